//! Structured activity logging: JSONL writer plus the thread that feeds it.

pub mod activity;
pub mod jsonl;
