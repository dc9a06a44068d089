//! Host facilities behind a trait seam.

pub mod pal;
