//! State-file persistence.

pub mod state_file;

pub use state_file::{PersistedState, RestoreOutcome, load_state, restore, save_snapshot, save_state};
