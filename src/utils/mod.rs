//! # Utility Functions (`utils`)
//!
//! Helpers for persisting optimizer state.

pub mod serialization;

pub use serialization::{load_state, save_state, SerializationError};
