//! # Optimizer State Serialization
//!
//! Saves and loads DiffGrad state (step counter plus every per-parameter slot).
//! Uses `serde` for serialization and `bincode` as the binary format.

use crate::optim::{DiffGrad, OptimError, OptimizerState};

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

// --- Error Type ---
#[derive(thiserror::Error, Debug)]
pub enum SerializationError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization Error (Bincode): {0}")]
    Bincode(#[from] bincode::Error),
    #[error("Optimizer Error: {0}")]
    Optim(#[from] OptimError),
}

/// Encodes optimizer state into any writer.
pub fn write_state<W: Write>(state: &OptimizerState, writer: W) -> Result<(), SerializationError> {
    bincode::serialize_into(writer, state)?;
    Ok(())
}

/// Decodes optimizer state from any reader.
pub fn read_state<R: Read>(reader: R) -> Result<OptimizerState, SerializationError> {
    Ok(bincode::deserialize_from(reader)?)
}

// --- Save Function ---

/// Saves the optimizer's state dictionary to a file.
///
/// # Arguments
/// * `optimizer`: The optimizer whose slots and step counter should be saved.
/// * `path`: The file path where the state will be written.
pub fn save_state<P: AsRef<Path>>(optimizer: &DiffGrad, path: P) -> Result<(), SerializationError> {
    let state = optimizer.state_dict();
    let file = File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);
    write_state(&state, &mut writer)?;
    writer.flush()?;
    log::debug!(
        "saved DiffGrad state ({} slots, iteration {}) to {}",
        state.slots.len(),
        state.iterations,
        path.as_ref().display()
    );
    Ok(())
}

// --- Load Function ---

/// Loads a state dictionary from a file into an already-built optimizer.
///
/// The optimizer must track exactly the parameter ids stored in the file;
/// otherwise nothing is changed and an error is returned.
pub fn load_state<P: AsRef<Path>>(optimizer: &mut DiffGrad, path: P) -> Result<(), SerializationError> {
    let file = File::open(path.as_ref())?;
    let state = read_state(BufReader::new(file))?;
    optimizer.load_state_dict(&state)?;
    Ok(())
}
