//! Binary state persistence for envelopes.
//!
//! Values are written little-endian. Every layout change bumps the revision
//! written at the head of the record; readers reject revisions newer than
//! they understand instead of guessing.

use std::io::{Read, Write};
use thiserror::Error;

/// Errors raised while saving or loading state.
#[derive(Debug, Error)]
pub enum StateError {
    /// Underlying stream failed or ended early.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The record was written by a newer format.
    #[error("unsupported state revision {found} (newest supported is {supported})")]
    UnsupportedRevision {
        /// Revision found in the stream.
        found: i32,
        /// Newest revision this build reads.
        supported: i32,
    },

    /// The record holds more stages than an envelope can.
    #[error("state holds {found} stages, at most {max} are supported")]
    StageCountMismatch {
        /// Stage count found in the stream.
        found: i32,
        /// Capacity of an envelope.
        max: usize,
    },

    /// A field decoded to a value outside its domain.
    #[error("invalid value for {field}: {value}")]
    InvalidValue {
        /// Name of the offending field.
        field: &'static str,
        /// Decoded value.
        value: f64,
    },
}

/// Result type for state persistence.
pub type Result<T> = std::result::Result<T, StateError>;

pub(crate) fn write_i32(w: &mut impl Write, v: i32) -> Result<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

pub(crate) fn write_f32(w: &mut impl Write, v: f32) -> Result<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

pub(crate) fn write_f64(w: &mut impl Write, v: f64) -> Result<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

pub(crate) fn write_bool(w: &mut impl Write, v: bool) -> Result<()> {
    w.write_all(&[u8::from(v)])?;
    Ok(())
}

pub(crate) fn read_i32(r: &mut impl Read) -> Result<i32> {
    let mut bytes = [0u8; 4];
    r.read_exact(&mut bytes)?;
    Ok(i32::from_le_bytes(bytes))
}

pub(crate) fn read_f32(r: &mut impl Read) -> Result<f32> {
    let mut bytes = [0u8; 4];
    r.read_exact(&mut bytes)?;
    Ok(f32::from_le_bytes(bytes))
}

pub(crate) fn read_f64(r: &mut impl Read) -> Result<f64> {
    let mut bytes = [0u8; 8];
    r.read_exact(&mut bytes)?;
    Ok(f64::from_le_bytes(bytes))
}

pub(crate) fn read_bool(r: &mut impl Read) -> Result<bool> {
    let mut byte = [0u8; 1];
    r.read_exact(&mut byte)?;
    match byte[0] {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(StateError::InvalidValue {
            field: "bool",
            value: f64::from(other),
        }),
    }
}
