//! Core utilities and types for archdiff
//!
//! This crate provides the error taxonomy and the compiler configuration
//! shared across the archdiff crates.

pub mod config;
pub mod errors;

pub use config::{NormalizeConfig, SyntheticNames};
pub use errors::{ArchError, Result};

#[cfg(feature = "python")]
impl From<ArchError> for pyo3::PyErr {
    fn from(err: ArchError) -> Self {
        pyo3::exceptions::PyValueError::new_err(err.to_string())
    }
}
