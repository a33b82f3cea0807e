use std::io;
use thiserror::Error;

pub type CaseResult<T> = Result<T, CaseError>;

#[derive(Error, Debug)]
pub enum CaseError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("missing key `{key}` in {file}")]
    MissingKey { key: String, file: &'static str },

    #[error("invalid value `{value}` for `{key}`: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("periodic boundary on the {face} face needs a periodic {opposite} face")]
    InvalidBoundaryPairing {
        face: &'static str,
        opposite: &'static str,
    },

    #[error("obstacle map is {rows}x{columns}, expected {ny}x{nx}")]
    MapShape {
        rows: usize,
        columns: usize,
        nx: usize,
        ny: usize,
    },
}

impl CaseError {
    pub fn invalid(key: &str, value: &str, reason: impl Into<String>) -> Self {
        CaseError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}
