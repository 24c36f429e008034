//! Static error types raised by the frontend and the semantic pass.

use thiserror::Error;

/// Fatal static diagnostics. The first error terminates the pipeline; the
/// prefixes are part of the compiler's observable surface.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SemantError {
    #[error("STypeError: {0}")]
    Type(String),
    #[error("SNameError: {0}")]
    Name(String),
    #[error("SSyntaxError: {0}")]
    Syntax(String),
    #[error("SNotImplementedError: {0}")]
    NotImplemented(String),
}

pub type SemantResult<T> = Result<T, SemantError>;
