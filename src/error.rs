//! Rich diagnostic error types for the catalogue client.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]`
//! derives, providing error codes and help text; this module aggregates
//! them so callers can handle the whole retrieval pipeline with one type.

use miette::Diagnostic;
use thiserror::Error;

use crate::beautify::BeautifyError;
use crate::protocol::ProtocolError;
use crate::query::QueryError;
use crate::session::RetrievalError;

/// Top-level error type of the crate.
///
/// Each variant wraps a subsystem-specific error, preserving the full
/// diagnostic chain (error codes, help text) through to the caller.
#[derive(Debug, Error, Diagnostic)]
pub enum OpacError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Beautify(#[from] BeautifyError),
}

/// Result alias for operations that can fail anywhere in the pipeline.
pub type OpacResult<T> = Result<T, OpacError>;
