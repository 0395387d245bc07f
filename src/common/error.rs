//! Error types for layout classification and call arrangement.
//!
//! Every error here is a programmer error at the call-site description
//! level: none of them is retried, and classification itself never fails
//! partway (an aggregate that violates a psABI rule deterministically
//! collapses to all-MEMORY, which is a successful classification).

use thiserror::Error;

/// Errors raised while classifying layouts or arranging a call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArrangeError {
    /// A layout the classifier or binding calculator does not support:
    /// padding outside a group, a value annotated with a non-value ABI
    /// class, or a scalar whose classification does not fit the carrier
    /// model (for example a bare `long double` argument).
    #[error("unsupported layout: {0}")]
    UnsupportedLayout(String),

    /// Structurally invalid classification input, such as an X87UP
    /// eightbyte with no preceding X87. Fatal for the call site.
    #[error("malformed layout: {0}")]
    MalformedLayout(String),

    /// The host signature declares a different number of parameters than
    /// the C function descriptor.
    #[error("host signature has {host} parameters but the descriptor declares {native}")]
    ArityMismatch { host: usize, native: usize },

    /// The host signature and the C function descriptor disagree about
    /// whether the call returns a value.
    #[error("host signature and descriptor disagree about the presence of a return value")]
    ReturnPresenceMismatch,
}

impl ArrangeError {
    pub(crate) fn unsupported(msg: impl Into<String>) -> Self {
        ArrangeError::UnsupportedLayout(msg.into())
    }

    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        ArrangeError::MalformedLayout(msg.into())
    }
}
