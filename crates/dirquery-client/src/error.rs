//! Client error types.

use dirquery_proto::ResultCode;
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Connection or transport failure.
    #[error("connection error: {0}")]
    Connection(String),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] dirquery_proto::Error),

    /// Invalid configuration or usage, detected before any I/O.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The server answered with a non-success result code.
    #[error("server returned {code}: {message}")]
    Server { code: ResultCode, message: String },

    /// The search succeeded but the requested sort was not applied.
    #[error("server-side sort failed with {code}{}", attribute_suffix(.attribute))]
    SortFailed {
        code: ResultCode,
        attribute: Option<String>,
    },

    /// A query expecting a fixed number of entries saw a different count.
    #[error("expected {expected} for filter '{filter}' under '{base_dn}', found {found}")]
    Cardinality {
        expected: &'static str,
        found: usize,
        filter: String,
        base_dn: String,
    },

    /// Range retrieval failed part-way through.
    #[error("range retrieval of '{attribute}' failed at range {range}: server returned {code}: {message}")]
    RangeRetrieval {
        attribute: String,
        range: String,
        code: ResultCode,
        message: String,
    },

    /// The resource was disposed by its owner.
    #[error("{0} has been disposed")]
    Disposed(String),

    /// Every pooled connection is in use.
    #[error("connection pool exhausted: maximum of {max} connections reached")]
    PoolExhausted { max: usize },

    /// The server lacks a capability the query depends on.
    #[error("server does not support {0}")]
    Unsupported(String),
}

fn attribute_suffix(attribute: &Option<String>) -> String {
    attribute
        .as_deref()
        .map(|a| format!(" on attribute '{}'", a))
        .unwrap_or_default()
}

impl Error {
    /// Build a server error from a failed response.
    pub fn server(code: ResultCode, message: impl Into<String>) -> Self {
        Error::Server {
            code,
            message: message.into(),
        }
    }
}
