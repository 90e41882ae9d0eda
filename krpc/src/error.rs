//! Error types for KRPC message handling.

use std::error::Error;
use std::fmt;

/// Errors raised while decoding or validating a single KRPC datagram.
///
/// Every variant describes a fault in one inbound message. Callers are
/// expected to log and drop the offending datagram; none of these errors
/// should ever terminate the receive path.
#[derive(Debug)]
pub enum KrpcError {
    /// The payload was not a well-formed bencoded dictionary.
    Encoding(serde_bencode::Error),
    /// A query arrived without a transaction id, so no reply can be correlated.
    MissingTransactionId,
    /// A required field was absent from the query arguments.
    MissingField(&'static str),
    /// An identifier field had the wrong length.
    BadIdentifier { field: &'static str, len: usize },
}

impl fmt::Display for KrpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KrpcError::Encoding(err) => write!(f, "malformed bencode payload: {err}"),
            KrpcError::MissingTransactionId => write!(f, "query missing transaction id"),
            KrpcError::MissingField(field) => write!(f, "query missing required field '{field}'"),
            KrpcError::BadIdentifier { field, len } => {
                write!(f, "field '{field}' is {len} bytes, expected {}", crate::ID_LEN)
            }
        }
    }
}

impl Error for KrpcError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            KrpcError::Encoding(err) => Some(err),
            KrpcError::MissingTransactionId => None,
            KrpcError::MissingField(_) => None,
            KrpcError::BadIdentifier { .. } => None,
        }
    }
}

impl From<serde_bencode::Error> for KrpcError {
    fn from(err: serde_bencode::Error) -> Self {
        KrpcError::Encoding(err)
    }
}
