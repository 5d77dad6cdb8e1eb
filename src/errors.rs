use thiserror::Error;

/// Error kinds shared across the server.
///
/// Parse-level errors abort processing of the offending message; the client
/// receives a response with the mapped RCODE only when the message arrived
/// directly from it.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("insufficient buffers")]
    NoBufs,
    #[error("malformed message")]
    Parse,
    #[error("signature or authorization failure")]
    Security,
    #[error("name registered with a different key")]
    Duplicated,
    #[error("operation failed")]
    Failed,
    #[error("message dropped")]
    Drop,
    #[error("invalid state for this operation")]
    InvalidState,
    #[error("invalid argument")]
    InvalidArgs,
    #[error("no response from the service update handler")]
    ResponseTimeout,
    #[error("not found")]
    NotFound,
}
