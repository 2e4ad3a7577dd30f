use thiserror::Error;

use crate::mail_reader::Uid;

/// Failures surfaced by the retrieval and delivery pipelines.
///
/// `Connection`, `Auth`, `Protocol` and `Delivery` abort the operation that
/// raised them. `Fetch` is scoped to one message and is logged and skipped by
/// the stream instead of being returned to the caller.
#[derive(Debug, Error)]
pub enum MailError {
    /// Transport could not be established or the server hung up.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Credentials were rejected.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Server refused a session-level command (select, search).
    #[error("Mailbox command failed: {0}")]
    Protocol(String),

    /// One message could not be fetched or decoded.
    #[error("Failed to fetch UID {uid}: {reason}")]
    Fetch { uid: Uid, reason: String },

    /// Submission was rejected or the submission server was unreachable.
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

pub type Result<T> = std::result::Result<T, MailError>;
