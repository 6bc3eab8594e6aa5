//! Server side of git's v1 smart transfer protocol.
//!
//! The [`handler::GitRequestHandler`] drives one request end to end:
//! handshake, ref advertisement, then either want/have negotiation and
//! sideband pack transmission (fetch) or ref updates and pack receipt
//! (push). Framing is pkt-line throughout, except for the raw push body.

pub mod handler;
pub mod negotiate;
pub mod pktline;
pub mod sideband;

pub use handler::{GitOperation, GitRequestHandler};

use vault_repo::RepoError;

/// Errors that can occur while serving a request.
///
/// Client-caused protocol violations terminate the request without a
/// descriptive frame; the client observes a closed stream. Storage and
/// I/O failures surface to the operator through the process exit path.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid pkt-line: {0}")]
    InvalidPktLine(String),

    #[error("invalid handshake from client")]
    InvalidHandshake,

    #[error("invalid `want` line sent by client")]
    InvalidWant,

    #[error("invalid `have` line sent by client")]
    InvalidHave,

    #[error("invalid line sent by client during ref update")]
    InvalidPushRefs,

    #[error("no HEAD in repository")]
    NoHead,

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
