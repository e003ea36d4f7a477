//! Handler replies.

use crate::error::ProbeError;

/// What an endpoint hands back to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub body: String,
}

impl Reply {
    /// `200` with an empty body.
    pub fn empty() -> Self {
        Self::new(200, String::new())
    }

    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Result from an endpoint, filter, or the server pipeline.
pub type HandlerResult = Result<Reply, ProbeError>;
