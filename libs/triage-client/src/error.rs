use std::fmt;

/// Broad failure categories surfaced to the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad username/password at login. Surfaced verbatim, nothing mutated.
    Credentials,
    /// The server rejected our token (or a refresh failed). Fatal for the session.
    Unauthorized,
    /// Transport-level failure (connect, timeout, DNS).
    Network,
    /// The server answered with a non-2xx status.
    Api,
    /// The response body could not be decoded.
    Decode,
}

/// Application-level client error.
///
/// `Clone` so a single-flight refresh outcome can be handed to every waiter.
#[derive(Debug, Clone)]
pub struct ClientError {
    pub kind: ErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl ClientError {
    pub fn credentials(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Credentials,
            status: Some(401),
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Unauthorized,
            status: Some(401),
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Network,
            status: None,
            message: message.into(),
        }
    }

    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Api,
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Decode,
            status: None,
            message: message.into(),
        }
    }

    /// Whether the error means the session itself is no longer usable.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self.kind, ErrorKind::Credentials | ErrorKind::Unauthorized)
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{:?} ({}): {}", self.kind, status, self.message),
            None => write!(f, "{:?}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::decode(err.to_string());
        }
        let mut out = Self::network(err.to_string());
        out.status = err.status().map(|s| s.as_u16());
        out
    }
}
