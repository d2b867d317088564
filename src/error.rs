use std::path::PathBuf;
use thiserror::Error;

/// Everything that can go wrong between reading the client config and the
/// Gmail API accepting a message.
#[derive(Debug, Error)]
pub enum GmailError {
    #[error("failed to read client configuration {}: {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("client configuration {} lists no redirect URIs", path.display())]
    MissingRedirectUri { path: PathBuf },

    #[error("line break in the {field} header")]
    HeaderLineBreak { field: &'static str },

    #[error("invalid authorization endpoint: {0}")]
    AuthUrl(String),

    #[error("failed to read authorization code: {0}")]
    CodeInput(#[source] std::io::Error),

    #[error("authorization code exchange failed: {0}")]
    AuthExchange(String),

    #[error("access token refresh failed: {0}")]
    TokenRefresh(String),

    #[error("failed to write credential file {}: {source}", path.display())]
    CredentialStore {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize credential: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("send request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gmail rejected the message ({status}): {body}")]
    Transport { status: u16, body: String },
}

/// Coarse cause of a failed send, for callers that need to branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendErrorKind {
    Config,
    Authorization,
    Transport,
}

impl From<&GmailError> for SendErrorKind {
    fn from(err: &GmailError) -> Self {
        match err {
            GmailError::Config { .. }
            | GmailError::MissingRedirectUri { .. }
            | GmailError::HeaderLineBreak { .. } => SendErrorKind::Config,
            GmailError::AuthUrl(_)
            | GmailError::CodeInput(_)
            | GmailError::AuthExchange(_)
            | GmailError::TokenRefresh(_)
            | GmailError::CredentialStore { .. }
            | GmailError::Serialize(_) => SendErrorKind::Authorization,
            GmailError::Http(_) | GmailError::Transport { .. } => SendErrorKind::Transport,
        }
    }
}

/// The only error `send_email` returns. The underlying cause is logged, not
/// carried: the message is always the same.
#[derive(Debug, Error)]
#[error("Error sending email")]
pub struct SendError {
    kind: SendErrorKind,
}

impl SendError {
    pub fn kind(&self) -> SendErrorKind {
        self.kind
    }
}

impl From<GmailError> for SendError {
    fn from(err: GmailError) -> Self {
        SendError {
            kind: SendErrorKind::from(&err),
        }
    }
}
