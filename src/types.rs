use serde::{Deserialize, Serialize};

/// One HTML email addressed to a single recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub to: String,
    pub subject: String,
    pub body_html: String,
}

impl OutboundMessage {
    pub fn new(to: &str, subject: &str, body_html: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: subject.to_string(),
            body_html: body_html.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SendRequest<'a> {
    pub raw: &'a str,
}

/// Subset of the `users.messages.send` response we care about.
#[derive(Debug, Deserialize, Default)]
pub struct SendResponse {
    pub id: Option<String>,
    #[serde(rename = "threadId")]
    pub thread_id: Option<String>,
}

/// Successful send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub message_id: Option<String>,
    pub thread_id: Option<String>,
}

// Token endpoint response for both the code and refresh grants
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TokenErrorResponse {
    pub error: String,
    pub error_description: Option<String>,
}
