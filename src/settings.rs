use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://gmail.googleapis.com";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Runtime knobs passed down from the caller instead of living in globals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GmailSettings {
    /// Scheme and host of the Gmail REST API, without a trailing path.
    pub api_base: String,
    /// Applied to every HTTP request, token endpoint included.
    pub request_timeout: Duration,
}

impl Default for GmailSettings {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl GmailSettings {
    pub fn http_client(&self) -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder()
            .timeout(self.request_timeout)
            .build()
    }

    pub fn send_url(&self) -> String {
        format!(
            "{}/gmail/v1/users/me/messages/send",
            self.api_base.trim_end_matches('/')
        )
    }
}
