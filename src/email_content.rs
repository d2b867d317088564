use crate::error::GmailError;
use crate::types::OutboundMessage;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::engine::Engine;

// Header values go on one line each; a CR or LF would start a new header
fn header_value<'a>(field: &'static str, value: &'a str) -> Result<&'a str, GmailError> {
    if value.contains(|c| c == '\r' || c == '\n') {
        return Err(GmailError::HeaderLineBreak { field });
    }
    Ok(value)
}

// Build the RFC 822 message. Lines end in a bare LF; Gmail accepts it.
pub fn build_mime_message(message: &OutboundMessage) -> Result<String, GmailError> {
    let to = header_value("To", &message.to)?;
    let subject = header_value("Subject", &message.subject)?;

    Ok([
        format!("To: {}", to),
        "Content-Type: text/html; charset=utf-8".to_string(),
        "MIME-Version: 1.0".to_string(),
        format!("Subject: {}", subject),
        String::new(),
        message.body_html.clone(),
    ]
    .join("\n"))
}

/// Encode a MIME message for the `raw` field: URL-safe alphabet, no padding.
pub fn encode_raw(mime: &str) -> String {
    URL_SAFE_NO_PAD.encode(mime.as_bytes())
}
