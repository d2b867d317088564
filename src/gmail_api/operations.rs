use crate::email_content::{build_mime_message, encode_raw};
use crate::error::{GmailError, SendError, SendErrorKind};
use crate::gmail_api::auth::{
    authorize_with, CodeProvider, ConsoleCodeProvider, OAuthFlow, RealOAuthFlow,
    DEFAULT_TOKEN_PATH,
};
use crate::settings::GmailSettings;
use crate::types::{OutboundMessage, SendRequest, SendResponse, Sent};
use std::path::Path;
use tracing::{error, info, warn};

// Send one HTML email, prompting on the console if no credential is stored yet
pub async fn send_email(
    to: &str,
    subject: &str,
    html_body: &str,
    config_path: &Path,
    token_path: Option<&Path>,
) -> Result<Sent, SendError> {
    let settings = GmailSettings::default();
    let oauth_flow = RealOAuthFlow::new(&settings).map_err(report_failure)?;
    let message = OutboundMessage::new(to, subject, html_body);

    send_email_with(
        &settings,
        &ConsoleCodeProvider,
        &oauth_flow,
        &message,
        config_path,
        token_path,
    )
    .await
}

pub async fn send_email_with<C: CodeProvider + ?Sized, O: OAuthFlow + ?Sized>(
    settings: &GmailSettings,
    code_provider: &C,
    oauth_flow: &O,
    message: &OutboundMessage,
    config_path: &Path,
    token_path: Option<&Path>,
) -> Result<Sent, SendError> {
    let token_path = token_path.unwrap_or_else(|| Path::new(DEFAULT_TOKEN_PATH));

    let result = deliver(
        settings,
        code_provider,
        oauth_flow,
        message,
        config_path,
        token_path,
    )
    .await;

    match result {
        Ok(sent) => {
            info!(
                to = %message.to,
                message_id = sent.message_id.as_deref().unwrap_or("-"),
                "Email sent"
            );
            Ok(sent)
        }
        Err(e) => Err(report_failure(e)),
    }
}

async fn deliver<C: CodeProvider + ?Sized, O: OAuthFlow + ?Sized>(
    settings: &GmailSettings,
    code_provider: &C,
    oauth_flow: &O,
    message: &OutboundMessage,
    config_path: &Path,
    token_path: &Path,
) -> Result<Sent, GmailError> {
    // Checked before authorizing so a bad header never prompts the operator
    let mime = build_mime_message(message)?;
    let client = authorize_with(config_path, token_path, code_provider, oauth_flow).await?;
    let access_token = client.access_token(oauth_flow).await?;
    let raw = encode_raw(&mime);
    post_raw_message(&settings.http_client()?, settings, &access_token, &raw).await
}

// The caller only ever sees the generic error; the detail goes to the log
fn report_failure(err: GmailError) -> SendError {
    let kind = SendErrorKind::from(&err);
    error!(error = %err, ?kind, "Error sending email");
    SendError::from(err)
}

// Submit an already-encoded message through users.messages.send
pub async fn post_raw_message(
    client: &reqwest::Client,
    settings: &GmailSettings,
    access_token: &str,
    raw: &str,
) -> Result<Sent, GmailError> {
    let response = client
        .post(settings.send_url())
        .bearer_auth(access_token)
        .json(&SendRequest { raw })
        .send()
        .await?;

    if response.status().is_success() {
        let body: SendResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "Unreadable send response, message id unknown");
                SendResponse::default()
            }
        };
        Ok(Sent {
            message_id: body.id,
            thread_id: body.thread_id,
        })
    } else {
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(GmailError::Transport { status, body })
    }
}
