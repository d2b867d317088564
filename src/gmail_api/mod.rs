//! Gmail API access split into:
//! - auth: client config, credential store and the OAuth2 grant flow
//! - operations: building and submitting the outgoing message

pub mod auth;
pub mod operations;

pub use auth::{
    authorize, authorize_with, clear_credential, AuthorizedClient, ClientConfig, CodeProvider,
    ConsoleCodeProvider, Credential, OAuthFlow, RealOAuthFlow, DEFAULT_TOKEN_PATH,
    GMAIL_SEND_SCOPE,
};
pub use operations::{post_raw_message, send_email, send_email_with};
