pub mod cli;
pub mod email_content;
pub mod error;
pub mod gmail_api;
pub mod settings;
pub mod types;

pub use error::{GmailError, SendError, SendErrorKind};
pub use gmail_api::{send_email, send_email_with};
pub use settings::GmailSettings;
pub use types::{OutboundMessage, Sent};
