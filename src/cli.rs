use crate::gmail_api::{clear_credential, DEFAULT_TOKEN_PATH};
use crate::settings::{GmailSettings, DEFAULT_API_BASE, DEFAULT_TIMEOUT_SECS};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    /// Recipient address.
    #[clap(long, required_unless_present = "clear_token")]
    pub to: Option<String>,

    /// Subject line.
    #[clap(long, default_value = "")]
    pub subject: String,

    /// HTML body.
    #[clap(long, conflicts_with = "body_file")]
    pub body: Option<String>,

    /// Read the HTML body from a file instead.
    #[clap(long)]
    pub body_file: Option<PathBuf>,

    /// OAuth client secret downloaded from the Google Cloud console.
    #[clap(long, default_value = "client_secret.json")]
    pub credentials: PathBuf,

    /// Where the authorized-user credential is stored.
    #[clap(long, default_value = DEFAULT_TOKEN_PATH)]
    pub token: PathBuf,

    #[clap(long, default_value = DEFAULT_API_BASE, hide = true)]
    pub api_base: String,

    /// Per-request HTTP timeout in seconds.
    #[clap(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    /// Delete the stored credential and exit.
    #[clap(long)]
    pub clear_token: bool,
}

impl Cli {
    pub fn settings(&self) -> GmailSettings {
        GmailSettings {
            api_base: self.api_base.clone(),
            request_timeout: Duration::from_secs(self.timeout_secs),
        }
    }

    pub async fn html_body(&self) -> Result<String, std::io::Error> {
        match (&self.body, &self.body_file) {
            (Some(body), _) => Ok(body.clone()),
            (None, Some(path)) => tokio::fs::read_to_string(path).await,
            (None, None) => Ok(String::new()),
        }
    }
}

pub async fn handle_token_clear(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if clear_credential(&cli.token).await? {
        println!("Removed stored credential {}.", cli.token.display());
    } else {
        println!("No stored credential at {}.", cli.token.display());
    }
    Ok(())
}
