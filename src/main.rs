use clap::Parser;
use gmail_sender::cli::{handle_token_clear, Cli};
use gmail_sender::gmail_api::{send_email_with, ConsoleCodeProvider, RealOAuthFlow};
use gmail_sender::OutboundMessage;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr; stdout is reserved for the authorization prompt
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.clear_token {
        handle_token_clear(&cli).await?;
        return Ok(());
    }

    let to = cli.to.clone().unwrap_or_default();
    let body = cli.html_body().await?;
    let message = OutboundMessage::new(&to, &cli.subject, &body);

    let settings = cli.settings();
    let oauth_flow = RealOAuthFlow::new(&settings)?;

    let sent = send_email_with(
        &settings,
        &ConsoleCodeProvider,
        &oauth_flow,
        &message,
        &cli.credentials,
        Some(cli.token.as_path()),
    )
    .await?;

    match sent.message_id {
        Some(id) => println!("Email sent successfully! (id {})", id),
        None => println!("Email sent successfully!"),
    }
    Ok(())
}
