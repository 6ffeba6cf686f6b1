//! oauth-userinfo: log in through the browser and print who you are.
//!
//! Usage:
//! ```bash
//! export OAUTH_USERINFO_CLIENT_ID=...
//! export OAUTH_USERINFO_CLIENT_SECRET=...
//! oauth-userinfo
//!
//! # Headless: print the URL instead of opening a browser
//! oauth-userinfo --no-browser --timeout 300
//! ```

mod cli;
mod logging;

use std::process::ExitCode;

use clap::Parser;
use oauth_userinfo_core::{
    render, CancellationToken, LoginError, LoginFlow, ManualBrowser,
};
use tracing::info;

use cli::Cli;

const EXIT_CANCELLED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.log_format, cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            match e.downcast_ref::<LoginError>() {
                Some(LoginError::Cancelled) => ExitCode::from(EXIT_CANCELLED),
                _ => ExitCode::FAILURE,
            }
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.client_config()?;
    info!(?config, "Configuration loaded");

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling login");
            on_signal.cancel();
        }
    });

    let mut flow = LoginFlow::new(config)?.with_cancellation(cancel);
    if cli.no_browser {
        flow = flow.with_launcher(ManualBrowser);
    }

    let outcome = flow.run().await?;
    print!("{}", render(&outcome.profile, cli.output_format()));
    Ok(())
}
