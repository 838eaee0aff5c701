use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use gh_org_secrets::app::App;
use gh_org_secrets::cli::Cli;
use gh_org_secrets::error::format_error_chain;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_env("GH_ORG_SECRETS_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("gh_org_secrets=debug")
        } else {
            EnvFilter::new("gh_org_secrets=info")
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    match App::run(cli).await {
        Ok(status) => std::process::exit(status.exit_code()),
        Err(e) => {
            eprintln!("Error: {}", format_error_chain(&e));
            std::process::exit(2);
        }
    }
}
