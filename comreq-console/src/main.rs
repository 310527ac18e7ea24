mod output;
mod session;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use comreq_core::{AppConfig, RequestStateService};
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

use crate::output::Printer;
use crate::session::Session;

#[derive(Debug, Parser)]
#[command(
    name = "comreq-console",
    version,
    about = "Feed the request cache from JSON lines and print every change"
)]
struct Cli {
    /// Read commands from this file instead of stdin
    #[arg(long)]
    input: Option<PathBuf>,
    /// Config file (defaults to <config dir>/comreq/config.json)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref(), env_filter("info"), std::io::stderr);
    if cli.pretty {
        config.output.pretty = true;
    }
    init_tracing(&config.log.level);

    let service = RequestStateService::new();
    let printer = Printer::new(std::io::stdout(), config.output.clone());
    let listener_id = service.add_listener(printer.listener()).await;
    let session = Session::new(service.clone(), config.session.default_user.clone(), printer);

    let summary = match &cli.input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("failed to open input {}", path.display()))?;
            session.run(BufReader::new(file)).await
        }
        None => session.run(BufReader::new(tokio::io::stdin())).await,
    };

    service.remove_listener(listener_id).await;
    info!(
        users = service.user_ids().await.len(),
        applied = summary.applied,
        rejected = summary.rejected,
        "session finished"
    );
    Ok(())
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Loads the config under a temporary subscriber: the global one depends on
/// the configured level, but fallback warnings must still be reported.
fn load_config<W>(path: Option<&Path>, filter: EnvFilter, writer: W) -> AppConfig
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let bootstrap = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .finish();
    tracing::subscriber::with_default(bootstrap, || match path {
        Some(path) => AppConfig::load_or_default(path),
        None => AppConfig::load(),
    })
}

fn init_tracing(default_level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_level))
        .with_writer(std::io::stderr)
        .try_init();
}
