//! kwatch - Command-line tool for streaming watch events
//!
//! Opens one watch against an API server and prints every event as it
//! arrives.

mod config;
mod output;
mod watch;

use anyhow::{Context, Result};
use clap::Parser;
use kwatch_client::TransportMode;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::output::{OutputContext, OutputFormat};

#[derive(Parser)]
#[command(name = "kwatch")]
#[command(author, version, about = "Stream change events from a watch endpoint")]
struct Cli {
    /// Server URL (overrides the config file)
    #[arg(short, long, env = "KWATCH_SERVER")]
    server: Option<String>,

    /// Configuration file path
    #[arg(short, long, env = "KWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Bearer token (overrides the config file)
    #[arg(long, env = "KWATCH_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    output: OutputFormat,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Minimal output (for scripting)
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Collection path, e.g. /api/v1/namespaces/default/pods
    path: String,

    /// Resume from this resourceVersion
    #[arg(long)]
    resource_version: Option<String>,

    /// Label selector, e.g. app=web
    #[arg(short, long)]
    label_selector: Option<String>,

    /// Field selector, e.g. metadata.name=web-0
    #[arg(long)]
    field_selector: Option<String>,

    /// Watch timeout in seconds (defaults to the configured watch timeout)
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Do not request bookmark events
    #[arg(long)]
    no_bookmarks: bool,

    /// Read the whole response before decoding
    #[arg(long)]
    buffered: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("kwatch=info,kwatch_client=info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Load config file and merge CLI args over it
    let loaded = config::load(cli.config.as_deref())?;
    let mut client_config =
        config::merge_with_args(loaded, cli.server.as_deref(), cli.token.as_deref());
    if cli.buffered {
        client_config.transport = TransportMode::Buffered;
    }

    let ctx = OutputContext::new(cli.output, cli.no_color, cli.quiet);

    let args = watch::WatchArgs {
        path: cli.path,
        resource_version: cli.resource_version,
        label_selector: cli.label_selector,
        field_selector: cli.field_selector,
        timeout_secs: cli.timeout_secs,
        bookmarks: !cli.no_bookmarks,
    };

    watch::run(&client_config, &args, &ctx)
        .await
        .context("Watch failed")
}
