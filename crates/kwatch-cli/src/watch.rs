//! Watch command - print events as they arrive

use anyhow::{Context, Result};
use kwatch_client::{CancellationToken, ClientConfig, WatchError, WatchOptions, Watcher};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::output::OutputContext;

/// Parsed watch arguments
#[derive(Debug, Clone)]
pub struct WatchArgs {
    pub path: String,
    pub resource_version: Option<String>,
    pub label_selector: Option<String>,
    pub field_selector: Option<String>,
    pub timeout_secs: Option<u64>,
    pub bookmarks: bool,
}

impl WatchArgs {
    /// Build watch options bound to `cancel`
    pub fn options(&self, cancel: CancellationToken) -> WatchOptions {
        let mut options = WatchOptions::new()
            .allow_watch_bookmarks(self.bookmarks)
            .cancel_token(cancel);

        if let Some(rv) = &self.resource_version {
            options = options.resource_version(rv);
        }
        if let Some(selector) = &self.label_selector {
            options = options.label_selector(selector);
        }
        if let Some(selector) = &self.field_selector {
            options = options.field_selector(selector);
        }
        if let Some(secs) = self.timeout_secs {
            options = options.timeout(Duration::from_secs(secs));
        }
        options
    }
}

/// Run one watch until it ends, fails, or Ctrl+C is pressed
pub async fn run(config: &ClientConfig, args: &WatchArgs, ctx: &OutputContext) -> Result<()> {
    let watcher = Watcher::from_config(config).context("Failed to create watcher")?;

    // Ctrl+C cancels the watch; the stream then ends on its own
    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        handler_token.cancel();
    })?;

    let options = args.options(cancel.clone());
    let mut stream = watcher.watch::<Value>(&args.path, &options)?;

    ctx.info(&format!("Watching {} (Ctrl+C to stop)", stream.url()));

    let mut count = 0usize;
    while let Some(item) = stream.next().await {
        match item {
            Ok(event) => {
                count += 1;
                ctx.print_event(&event);
            }
            // Interrupted by the user before anything arrived
            Err(WatchError::Cancelled) if cancel.is_cancelled() => break,
            Err(e) => return Err(e.into()),
        }
    }

    debug!("Watch ended after {} event(s)", count);
    if cancel.is_cancelled() {
        ctx.info("Watch cancelled");
    } else {
        ctx.info(&format!("Watch ended after {} event(s)", count));
    }

    Ok(())
}
