//! `meater run`: drive the poll loop until a shutdown signal arrives.

use std::sync::Arc;

use tracing::{debug, info, warn};

use meater_core::{MemoryTree, Poller, PollerHandle};

use crate::cli::{GlobalOpts, OutputFormat, RunArgs};
use crate::error::CliError;
use crate::output;

use super::poller_config;

pub async fn handle(args: &RunArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let (path, config) = poller_config(global)?;
    if !config.credentials.is_complete() {
        warn!(
            path = %path.display(),
            "no credentials configured, the poller will stay idle"
        );
    }

    let tree = Arc::new(MemoryTree::new());
    let mut poller = Poller::new(config, Arc::clone(&tree))?;
    let handle = poller.handle();

    let task = tokio::spawn(async move { poller.run().await });

    wait_for_shutdown(&handle).await?;
    info!("shutdown requested, stopping poller");
    handle.shutdown();
    task.await
        .map_err(|e| CliError::Internal(format!("poller task failed: {e}")))?;

    if args.dump {
        let snapshot = tree.snapshot();
        let compact = matches!(global.output, OutputFormat::JsonCompact);
        output::print_output(&output::render_json(&snapshot, compact)?, global.quiet);
    }
    Ok(())
}

/// Block until Ctrl-C or SIGTERM. SIGUSR1 requests an immediate poll.
#[cfg(unix)]
async fn wait_for_shutdown(handle: &PollerHandle) -> Result<(), CliError> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = signal(SignalKind::terminate())?;
    let mut usr1 = signal(SignalKind::user_defined1())?;

    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => return Ok(res?),
            _ = term.recv() => return Ok(()),
            _ = usr1.recv() => {
                if handle.request_update() {
                    info!("manual update requested");
                } else {
                    debug!("update already pending");
                }
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(_handle: &PollerHandle) -> Result<(), CliError> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
