use super::{load_config, load_tree};
use anyhow::Result;
use autotap::SessionController;
use clap::Args;
use colored::*;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Args)]
pub struct RunCommand {
    /// JSON snapshot of the UI tree
    #[arg(long)]
    tree: PathBuf,

    /// Text to look for in node text, description or element id
    #[arg(long)]
    target: String,

    /// Stop after this many seconds (default: run until Ctrl-C)
    #[arg(long)]
    duration_secs: Option<u64>,

    /// Optional JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Delay between scans in milliseconds
    #[arg(long)]
    scan_interval_ms: Option<u64>,
}

impl RunCommand {
    pub async fn execute(&self) -> Result<()> {
        let engine = load_tree(&self.tree)?;
        let mut config = load_config(self.config.as_deref())?;
        if let Some(interval) = self.scan_interval_ms {
            config.scan_interval_ms = interval;
        }

        let controller = SessionController::new(Arc::new(engine), config)?;
        controller.set_target(self.target.as_str());
        controller.start();
        eprintln!("{} searching for '{}'", "▶".cyan(), self.target.bold());

        let reason = wait_for_stop(
            self.duration_secs.map(Duration::from_secs),
            tokio::signal::ctrl_c(),
        )
        .await;
        info!("Stopping session: {:?}", reason);

        controller.shutdown().await;
        let status = controller.status();
        match status.last_match_at {
            Some(at) => eprintln!("  {} last tap at {}", "✓".green(), at.to_rfc3339()),
            None => eprintln!("  {} no completed taps", "✗".yellow()),
        }
        println!("{}", serde_json::to_string_pretty(&status)?);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Elapsed,
    Interrupted,
    /// No duration was given and Ctrl-C could not be listened for.
    SignalUnavailable,
}

/// Wait until the duration elapses or `interrupt` fires. A failed Ctrl-C
/// registration is logged; with a duration the run still lasts the full time.
async fn wait_for_stop<F>(duration: Option<Duration>, interrupt: F) -> StopReason
where
    F: Future<Output = std::io::Result<()>>,
{
    let interrupted = async move {
        match interrupt.await {
            Ok(()) => StopReason::Interrupted,
            Err(e) => {
                warn!("Could not listen for Ctrl-C: {}", e);
                StopReason::SignalUnavailable
            }
        }
    };
    match duration {
        Some(duration) => {
            let deadline = tokio::time::Instant::now() + duration;
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => StopReason::Elapsed,
                reason = interrupted => {
                    if reason == StopReason::SignalUnavailable {
                        tokio::time::sleep_until(deadline).await;
                        return StopReason::Elapsed;
                    }
                    reason
                }
            }
        }
        None => interrupted.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn registration_failure() -> impl Future<Output = io::Result<()>> {
        async { Err(io::Error::new(io::ErrorKind::Other, "no signal handler")) }
    }

    #[tokio::test]
    async fn test_duration_elapses_without_interrupt() {
        let reason = wait_for_stop(
            Some(Duration::from_millis(20)),
            std::future::pending::<io::Result<()>>(),
        )
        .await;
        assert_eq!(reason, StopReason::Elapsed);
    }

    #[tokio::test]
    async fn test_interrupt_ends_wait_early() {
        let started = std::time::Instant::now();
        let reason = wait_for_stop(Some(Duration::from_secs(30)), async { Ok(()) }).await;
        assert_eq!(reason, StopReason::Interrupted);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_failed_registration_still_waits_for_duration() {
        let started = std::time::Instant::now();
        let reason = wait_for_stop(Some(Duration::from_millis(100)), registration_failure()).await;
        assert_eq!(reason, StopReason::Elapsed);
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_failed_registration_without_duration_is_reported() {
        let reason = wait_for_stop(None, registration_failure()).await;
        assert_eq!(reason, StopReason::SignalUnavailable);
    }
}
