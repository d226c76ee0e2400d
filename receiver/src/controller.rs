use frame_rx_common::config::Config;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{error, info};

use crate::error::ReceiverError;
use crate::pipeline::PipelineFactory;
use crate::session::SessionRegistry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub index: usize,
    pub received: u64,
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub sessions: Vec<SessionSummary>,
}

impl RunReport {
    pub fn total_received(&self) -> u64 {
        self.sessions.iter().map(|s| s.received).sum()
    }
}

/// Run every configured session until `exit` is raised (or `rx.run_secs`
/// runs out), then stop, check and release them.
///
/// A setup failure tears down whatever was already created and is returned
/// as is. Sessions without a single frame fail the run as a whole.
pub fn run(
    config: &Config,
    factory: &dyn PipelineFactory,
    exit: &AtomicBool,
) -> Result<RunReport, ReceiverError> {
    let mut registry = SessionRegistry::new();

    if let Err(e) = registry.create_all(config, factory) {
        error!(error = %e, created = registry.len(), "setup failed, tearing down");
        registry.teardown_all();
        return Err(e.into());
    }

    wait_for_exit(
        exit,
        Duration::from_millis(config.rx.poll_interval_ms),
        config.rx.run_secs.map(Duration::from_secs),
    );

    info!("stopping sessions");
    registry.stop_all();

    let report = RunReport {
        sessions: registry
            .received()
            .into_iter()
            .map(|(index, received)| SessionSummary { index, received })
            .collect(),
    };
    let validation = registry.validate();
    registry.teardown_all();

    validation?;
    Ok(report)
}

/// Sleep in `poll` steps until `exit` is set or `limit` has passed.
fn wait_for_exit(exit: &AtomicBool, poll: Duration, limit: Option<Duration>) {
    let deadline = limit.map(|d| Instant::now() + d);
    while !exit.load(Ordering::Acquire) {
        let mut step = poll;
        if let Some(deadline) = deadline {
            let now = Instant::now();
            if now >= deadline {
                info!("run time elapsed");
                return;
            }
            step = step.min(deadline - now);
        }
        std::thread::sleep(step);
    }
    info!("exit requested");
}
