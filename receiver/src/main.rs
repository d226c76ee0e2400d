use frame_rx_common::config::Config;
use frame_rx_receiver::controller;
use frame_rx_receiver::pipeline::synthetic::SyntheticFactory;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .with_thread_names(true)
        .init();

    info!(
        sessions = config.rx.sessions,
        width = config.video.width,
        height = config.video.height,
        fps = config.video.fps,
        ip = %config.network.ip,
        udp_port = config.network.udp_port,
        num_ports = config.network.num_ports(),
        dump = config.dump.enabled,
        "starting frame receiver"
    );

    let exit = Arc::new(AtomicBool::new(false));
    {
        let exit = Arc::clone(&exit);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("exit signal received");
                    exit.store(true, Ordering::Release);
                }
                Err(e) => warn!(error = %e, "failed to listen for Ctrl-C"),
            }
        });
    }

    let outcome =
        tokio::task::spawn_blocking(move || controller::run(&config, &SyntheticFactory, &exit))
            .await;

    match outcome {
        Ok(Ok(report)) => {
            for s in &report.sessions {
                info!(session = s.index, received = s.received, "session result");
            }
            info!(total = report.total_received(), "run passed");
        }
        Ok(Err(e)) => {
            error!(error = %e, "run failed");
            std::process::exit(1);
        }
        Err(e) => {
            error!(error = %e, "run controller panicked");
            std::process::exit(1);
        }
    }
}
