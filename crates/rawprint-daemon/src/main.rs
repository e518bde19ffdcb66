// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// rawprintd: raw-socket (JetDirect, port 9100) print ingestion daemon.
//
// Entry point.  Initialises logging, resolves the data directory, loads the
// configuration, opens the spool and runs the listener until SIGINT or
// SIGTERM.  A second signal abandons the wait for in-flight jobs.

mod data_dir;

use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, warn};

use rawprint_core::config::AppConfig;
use rawprint_core::error::Result;
use rawprint_server::RawPrintServer;
use rawprint_spool::Spool;

/// Accept PostScript print jobs over a raw TCP socket and spool them.
#[derive(Parser, Debug)]
#[command(name = "rawprintd")]
#[command(version, about, long_about = None)]
struct Args {
    /// JSON configuration file [default: <data-dir>/config.json]
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding the job ledger, alert log and spooled documents
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Listen port, overriding the configuration
    #[arg(short, long)]
    port: Option<u16>,

    /// Listen address, overriding the configuration
    #[arg(long)]
    bind: Option<IpAddr>,
}

impl Args {
    /// Command-line values take precedence over the file.
    fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(bind) = self.bind {
            config.server.bind_address = bind;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "rawprintd failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let data_dir = data_dir::resolve(args.data_dir.as_deref())?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| data_dir.join(data_dir::CONFIG_FILE));

    let mut config = AppConfig::load_or_default(&config_path)?;
    args.apply_overrides(&mut config);
    info!(
        data_dir = %data_dir.display(),
        config = %config_path.display(),
        "rawprintd starting"
    );

    let spool = Spool::open(&data_dir, &config.spool)?;
    let mut server = RawPrintServer::new(config.server, spool.services());
    server.start().await?;

    shutdown_signal().await;
    info!("shutdown requested; waiting for active print jobs (signal again to abort)");

    let drained = server.shutdown_until(shutdown_signal()).await?;
    if !drained {
        warn!(
            active = server.active_requests(),
            "exiting with print jobs still in flight"
        );
    }
    Ok(())
}

/// Resolve on Ctrl-C, or on SIGTERM where the platform has it.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT"),
        _ = terminate => info!("received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn overrides_replace_file_values() {
        let args = Args::parse_from(["rawprintd", "--port", "19100", "--bind", "127.0.0.1"]);
        let mut config = AppConfig::default();
        args.apply_overrides(&mut config);

        assert_eq!(config.server.port, 19100);
        assert_eq!(config.server.bind_address, "127.0.0.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn no_flags_keep_configured_values() {
        let args = Args::parse_from(["rawprintd"]);
        let mut config = AppConfig::default();
        config.server.port = 9101;
        args.apply_overrides(&mut config);

        assert_eq!(config.server.port, 9101);
        assert!(args.config.is_none());
        assert!(args.data_dir.is_none());
    }
}
