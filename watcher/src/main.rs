//! daowatch - Entry Point
//!
//! Watches DAO deployments on the explorer backend and prints one JSON
//! line per progress event to stdout.

use std::collections::HashMap;
use std::env;
use std::io::Write;

use anyhow::Context;
use daowatch::app::options::AppOptions;
use daowatch::app::run::run;
use daowatch::filesys::file::File;
use daowatch::logs::{init_logging, LogOptions};
use daowatch::storage::settings::Settings;
use daowatch::utils::version_info;
use daowatch::watch::controller::WatchEvent;

use tracing::{error, info};

const USAGE: &str = "Usage: daowatch --dao=<id>[,<id>...] [--settings=<path>] [--version]";

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version_info()) {
            Ok(version) => println!("{}", version),
            Err(e) => eprintln!("Failed to render version info: {e}"),
        }
        return;
    }

    let dao_ids = parse_dao_ids(cli_args.get("dao").map(String::as_str));
    if dao_ids.is_empty() {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    }

    let settings = match load_settings(cli_args.get("settings").map(String::as_str)).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Unable to read settings file: {e:#}");
            std::process::exit(1);
        }
    };

    // Initialize logging; the guard flushes file output on exit
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        log_dir: settings.log_dir.clone(),
        json_format: settings.log_json,
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    let options = AppOptions::from_settings(&settings, dao_ids);
    info!("Running daowatch with options: {:?}", options);

    let result = run(options, print_event, await_shutdown_signal()).await;
    if let Err(e) = result {
        error!("Failed to run the watcher: {e}");
        std::process::exit(1);
    }
}

fn parse_dao_ids(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

async fn load_settings(path: Option<&str>) -> anyhow::Result<Settings> {
    let Some(path) = path else {
        return Ok(Settings::default());
    };
    let file = File::new(path);
    let settings = file
        .read_json::<Settings>()
        .await
        .with_context(|| format!("reading {}", file.path().display()))?;
    Ok(settings)
}

fn print_event(event: &WatchEvent) {
    let line = match serde_json::to_string(event) {
        Ok(line) => line,
        Err(e) => {
            error!("Failed to serialize event for DAO {}: {}", event.dao_id(), e);
            return;
        }
    };
    let mut stdout = std::io::stdout().lock();
    if let Err(e) = writeln!(stdout, "{}", line).and_then(|_| stdout.flush()) {
        error!("Failed to write event: {}", e);
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                error!("Unable to listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Unable to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Ctrl+C received, shutting down...");
    }
}
