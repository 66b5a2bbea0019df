//! Precomputes the cache files of a map: area and floor-cluster visibility
//! (written while the world loads) and the static route table.
//!
//! Usage: `aas_precompute <world file> [map name] [config.ron]`

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use aas_nav::{NavConfig, NavContext, OpenSpace};
use bevy::prelude::*;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_PREFIX: &str = "aas_precompute";

fn setup_file_logging() -> Option<String> {
    let log_dir = PathBuf::from("logs");
    if let Err(e) = fs::create_dir_all(&log_dir) {
        eprintln!("Could not create {}: {}", log_dir.display(), e);
        return None;
    }

    // Keep only the last 25 logs
    cleanup_old_logs(&log_dir, 25);

    let now = chrono::Local::now();
    let log_filename = format!("{}_{}.log", LOG_PREFIX, now.format("%Y%m%d_%H%M%S"));
    let log_path_str = log_dir.join(&log_filename).to_string_lossy().to_string();

    let file_appender = RollingFileAppender::new(Rotation::NEVER, &log_dir, &log_filename);
    let file_layer = fmt::layer().with_writer(file_appender).with_ansi(false);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("aas_nav=info,aas_precompute=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    Some(log_path_str)
}

fn cleanup_old_logs(log_dir: &Path, keep_count: usize) {
    if let Ok(entries) = fs::read_dir(log_dir) {
        let mut log_files: Vec<_> = entries
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|s| s.starts_with(LOG_PREFIX) && s.ends_with(".log"))
                    .unwrap_or(false)
            })
            .collect();

        // Oldest first
        log_files.sort_by_key(|e| e.metadata().ok().and_then(|m| m.modified().ok()));

        if log_files.len() > keep_count {
            for file in log_files.iter().take(log_files.len() - keep_count) {
                let _ = fs::remove_file(file.path());
            }
        }
    }
}

fn main() -> ExitCode {
    if let Some(log_file) = setup_file_logging() {
        println!("Logging to {}", log_file);
    }

    let mut args = std::env::args().skip(1);
    let Some(world_path) = args.next().map(PathBuf::from) else {
        eprintln!("usage: aas_precompute <world file> [map name] [config.ron]");
        return ExitCode::FAILURE;
    };
    let map_name = args.next().unwrap_or_else(|| {
        world_path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_else(|| "map".to_string())
    });
    let config = match args.next() {
        Some(path) => NavConfig::load_or_default(path),
        None => NavConfig::default(),
    };

    let mut context = match NavContext::load(&world_path, &map_name, config, &OpenSpace) {
        Ok(context) => context,
        Err(e) => {
            error!("[NAV] Could not load {}: {}", world_path.display(), e);
            return ExitCode::FAILURE;
        }
    };

    context.compute_static_routes();
    let saved = match context.static_routes() {
        Some(table) => table.save_cached(context.world(), context.config()),
        None => Ok(()),
    };
    if let Err(e) = saved {
        error!("[STATIC ROUTES] Could not write static routes for {}: {}", map_name, e);
        return ExitCode::FAILURE;
    }
    info!("[NAV] Precomputed navigation caches for {}", map_name);
    ExitCode::SUCCESS
}
