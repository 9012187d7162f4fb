mod app;
mod config;
mod error;
mod imagej;
mod manager;
mod models;
mod worker;

use std::sync::Arc;

use app::cli::{self, Session};
use config::{ConfigStore, MemoryLimits};
use crossbeam_channel::unbounded;
use imagej::command::default_macros_dir;
use manager::task_manager::TaskManager;
use worker::launcher::SystemLauncher;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let limits = MemoryLimits::detect();
    let store = ConfigStore::with_default_path()?;
    let configuration = store.load(&limits);
    log::info!("Loaded configuration from {}", store.path().display());

    let (notifications, alerts) = unbounded();
    let manager = TaskManager::new(
        Arc::new(SystemLauncher),
        configuration,
        default_macros_dir(),
        notifications,
    );
    manager.start();
    cli::spawn_alert_printer(alerts);

    cli::run_cli(Session {
        manager,
        store,
        limits,
    })?;
    Ok(())
}
