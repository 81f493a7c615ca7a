//! Session logger — routes `tracing` output to a single file in the OS data
//! directory.
//!
//! The file is **truncated (overwritten) at each launch**, so it only ever
//! contains output from the most-recent session.
//!
//! Log location:
//!   Windows:  `%APPDATA%\Tegaki\tegaki.log`
//!   Linux:    `~/.local/share/Tegaki/tegaki.log`
//!   macOS:    `~/Library/Application Support/Tegaki/tegaki.log`
//!
//! The library itself only emits `tracing` events; whoever owns the process
//! (the CLI here, the host application otherwise) installs a subscriber.

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use tracing::Level;

static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();

/// Returns the path to the current session log file.
pub fn log_path() -> Option<&'static PathBuf> {
    LOG_PATH.get()
}

/// Initialise the session logger.  Call once, before any engine work.
///
/// * Creates (or truncates) the log file; falls back to stderr if it cannot.
/// * `verbose` lowers the level from `INFO` to `DEBUG`.
/// * Installs a panic hook that records the panic before running the
///   default handler.
pub fn init(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let path = log_file_path();

    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&path);

    let installed = match file {
        Ok(f) => {
            let _ = LOG_PATH.set(path.clone());
            tracing_subscriber::fmt()
                .with_writer(Mutex::new(f))
                .with_ansi(false)
                .with_max_level(level)
                .try_init()
        }
        Err(e) => {
            eprintln!("[logger] Failed to open log file {:?}: {}", path, e);
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_max_level(level)
                .try_init()
        }
    };
    if installed.is_err() {
        // A subscriber is already set (tests, host application).
        return;
    }

    tracing::info!("=== Tegaki session started ===");
    if let Some(p) = log_path() {
        tracing::info!("log file: {}", p.display());
    }

    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!("PANIC: {info}");
        prev(info);
    }));
}

fn log_file_path() -> PathBuf {
    data_dir().join("Tegaki").join("tegaki.log")
}

/// Platform data directory (without the app sub-folder).
fn data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata);
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join("Library").join("Application Support");
        }
    }
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    PathBuf::from(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_lives_under_app_folder() {
        let path = log_file_path();
        assert!(path.ends_with(PathBuf::from("Tegaki").join("tegaki.log")));
    }
}
