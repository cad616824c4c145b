//! Logging setup.
//!
//! Output goes to stdout, stderr (default), an append-mode file, or nowhere,
//! selected by `--log 0|off|1|stdout|2|stderr|<filename>`. The level is
//! `info`, or `debug` with `--verbose`; `RUST_LOG` overrides both.

use anyhow::Result;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::Subscriber;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Where log output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Off,
    Stdout,
    Stderr,
    File(PathBuf),
}

impl LogTarget {
    /// Interpret a `--log` value. Anything that is not a known keyword is a
    /// file name.
    pub fn parse(value: &str) -> Self {
        match value {
            "0" | "off" => LogTarget::Off,
            "1" | "stdout" => LogTarget::Stdout,
            "2" | "stderr" => LogTarget::Stderr,
            filename => LogTarget::File(PathBuf::from(filename)),
        }
    }
}

/// Level filter: `RUST_LOG` if set, else `debug`/`info` by `verbose`.
pub fn env_filter(verbose: bool) -> EnvFilter {
    let default = if verbose { "debug" } else { "info" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

fn install(subscriber: impl Subscriber + Send + Sync + 'static) -> Result<()> {
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Install the global subscriber.
pub fn init(target: &LogTarget, verbose: bool) -> Result<()> {
    let filter = env_filter(verbose);
    match target {
        LogTarget::Off => Ok(()),
        LogTarget::Stdout => install(
            FmtSubscriber::builder()
                .with_env_filter(filter)
                .with_writer(std::io::stdout)
                .finish(),
        ),
        LogTarget::Stderr => install(
            FmtSubscriber::builder()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .finish(),
        ),
        LogTarget::File(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            install(
                FmtSubscriber::builder()
                    .with_env_filter(filter)
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .finish(),
            )
        }
    }
}
