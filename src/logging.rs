//! Global tracing subscriber for the `content-sync` binary.
//!
//! Events go to stderr so JSON printed on stdout stays machine-readable.
//! `RUST_LOG` takes precedence over the `-v` / `-q` flags.

use std::io::IsTerminal;
use std::str::FromStr;

use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Verbosity switches as given on the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogLevelArgs {
    pub verbosity: u8,
    pub quiet: u8,
}

/// Install the global subscriber. Fails if one is already set.
pub fn init_global_subscriber(args: LogLevelArgs) -> anyhow::Result<()> {
    let level = log_level(args, std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref());
    let env_filter = EnvFilter::from_default_env().add_directive(level.into());

    let ansi = std::io::stderr().is_terminal();
    let fmt = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(ansi)
        .with_target(level >= LevelFilter::DEBUG)
        .compact();

    tracing_subscriber::registry()
        .with(fmt)
        .with(env_filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {}", e))
}

fn log_level(args: LogLevelArgs, rust_log: Option<&str>) -> LevelFilter {
    match args.quiet {
        0 => (),
        1 => return LevelFilter::WARN,
        _ => return LevelFilter::ERROR,
    }

    if let Some(level) = rust_log.and_then(|v| LevelFilter::from_str(v).ok()) {
        return level;
    }

    match args.verbosity {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}
