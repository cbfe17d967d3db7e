pub mod cli;
pub mod config;
pub mod duration;
pub mod notify;
pub mod secrets;
pub mod storage;

use color_eyre::Report;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the stderr subscriber shared by both binaries.
pub fn init_tracing() {
    // stdout carries secret values, so diagnostics go to stderr and default to warn.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

/// Flatten an error chain into a single line.
pub fn error_line(err: &Report) -> String {
    err.chain()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(": ")
}
