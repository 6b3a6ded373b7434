use crate::constants::LOG_TARGET_CRATES;
use std::io::IsTerminal;
pub use tracing::{debug, error, info, warn};

pub fn init_logger() {
  use tracing_subscriber::{fmt, prelude::*, EnvFilter};

  // Run ids prefix every message, targets and thread names would only repeat them
  let format_layer = fmt::layer()
    .with_writer(std::io::stderr)
    .with_ansi(std::io::stderr().is_terminal())
    .with_target(false)
    .compact();

  let level_string = std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_else(|_| "info".to_string());
  let filter_layer = EnvFilter::new(filter_directives(&level_string));

  tracing_subscriber::registry()
    .with(format_layer)
    .with(filter_layer)
    .init();
}

/// Directives limiting the logger to the acmebot crates
fn filter_directives(level: &str) -> String {
  std::iter::once(env!("CARGO_PKG_NAME"))
    .chain(LOG_TARGET_CRATES.iter().copied())
    .map(|target| format!("{target}={level}"))
    .collect::<Vec<_>>()
    .join(",")
}
