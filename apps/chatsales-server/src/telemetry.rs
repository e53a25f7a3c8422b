//! Telemetry initialization (logging and tracing)

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::Args;

/// Filter used when `RUST_LOG` is unset. HTTP client internals stay quiet
/// below `warn` whatever the chosen level.
pub fn default_filter(level: &str) -> String {
    format!("{},hyper=warn,reqwest=warn,rustls=warn", level)
}

/// Initialize the logging stack. `RUST_LOG` takes precedence over `--log-level`.
pub fn init_telemetry(args: &Args) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter(&args.log_level)))
        .context("Failed to create environment filter")?;

    if args.json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_target(true).with_current_span(true))
            .try_init()
            .context("Failed to install JSON subscriber")?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_line_number(true)
                    .with_file(true),
            )
            .try_init()
            .context("Failed to install subscriber")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_parses() {
        for level in ["trace", "debug", "info", "warn", "error"] {
            let filter = default_filter(level);
            assert!(filter.starts_with(level));
            assert!(EnvFilter::try_new(&filter).is_ok());
        }
    }
}
