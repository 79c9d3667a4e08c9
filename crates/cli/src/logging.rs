use tracing_subscriber::{fmt::Layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::CliError;

/// Filter directive: `RUST_LOG` wins, then `--verbose`, then the configured level
pub fn filter_directive(configured: &str, verbose: bool) -> String {
    let level = if verbose { "debug" } else { configured };
    format!("migshift={level},migshift_engine={level},migshift_core={level},warn")
}

/// Install the global subscriber. Logs go to stderr so command output on
/// stdout stays machine-readable.
pub fn init(configured: &str, verbose: bool, json: bool) -> Result<(), CliError> {
    let directive = filter_directive(configured, verbose);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&directive))
        .map_err(|e| CliError::Logging {
            message: e.to_string(),
        })?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(Layer::new().with_writer(std::io::stderr).json())
            .try_init()
    } else {
        registry
            .with(Layer::new().with_writer(std::io::stderr).with_target(false))
            .try_init()
    };

    result.map_err(|e| CliError::Logging {
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_overrides_configured_level() {
        assert!(filter_directive("warn", true).starts_with("migshift=debug"));
        assert!(filter_directive("warn", false).contains("migshift_engine=warn"));
    }
}
