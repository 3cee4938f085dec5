use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Install the global subscriber. Output goes to stderr so stdout stays free
/// for envelopes and keys.
///
/// `RUST_LOG` takes precedence over `config.filter`; an unparsable filter
/// falls back to `info`. Returns `false` when a subscriber was already set,
/// in which case the existing one is left in place.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer().with_writer(std::io::stderr).with_target(true);

    if config.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer.json())
            .try_init()
            .is_ok()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        let config = LoggingConfig::default();
        init_logging(&config);
        assert!(!init_logging(&config));
        tracing::info!("logging still works");
    }
}
