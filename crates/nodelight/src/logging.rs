//! Global `tracing` subscriber setup.

use nodelight_settings::LoggingSettings;
use tracing_subscriber::EnvFilter;

/// Filter from `RUST_LOG` when set, else `default_level`.
fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Install the stderr subscriber. Later calls are no-ops.
pub fn init(settings: &LoggingSettings) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter(&settings.level))
        .with_target(true)
        .with_writer(std::io::stderr);

    let _ = if settings.json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_is_harmless() {
        let settings = LoggingSettings::default();
        init(&settings);
        init(&LoggingSettings {
            json: true,
            ..settings
        });
    }
}
