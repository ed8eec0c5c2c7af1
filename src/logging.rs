use time::UtcOffset;
use tracing_subscriber::{
    fmt::time::OffsetTime, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
    Registry,
};

use crate::{config::LoggingConfig, errors::InitializationError, ModbusError};

/// Targets switched to trace level by `trace_frames`.
const FRAME_TARGETS: [&str; 2] = ["modbus_engine::transport", "modbus_engine::listener"];

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` directives, when present, are added on top of the configured
/// level.
pub fn setup_logging(config: &LoggingConfig) -> Result<(), ModbusError> {
    config.validate()?;

    let timer = OffsetTime::new(
        UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC),
        time::format_description::well_known::Rfc3339,
    );

    let env_filter = build_filter(config)?;

    let layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(config.thread_ids)
        .with_thread_names(config.thread_names)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_level(true)
        .with_timer(timer);

    let layer = if config.is_json() {
        layer.json().with_filter(env_filter).boxed()
    } else {
        layer.with_filter(env_filter).boxed()
    };

    Registry::default().with(layer).try_init().map_err(|e| {
        ModbusError::Init(InitializationError::logging(format!(
            "Failed to initialize logging: {}",
            e
        )))
    })?;

    Ok(())
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, InitializationError> {
    let mut env_filter = EnvFilter::default().add_directive(config.get_level_filter().into());

    if config.trace_frames {
        for target in FRAME_TARGETS {
            env_filter = env_filter.add_directive(directive(&format!("{}=trace", target))?);
        }
    }

    if let Ok(extra) = std::env::var(EnvFilter::DEFAULT_ENV) {
        for spec in extra.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            env_filter = env_filter.add_directive(directive(spec)?);
        }
    }

    Ok(env_filter)
}

fn directive(spec: &str) -> Result<tracing_subscriber::filter::Directive, InitializationError> {
    spec.parse()
        .map_err(|e: tracing_subscriber::filter::ParseError| {
            InitializationError::log_filter(spec, e.to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_trace_frames_adds_transport_directives() {
        std::env::remove_var(EnvFilter::DEFAULT_ENV);
        let config = LoggingConfig {
            trace_frames: true,
            ..Default::default()
        };
        let filter = build_filter(&config).unwrap().to_string();
        assert!(filter.contains("modbus_engine::transport=trace"), "{}", filter);
        assert!(filter.contains("modbus_engine::listener=trace"), "{}", filter);
    }

    #[test]
    #[serial]
    fn test_invalid_env_directive_is_reported() {
        std::env::set_var(EnvFilter::DEFAULT_ENV, "modbus_engine=loud");
        let result = build_filter(&LoggingConfig::default());
        std::env::remove_var(EnvFilter::DEFAULT_ENV);

        match result {
            Err(InitializationError::LogFilter { directive, .. }) => {
                assert_eq!(directive, "modbus_engine=loud")
            }
            other => panic!("Unexpected result: {:?}", other.map(|f| f.to_string())),
        }
    }

    #[test]
    fn test_invalid_level_is_rejected() {
        let config = LoggingConfig {
            level: "verbose".to_string(),
            ..Default::default()
        };
        assert!(matches!(setup_logging(&config), Err(ModbusError::Config(_))));
    }
}
