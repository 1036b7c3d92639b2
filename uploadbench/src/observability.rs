use std::env;
use std::io::IsTerminal;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::registry::Registry;
use tracing_subscriber::{EnvFilter, Layer, prelude::*};

use crate::config::{Config, LogFormat};

const CRATE_NAMES: &[&str] = &["uploadbench", "uploadbench_storage"];

/// Installs the global tracing subscriber writing to stderr.
pub fn init_tracing(config: &Config) {
    let format = match config.logging.format {
        LogFormat::Auto if std::io::stderr().is_terminal() => LogFormat::Pretty,
        format => format,
    };

    let base = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);
    let layer: Box<dyn Layer<Registry> + Send + Sync> = match format {
        LogFormat::Pretty => base.pretty().boxed(),
        LogFormat::Json => base.json().boxed(),
        LogFormat::Auto | LogFormat::Simplified => base.compact().with_ansi(false).boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(env_filter(config.logging.level))
        .init();
}

/// Uses `RUST_LOG` literally if set, otherwise logs this crate at `level` and everything else at
/// `WARN` or less.
fn env_filter(level: LevelFilter) -> EnvFilter {
    match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(value) => EnvFilter::new(value),
        Err(_) => EnvFilter::new(default_directives(level)),
    }
}

fn default_directives(level: LevelFilter) -> String {
    let mut directives = LevelFilter::WARN.min(level).to_string();
    for name in CRATE_NAMES {
        directives.push_str(&format!(",{name}={level}"));
    }
    directives
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_follow_level() {
        assert_eq!(
            default_directives(LevelFilter::DEBUG).to_lowercase(),
            "warn,uploadbench=debug,uploadbench_storage=debug"
        );
        assert_eq!(
            default_directives(LevelFilter::ERROR).to_lowercase(),
            "error,uploadbench=error,uploadbench_storage=error"
        );
    }
}
