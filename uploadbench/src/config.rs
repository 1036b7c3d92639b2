//! Configuration for the upload benchmark.
//!
//! Configuration is merged from the following sources, highest precedence first:
//!
//! 1. Command line flags
//! 2. Environment variables (prefixed with `UB__`)
//! 3. YAML configuration file (specified via `-c` or `--config` flag)
//! 4. Defaults
//!
//! `account_name`, `access_key` and `base_service_url` have no default and must be provided by
//! one of the sources. See [`Config`] for all other fields.
//!
//! # Environment Variables
//!
//! Environment variables use `UB__` as a prefix and double underscores (`__`) to denote nested
//! configuration structures. For example:
//!
//! - `UB__ACCOUNT_NAME=myaccount` sets the storage account
//! - `UB__WORKER_COUNT=50` sets the number of concurrent uploads
//! - `UB__LOGGING__LEVEL=debug` sets the log level
//!
//! # YAML Configuration File
//!
//! ```yaml
//! account_name: myaccount
//! access_key: c2VjcmV0
//! base_service_url: core.windows.net
//! worker_count: 50
//!
//! logging:
//!   format: json
//! ```

use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use figment::providers::{Env, Format, Serialized, Yaml};
use secrecy::{CloneableSecret, ExposeSecret, SecretBox, zeroize::Zeroize};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use uploadbench_storage::AzureConfig;

use crate::benchmark::BenchmarkSettings;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "UB__";

/// Newtype around `String` that protects against accidental logging of secrets. Use with
/// [`secrecy::SecretBox`].
#[derive(Clone, Default, Deserialize, PartialEq)]
pub struct ConfigSecret(String);

impl ConfigSecret {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for ConfigSecret {
    fn from(str: &str) -> Self {
        ConfigSecret(str.to_string())
    }
}

impl fmt::Debug for ConfigSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[redacted]")
    }
}

impl CloneableSecret for ConfigSecret {}
impl Zeroize for ConfigSecret {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

/// Runtime configuration for the Tokio async runtime.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Runtime {
    /// Number of worker threads for the runtime.
    ///
    /// Uploads are spread over these threads. With fewer threads than workers, released workers
    /// queue for a thread and their measured durations include scheduling delay.
    ///
    /// # Default
    ///
    /// Defaults to the number of CPU cores on the host machine.
    ///
    /// # Environment Variable
    ///
    /// `UB__RUNTIME__WORKER_THREADS`
    pub worker_threads: usize,
}

impl Default for Runtime {
    fn default() -> Self {
        Self {
            worker_threads: num_cpus::get(),
        }
    }
}

/// Log output format.
///
/// Controls how log messages are formatted. The format can be explicitly specified or
/// auto-detected based on whether output is to a TTY.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum LogFormat {
    /// Auto detect the best format.
    ///
    /// This chooses [`LogFormat::Pretty`] for TTY, otherwise [`LogFormat::Simplified`].
    Auto,

    /// Pretty printing with colors.
    Pretty,

    /// Simplified plain text output.
    Simplified,

    /// Dump out JSON lines.
    Json,
}

/// The logging format parse error.
#[derive(Clone, Debug)]
pub struct FormatParseError(String);

impl fmt::Display for FormatParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            r#"error parsing "{}" as format: expected one of "auto", "pretty", "simplified", "json""#,
            self.0
        )
    }
}

impl std::error::Error for FormatParseError {}

impl std::str::FromStr for LogFormat {
    type Err = FormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let result = match s {
            "" => LogFormat::Auto,
            s if s.eq_ignore_ascii_case("auto") => LogFormat::Auto,
            s if s.eq_ignore_ascii_case("pretty") => LogFormat::Pretty,
            s if s.eq_ignore_ascii_case("simplified") => LogFormat::Simplified,
            s if s.eq_ignore_ascii_case("json") => LogFormat::Json,
            s => return Err(FormatParseError(s.into())),
        };

        Ok(result)
    }
}

/// Deserializes any [`FromStr`](std::str::FromStr) type from its string form.
fn from_str<'de, T, D>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: std::str::FromStr,
    <T as std::str::FromStr>::Err: fmt::Display,
{
    let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}

/// Logging configuration.
///
/// Logs are always written to stderr. The report of a finished run goes to stdout.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Logging {
    /// Minimum log level to output.
    ///
    /// Valid levels in increasing severity: TRACE, DEBUG, INFO, WARN, ERROR, OFF. The `RUST_LOG`
    /// environment variable provides more granular control per module if needed.
    ///
    /// # Default
    ///
    /// `INFO`, which logs every lifecycle step including the start and end of each upload.
    ///
    /// # Environment Variable
    ///
    /// `UB__LOGGING__LEVEL`
    #[serde(deserialize_with = "from_str")]
    pub level: LevelFilter,

    /// Log output format. See [`LogFormat`] for available options.
    ///
    /// # Environment Variable
    ///
    /// `UB__LOGGING__FORMAT`
    #[serde(deserialize_with = "from_str")]
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
        }
    }
}

/// Main configuration struct for the upload benchmark.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Name of the storage account.
    ///
    /// # Environment Variable
    ///
    /// `UB__ACCOUNT_NAME`
    pub account_name: String,

    /// Base64 encoded access key of the storage account. Never logged.
    ///
    /// # Environment Variable
    ///
    /// `UB__ACCESS_KEY`
    pub access_key: SecretBox<ConfigSecret>,

    /// Base address of the storage service, such as `core.windows.net` or the domain of an Azure
    /// Stack deployment.
    ///
    /// # Environment Variable
    ///
    /// `UB__BASE_SERVICE_URL`
    pub base_service_url: String,

    /// Storage REST API version sent with every request.
    ///
    /// # Default
    ///
    /// `2015-04-05`
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Prefix of the container name and of all object names.
    ///
    /// Container names must be lowercase, so the prefix should be as well.
    ///
    /// # Default
    ///
    /// `bench`
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,

    /// Number of concurrent workers, each uploading one object.
    ///
    /// # Default
    ///
    /// `10`
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Size of the uploaded payload in KiB. At most `262144` (256 MiB).
    ///
    /// # Default
    ///
    /// `10`
    #[serde(default = "default_payload_kib")]
    pub payload_kib: u64,

    /// Whether the derived blob endpoint uses `https`.
    ///
    /// # Default
    ///
    /// `true`
    #[serde(default = "default_use_https")]
    pub use_https: bool,

    /// Explicit blob endpoint, overriding the one derived from account and base address.
    ///
    /// # Environment Variable
    ///
    /// `UB__ENDPOINT`
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Timeout for creating and deleting the benchmark container.
    ///
    /// # Default
    ///
    /// `60s`
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Deadline for every single upload. A timed out upload counts as a failure.
    ///
    /// # Default
    ///
    /// None, uploads may take arbitrarily long.
    #[serde(default, with = "humantime_serde")]
    pub upload_timeout: Option<Duration>,

    /// Seed for generating names and the payload. Random if absent.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Runtime configuration.
    #[serde(default)]
    pub runtime: Runtime,

    /// Logging configuration.
    #[serde(default)]
    pub logging: Logging,
}

fn default_api_version() -> String {
    "2015-04-05".to_owned()
}

fn default_name_prefix() -> String {
    "bench".to_owned()
}

fn default_worker_count() -> usize {
    10
}

fn default_payload_kib() -> u64 {
    10
}

fn default_use_https() -> bool {
    true
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

/// Values set on the command line, taking precedence over all other sources.
///
/// Fields that are `None` leave the value from lower precedence sources untouched.
#[derive(Debug, Default, Serialize)]
pub struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_service_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_kib: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Config {
    /// Loads configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The YAML configuration file cannot be read or parsed
    /// - Environment variables contain invalid values
    /// - Required fields are missing in all sources
    pub fn load(path: Option<&Path>, overrides: Overrides) -> Result<Self> {
        let mut figment = figment::Figment::new();
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .merge(Serialized::globals(overrides))
            .extract()?;

        Ok(config)
    }

    /// Parameters for [`benchmark::run`](crate::benchmark::run).
    pub fn benchmark_settings(&self) -> BenchmarkSettings {
        BenchmarkSettings {
            worker_count: self.worker_count,
            payload_size: self.payload_kib.saturating_mul(1024),
            name_prefix: self.name_prefix.clone(),
            request_timeout: self.request_timeout,
            upload_timeout: self.upload_timeout,
            seed: self.seed,
        }
    }

    /// Connection parameters for the storage account.
    pub fn storage_config(&self) -> AzureConfig {
        AzureConfig {
            account_name: self.account_name.clone(),
            access_key: self.access_key.expose_secret().as_str().to_owned(),
            base_service_url: self.base_service_url.clone(),
            api_version: self.api_version.clone(),
            use_https: self.use_https,
            endpoint: self.endpoint.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const REQUIRED_ENV: [(&str, &str); 3] = [
        ("UB__ACCOUNT_NAME", "benchaccount"),
        ("UB__ACCESS_KEY", "c2VjcmV0"),
        ("UB__BASE_SERVICE_URL", "core.windows.net"),
    ];

    #[test]
    fn defaults() {
        figment::Jail::expect_with(|jail| {
            for (name, value) in REQUIRED_ENV {
                jail.set_env(name, value);
            }

            let config = Config::load(None, Overrides::default()).unwrap();

            assert_eq!(config.api_version, "2015-04-05");
            assert_eq!(config.name_prefix, "bench");
            assert_eq!(config.worker_count, 10);
            assert_eq!(config.payload_kib, 10);
            assert!(config.use_https);
            assert_eq!(config.endpoint, None);
            assert_eq!(config.request_timeout, Duration::from_secs(60));
            assert_eq!(config.upload_timeout, None);
            assert_eq!(config.logging.level, LevelFilter::INFO);
            assert_eq!(config.logging.format, LogFormat::Auto);

            let settings = config.benchmark_settings();
            assert_eq!(settings.payload_size, 10 * 1024);
            assert_eq!(settings.worker_count, 10);

            Ok(())
        });
    }

    #[test]
    fn missing_required_fields() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("UB__ACCOUNT_NAME", "benchaccount");

            let error = Config::load(None, Overrides::default()).unwrap_err();
            assert!(error.to_string().contains("access_key"), "{error}");

            Ok(())
        });
    }

    #[test]
    fn configurable_via_env() {
        figment::Jail::expect_with(|jail| {
            for (name, value) in REQUIRED_ENV {
                jail.set_env(name, value);
            }
            jail.set_env("UB__WORKER_COUNT", "50");
            jail.set_env("UB__PAYLOAD_KIB", "1024");
            jail.set_env("UB__UPLOAD_TIMEOUT", "5s");
            jail.set_env("UB__LOGGING__LEVEL", "debug");
            jail.set_env("UB__LOGGING__FORMAT", "json");
            jail.set_env("UB__RUNTIME__WORKER_THREADS", "3");

            let config = Config::load(None, Overrides::default()).unwrap();

            assert_eq!(config.account_name, "benchaccount");
            assert_eq!(config.access_key.expose_secret().as_str(), "c2VjcmV0");
            assert_eq!(config.worker_count, 50);
            assert_eq!(config.upload_timeout, Some(Duration::from_secs(5)));
            assert_eq!(config.logging.level, LevelFilter::DEBUG);
            assert_eq!(config.logging.format, LogFormat::Json);
            assert_eq!(config.runtime.worker_threads, 3);
            assert_eq!(config.benchmark_settings().payload_size, 1024 * 1024);

            Ok(())
        });
    }

    #[test]
    fn configurable_via_yaml() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile
            .write_all(
                br#"
            account_name: devstoreaccount
            access_key: c2VjcmV0
            base_service_url: local.azurestack.external
            use_https: false
            endpoint: http://127.0.0.1:10000/devstoreaccount
            request_timeout: 2m
            seed: 42
            "#,
            )
            .unwrap();

        figment::Jail::expect_with(|_jail| {
            let config = Config::load(Some(tempfile.path()), Overrides::default()).unwrap();

            assert_eq!(config.base_service_url, "local.azurestack.external");
            assert!(!config.use_https);
            assert_eq!(config.request_timeout, Duration::from_secs(120));
            assert_eq!(config.seed, Some(42));

            let storage = config.storage_config();
            assert_eq!(
                storage.endpoint.as_deref(),
                Some("http://127.0.0.1:10000/devstoreaccount")
            );
            assert_eq!(storage.access_key, "c2VjcmV0");

            Ok(())
        });
    }

    #[test]
    fn overrides_take_precedence() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile
            .write_all(
                br#"
            account_name: fromyaml
            access_key: c2VjcmV0
            base_service_url: core.windows.net
            worker_count: 5
            name_prefix: yaml
            "#,
            )
            .unwrap();

        figment::Jail::expect_with(|jail| {
            jail.set_env("UB__WORKER_COUNT", "7");
            jail.set_env("UB__NAME_PREFIX", "env");

            let overrides = Overrides {
                name_prefix: Some("cli".into()),
                ..Default::default()
            };
            let config = Config::load(Some(tempfile.path()), overrides).unwrap();

            assert_eq!(config.account_name, "fromyaml");
            // Env overrides yaml, flags override env.
            assert_eq!(config.worker_count, 7);
            assert_eq!(config.name_prefix, "cli");

            Ok(())
        });
    }

    #[test]
    fn secret_is_redacted() {
        figment::Jail::expect_with(|jail| {
            for (name, value) in REQUIRED_ENV {
                jail.set_env(name, value);
            }

            let config = Config::load(None, Overrides::default()).unwrap();
            let debug = format!("{config:?}");
            assert!(!debug.contains("c2VjcmV0"), "{debug}");

            Ok(())
        });
    }

    #[test]
    fn parse_log_format() {
        assert_eq!("".parse::<LogFormat>().unwrap(), LogFormat::Auto);
        assert_eq!("PRETTY".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
