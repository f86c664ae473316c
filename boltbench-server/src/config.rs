//! Configuration for the boltbench server.
//!
//! Configuration can be loaded from multiple sources with the following precedence (highest to
//! lowest):
//!
//! 1. Environment variables (prefixed with `BB__`)
//! 2. The `BOLT_URL` environment variable, for the accelerator endpoint only
//! 3. YAML configuration file (specified via `-c` or `--config` flag)
//! 4. Defaults
//!
//! See [`Config`] for a description of all configuration fields and their defaults.
//!
//! # Environment Variables
//!
//! Environment variables use `BB__` as a prefix and double underscores (`__`) to denote nested
//! configuration structures. For example:
//!
//! - `BB__HTTP_ADDR=0.0.0.0:8080` sets the HTTP server address
//! - `BB__ACCELERATOR__ENDPOINT=https://bolt.{region}.example.com` sets the accelerator endpoint
//! - `BB__CONVERGENCE__MODE=legacy` switches the auto-heal poll to unbounded retries
//!
//! # YAML Configuration File
//!
//! The above configuration in YAML format would look like this:
//!
//! ```yaml
//! http_addr: 0.0.0.0:8080
//!
//! accelerator:
//!   type: gcs
//!   endpoint: https://bolt.{region}.example.com
//!
//! convergence:
//!   mode: legacy
//! ```

use std::borrow::Cow;
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use boltbench_service::{RetryMode, RetryPolicy};
use figment::providers::{Env, Format, Serialized, Yaml};
use secrecy::{CloneableSecret, SecretBox, SerializableSecret, zeroize::Zeroize};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "BB__";

/// Legacy environment variable holding the accelerator endpoint.
const BOLT_URL: &str = "BOLT_URL";

/// Newtype around `String` that may protect against accidental
/// logging of secrets in our configuration struct. Use with
/// [`secrecy::SecretBox`].
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigSecret(String);

impl ConfigSecret {
    /// Returns the secret as a string slice.
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
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "[redacted]")
    }
}

impl CloneableSecret for ConfigSecret {}
impl SerializableSecret for ConfigSecret {}
impl Zeroize for ConfigSecret {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

/// Storage endpoint configuration.
///
/// The `type` field in YAML or `__TYPE` in environment variables determines which variant is used.
///
/// Used in: [`Config::primary`], [`Config::accelerator`]
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Storage {
    /// An endpoint speaking the [Google Cloud Storage] JSON API (type `"gcs"`).
    ///
    /// Both GCS itself and the Bolt accelerator are configured this way. Authentication uses
    /// Application Default Credentials (ADC), which can be provided via the
    /// `GOOGLE_APPLICATION_CREDENTIALS` environment variable or the GCE metadata service.
    ///
    /// [Google Cloud Storage]: https://cloud.google.com/storage
    ///
    /// # Example
    ///
    /// ```yaml
    /// accelerator:
    ///   type: gcs
    ///   endpoint: https://bolt.{region}.example.com
    /// ```
    Gcs {
        /// Base URL of the endpoint.
        ///
        /// A `{region}` placeholder is replaced with the deployment region on startup, see
        /// [`Config::region`]. If `None`, uses the public GCS endpoint.
        ///
        /// # Environment Variables
        ///
        /// - `BB__PRIMARY__ENDPOINT`
        /// - `BB__ACCELERATOR__ENDPOINT`, or the legacy `BOLT_URL`
        #[serde(default)]
        endpoint: Option<String>,

        /// Whether requests carry ADC bearer tokens.
        ///
        /// Disable this for local emulators.
        ///
        /// # Default
        ///
        /// `true`
        #[serde(default = "default_true")]
        authenticated: bool,

        /// Project for bucket listings.
        ///
        /// # Default
        ///
        /// `None` (the project of the credentials)
        #[serde(default)]
        project: Option<String>,
    },

    /// Process-local storage (type `"memory"`), for development and tests.
    ///
    /// Contents are lost on restart.
    ///
    /// # Example
    ///
    /// ```yaml
    /// primary:
    ///   type: memory
    ///   containers: [bench-bucket]
    /// ```
    Memory {
        /// Containers that exist on startup.
        #[serde(default)]
        containers: Vec<String>,
    },
}

fn default_true() -> bool {
    true
}

impl Default for Storage {
    fn default() -> Self {
        Storage::Gcs {
            endpoint: None,
            authenticated: true,
            project: None,
        }
    }
}

/// Retry behavior of the auto-heal poll.
///
/// Used in: [`Config::convergence`]
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Convergence {
    /// Selects bounded retries or the unbounded legacy loop.
    ///
    /// In `legacy` mode all other fields are ignored: the poll retries immediately and forever,
    /// until the object is readable or the server shuts down.
    ///
    /// # Default
    ///
    /// `bounded`
    ///
    /// # Environment Variable
    ///
    /// `BB__CONVERGENCE__MODE`
    pub mode: RetryMode,

    /// Time after which the poll gives up.
    ///
    /// # Default
    ///
    /// `5m`
    ///
    /// # Environment Variable
    ///
    /// `BB__CONVERGENCE__DEADLINE`
    #[serde(with = "humantime_serde")]
    pub deadline: Option<Duration>,

    /// Number of failed reads after which the poll gives up.
    ///
    /// # Default
    ///
    /// `None` (only the deadline applies)
    pub max_attempts: Option<u32>,

    /// Pause after the first failed read, doubling with every further failure.
    ///
    /// # Default
    ///
    /// `50ms`
    #[serde(with = "humantime_serde")]
    pub initial_backoff: Duration,

    /// Upper bound for the pause between reads.
    ///
    /// # Default
    ///
    /// `5s`
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
}

impl Convergence {
    /// Returns the retry policy described by this configuration.
    pub fn policy(&self) -> RetryPolicy {
        match self.mode {
            RetryMode::Legacy => RetryPolicy::legacy(),
            RetryMode::Bounded => RetryPolicy {
                mode: RetryMode::Bounded,
                max_attempts: self.max_attempts,
                deadline: self.deadline,
                initial_backoff: self.initial_backoff,
                max_backoff: self.max_backoff,
            },
        }
    }
}

impl Default for Convergence {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            mode: policy.mode,
            deadline: policy.deadline,
            max_attempts: policy.max_attempts,
            initial_backoff: policy.initial_backoff,
            max_backoff: policy.max_backoff,
        }
    }
}

/// Runtime configuration for the Tokio async runtime.
///
/// Used in: [`Config::runtime`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Runtime {
    /// Number of worker threads for the server runtime.
    ///
    /// Benchmarks run sequentially within a request, so more threads only help when several
    /// requests are served concurrently.
    ///
    /// # Default
    ///
    /// Defaults to the number of CPU cores on the host machine.
    ///
    /// # Environment Variable
    ///
    /// `BB__RUNTIME__WORKER_THREADS`
    pub worker_threads: usize,
}

impl Default for Runtime {
    fn default() -> Self {
        Self {
            worker_threads: num_cpus::get(),
        }
    }
}

/// [Sentry](https://sentry.io/) error tracking and performance monitoring configuration.
///
/// Sentry is disabled by default and only enabled when a DSN is provided.
///
/// Used in: [`Config::sentry`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Sentry {
    /// Sentry DSN (Data Source Name).
    ///
    /// # Environment Variable
    ///
    /// `BB__SENTRY__DSN`
    pub dsn: Option<SecretBox<ConfigSecret>>,

    /// Environment name for this deployment, e.g. "production".
    ///
    /// # Environment Variable
    ///
    /// `BB__SENTRY__ENVIRONMENT`
    pub environment: Option<Cow<'static, str>>,

    /// Server name or identifier.
    ///
    /// # Environment Variable
    ///
    /// `BB__SENTRY__SERVER_NAME`
    pub server_name: Option<Cow<'static, str>>,

    /// Error event sampling rate.
    ///
    /// # Default
    ///
    /// `1.0` (send all errors)
    ///
    /// # Environment Variable
    ///
    /// `BB__SENTRY__SAMPLE_RATE`
    pub sample_rate: f32,

    /// Performance trace sampling rate.
    ///
    /// Benchmark requests are few and long-running, so the default traces all of them.
    ///
    /// # Default
    ///
    /// `1.0`
    ///
    /// # Environment Variable
    ///
    /// `BB__SENTRY__TRACES_SAMPLE_RATE`
    pub traces_sample_rate: f32,

    /// Enable Sentry SDK debug mode.
    ///
    /// # Default
    ///
    /// `false`
    pub debug: bool,
}

impl Sentry {
    /// Returns whether Sentry integration is enabled.
    pub fn is_enabled(&self) -> bool {
        self.dsn.is_some()
    }
}

impl Default for Sentry {
    fn default() -> Self {
        Self {
            dsn: None,
            environment: None,
            server_name: None,
            sample_rate: 1.0,
            traces_sample_rate: 1.0,
            debug: false,
        }
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
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

mod display_fromstr {
    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
        T: std::fmt::Display,
    {
        serializer.collect_str(&value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        D: serde::Deserializer<'de>,
        T: std::str::FromStr,
        <T as std::str::FromStr>::Err: std::fmt::Display,
    {
        use serde::Deserialize;
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Logging configuration.
///
/// Logs are always written to stderr.
///
/// Used in: [`Config::logging`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Logging {
    /// Minimum log level to output.
    ///
    /// The `RUST_LOG` environment variable provides more granular control per module if needed.
    ///
    /// # Default
    ///
    /// `INFO`
    ///
    /// # Environment Variable
    ///
    /// `BB__LOGGING__LEVEL`
    #[serde(with = "display_fromstr")]
    pub level: LevelFilter,

    /// Log output format.
    ///
    /// # Default
    ///
    /// `Auto` (pretty for TTY, simplified otherwise)
    ///
    /// # Environment Variable
    ///
    /// `BB__LOGGING__FORMAT`
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

/// Main configuration struct for the boltbench server.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// HTTP server bind address.
    ///
    /// # Default
    ///
    /// `0.0.0.0:8080`
    ///
    /// # Environment Variable
    ///
    /// `BB__HTTP_ADDR`
    pub http_addr: SocketAddr,

    /// The durable object store, addressed as `GS` in requests.
    ///
    /// # Default
    ///
    /// The public GCS endpoint with Application Default Credentials.
    pub primary: Storage,

    /// The accelerator in front of the primary store, addressed as `BOLT` in requests.
    ///
    /// # Default
    ///
    /// The public GCS endpoint, which is rarely what you want. Set `BOLT_URL` or
    /// `BB__ACCELERATOR__ENDPOINT`.
    pub accelerator: Storage,

    /// Deployment region substituted for `{region}` in endpoint URLs.
    ///
    /// # Default
    ///
    /// `None` (queried from the GCE metadata server when an endpoint needs it)
    ///
    /// # Environment Variable
    ///
    /// `BB__REGION`
    pub region: Option<String>,

    /// Retry behavior of the auto-heal poll. See [`Convergence`].
    pub convergence: Convergence,

    /// Configuration of the internal task runtime.
    pub runtime: Runtime,

    /// Logging configuration.
    pub logging: Logging,

    /// Sentry error tracking configuration.
    pub sentry: Sentry,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            primary: Storage::default(),
            accelerator: Storage::default(),
            region: None,
            convergence: Convergence::default(),
            runtime: Runtime::default(),
            logging: Logging::default(),
            sentry: Sentry::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the provided arguments.
    ///
    /// Configuration is merged in the following order (later sources override earlier ones):
    /// 1. Default values
    /// 2. YAML configuration file (if provided in `args`)
    /// 3. `BOLT_URL`, as the accelerator endpoint
    /// 4. Environment variables (prefixed with `BB__`)
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The YAML configuration file cannot be read or parsed
    /// - Environment variables contain invalid values
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config = figment
            .merge(
                Env::raw()
                    .only(&[BOLT_URL])
                    .map(|_| "accelerator.endpoint".into()),
            )
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn defaults() {
        figment::Jail::expect_with(|_jail| {
            let config = Config::load(None).unwrap();

            assert_eq!(config.http_addr, SocketAddr::from(([0, 0, 0, 0], 8080)));
            assert!(matches!(
                config.accelerator,
                Storage::Gcs {
                    endpoint: None,
                    authenticated: true,
                    ..
                }
            ));
            assert_eq!(config.convergence.policy(), RetryPolicy::default());
            assert!(!config.sentry.is_enabled());

            Ok(())
        });
    }

    #[test]
    fn configurable_via_env() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("BB__PRIMARY__TYPE", "memory");
            jail.set_env("BB__PRIMARY__CONTAINERS", "[bench, other]");
            jail.set_env("BB__ACCELERATOR__ENDPOINT", "http://localhost:9000");
            jail.set_env("BB__ACCELERATOR__AUTHENTICATED", "false");
            jail.set_env("BB__REGION", "europe-west1");
            jail.set_env("BB__CONVERGENCE__DEADLINE", "30s");
            jail.set_env("BB__CONVERGENCE__MAX_ATTEMPTS", "10");
            jail.set_env("BB__SENTRY__DSN", "abcde");
            jail.set_env("BB__SENTRY__SAMPLE_RATE", "0.5");
            jail.set_env("BB__SENTRY__ENVIRONMENT", "production");

            let config = Config::load(None).unwrap();

            let Storage::Memory { containers } = &dbg!(&config).primary else {
                panic!("expected memory storage");
            };
            assert_eq!(containers, &["bench", "other"]);

            let Storage::Gcs {
                endpoint,
                authenticated,
                ..
            } = &config.accelerator
            else {
                panic!("expected gcs storage");
            };
            assert_eq!(endpoint.as_deref(), Some("http://localhost:9000"));
            assert!(!authenticated);

            assert_eq!(config.region.as_deref(), Some("europe-west1"));
            let policy = config.convergence.policy();
            assert_eq!(policy.deadline, Some(Duration::from_secs(30)));
            assert_eq!(policy.max_attempts, Some(10));

            assert_eq!(config.sentry.dsn.unwrap().expose_secret().as_str(), "abcde");
            assert_eq!(config.sentry.environment.as_deref(), Some("production"));
            assert_eq!(config.sentry.sample_rate, 0.5);

            Ok(())
        });
    }

    #[test]
    fn bolt_url_sets_accelerator_endpoint() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("BOLT_URL", "https://bolt.{region}.example.com");

            let config = Config::load(None).unwrap();
            let Storage::Gcs { endpoint, .. } = &config.accelerator else {
                panic!("expected gcs storage");
            };
            assert_eq!(endpoint.as_deref(), Some("https://bolt.{region}.example.com"));

            let Storage::Gcs { endpoint, .. } = &config.primary else {
                panic!("expected gcs storage");
            };
            assert_eq!(endpoint.as_deref(), None);

            // The prefixed variable takes precedence.
            jail.set_env("BB__ACCELERATOR__ENDPOINT", "http://localhost:9000");
            let config = Config::load(None).unwrap();
            let Storage::Gcs { endpoint, .. } = &config.accelerator else {
                panic!("expected gcs storage");
            };
            assert_eq!(endpoint.as_deref(), Some("http://localhost:9000"));

            Ok(())
        });
    }

    #[test]
    fn configurable_via_yaml() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile
            .write_all(
                br#"
            http_addr: 127.0.0.1:9999
            accelerator:
                type: gcs
                endpoint: https://bolt.{region}.example.com
                project: my-project
            convergence:
                mode: legacy
            logging:
                level: debug
                format: json
            "#,
            )
            .unwrap();

        figment::Jail::expect_with(|_jail| {
            let config = Config::load(Some(tempfile.path())).unwrap();

            assert_eq!(config.http_addr, SocketAddr::from(([127, 0, 0, 1], 9999)));
            let Storage::Gcs {
                endpoint, project, ..
            } = &dbg!(&config).accelerator
            else {
                panic!("expected gcs storage");
            };
            assert_eq!(endpoint.as_deref(), Some("https://bolt.{region}.example.com"));
            assert_eq!(project.as_deref(), Some("my-project"));

            assert_eq!(config.convergence.policy(), RetryPolicy::legacy());
            assert_eq!(config.logging.level, LevelFilter::DEBUG);
            assert_eq!(config.logging.format, LogFormat::Json);

            Ok(())
        });
    }

    #[test]
    fn configured_with_env_and_yaml() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile
            .write_all(
                br#"
            accelerator:
                type: gcs
                endpoint: http://localhost:8888
            "#,
            )
            .unwrap();

        figment::Jail::expect_with(|jail| {
            jail.set_env("BB__ACCELERATOR__ENDPOINT", "http://localhost:9001");

            let config = Config::load(Some(tempfile.path())).unwrap();

            let Storage::Gcs { endpoint, .. } = &dbg!(&config).accelerator else {
                panic!("expected gcs storage");
            };
            // Env should overwrite the yaml config
            assert_eq!(endpoint.as_deref(), Some("http://localhost:9001"));

            Ok(())
        });
    }
}
