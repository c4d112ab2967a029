//! Exporter configuration.
//!
//! Configuration is loaded once at startup from a TOML file:
//!
//! ```toml
//! [[instances]]
//! name = "ol_prod"
//! descriptor = "DSN=ol_prod"
//!
//! [retry]
//! max_attempts = 5
//! delay_ms = 1000
//! backoff = "fixed"
//!
//! [scrape]
//! interval_secs = 30
//!
//! [server]
//! listen = "0.0.0.0:9088"
//! namespace = "informix"
//! ```

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::DEFAULT_NAMESPACE;
use crate::connection::{Backoff, RetryPolicy};
use crate::error::{CollectorError, Result};

/// One monitored database instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstanceConfig {
    /// Label value identifying the instance on every series.
    pub name: String,
    /// Opaque connection descriptor handed to the driver.
    pub descriptor: String,
}

/// Shape of the delay between connection attempts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    /// Constant delay.
    #[default]
    Fixed,
    /// Doubling delay, capped at `max_delay_ms`.
    Exponential,
}

/// Connection retry settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    /// Total connection attempts per instance per cycle.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub delay_ms: u64,
    /// Delay schedule.
    pub backoff: BackoffKind,
    /// Upper bound for exponential delays, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay_ms: 1000,
            backoff: BackoffKind::Fixed,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryConfig {
    /// Builds the retry policy described by this section.
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        let initial = Duration::from_millis(self.delay_ms);
        let backoff = match self.backoff {
            BackoffKind::Fixed => Backoff::Fixed(initial),
            BackoffKind::Exponential => Backoff::Exponential {
                initial,
                max: Duration::from_millis(self.max_delay_ms),
            },
        };
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff,
        }
    }
}

/// Scrape scheduling settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScrapeConfig {
    /// Seconds between timer-driven scrape cycles.
    pub interval_secs: u64,
    /// Run a cycle before answering every metrics request.
    pub on_pull: bool,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            on_pull: false,
        }
    }
}

impl ScrapeConfig {
    /// Returns the scrape interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// HTTP exposition settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the metrics endpoint listens on.
    pub listen: SocketAddr,
    /// Prefix prepended to every exported series name.
    pub namespace: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 9088)),
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

/// Complete exporter configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExporterConfig {
    /// Monitored instances.
    pub instances: Vec<InstanceConfig>,
    /// Connection retry settings.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Scrape scheduling.
    #[serde(default)]
    pub scrape: ScrapeConfig,
    /// HTTP exposition.
    #[serde(default)]
    pub server: ServerConfig,
}

impl ExporterConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            CollectorError::Config(format!(
                "failed to read config file '{}': {e}",
                path.as_ref().display()
            ))
        })?;

        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or fails validation.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| CollectorError::Config(format!("invalid TOML: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Serializes the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| CollectorError::Config(format!("failed to serialize config: {e}")))
    }

    /// Writes the configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// A starting-point configuration with a single instance.
    #[must_use]
    pub fn sample() -> Self {
        Self {
            instances: vec![InstanceConfig {
                name: "ol_informix".to_string(),
                descriptor: "DSN=ol_informix".to_string(),
            }],
            retry: RetryConfig::default(),
            scrape: ScrapeConfig::default(),
            server: ServerConfig::default(),
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.instances.is_empty() {
            return Err(CollectorError::Config(
                "at least one instance must be configured".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for instance in &self.instances {
            if instance.name.trim().is_empty() {
                return Err(CollectorError::Config(
                    "instance name cannot be empty".to_string(),
                ));
            }
            if instance.descriptor.trim().is_empty() {
                return Err(CollectorError::Config(format!(
                    "instance '{}' has an empty descriptor",
                    instance.name
                )));
            }
            if !seen.insert(instance.name.as_str()) {
                return Err(CollectorError::Config(format!(
                    "duplicate instance name '{}'",
                    instance.name
                )));
            }
        }

        if self.retry.max_attempts == 0 {
            return Err(CollectorError::Config(
                "retry.max_attempts must be greater than 0".to_string(),
            ));
        }

        if self.retry.backoff == BackoffKind::Exponential
            && self.retry.max_delay_ms < self.retry.delay_ms
        {
            return Err(CollectorError::Config(
                "retry.max_delay_ms must not be smaller than retry.delay_ms".to_string(),
            ));
        }

        if self.scrape.interval_secs == 0 {
            return Err(CollectorError::Config(
                "scrape.interval_secs must be greater than 0".to_string(),
            ));
        }

        let namespace = &self.server.namespace;
        if namespace.is_empty()
            || namespace.starts_with(|c: char| c.is_ascii_digit())
            || !namespace.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(CollectorError::Config(format!(
                "server.namespace '{namespace}' is not a valid metric name prefix"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use test_case::test_case;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("failed to create temp file");
        file.write_all(content.as_bytes())
            .expect("failed to write temp file");
        file
    }

    const MINIMAL: &str = r#"
        [[instances]]
        name = "ol_prod"
        descriptor = "DSN=ol_prod"
    "#;

    #[test]
    fn parse_minimal_config_applies_defaults() {
        let config = ExporterConfig::from_toml(MINIMAL).expect("should parse minimal config");

        assert_eq!(config.instances.len(), 1);
        assert_eq!(config.instances[0].name, "ol_prod");
        assert_eq!(config.retry, RetryConfig::default());
        assert_eq!(config.scrape.interval_secs, 30);
        assert!(!config.scrape.on_pull);
        assert_eq!(config.server.listen.port(), 9088);
        assert_eq!(config.server.namespace, "informix");
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
            [[instances]]
            name = "ol_a"
            descriptor = "DSN=ol_a"

            [[instances]]
            name = "ol_b"
            descriptor = "DSN=ol_b;UID=monitor"

            [retry]
            max_attempts = 3
            delay_ms = 250
            backoff = "exponential"
            max_delay_ms = 2000

            [scrape]
            interval_secs = 15
            on_pull = true

            [server]
            listen = "127.0.0.1:9100"
            namespace = "ifx"
        "#;

        let config = ExporterConfig::from_toml(toml).expect("should parse full config");

        assert_eq!(config.instances.len(), 2);
        assert_eq!(config.instances[1].descriptor, "DSN=ol_b;UID=monitor");
        assert_eq!(config.scrape.interval(), Duration::from_secs(15));
        assert!(config.scrape.on_pull);
        assert_eq!(config.server.listen, "127.0.0.1:9100".parse().unwrap());
        assert_eq!(
            config.retry.policy(),
            RetryPolicy {
                max_attempts: 3,
                backoff: Backoff::Exponential {
                    initial: Duration::from_millis(250),
                    max: Duration::from_secs(2),
                },
            }
        );
    }

    #[test]
    fn default_retry_policy_matches_five_by_one_second() {
        assert_eq!(RetryConfig::default().policy(), RetryPolicy::default());
    }

    #[test_case("instances = []" ; "no instances")]
    #[test_case("[[instances]]\nname = \"\"\ndescriptor = \"DSN=x\"" ; "empty name")]
    #[test_case("[[instances]]\nname = \"a\"\ndescriptor = \" \"" ; "empty descriptor")]
    #[test_case("[[instances]]\nname = \"a\"\ndescriptor = \"DSN=a\"\n[[instances]]\nname = \"a\"\ndescriptor = \"DSN=b\"" ; "duplicate name")]
    #[test_case("[[instances]]\nname = \"a\"\ndescriptor = \"DSN=a\"\n[retry]\nmax_attempts = 0" ; "zero attempts")]
    #[test_case("[[instances]]\nname = \"a\"\ndescriptor = \"DSN=a\"\n[scrape]\ninterval_secs = 0" ; "zero interval")]
    #[test_case("[[instances]]\nname = \"a\"\ndescriptor = \"DSN=a\"\n[server]\nnamespace = \"bad-name\"" ; "bad namespace")]
    #[test_case("[[instances]]\nname = \"a\"\ndescriptor = \"DSN=a\"\n[retry]\nbackoff = \"exponential\"\ndelay_ms = 5000\nmax_delay_ms = 10" ; "cap below delay")]
    fn invalid_configs_are_rejected(toml: &str) {
        let result = ExporterConfig::from_toml(toml);
        assert!(matches!(result, Err(CollectorError::Config(_))), "{result:?}");
    }

    #[test]
    fn malformed_toml_is_rejected() {
        let err = ExporterConfig::from_toml("instances = [").unwrap_err();
        assert!(err.to_string().contains("invalid TOML"));
    }

    #[test]
    fn load_from_file() {
        let file = create_temp_config(MINIMAL);
        let config = ExporterConfig::from_file(file.path()).expect("should load");
        assert_eq!(config.instances[0].descriptor, "DSN=ol_prod");
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = ExporterConfig::from_file("/nonexistent/ifx-exporter.toml").unwrap_err();
        assert!(matches!(err, CollectorError::Config(_)));
    }

    #[test]
    fn sample_round_trips_through_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("exporter.toml");

        let sample = ExporterConfig::sample();
        sample.save(&path).expect("save");

        let loaded = ExporterConfig::from_file(&path).expect("load");
        assert_eq!(loaded, sample);
    }
}
