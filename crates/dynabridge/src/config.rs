use std::{env, time::Duration};

use dynabridge_core::RetryPolicy;

/// Library configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Name of the reserved version attribute (default: "lockVersion")
    pub version_attribute: String,
    /// Whether saves stamp a `last_update` attribute (default: true)
    pub track_last_update: bool,
    /// Total attempts for transient store failures (default: 5)
    pub max_attempts: u32,
    /// First retry delay in milliseconds (default: 100)
    pub retry_base_ms: u64,
    /// Retry delay cap in milliseconds (default: 2,000)
    pub retry_max_ms: u64,
    /// Custom DynamoDB endpoint, e.g. DynamoDB Local (default: none)
    pub endpoint_url: Option<String>,
    /// AWS region (default: "us-east-1")
    pub region: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `DYNABRIDGE_VERSION_ATTRIBUTE` - Version attribute name (default: "lockVersion")
    /// - `DYNABRIDGE_TRACK_LAST_UPDATE` - Stamp `last_update` on saves (default: true)
    /// - `DYNABRIDGE_MAX_ATTEMPTS` - Attempts for transient failures (default: 5)
    /// - `DYNABRIDGE_RETRY_BASE_MS` - First retry delay (default: 100)
    /// - `DYNABRIDGE_RETRY_MAX_MS` - Retry delay cap (default: 2,000)
    /// - `AWS_ENDPOINT_URL` - Custom DynamoDB endpoint (default: none)
    /// - `AWS_REGION` - AWS region (default: "us-east-1")
    pub fn from_env() -> Self {
        Self {
            version_attribute: env::var("DYNABRIDGE_VERSION_ATTRIBUTE")
                .unwrap_or_else(|_| "lockVersion".to_string()),
            track_last_update: env::var("DYNABRIDGE_TRACK_LAST_UPDATE")
                .ok()
                .and_then(|v| parse_bool(&v))
                .unwrap_or(true),
            max_attempts: env::var("DYNABRIDGE_MAX_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            retry_base_ms: env::var("DYNABRIDGE_RETRY_BASE_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(100),
            retry_max_ms: env::var("DYNABRIDGE_RETRY_MAX_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(2_000),
            endpoint_url: env::var("AWS_ENDPOINT_URL").ok(),
            region: env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
        }
    }

    /// Get the retry policy described by this configuration.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.retry_base_ms),
            Duration::from_millis(self.retry_max_ms),
        )
    }

    /// Returns a display string for the target store.
    pub fn target_display(&self) -> String {
        match &self.endpoint_url {
            Some(url) => format!("Local DynamoDB ({})", url),
            None => format!("AWS DynamoDB (region: {})", self.region),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            version_attribute: "lockVersion".to_string(),
            track_last_update: true,
            max_attempts: 3,
            retry_base_ms: 50,
            retry_max_ms: 400,
            endpoint_url: None,
            region: "us-east-1".to_string(),
        }
    }

    #[test]
    fn test_retry_policy_conversion() {
        let policy = config().retry_policy();

        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(50));
        assert_eq!(policy.max_delay, Duration::from_millis(400));
    }

    #[test]
    fn test_target_display() {
        assert_eq!(
            config().target_display(),
            "AWS DynamoDB (region: us-east-1)"
        );

        let local = Config {
            endpoint_url: Some("http://localhost:8000".to_string()),
            ..config()
        };
        assert_eq!(
            local.target_display(),
            "Local DynamoDB (http://localhost:8000)"
        );
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" off "), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_default_values() {
        // Clear environment variables to test defaults
        env::remove_var("DYNABRIDGE_VERSION_ATTRIBUTE");
        env::remove_var("DYNABRIDGE_TRACK_LAST_UPDATE");
        env::remove_var("DYNABRIDGE_MAX_ATTEMPTS");
        env::remove_var("DYNABRIDGE_RETRY_BASE_MS");
        env::remove_var("DYNABRIDGE_RETRY_MAX_MS");
        env::remove_var("AWS_ENDPOINT_URL");
        env::remove_var("AWS_REGION");

        let config = Config::from_env();

        assert_eq!(config.version_attribute, "lockVersion");
        assert!(config.track_last_update);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.retry_base_ms, 100);
        assert_eq!(config.retry_max_ms, 2_000);
        assert_eq!(config.endpoint_url, None);
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.retry_policy(), RetryPolicy::default());
    }
}
