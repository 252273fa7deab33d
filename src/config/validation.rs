//! Configuration validation logic.

use url::Url;

use crate::config::schema::ProxyConfig;

/// Error type for configuration validation failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError(pub String);

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Validation error: {}", self.0)
    }
}

/// Validate a ProxyConfig for semantic correctness.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    // 1. The upstream URL is required and must carry a scheme and host.
    if config.upstream.url.is_empty() {
        errors.push(ValidationError("upstream.url is required".to_string()));
    } else {
        match Url::parse(&config.upstream.url) {
            Ok(url) => {
                if !url.host_str().is_some_and(|h| !h.is_empty()) {
                    errors.push(ValidationError(format!(
                        "upstream.url '{}' has no host",
                        config.upstream.url
                    )));
                }
                if url.scheme() != "http" && url.scheme() != "https" {
                    errors.push(ValidationError(format!(
                        "upstream.url scheme '{}' is not supported (expected http or https)",
                        url.scheme()
                    )));
                }
            }
            Err(e) => {
                errors.push(ValidationError(format!(
                    "upstream.url '{}' does not parse: {}",
                    config.upstream.url, e
                )));
            }
        }
    }

    // 2. Retry bounds
    if config.retries.initial_interval_ms == 0 {
        tracing::warn!("retries.initial_interval_ms is 0, retries will not back off");
    }

    // 3. Timeouts (basic check)
    if config.timeouts.connect_secs == 0 || config.timeouts.probe_connect_secs == 0 {
        errors.push(ValidationError(
            "timeouts.connect_secs and timeouts.probe_connect_secs must be > 0".to_string(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
