use serde::Deserialize;
use std::time::Duration;

/// Session pool configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    /// Maximum sessions outstanding (idle + on loan)
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    /// Idle sessions older than this are evicted on the next acquire
    #[serde(default = "default_idle_timeout_ms", rename = "idle_timeout_ms")]
    #[serde(deserialize_with = "millis")]
    pub idle_timeout: Duration,
}

fn default_max_size() -> usize {
    20
}

fn default_idle_timeout_ms() -> Duration {
    Duration::from_millis(30_000)
}

fn millis<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let ms = u64::deserialize(deserializer)?;
    Ok(Duration::from_millis(ms))
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 20,
            idle_timeout: Duration::from_millis(30_000),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.max_size, 20);
        assert_eq!(config.idle_timeout, Duration::from_millis(30_000));
    }

    #[test]
    fn test_deserialize_with_overrides() {
        let config: PoolConfig =
            serde_json::from_str(r#"{"max_size": 3, "idle_timeout_ms": 500}"#).unwrap();
        assert_eq!(config.max_size, 3);
        assert_eq!(config.idle_timeout, Duration::from_millis(500));
    }

    #[test]
    fn test_deserialize_empty_uses_defaults() {
        let config: PoolConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.max_size, 20);
    }
}
