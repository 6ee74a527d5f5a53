use core_config::{ConfigError, FromEnv, env_parse};
use std::time::Duration;

/// Time budgets for LLM calls. Expiry sends the caller down its local fallback.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub summary_timeout_secs: u64,
    pub classify_timeout_secs: u64,
}

impl LlmConfig {
    pub fn summary_timeout(&self) -> Duration {
        Duration::from_secs(self.summary_timeout_secs)
    }

    pub fn classify_timeout(&self) -> Duration {
        Duration::from_secs(self.classify_timeout_secs)
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            summary_timeout_secs: 300,
            classify_timeout_secs: 30,
        }
    }
}

/// - `LLM_SUMMARY_TIMEOUT_SECS` (300)
/// - `LLM_CLASSIFY_TIMEOUT_SECS` (30)
impl FromEnv for LlmConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            summary_timeout_secs: env_parse("LLM_SUMMARY_TIMEOUT_SECS", "300")?,
            classify_timeout_secs: env_parse("LLM_CLASSIFY_TIMEOUT_SECS", "30")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_env() {
        temp_env::with_vars(
            [
                ("LLM_SUMMARY_TIMEOUT_SECS", Some("120")),
                ("LLM_CLASSIFY_TIMEOUT_SECS", None),
            ],
            || {
                let config = LlmConfig::from_env().unwrap();
                assert_eq!(config.summary_timeout(), Duration::from_secs(120));
                assert_eq!(config.classify_timeout(), Duration::from_secs(30));
            },
        );
    }

    #[test]
    fn test_from_env_rejects_garbage() {
        temp_env::with_var("LLM_CLASSIFY_TIMEOUT_SECS", Some("soon"), || {
            assert!(LlmConfig::from_env().is_err());
        });
    }
}
