//! Engine configuration
//!
//! Defines the tunable parameters of the engine and scheduler: the field the
//! final output falls back to, debug tracing, and submission limits.

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Conventional field copied into the final output when present
    pub output_field: String,

    /// Log every block's output and the accumulated state at debug level
    pub debug: bool,

    /// Maximum number of runs (seeds x repetitions) accepted per job
    pub max_seeds: usize,

    /// Maximum repetitions a single seed may request
    pub max_repetitions: u32,
}

impl EngineConfig {
    /// Creates a new configuration with defaults
    pub fn new() -> Self {
        Self {
            output_field: "assistant".to_string(),
            debug: false,
            max_seeds: 10_000,
            max_repetitions: 1_000,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - DATAGEN_OUTPUT_FIELD (default: assistant)
    /// - DATAGEN_DEBUG (true/false/1/0, default: false)
    /// - DATAGEN_MAX_SEEDS (default: 10000)
    /// - DATAGEN_MAX_REPETITIONS (default: 1000)
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::new();

        let output_field =
            std::env::var("DATAGEN_OUTPUT_FIELD").unwrap_or(defaults.output_field);

        let debug = match std::env::var("DATAGEN_DEBUG") {
            Ok(raw) => parse_bool(&raw)
                .ok_or_else(|| anyhow::anyhow!("DATAGEN_DEBUG must be a boolean, got '{}'", raw))?,
            Err(_) => defaults.debug,
        };

        let max_seeds = std::env::var("DATAGEN_MAX_SEEDS")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(defaults.max_seeds);

        let max_repetitions = std::env::var("DATAGEN_MAX_REPETITIONS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(defaults.max_repetitions);

        Ok(Self {
            output_field,
            debug,
            max_seeds,
            max_repetitions,
        })
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.output_field.trim().is_empty() {
            anyhow::bail!("output_field cannot be empty");
        }

        if self.max_seeds == 0 {
            anyhow::bail!("max_seeds must be greater than 0");
        }

        if self.max_repetitions == 0 {
            anyhow::bail!("max_repetitions must be greater than 0");
        }

        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.output_field, "assistant");
        assert!(!config.debug);
        assert_eq!(config.max_seeds, 10_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig::default();

        config.output_field = "  ".to_string();
        assert!(config.validate().is_err());

        config.output_field = "assistant".to_string();
        config.max_seeds = 0;
        assert!(config.validate().is_err());

        config.max_seeds = 1;
        config.max_repetitions = 0;
        assert!(config.validate().is_err());

        config.max_repetitions = 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" 0 "), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
