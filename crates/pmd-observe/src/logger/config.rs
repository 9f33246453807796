use std::{env, io::IsTerminal};

use crate::logger::{error::LoggerError, format::LoggerFormat};

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    pub level: String,
    pub with_targets: bool,
    pub use_color: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            format: LoggerFormat::Text,
            level: "info".to_string(),
            with_targets: true,
            use_color: std::io::stdout().is_terminal(),
        }
    }
}

impl LoggerConfig {
    pub const ENV_LEVEL: &'static str = "PMD_LOG_LEVEL";
    pub const ENV_FORMAT: &'static str = "PMD_LOG_FORMAT";

    /// Defaults overridden by `PMD_LOG_LEVEL` and `PMD_LOG_FORMAT`.
    pub fn from_env() -> Result<Self, LoggerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, LoggerError> {
        let mut cfg = Self::default();
        if let Some(level) = lookup(Self::ENV_LEVEL).filter(|l| !l.trim().is_empty()) {
            cfg.level = level;
        }
        if let Some(format) = lookup(Self::ENV_FORMAT) {
            cfg.format = format.parse()?;
        }
        if cfg.format != LoggerFormat::Text {
            cfg.use_color = false;
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_overrides() {
        let cfg = LoggerConfig::from_lookup(|key| match key {
            "PMD_LOG_LEVEL" => Some("pmd.core=debug".into()),
            "PMD_LOG_FORMAT" => Some("json".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(cfg.level, "pmd.core=debug");
        assert_eq!(cfg.format, LoggerFormat::Json);
        assert!(!cfg.use_color);
    }

    #[test]
    fn empty_environment_keeps_defaults() {
        let cfg = LoggerConfig::from_lookup(|_| None).unwrap();
        assert_eq!(cfg.level, "info");
        assert_eq!(cfg.format, LoggerFormat::Text);
        assert!(cfg.with_targets);

        let bad = LoggerConfig::from_lookup(|key| (key == "PMD_LOG_FORMAT").then(|| "yaml".into()));
        assert!(matches!(bad, Err(LoggerError::InvalidFormat(_))));
    }
}
