use std::{env, path::PathBuf};

use anyhow::{Context, Result};

use pmd_core::PmConfig;
use pmd_observe::LoggerConfig;

pub const ENV_MAX_JOBS: &str = "PMD_MAX_JOBS";

/// Agent settings from the environment and the command line.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub logger: LoggerConfig,
    pub pm: PmConfig,
    /// JSON list of startup entries booted after start.
    pub startup: Option<PathBuf>,
}

impl AgentConfig {
    pub fn load() -> Result<Self> {
        let logger = LoggerConfig::from_env().context("logger configuration")?;

        let mut pm = PmConfig::default();
        if let Ok(raw) = env::var(ENV_MAX_JOBS) {
            pm.max_jobs = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_MAX_JOBS}={raw:?} is not a number"))?;
        }

        Ok(Self {
            logger,
            pm,
            startup: env::args_os().nth(1).map(PathBuf::from),
        })
    }
}
