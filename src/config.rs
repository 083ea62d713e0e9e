use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{GroupError, Result};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
/// The configuration for one member of a consumer group.
pub struct GroupConfig {
    /// Name of the consumer group. Must not contain `:`.
    pub group: String,
    /// Topics consumed by the group.
    pub topics: Vec<String>,
    /// Location of the registry database.
    pub data_directory: PathBuf,
    /// Delay before a failed rebalance is attempted again.
    pub rebalance_backoff: Duration,
    /// Attempts per rebalance before the member gives up.
    pub max_rebalance_attempts: u32,
    /// Attempts to claim a partition the previous owner has not released yet.
    pub claim_retries: u32,
    pub claim_backoff: Duration,
    /// How often registry watchers check whether the member is still running.
    pub watch_poll: Duration,
}

impl GroupConfig {
    pub fn new<G: Into<String>>(group: G, topics: &[&str]) -> Self {
        Self {
            group: group.into(),
            topics: topics.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.group.is_empty() {
            return Err(invalid("group name cannot be empty"));
        }
        if self.group.contains(':') {
            return Err(invalid("group name cannot contain ':'"));
        }
        let mut seen = HashSet::new();
        for topic in &self.topics {
            if topic.is_empty() {
                return Err(invalid("topic name cannot be empty"));
            }
            if !seen.insert(topic) {
                return Err(invalid(format!("topic {} listed twice", topic)));
            }
        }
        if self.max_rebalance_attempts == 0 {
            return Err(invalid("max rebalance attempts cannot be 0"));
        }
        if self.claim_retries == 0 {
            return Err(invalid("claim retries cannot be 0"));
        }
        if self.rebalance_backoff < Duration::from_millis(1) {
            return Err(invalid("rebalance backoff is too low"));
        }
        if self.claim_backoff < Duration::from_millis(1) {
            return Err(invalid("claim backoff is too low"));
        }
        if self.watch_poll < Duration::from_millis(1) {
            return Err(invalid("watch poll interval is too low"));
        }

        Ok(())
    }
}

impl Default for GroupConfig {
    fn default() -> Self {
        GroupConfig {
            group: "default".to_string(),
            topics: vec![],
            data_directory: std::env::temp_dir().join("consumergroup"),
            rebalance_backoff: Duration::from_millis(500),
            max_rebalance_attempts: 10,
            claim_retries: 20,
            claim_backoff: Duration::from_millis(100),
            watch_poll: Duration::from_millis(250),
        }
    }
}

fn invalid<S: Into<String>>(msg: S) -> GroupError {
    GroupError::ConfigError {
        file_path: String::new(),
        error_msg: msg.into(),
    }
}

/// Reads a config file, overridden by `CONSUMERGROUP_*` environment variables.
pub fn config<P: AsRef<Path>>(config_path: P) -> Result<GroupConfig> {
    let path = config_path.as_ref();
    let with_path = |err: GroupError| match err {
        GroupError::ConfigError { error_msg, .. } => GroupError::ConfigError {
            file_path: path.display().to_string(),
            error_msg,
        },
        err => err,
    };

    let settings = config::Config::builder()
        .add_source(config::File::from(path))
        .add_source(config::Environment::with_prefix("CONSUMERGROUP"))
        .build()
        .map_err(|e| with_path(e.into()))?;
    let config: GroupConfig = settings
        .try_deserialize()
        .map_err(|e| with_path(e.into()))?;
    config.validate().map_err(with_path)?;
    Ok(config)
}
