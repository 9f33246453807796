use std::fmt;

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{Level, ModelError};

/// Opaque routing key used to deliver a job result back to the sink that submitted it.
///
/// Routes never travel with the serialized command body.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Route(String);

impl Route {
    pub fn new(route: impl Into<String>) -> Self {
        Self(route.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Route {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Immutable job description submitted to the process manager.
///
/// `id` must be unique among the currently running jobs; submitting a duplicate is rejected.
/// `command` selects the process factory, `arguments` is interpreted by that factory only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Unique job identifier.
    #[serde(default)]
    pub id: String,
    /// Process factory key (e.g. `"core.system"`).
    pub command: String,
    /// Opaque payload for the factory.
    #[serde(default)]
    pub arguments: serde_json::Value,
    /// Serialization lane; empty means the job is not serialized.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub queue: String,
    /// Flush period of the per-job stats aggregator, in seconds; 0 uses the manager default.
    #[serde(default)]
    pub stats_interval: u64,
    /// Maximum run time of one attempt, in seconds; 0 is unbounded.
    #[serde(default)]
    pub max_time: u64,
    /// Number of attempts allowed on failure; 0 disables restarts.
    #[serde(default)]
    pub max_restart: u32,
    /// Period between recurring runs, in seconds; 0 runs once.
    #[serde(default)]
    pub recurring_period: u64,
    /// Levels forwarded to message handlers; empty forwards everything.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub log_levels: Vec<Level>,
    /// Free-form tags copied onto the job result.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tags: String,
    #[serde(skip)]
    pub route: Route,
}

impl Command {
    /// Creates a command of the given kind with a random id and default policy.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            command: command.into(),
            arguments: serde_json::Value::Null,
            queue: String::new(),
            stats_interval: 0,
            max_time: 0,
            max_restart: 0,
            recurring_period: 0,
            log_levels: Vec::new(),
            tags: String::new(),
            route: Route::default(),
        }
    }

    /// Parses a JSON command body. A missing id is replaced by a random one.
    pub fn load(data: &[u8]) -> Result<Self, ModelError> {
        let mut cmd: Command = serde_json::from_slice(data).map_err(ModelError::InvalidCommand)?;
        if cmd.id.is_empty() {
            cmd.id = uuid::Uuid::new_v4().to_string();
        }
        Ok(cmd)
    }

    /// Deserializes the opaque arguments into the factory's argument type.
    pub fn arguments<T: DeserializeOwned>(&self) -> Result<T, ModelError> {
        serde_json::from_value(self.arguments.clone()).map_err(|source| {
            ModelError::InvalidArguments {
                command: self.command.clone(),
                source,
            }
        })
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_arguments(mut self, arguments: serde_json::Value) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    pub fn with_max_time(mut self, secs: u64) -> Self {
        self.max_time = secs;
        self
    }

    pub fn with_max_restart(mut self, restarts: u32) -> Self {
        self.max_restart = restarts;
        self
    }

    pub fn with_recurring_period(mut self, secs: u64) -> Self {
        self.recurring_period = secs;
        self
    }

    pub fn with_stats_interval(mut self, secs: u64) -> Self {
        self.stats_interval = secs;
        self
    }

    pub fn with_log_levels(mut self, levels: Vec<Level>) -> Self {
        self.log_levels = levels;
        self
    }

    pub fn with_tags(mut self, tags: impl Into<String>) -> Self {
        self.tags = tags.into();
        self
    }

    pub fn with_route(mut self, route: Route) -> Self {
        self.route = route;
        self
    }

    /// Returns `true` if messages at `level` pass this command's log filter.
    pub fn accepts(&self, level: Level) -> bool {
        self.log_levels.is_empty() || self.log_levels.contains(&level)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}# {})", self.id, self.command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn load_fills_missing_id() {
        let cmd = Command::load(br#"{"command": "core.ping"}"#).unwrap();
        assert_eq!(cmd.command, "core.ping");
        assert!(!cmd.id.is_empty());
        assert_eq!(cmd.max_restart, 0);
        assert!(cmd.queue.is_empty());
    }

    #[test]
    fn load_keeps_policy_fields() {
        let cmd = Command::load(
            br#"{"id": "job-1", "command": "core.system", "queue": "q",
                 "max_time": 5, "max_restart": 3, "recurring_period": 10,
                 "log_levels": [1, 2], "tags": "t"}"#,
        )
        .unwrap();

        assert_eq!(cmd.id, "job-1");
        assert_eq!(cmd.queue, "q");
        assert_eq!(cmd.max_time, 5);
        assert_eq!(cmd.max_restart, 3);
        assert_eq!(cmd.recurring_period, 10);
        assert_eq!(cmd.log_levels, vec![Level::STDOUT, Level::STDERR]);
        assert_eq!(cmd.tags, "t");
    }

    #[test]
    fn route_is_not_serialized() {
        let cmd = Command::new("core.ping").with_route(Route::from("sink-a"));
        let body = serde_json::to_value(&cmd).unwrap();
        assert!(body.get("route").is_none());

        let back: Command = serde_json::from_value(body).unwrap();
        assert!(back.route.is_empty());
    }

    #[test]
    fn typed_arguments() {
        #[derive(Deserialize)]
        struct Args {
            name: String,
        }

        let cmd = Command::new("core.system").with_arguments(json!({"name": "ls"}));
        let args: Args = cmd.arguments().unwrap();
        assert_eq!(args.name, "ls");

        let bad = Command::new("core.system").with_arguments(json!([1, 2]));
        assert!(matches!(
            bad.arguments::<Args>(),
            Err(ModelError::InvalidArguments { .. })
        ));
    }

    #[test]
    fn log_filter() {
        let all = Command::new("x");
        assert!(all.accepts(Level::DEBUG));

        let some = Command::new("x").with_log_levels(vec![Level::STDERR]);
        assert!(some.accepts(Level::STDERR));
        assert!(!some.accepts(Level::STDOUT));
    }
}
