//! Load configuration via `config` crate with env-override support.

use std::{ops::Deref, path::PathBuf, sync::Arc, time::Duration};

use chrono::TimeDelta;
use serde::Deserialize;

use super::types::{AccountId, GroupId, Res};

/// Default retention window for interaction history, in seconds.
fn default_history_window_secs() -> u64 {
    240
}

/// Default trailing window used to count recent activity, in seconds.
fn default_detection_window_secs() -> u64 {
    30
}

/// Default number of bot-to-bot interactions that counts as a loop.
fn default_interaction_threshold() -> usize {
    2
}

/// Default number of messages that counts as spam.
fn default_spam_threshold() -> usize {
    5
}

/// Default mute duration, in seconds (10 minutes).
fn default_ban_duration_secs() -> u64 {
    600
}

/// Default pause between two message retractions, in milliseconds.
fn default_retract_delay_ms() -> u64 {
    500
}

/// Default idle period after which a group's history is dropped, in seconds.
fn default_group_idle_secs() -> u64 {
    4 * default_history_window_secs()
}

/// Default hard cap on retained events per group.
fn default_max_group_events() -> usize {
    10_000
}

/// Default path of the bot roster.
fn default_bots_path() -> PathBuf {
    PathBuf::from("bots.json")
}

/// Default command prefix.
fn default_command_prefix() -> String {
    "/".to_string()
}

/// Default OneBot HTTP API endpoint.
fn default_onebot_api_url() -> String {
    "http://127.0.0.1:5700".to_string()
}

/// Default address the OneBot event listener binds to.
fn default_listen_addr() -> String {
    "127.0.0.1:8080".to_string()
}

/// Configuration for the bot-loop-guard application.
#[derive(Debug, Clone)]
pub struct Config {
    pub inner: Arc<ConfigInner>,
}

impl Deref for Config {
    type Target = ConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConfigInner {
    /// How long interactions are retained, in seconds (`HISTORY_WINDOW_SECS`).
    #[serde(default = "default_history_window_secs")]
    pub history_window_secs: u64,
    /// Trailing window for loop and spam counts, in seconds (`DETECTION_WINDOW_SECS`).
    /// Must not exceed the history window.
    #[serde(default = "default_detection_window_secs")]
    pub detection_window_secs: u64,
    /// Interactions with other bots inside the detection window that trigger a loop ban (`INTERACTION_THRESHOLD`).
    #[serde(default = "default_interaction_threshold")]
    pub interaction_threshold: usize,
    /// Messages inside the detection window that trigger a spam ban (`SPAM_THRESHOLD`).
    #[serde(default = "default_spam_threshold")]
    pub spam_threshold: usize,
    /// Mute duration, in seconds (`BAN_DURATION_SECS`).
    #[serde(default = "default_ban_duration_secs")]
    pub ban_duration_secs: u64,
    /// Pause between two retractions, in milliseconds (`RETRACT_DELAY_MS`).
    #[serde(default = "default_retract_delay_ms")]
    pub retract_delay_ms: u64,
    /// Idle period after which a group's worker and history are dropped, in seconds (`GROUP_IDLE_SECS`).
    #[serde(default = "default_group_idle_secs")]
    pub group_idle_secs: u64,
    /// Hard cap on retained events per group (`MAX_GROUP_EVENTS`).
    #[serde(default = "default_max_group_events")]
    pub max_group_events: usize,
    /// Monitored groups; empty means every group (`ENABLED_GROUPS`, comma separated).
    #[serde(default)]
    pub enabled_groups: Vec<GroupId>,
    /// Accounts allowed to manage the bot roster (`SUPERUSERS`, comma separated).
    #[serde(default)]
    pub superusers: Vec<AccountId>,
    /// Path of the JSON bot roster (`BOTS_PATH`).
    #[serde(default = "default_bots_path")]
    pub bots_path: PathBuf,
    /// Prefix that marks a roster command (`COMMAND_PREFIX`).
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
    /// OneBot v11 HTTP API endpoint (`ONEBOT_API_URL`).
    #[serde(default = "default_onebot_api_url")]
    pub onebot_api_url: String,
    /// OneBot access token, if the implementation requires one (`ONEBOT_ACCESS_TOKEN`).
    #[serde(default)]
    pub onebot_access_token: Option<String>,
    /// Address on which OneBot events are received (`LISTEN_ADDR`).
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for ConfigInner {
    fn default() -> Self {
        Self {
            history_window_secs: default_history_window_secs(),
            detection_window_secs: default_detection_window_secs(),
            interaction_threshold: default_interaction_threshold(),
            spam_threshold: default_spam_threshold(),
            ban_duration_secs: default_ban_duration_secs(),
            retract_delay_ms: default_retract_delay_ms(),
            group_idle_secs: default_group_idle_secs(),
            max_group_events: default_max_group_events(),
            enabled_groups: Vec::new(),
            superusers: Vec::new(),
            bots_path: default_bots_path(),
            command_prefix: default_command_prefix(),
            onebot_api_url: default_onebot_api_url(),
            onebot_access_token: None,
            listen_addr: default_listen_addr(),
        }
    }
}

impl ConfigInner {
    pub fn history_window(&self) -> TimeDelta {
        TimeDelta::seconds(self.history_window_secs as i64)
    }

    pub fn detection_window(&self) -> TimeDelta {
        TimeDelta::seconds(self.detection_window_secs as i64)
    }

    pub fn ban_duration(&self) -> TimeDelta {
        TimeDelta::seconds(self.ban_duration_secs as i64)
    }

    pub fn retract_delay(&self) -> Duration {
        Duration::from_millis(self.retract_delay_ms)
    }

    pub fn group_idle(&self) -> Duration {
        Duration::from_secs(self.group_idle_secs)
    }

    /// Checks the invariants the detector relies on.
    pub fn validate(&self) -> Res<()> {
        // One hundred years; anything longer cannot be added to the current time safely.
        const MAX_SECS: u64 = 100 * 365 * 24 * 60 * 60;

        for (name, value) in [
            ("History window", self.history_window_secs),
            ("Detection window", self.detection_window_secs),
            ("Ban duration", self.ban_duration_secs),
            ("Group idle period", self.group_idle_secs),
        ] {
            if value < 1 || value > MAX_SECS {
                return Err(anyhow::anyhow!("{name} must be between 1 and {MAX_SECS} seconds."));
            }
        }

        if self.detection_window_secs > self.history_window_secs {
            return Err(anyhow::anyhow!("Detection window must not exceed the history window."));
        }

        if self.group_idle_secs < self.history_window_secs {
            return Err(anyhow::anyhow!("Group idle period must be at least the history window."));
        }

        if self.group_idle_secs < self.ban_duration_secs {
            return Err(anyhow::anyhow!("Group idle period must be at least the ban duration."));
        }

        if self.interaction_threshold < 1 {
            return Err(anyhow::anyhow!("Interaction threshold must be at least 1."));
        }

        if self.spam_threshold < 1 {
            return Err(anyhow::anyhow!("Spam threshold must be at least 1."));
        }

        if self.max_group_events < self.interaction_threshold.max(self.spam_threshold) {
            return Err(anyhow::anyhow!("Max group events must be at least the largest threshold."));
        }

        Ok(())
    }
}

impl Config {
    pub fn load(explicit_path: Option<&std::path::Path>) -> Res<Self> {
        let mut cfg = config::Config::builder().add_source(
            config::Environment::default()
                .prefix("LOOP_GUARD")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("enabled_groups")
                .with_list_parse_key("superusers"),
        );

        if let Some(p) = explicit_path {
            cfg = cfg.add_source(config::File::from(p.to_path_buf()));
        } else if std::path::Path::new(".hidden/config.toml").exists() {
            cfg = cfg.add_source(config::File::with_name(".hidden/config.toml"));
        }

        let inner: ConfigInner = cfg.build()?.try_deserialize()?;
        inner.validate()?;

        Ok(Config { inner: Arc::new(inner) })
    }
}

impl From<ConfigInner> for Config {
    fn from(inner: ConfigInner) -> Self {
        Self { inner: Arc::new(inner) }
    }
}

// Tests.
