//! Configuration Vault – reads/writes `~/.navrelay/config.toml`.

use navrelay_middleware::endpoint_url;
use navrelay_runtime::NavigatorConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Topic names used by the navigator.  Message types are fixed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicsConfig {
    #[serde(default = "default_goal_topic")]
    pub goal: String,
    #[serde(default = "default_result_topic")]
    pub result: String,
    #[serde(default = "default_pose_topic")]
    pub pose: String,
    #[serde(default = "default_initial_pose_topic")]
    pub initial_pose: String,
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            goal: default_goal_topic(),
            result: default_result_topic(),
            pose: default_pose_topic(),
            initial_pose: default_initial_pose_topic(),
        }
    }
}

/// Persisted configuration stored in `~/.navrelay/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Host running the rosbridge server.
    #[serde(default = "default_rosbridge_host")]
    pub rosbridge_host: String,

    /// rosbridge WebSocket port.
    #[serde(default = "default_rosbridge_port")]
    pub rosbridge_port: u16,

    /// Port of the navigation service endpoint.
    #[serde(default = "default_service_port")]
    pub service_port: u16,

    /// Reference frame stamped on outbound poses.
    #[serde(default = "default_frame_id")]
    pub frame_id: String,

    #[serde(default = "default_nav_timeout_secs")]
    pub nav_timeout_secs: u64,

    #[serde(default = "default_pose_timeout_secs")]
    pub pose_timeout_secs: u64,

    /// Per-connection call budget of the service endpoint; `0` disables it.
    #[serde(default = "default_max_calls_per_second")]
    pub max_calls_per_second: u32,

    #[serde(default)]
    pub topics: TopicsConfig,
}

fn default_rosbridge_host() -> String {
    "127.0.0.1".to_string()
}
fn default_rosbridge_port() -> u16 {
    9090
}
fn default_service_port() -> u16 {
    navrelay_server::DEFAULT_PORT
}
fn default_frame_id() -> String {
    "map".to_string()
}
fn default_nav_timeout_secs() -> u64 {
    300
}
fn default_pose_timeout_secs() -> u64 {
    10
}
fn default_max_calls_per_second() -> u32 {
    navrelay_server::DEFAULT_MAX_CALLS_PER_SECOND
}
fn default_goal_topic() -> String {
    "/move_base_simple/goal".to_string()
}
fn default_result_topic() -> String {
    "/move_base/result".to_string()
}
fn default_pose_topic() -> String {
    "/amcl_pose".to_string()
}
fn default_initial_pose_topic() -> String {
    "/initialpose".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rosbridge_host: default_rosbridge_host(),
            rosbridge_port: default_rosbridge_port(),
            service_port: default_service_port(),
            frame_id: default_frame_id(),
            nav_timeout_secs: default_nav_timeout_secs(),
            pose_timeout_secs: default_pose_timeout_secs(),
            max_calls_per_second: default_max_calls_per_second(),
            topics: TopicsConfig::default(),
        }
    }
}

impl Config {
    /// `ws://` URL of the rosbridge server.
    pub fn rosbridge_url(&self) -> String {
        endpoint_url(&self.rosbridge_host, self.rosbridge_port)
    }

    /// Navigator settings; message types keep their defaults.
    pub fn to_navigator_config(&self) -> NavigatorConfig {
        let mut nav = NavigatorConfig {
            frame_id: self.frame_id.clone(),
            nav_timeout: Duration::from_secs(self.nav_timeout_secs),
            pose_timeout: Duration::from_secs(self.pose_timeout_secs),
            ..NavigatorConfig::default()
        };
        nav.goal.topic = self.topics.goal.clone();
        nav.result.topic = self.topics.result.clone();
        nav.pose.topic = self.topics.pose.clone();
        nav.initial_pose.topic = self.topics.initial_pose.clone();
        nav
    }
}

/// Return the path to `~/.navrelay/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".navrelay").join("config.toml")
}

/// Load the effective configuration: the file when present, defaults
/// otherwise, then `NAVRELAY_*` overrides on top.
pub fn load() -> Result<Config, String> {
    let mut cfg = load_from(&config_path())?;
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Read `path` without environment overrides.
pub(crate) fn load_from(path: &Path) -> Result<Config, String> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))
}

/// Apply `NAVRELAY_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `NAVRELAY_ROSBRIDGE_HOST` | `rosbridge_host` |
/// | `NAVRELAY_ROSBRIDGE_PORT` | `rosbridge_port` |
/// | `NAVRELAY_SERVICE_PORT` | `service_port` |
/// | `NAVRELAY_FRAME_ID` | `frame_id` |
/// | `NAVRELAY_NAV_TIMEOUT_SECS` | `nav_timeout_secs` |
/// | `NAVRELAY_POSE_TIMEOUT_SECS` | `pose_timeout_secs` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("NAVRELAY_ROSBRIDGE_HOST") {
        cfg.rosbridge_host = v;
    }
    if let Ok(v) = std::env::var("NAVRELAY_ROSBRIDGE_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.rosbridge_port = port;
    }
    if let Ok(v) = std::env::var("NAVRELAY_SERVICE_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.service_port = port;
    }
    if let Ok(v) = std::env::var("NAVRELAY_FRAME_ID") {
        cfg.frame_id = v;
    }
    if let Ok(v) = std::env::var("NAVRELAY_NAV_TIMEOUT_SECS")
        && let Ok(secs) = v.parse::<u64>()
    {
        cfg.nav_timeout_secs = secs;
    }
    if let Ok(v) = std::env::var("NAVRELAY_POSE_TIMEOUT_SECS")
        && let Ok(secs) = v.parse::<u64>()
    {
        cfg.pose_timeout_secs = secs;
    }
}

/// Save the config to disk, creating `~/.navrelay/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
