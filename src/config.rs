//! Configuration surface: YAML file plus CLI overlay, `serde` +
//! `serde_yaml` for parsing (the same pair the wire stat catalogue uses),
//! `clap` for the handful of per-invocation overrides.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::message::codes::AuthType;

fn default_control_port() -> u16 {
    7878
}

fn default_stat_port() -> u16 {
    7879
}

fn default_read_timeout_sec() -> u64 {
    5
}

fn default_stop_grace_sec() -> u64 {
    5
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TlsConfig {
    pub use_tls: bool,
    #[serde(default)]
    pub trust_mode: TlsTrustMode,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum TlsTrustMode {
    #[default]
    Verify,
    Blind,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub auth_type: AuthType,
    #[serde(default)]
    pub auth_id: String,
    #[serde(default)]
    pub auth_credentials: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        AuthConfig { auth_type: AuthType::default(), auth_id: String::new(), auth_credentials: String::new() }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    pub control_bind: SocketAddr,
    pub stat_bind: SocketAddr,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub tls: Option<TlsConfig>,
    #[serde(default = "default_read_timeout_sec")]
    pub read_timeout_sec: u64,
    #[serde(default = "default_stop_grace_sec")]
    pub stop_grace_sec: u64,
    /// OS tag per `clientID`, used by job assignment. The
    /// Client-Hello carries no OS field, so the coordinator's own
    /// deployment config is the source of truth for it, the same way a
    /// worker's probe config names its own job classes. Workers missing
    /// from this map are treated as `"unknown"` and only match a job with
    /// no OS requirement.
    #[serde(default)]
    pub worker_os: std::collections::HashMap<String, String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub coordinator_host: String,
    #[serde(default = "default_control_port")]
    pub coordinator_control_port: u16,
    #[serde(default = "default_stat_port")]
    pub coordinator_stat_port: u16,
    #[serde(default)]
    pub use_tls: bool,
    #[serde(default)]
    pub tls_trust_mode: TlsTrustMode,
    #[serde(default)]
    pub auth_type: AuthType,
    #[serde(default)]
    pub auth_id: String,
    #[serde(default)]
    pub auth_credentials: String,
    pub client_id: String,
    #[serde(default)]
    pub supports_time_sync: bool,
    #[serde(default)]
    pub enable_real_time_stats: bool,
    #[serde(default = "default_real_time_stat_interval_sec")]
    pub real_time_stat_interval_sec: u32,
    #[serde(default)]
    pub restricted_mode: bool,
    #[serde(default)]
    pub local_bind_address: Option<String>,
    #[serde(default = "default_read_timeout_sec")]
    pub read_timeout_sec: u64,
    #[serde(default = "default_stop_grace_sec")]
    pub stop_grace_sec: u64,
}

fn default_real_time_stat_interval_sec() -> u32 {
    1
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProbeConfig {
    pub monitor_enabled: bool,
    pub monitor_class: String,
    #[serde(flatten)]
    pub extra: serde_yaml::Value,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MonitorWorkerConfig {
    #[serde(flatten)]
    pub base: WorkerConfig,
    pub probe_config_dir: PathBuf,
}

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Parse(serde_yaml::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "reading config file: {e}"),
            Error::Parse(e) => write!(f, "parsing config file: {e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Parse(e)
    }
}

pub fn load_yaml<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, Error> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_config_round_trips_through_yaml() {
        let cfg = WorkerConfig {
            coordinator_host: "coordinator.internal".into(),
            coordinator_control_port: default_control_port(),
            coordinator_stat_port: default_stat_port(),
            use_tls: false,
            tls_trust_mode: TlsTrustMode::Verify,
            auth_type: AuthType::Simple,
            auth_id: "svc".into(),
            auth_credentials: "secret".into(),
            client_id: "worker-1".into(),
            supports_time_sync: true,
            enable_real_time_stats: true,
            real_time_stat_interval_sec: 2,
            restricted_mode: false,
            local_bind_address: None,
            read_timeout_sec: default_read_timeout_sec(),
            stop_grace_sec: default_stop_grace_sec(),
        };
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let parsed: WorkerConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.client_id, cfg.client_id);
        assert_eq!(parsed.auth_type, cfg.auth_type);
    }

    #[test]
    fn worker_config_applies_defaults_for_omitted_fields() {
        let yaml = "coordinator_host: coordinator.internal\nclient_id: worker-1\n";
        let parsed: WorkerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(parsed.coordinator_control_port, default_control_port());
        assert_eq!(parsed.coordinator_stat_port, default_stat_port());
        assert!(!parsed.supports_time_sync);
    }
}
