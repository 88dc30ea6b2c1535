//! Operator process configuration read from the environment

use std::net::SocketAddr;

use thiserror::Error;

pub const DEFAULT_HEALTH_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_LEASE_NAMESPACE: &str = "default";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Settings the operator binary needs before any controller starts
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Lease holder identity; `None` falls back to the hostname
    pub pod_name: Option<String>,
    /// Namespace the leader election lease lives in
    pub pod_namespace: String,
    /// Only watch this namespace; `None` watches cluster-wide
    pub watch_namespace: Option<String>,
    pub health_addr: SocketAddr,
    pub leader_election: bool,
}

impl OperatorConfig {
    /// Read the configuration from process environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let health_addr = match non_empty("HEALTH_ADDR") {
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
                key: "HEALTH_ADDR",
                value,
            })?,
            None => DEFAULT_HEALTH_ADDR
                .parse()
                .map_err(|_| ConfigError::InvalidValue {
                    key: "HEALTH_ADDR",
                    value: DEFAULT_HEALTH_ADDR.to_string(),
                })?,
        };

        let leader_election = match non_empty("LEADER_ELECTION") {
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "LEADER_ELECTION",
                        value,
                    });
                }
            },
            None => true,
        };

        Ok(Self {
            pod_name: non_empty("POD_NAME"),
            pod_namespace: non_empty("POD_NAMESPACE")
                .unwrap_or_else(|| DEFAULT_LEASE_NAMESPACE.to_string()),
            watch_namespace: non_empty("WATCH_NAMESPACE"),
            health_addr,
            leader_election,
        })
    }
}
