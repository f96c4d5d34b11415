//! Server configuration.
//!
//! Loaded from an optional JSON file; every field has a default,
//! and the command line overrides the file.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::light::RotationTiming;
use crate::{Error, IntersectionLayout, LayoutConfig, LeasePolicy, PolicyKind, Result};

/// The port the server listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 6665;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// The address to listen on.
    pub bind: IpAddr,
    /// The UDP port to listen on.
    pub port: u16,
    /// The admission policy.
    pub policy: PolicyKind,
    /// How often the sequential admission loop checks for work when idle, in ms.
    pub idle_poll_ms: u64,
    /// How long grants last without an exit notification.
    pub lease: LeasePolicy,
    /// The traffic light timing.
    pub rotation: RotationTiming,
    /// The intersection; a four-way intersection if absent.
    pub layout: Option<LayoutConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            policy: PolicyKind::default(),
            idle_poll_ms: 50,
            lease: LeasePolicy::default(),
            rotation: RotationTiming::default(),
            layout: None,
        }
    }
}

impl ServerConfig {
    /// Reads a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json(&text).map_err(|e| match e {
            Error::Config(reason) => Error::config(format!("{}: {reason}", path.display())),
            other => other,
        })
    }

    /// Parses a configuration from JSON.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| Error::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the values that would otherwise fail at startup.
    pub fn validate(&self) -> Result<()> {
        if self.idle_poll_ms == 0 {
            return Err(Error::config("idle_poll_ms must be positive"));
        }
        if self.lease.min_lease_ms < 0 {
            return Err(Error::config("lease.min_lease_ms must not be negative"));
        }
        self.rotation.validate()?;
        self.layout()?;
        Ok(())
    }

    /// The socket address to listen on.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    /// Builds the configured intersection.
    pub fn layout(&self) -> Result<IntersectionLayout> {
        match &self.layout {
            Some(layout) => IntersectionLayout::from_config(layout),
            None => Ok(IntersectionLayout::four_way()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::{ServerConfig, DEFAULT_PORT};
    use crate::PolicyKind;

    #[test]
    fn empty_file_gives_defaults() {
        let config = ServerConfig::from_json("{}").unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(ServerConfig::default().port, DEFAULT_PORT);
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let config = ServerConfig::from_json(
            r#"{
                "port": 7898,
                "policy": "traffic-light",
                "rotation": { "interval_ms": 60000 },
                "layout": { "roads": [
                    { "name": "main", "entries": ["main_in"], "exits": ["main_out"] },
                    { "name": "side", "entries": ["side_in"], "exits": ["side_out"] }
                ] }
            }"#,
        )
        .unwrap();
        assert_eq!(config.port, 7898);
        assert_eq!(config.policy, PolicyKind::TrafficLight);
        assert_eq!(config.rotation.interval_ms, 60_000);
        assert_eq!(config.rotation.transition_ms, 10_000);
        assert_eq!(config.layout().unwrap().num_roads(), 2);
    }

    #[test]
    fn rejects_transition_longer_than_rotation() {
        let config = ServerConfig::from_json(
            r#"{ "rotation": { "interval_ms": 5000, "transition_ms": 5000 } }"#,
        );
        assert!(config.is_err());
    }

    #[test]
    fn rejects_unknown_policy() {
        assert!(ServerConfig::from_json(r#"{ "policy": "stop-sign" }"#).is_err());
    }
}
