use fusen_gateway_common::{config::get_config_by_file, error::ConfigError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{path::Path, sync::Arc};

use crate::{
    client::{BackendProtocol, Credentials},
    handler::loadbalance::{LoadBalance, RandomLoadBalance, SmoothWeightedRoundRobin},
    server::router::DEFAULT_BODY_LIMIT,
};

pub const DEFAULT_PORT: u16 = 1452;
pub const DEFAULT_PROTO_DIR: &str = "protos";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RuleConfig {
    pub path: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(
        default,
        alias = "registryPath",
        alias = "serviceName",
        alias = "service_name"
    )]
    pub registry_path: Option<String>,
}

impl RuleConfig {
    pub fn host(path: &str, host: &str) -> Self {
        Self {
            path: path.to_owned(),
            host: Some(host.to_owned()),
            registry_path: None,
        }
    }

    pub fn registry(path: &str, registry_path: &str) -> Self {
        Self {
            path: path.to_owned(),
            host: None,
            registry_path: Some(registry_path.to_owned()),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalanceType {
    #[default]
    SmoothWeighted,
    Random,
}

impl LoadBalanceType {
    pub fn build(&self) -> Arc<dyn LoadBalance> {
        match self {
            LoadBalanceType::SmoothWeighted => Arc::new(SmoothWeightedRoundRobin),
            LoadBalanceType::Random => Arc::new(RandomLoadBalance),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct GatewayConfig {
    /// Prepended to every compiled route path.
    pub prefix: String,
    /// Ordered forwarding rules, the first structural match wins.
    pub rules: Vec<RuleConfig>,
    /// Zookeeper connection string. Without it registry rules resolve no host.
    #[serde(
        alias = "registryConnection",
        alias = "zkConnectionString",
        alias = "zk_connection_string"
    )]
    pub registry: Option<String>,
    pub port: u16,
    pub proto_dir: String,
    pub log_routes: bool,
    pub load_balance: LoadBalanceType,
    pub credentials: Credentials,
    /// Wire protocol spoken to backends.
    pub protocol: BackendProtocol,
    /// Largest accepted request body in bytes.
    pub body_limit: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            rules: vec![],
            registry: None,
            port: DEFAULT_PORT,
            proto_dir: DEFAULT_PROTO_DIR.to_owned(),
            log_routes: true,
            load_balance: LoadBalanceType::default(),
            credentials: Credentials::default(),
            protocol: BackendProtocol::default(),
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }
}

impl GatewayConfig {
    pub fn new(rules: Vec<RuleConfig>) -> Self {
        Self {
            rules,
            ..Default::default()
        }
    }

    pub fn prefix(mut self, prefix: &str) -> Self {
        prefix.clone_into(&mut self.prefix);
        self
    }

    pub fn registry(mut self, registry: Option<&str>) -> Self {
        self.registry = registry.map(|e| e.to_owned());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn proto_dir(mut self, proto_dir: &str) -> Self {
        proto_dir.clone_into(&mut self.proto_dir);
        self
    }

    pub fn protocol(mut self, protocol: BackendProtocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn body_limit(mut self, body_limit: usize) -> Self {
        self.body_limit = body_limit;
        self
    }

    /// `rules` has to be present and has to be a list.
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        match value.get("rules") {
            Some(Value::Array(_)) => {}
            _ => return Err(ConfigError::Invalid("rules must be an array".to_owned())),
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let value: Value = get_config_by_file(path)?;
        Self::from_value(value)
    }
}
