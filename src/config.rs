//! Service configuration.
//!
//! A YAML file at `CONFIG_PATH` carries the API binding, the registry
//! address, the RPC node and the proof service endpoint. Key material comes
//! from the environment, never from the file.

use std::path::Path;

use alloy::primitives::Address;
use serde::Deserialize;

use crate::error::{IssuerError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(rename = "APIConf", default)]
    pub api: ApiConf,
    #[serde(rename = "RegistryAddress")]
    pub registry_address: Address,
    /// Ethereum JSON-RPC endpoint.
    #[serde(rename = "Node")]
    pub node: String,
    #[serde(rename = "MerkleProofService")]
    pub merkle_proof_service: MerkleProofServiceConf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConf {
    #[serde(rename = "Port", default = "default_port")]
    pub port: String,
    #[serde(rename = "Host", default = "default_host")]
    pub host: String,
    #[serde(rename = "CORSEnabled", default)]
    pub cors_enabled: bool,
    #[serde(rename = "CORSOrigin", default)]
    pub cors_origin: String,
}

impl Default for ApiConf {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            cors_enabled: false,
            cors_origin: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MerkleProofServiceConf {
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "TLS", default)]
    pub tls: bool,
}

fn default_port() -> String {
    "8081".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            IssuerError::Configuration(format!("read config file {:?}: {e}", path.as_ref()))
        })?;
        serde_yaml::from_str(&raw)
            .map_err(|e| IssuerError::Configuration(format!("parse config file: {e}")))
    }

    /// Load from the path in `CONFIG_PATH`.
    pub fn from_env() -> Result<Self> {
        let path = std::env::var("CONFIG_PATH")
            .map_err(|_| IssuerError::Configuration("CONFIG_PATH is not set".into()))?;
        Self::load(path)
    }
}
