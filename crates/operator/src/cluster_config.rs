//! Node configuration read from the ConfigMaps a tier references
//!
//! Frontends read `fe.conf`, backends `be.conf`. Both are `key = value`
//! property files; only a handful of keys matter to the control plane.

use crate::crd::ConfigMapRef;
use crate::error::{OperatorError, Result};
use crate::topology::AddressingMode;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{Api, Client};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, warn};

pub const QUERY_PORT_KEY: &str = "query_port";
pub const FQDN_MODE_KEY: &str = "enable_fqdn_mode";
pub const FILE_CACHE_PATH_KEY: &str = "file_cache_path";

pub const DEFAULT_QUERY_PORT: u16 = 9030;
pub const DEFAULT_FILE_CACHE_PATH: &str = "/opt/apache-doris/be/file_cache";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfFile {
    Frontend,
    Backend,
}

impl ConfFile {
    pub fn file_name(&self) -> &'static str {
        match self {
            ConfFile::Frontend => "fe.conf",
            ConfFile::Backend => "be.conf",
        }
    }
}

/// Parsed properties of one tier. Later ConfigMaps override earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TierConfig {
    values: HashMap<String, String>,
}

#[derive(Deserialize)]
struct CachePath {
    path: String,
}

impl TierConfig {
    pub fn parse(content: &str) -> Self {
        let mut config = Self::default();
        config.merge(content);
        config
    }

    pub fn merge(&mut self, content: &str) {
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                self.values
                    .insert(key.trim().to_string(), value.trim().to_string());
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn query_port(&self) -> u16 {
        self.get(QUERY_PORT_KEY)
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_QUERY_PORT)
    }

    pub fn addressing_mode(&self) -> AddressingMode {
        match self.get(FQDN_MODE_KEY) {
            Some(v) if v.eq_ignore_ascii_case("true") => AddressingMode::Fqdn,
            _ => AddressingMode::Ip,
        }
    }

    /// Cache directories declared in `file_cache_path`, one PVC template each.
    /// Falls back to the single default path when unset or unparsable.
    pub fn storage_paths(&self) -> Vec<String> {
        let Some(raw) = self.get(FILE_CACHE_PATH_KEY) else {
            return vec![DEFAULT_FILE_CACHE_PATH.to_string()];
        };
        // values are often quoted in the properties file
        let raw = raw.trim_matches(|c| c == '"' || c == '\'');
        match serde_json::from_str::<Vec<CachePath>>(raw) {
            Ok(paths) if !paths.is_empty() => paths.into_iter().map(|p| p.path).collect(),
            Ok(_) => vec![DEFAULT_FILE_CACHE_PATH.to_string()],
            Err(e) => {
                warn!(value = %raw, error = %e, "Unparsable file_cache_path, using default");
                vec![DEFAULT_FILE_CACHE_PATH.to_string()]
            }
        }
    }
}

#[async_trait]
pub trait ConfigResolver: Send + Sync {
    async fn resolve(
        &self,
        namespace: &str,
        config_maps: &[ConfigMapRef],
        file: ConfFile,
    ) -> Result<TierConfig>;
}

pub struct ConfigMapConfigResolver {
    client: Client,
}

impl ConfigMapConfigResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ConfigResolver for ConfigMapConfigResolver {
    async fn resolve(
        &self,
        namespace: &str,
        config_maps: &[ConfigMapRef],
        file: ConfFile,
    ) -> Result<TierConfig> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        let mut config = TierConfig::default();

        for reference in config_maps {
            let Some(config_map) = api.get_opt(&reference.name).await? else {
                return Err(OperatorError::Config(format!(
                    "ConfigMap {}/{} not found",
                    namespace, reference.name
                )));
            };
            match config_map
                .data
                .as_ref()
                .and_then(|data| data.get(file.file_name()))
            {
                Some(content) => config.merge(content),
                None => debug!(
                    config_map = %reference.name,
                    file = file.file_name(),
                    "ConfigMap does not carry the tier configuration file"
                ),
            }
        }

        Ok(config)
    }
}
