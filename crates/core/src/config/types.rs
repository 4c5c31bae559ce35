use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::job::FINALIZE_JOB_TYPE;
use crate::pool::PoolConfig;
use crate::supervisor::SupervisorConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    /// One pool per job type.
    #[serde(default = "default_pools")]
    pub pools: Vec<PoolConfig>,
    #[serde(default)]
    pub deposits: DepositsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            supervisor: SupervisorConfig::default(),
            pools: default_pools(),
            deposits: DepositsConfig::default(),
        }
    }
}

fn default_pools() -> Vec<PoolConfig> {
    vec![PoolConfig::new(FINALIZE_JOB_TYPE)]
}

/// Operational HTTP surface
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

/// Database shared by the status store, work queue and audit log
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("deposits.db")
}

/// Registration settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DepositsConfig {
    /// Job type for packaging types without an explicit mapping.
    #[serde(default = "default_job_type")]
    pub default_job_type: String,
    /// Packaging type -> job type.
    #[serde(default)]
    pub packaging: HashMap<String, String>,
}

impl Default for DepositsConfig {
    fn default() -> Self {
        Self {
            default_job_type: default_job_type(),
            packaging: HashMap::new(),
        }
    }
}

fn default_job_type() -> String {
    FINALIZE_JOB_TYPE.to_string()
}

impl DepositsConfig {
    /// Job type that processes deposits of the given packaging type.
    pub fn job_type_for(&self, packaging_type: &str) -> &str {
        self.packaging
            .get(packaging_type)
            .map(String::as_str)
            .unwrap_or(&self.default_job_type)
    }
}
