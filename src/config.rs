use std::collections::HashMap;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::dag::UserSpec;
use crate::error::{Result, SimError};

/// Cluster-wide resource capacity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClusterSpec {
    pub cpus: i64,
    pub ram: i64,
}

/// Top-level shape of a simulation's YAML input: a cluster and its users,
/// each with their own declarative DAG.
#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    pub cluster: ClusterSpec,
    pub users: IndexMap<String, UserSpec>,
}

impl SimulationConfig {
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    fn validate(&self) -> Result<()> {
        if self.cluster.cpus <= 0 || self.cluster.ram <= 0 {
            return Err(SimError::MalformedSpec(
                "cluster cpus and ram must be positive integers".to_string(),
            ));
        }
        if self.users.is_empty() {
            return Err(SimError::MalformedSpec("config declares no users".to_string()));
        }
        for (user, spec) in &self.users {
            if spec.arrival_time < 0 {
                return Err(SimError::MalformedSpec(format!(
                    "user '{user}': arrival_time must not be negative"
                )));
            }
        }
        Ok(())
    }
}

/// Loads every `.yml`/`.yaml` file in `dir` into a map keyed by file name,
/// for batch or demo loading.
pub fn load_configs_dir(dir: impl AsRef<Path>) -> Result<HashMap<String, SimulationConfig>> {
    let dir = dir.as_ref();
    let mut configs = HashMap::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext == "yml" || ext == "yaml")
            .unwrap_or(false);
        if !is_yaml {
            continue;
        }
        let name = path.file_name().expect("read_dir entries have a file name").to_string_lossy().into_owned();
        configs.insert(name, SimulationConfig::from_file(&path)?);
    }
    Ok(configs)
}
