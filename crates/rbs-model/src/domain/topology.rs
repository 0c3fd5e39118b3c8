use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::{ModelError, Resources, yaml_files};

/// Deployment shape of the database-under-test.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TopologySpec {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub redis_topology: Option<RedisTopology>,
    pub resources: Resources,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RedisTopology {
    pub primaries: u32,
    #[serde(default)]
    pub replicas: u32,
}

#[derive(Debug, Deserialize)]
struct TopologiesFile {
    spec: TopologiesSpec,
}

#[derive(Debug, Deserialize)]
struct TopologiesSpec {
    setups: Vec<TopologySpec>,
}

/// Read-only map of topology name to its resource request.
#[derive(Debug, Clone, Default)]
pub struct TopologyCatalog {
    source: Option<PathBuf>,
    topologies: HashMap<String, TopologySpec>,
}

impl TopologyCatalog {
    pub fn from_specs(specs: impl IntoIterator<Item = TopologySpec>) -> Self {
        Self {
            source: None,
            topologies: specs.into_iter().map(|t| (t.name.clone(), t)).collect(),
        }
    }

    /// Parse a `spec.setups[]` document.
    pub fn from_yaml_str(path: impl AsRef<Path>, yaml: &str) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let file: TopologiesFile =
            serde_yaml::from_str(yaml).map_err(|e| ModelError::yaml(path, e))?;
        let mut catalog = Self::from_specs(file.spec.setups);
        catalog.source = Some(path.to_path_buf());
        Ok(catalog)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| ModelError::io(path, e))?;
        Self::from_yaml_str(path, &yaml)
    }

    /// Load the first definition file (in name order) of a topologies directory.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self, ModelError> {
        let dir = dir.as_ref();
        let first = yaml_files(dir)?
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::NoDefinitions(dir.to_path_buf()))?;
        Self::load(first)
    }

    pub fn get(&self, name: &str) -> Option<&TopologySpec> {
        self.topologies.get(name)
    }

    pub fn len(&self) -> usize {
        self.topologies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topologies.is_empty()
    }

    /// Topology names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.topologies.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CpuRequest;

    const TOPOLOGIES: &str = r#"
version: 0.1
spec:
  setups:
    - name: oss-standalone
      type: oss-standalone
      redis_topology:
        primaries: 1
        replicas: 0
      resources:
        requests:
          cpus: "1"
          memory: "10g"
    - name: oss-standalone-04-io-threads
      type: oss-standalone
      resources:
        requests:
          cpus: 4.5
"#;

    #[test]
    fn parses_setups() {
        let catalog = TopologyCatalog::from_yaml_str("topologies.yml", TOPOLOGIES).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(
            catalog.names(),
            vec!["oss-standalone", "oss-standalone-04-io-threads"]
        );

        let standalone = catalog.get("oss-standalone").unwrap();
        assert_eq!(standalone.kind.as_deref(), Some("oss-standalone"));
        assert_eq!(standalone.resources.requests.cpus, CpuRequest(1.0));
        assert_eq!(standalone.redis_topology.unwrap().primaries, 1);

        let threaded = catalog.get("oss-standalone-04-io-threads").unwrap();
        assert_eq!(threaded.resources.requests.cpus.whole_cpus().unwrap(), 5);
        assert!(catalog.get("oss-cluster").is_none());
    }

    #[test]
    fn yaml_error_names_the_file() {
        let err = TopologyCatalog::from_yaml_str("bad.yml", "spec: [").unwrap_err();
        assert!(err.to_string().contains("bad.yml"));
    }

    #[test]
    fn load_dir_uses_first_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.yml"), "spec:\n  setups: []\n").unwrap();
        std::fs::write(dir.path().join("a.yml"), TOPOLOGIES).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let catalog = TopologyCatalog::load_dir(dir.path()).unwrap();
        assert_eq!(catalog.len(), 2);
        assert!(catalog.source().unwrap().ends_with("a.yml"));
    }

    #[test]
    fn load_dir_without_definitions_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = TopologyCatalog::load_dir(dir.path()).unwrap_err();
        assert!(matches!(err, ModelError::NoDefinitions(_)));
    }
}
