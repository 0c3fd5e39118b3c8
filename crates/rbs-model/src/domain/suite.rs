use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_yaml::{Mapping, Value};

use crate::{ModelError, Resources};

/// Tool assumed when `clientconfig.tool` is absent.
const DEFAULT_TOOL: &str = "redis-benchmark";

/// One benchmark definition file.
#[derive(Debug, Clone, PartialEq)]
pub struct TestSuiteDefinition {
    pub name: String,
    pub description: Option<String>,
    /// Topology names the suite runs against, in declaration order.
    pub topologies: Vec<String>,
    pub dbconfig: DbConfig,
    pub clientconfig: ClientConfig,
    pub source: PathBuf,
}

/// Database configuration parameters, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DbConfig {
    pub parameters: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_tool")]
    pub tool: String,
    /// Image the client sandbox runs in.
    #[serde(default)]
    pub run_image: Option<String>,
    /// Absolute path of the tool binary inside the client image.
    #[serde(default)]
    pub binary: Option<String>,
    /// Extra tool arguments, shell-quoted.
    #[serde(default)]
    pub arguments: String,
    #[serde(default)]
    pub resources: Option<Resources>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            tool: default_tool(),
            run_image: None,
            binary: None,
            arguments: String::new(),
            resources: None,
        }
    }
}

fn default_tool() -> String {
    DEFAULT_TOOL.to_string()
}

#[derive(Deserialize)]
struct RawSuite {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(rename = "redis-topologies", default)]
    topologies: Vec<String>,
    #[serde(default)]
    dbconfig: Option<RawDbConfig>,
    #[serde(default)]
    clientconfig: Option<ClientConfig>,
}

#[derive(Deserialize)]
struct RawDbConfig {
    #[serde(rename = "configuration-parameters", default)]
    parameters: Mapping,
}

impl TestSuiteDefinition {
    pub fn from_yaml_str(path: impl AsRef<Path>, yaml: &str) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let raw: RawSuite = serde_yaml::from_str(yaml).map_err(|e| ModelError::yaml(path, e))?;

        let mut parameters = Vec::new();
        if let Some(db) = raw.dbconfig {
            for (key, value) in db.parameters {
                let key = scalar_to_string(&key).ok_or_else(|| ModelError::InvalidField {
                    field: "dbconfig.configuration-parameters",
                    reason: format!("non-scalar parameter name {key:?}"),
                })?;
                let value = scalar_to_string(&value).ok_or_else(|| ModelError::InvalidField {
                    field: "dbconfig.configuration-parameters",
                    reason: format!("non-scalar value for {key}"),
                })?;
                parameters.push((key, value));
            }
        }

        Ok(Self {
            name: raw.name,
            description: raw.description,
            topologies: raw.topologies,
            dbconfig: DbConfig { parameters },
            clientconfig: raw.clientconfig.unwrap_or_default(),
            source: path.to_path_buf(),
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| ModelError::io(path, e))?;
        Self::from_yaml_str(path, &yaml)
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(true) => Some("yes".to_string()),
        Value::Bool(false) => Some("no".to_string()),
        _ => None,
    }
}

/// `*.yml` / `*.yaml` files directly inside `dir`, sorted by path.
pub fn yaml_files(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, ModelError> {
    let dir = dir.as_ref();
    let entries = std::fs::read_dir(dir).map_err(|e| ModelError::io(dir, e))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| ModelError::io(dir, e))?.path();
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == "yml" || ext == "yaml");
        if is_yaml && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
