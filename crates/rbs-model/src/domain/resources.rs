use serde::{Deserialize, Deserializer};

use crate::ModelError;

/// Requested CPU quantity; YAML definitions write it as a number or a string (`"1.5"`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpuRequest(pub f64);

impl CpuRequest {
    /// Whole CPUs needed to satisfy the request.
    pub fn whole_cpus(&self) -> Result<usize, ModelError> {
        let value = self.0;
        if !value.is_finite() || value <= 0.0 || value.ceil() >= usize::MAX as f64 {
            return Err(ModelError::InvalidCpuRequest(value.to_string()));
        }
        Ok(value.ceil() as usize)
    }
}

impl<'de> Deserialize<'de> for CpuRequest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(CpuRequest(n)),
            Raw::Text(s) => s
                .trim()
                .parse::<f64>()
                .map(CpuRequest)
                .map_err(|_| serde::de::Error::custom(format!("invalid cpu quantity: {s:?}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResourceRequests {
    pub cpus: CpuRequest,
    #[serde(default)]
    pub memory: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Resources {
    pub requests: ResourceRequests,
}
