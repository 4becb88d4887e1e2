//! Simulation snapshot: templates, response delays and export metadata.

use super::pair::TemplatePair;
use crate::delay::ResponseDelay;
use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Schema tag written on export and required on import.
pub const SCHEMA_VERSION: &str = "v1";

/// Full snapshot of the interaction store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Simulation {
    pub data: SimulationData,
    pub meta: SimulationMeta,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationData {
    #[serde(default)]
    pub pairs: Vec<TemplatePair>,
    #[serde(default)]
    pub global_actions: GlobalActions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalActions {
    #[serde(default)]
    pub delays: Vec<ResponseDelay>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationMeta {
    pub schema_version: String,
    pub producer_version: String,
    /// RFC 3339 timestamp
    pub time_exported: String,
}

impl Simulation {
    /// Build a snapshot stamped with the current time.
    pub fn new(pairs: Vec<TemplatePair>, delays: Vec<ResponseDelay>, producer_version: &str) -> Self {
        Self {
            data: SimulationData {
                pairs,
                global_actions: GlobalActions { delays },
            },
            meta: SimulationMeta {
                schema_version: SCHEMA_VERSION.to_string(),
                producer_version: producer_version.to_string(),
                time_exported: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            },
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read simulation file {}", path.display()))?;
        let simulation = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse simulation file {}", path.display()))?;
        Ok(simulation)
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), anyhow::Error> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write simulation file {}", path.display()))?;
        Ok(())
    }

    pub fn pairs(&self) -> &[TemplatePair] {
        &self.data.pairs
    }

    pub fn delays(&self) -> &[ResponseDelay] {
        &self.data.global_actions.delays
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RequestTemplate, ResponseDetails};
    use crate::predicate::FieldMatcher;

    fn sample() -> Simulation {
        let pair = TemplatePair::new(
            RequestTemplate {
                method: Some(FieldMatcher::Literal("GET".to_string())),
                path: Some(FieldMatcher::Literal("/users/1".to_string())),
                ..Default::default()
            },
            ResponseDetails::new(200, "u1"),
        );
        let delay = ResponseDelay {
            url_pattern: ".*/slow".to_string(),
            http_method: "GET".to_string(),
            delay: 200,
        };
        Simulation::new(vec![pair], vec![delay], "0.1.0")
    }

    #[test]
    fn test_meta_is_stamped() {
        let simulation = sample();
        assert_eq!(simulation.meta.schema_version, SCHEMA_VERSION);
        assert_eq!(simulation.meta.producer_version, "0.1.0");
        assert!(chrono::DateTime::parse_from_rfc3339(&simulation.meta.time_exported).is_ok());
    }

    #[test]
    fn test_json_layout() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(value["data"]["pairs"][0]["response"]["body"], "u1");
        assert_eq!(value["data"]["globalActions"]["delays"][0]["urlPattern"], ".*/slow");
        assert_eq!(value["meta"]["schemaVersion"], "v1");
        assert!(value["meta"]["timeExported"].is_string());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("simulation.json");
        let simulation = sample();

        simulation.to_file(&path).unwrap();
        let loaded = Simulation::from_file(&path).unwrap();
        assert_eq!(loaded, simulation);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = Simulation::from_file("/definitely/not/here.json").unwrap_err();
        assert!(err.to_string().contains("Failed to read simulation file"));
    }
}
