//! Flow invocation parameters.
//!
//! Flows are invoked with a flat, immutable map of dotted parameter
//! keys. The map both constrains and documents every external input a
//! flow needs; validation happens once at flow entry through the
//! `require_*` accessors.

use crate::error::{FlowError, Result};
use serde_json::Value;
use std::collections::BTreeMap;

/// Well-known parameter keys.
pub mod keys {
    pub const INTEGRATION_ID: &str = "TendrlContext.integration_id";
    pub const SDS_NAME: &str = "TendrlContext.sds_name";
    pub const CLUSTER_NAME: &str = "TendrlContext.cluster_name";
    pub const NODES: &str = "Node[]";
    pub const JOB_ID: &str = "job_id";
    pub const FLOW_ID: &str = "flow_id";
    pub const PUBLIC_NETWORK: &str = "Cluster.public_network";
    pub const CLUSTER_NETWORK: &str = "Cluster.cluster_network";
    pub const SDS_PKG_NAME: &str = "DetectedCluster.sds_pkg_name";
    pub const SDS_PKG_VERSION: &str = "DetectedCluster.sds_pkg_version";
    pub const IMPORT_AFTER_CREATE: &str = "import_after_create";
    pub const GDEPLOY_PROVISIONED: &str = "gdeploy_provisioned";
    /// Set by Ceph installers before their install step so the
    /// provisioning scripts generate the monitor secret.
    pub const CREATE_MON_SECRET: &str = "create_mon_secret";
}

/// Flat map of dotted parameter keys to values.
#[derive(Debug, Clone, Default)]
pub struct FlowParams(BTreeMap<String, Value>);

impl FlowParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    pub fn get_str_list(&self, key: &str) -> Option<Vec<String>> {
        let items = self.0.get(key)?.as_array()?;
        items
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect()
    }

    /// A present, non-empty string, or a validation error.
    pub fn require_str(&self, key: &str) -> Result<&str> {
        match self.0.get(key) {
            None | Some(Value::Null) => Err(FlowError::MissingParameter(key.to_string())),
            Some(Value::String(s)) if s.is_empty() => {
                Err(FlowError::MissingParameter(key.to_string()))
            }
            Some(Value::String(s)) => Ok(s),
            Some(_) => Err(FlowError::BadParameter {
                key: key.to_string(),
                expected: "string",
            }),
        }
    }

    /// A present, non-empty list of strings, or a validation error.
    pub fn require_str_list(&self, key: &str) -> Result<Vec<String>> {
        match self.0.get(key) {
            None | Some(Value::Null) => Err(FlowError::MissingParameter(key.to_string())),
            Some(Value::Array(_)) => {
                let items = self
                    .get_str_list(key)
                    .ok_or_else(|| FlowError::BadParameter {
                        key: key.to_string(),
                        expected: "list of strings",
                    })?;
                if items.is_empty() {
                    Err(FlowError::MissingParameter(key.to_string()))
                } else {
                    Ok(items)
                }
            }
            Some(_) => Err(FlowError::BadParameter {
                key: key.to_string(),
                expected: "list of strings",
            }),
        }
    }

    /// The whole map as a JSON object, for embedding in a job payload.
    pub fn to_value(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

impl FromIterator<(String, Value)> for FlowParams {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> FlowParams {
        FlowParams::new()
            .set(keys::INTEGRATION_ID, "int-1")
            .set(keys::NODES, json!(["n1", "n2"]))
            .set(keys::IMPORT_AFTER_CREATE, true)
    }

    #[test]
    fn test_typed_accessors() {
        let params = sample();
        assert_eq!(params.get_str(keys::INTEGRATION_ID), Some("int-1"));
        assert_eq!(
            params.get_str_list(keys::NODES),
            Some(vec!["n1".to_string(), "n2".to_string()])
        );
        assert_eq!(params.get_bool(keys::IMPORT_AFTER_CREATE), Some(true));
    }

    #[test]
    fn test_installer_extends_parameters() {
        // A Ceph installer's enriched copy of the flow parameters.
        let mut params = sample();
        params.insert(keys::CREATE_MON_SECRET, true);
        assert_eq!(params.get_bool(keys::CREATE_MON_SECRET), Some(true));
    }

    #[test]
    fn test_require_str_missing_or_empty() {
        let params = sample().set(keys::CLUSTER_NAME, "");
        assert!(matches!(
            params.require_str(keys::SDS_NAME),
            Err(FlowError::MissingParameter(_))
        ));
        assert!(matches!(
            params.require_str(keys::CLUSTER_NAME),
            Err(FlowError::MissingParameter(_))
        ));
        assert_eq!(params.require_str(keys::INTEGRATION_ID).unwrap(), "int-1");
    }

    #[test]
    fn test_require_str_wrong_type() {
        let params = sample();
        assert!(matches!(
            params.require_str(keys::IMPORT_AFTER_CREATE),
            Err(FlowError::BadParameter { .. })
        ));
    }

    #[test]
    fn test_require_str_list() {
        let params = sample();
        assert_eq!(
            params.require_str_list(keys::NODES).unwrap(),
            vec!["n1".to_string(), "n2".to_string()]
        );

        let empty = FlowParams::new().set(keys::NODES, json!([]));
        assert!(matches!(
            empty.require_str_list(keys::NODES),
            Err(FlowError::MissingParameter(_))
        ));
    }

    #[test]
    fn test_to_value_round_trips_keys() {
        let value = sample().to_value();
        assert_eq!(value[keys::INTEGRATION_ID], json!("int-1"));
        assert_eq!(value[keys::NODES], json!(["n1", "n2"]));
    }
}
