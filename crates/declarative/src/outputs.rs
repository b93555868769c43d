//! Output collector - named values read from applied state

use crate::types::{AppliedState, ResourceId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A declared output: one attribute of one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSpec {
    pub name: String,
    pub resource: ResourceId,
    pub attribute: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub export_name: Option<String>,
}

impl OutputSpec {
    pub fn new(
        name: impl Into<String>,
        resource: impl Into<ResourceId>,
        attribute: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            resource: resource.into(),
            attribute: attribute.into(),
            description: None,
            export_name: None,
        }
    }
}

/// Result of collecting outputs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectedOutputs {
    /// Resolved name -> value
    pub values: BTreeMap<String, String>,
    /// Outputs whose resource is absent or lacks the attribute
    pub unresolved: Vec<String>,
    /// Export name -> value, for resolved outputs that declare one
    #[serde(default)]
    pub exports: BTreeMap<String, String>,
}

impl CollectedOutputs {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Read every output from `state`. Pure: nothing is fetched or written.
pub fn collect(outputs: &[OutputSpec], state: &AppliedState) -> CollectedOutputs {
    let mut collected = CollectedOutputs::default();
    for output in outputs {
        let value = state
            .get(output.resource.as_str())
            .and_then(|observed| observed.attribute(&output.attribute));
        match value {
            Some(value) => {
                if let Some(export) = &output.export_name {
                    collected.exports.insert(export.clone(), value.to_string());
                }
                collected
                    .values
                    .insert(output.name.clone(), value.to_string());
            }
            None => collected.unresolved.push(output.name.clone()),
        }
    }
    collected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Fingerprint, ObservedResource, ResourceKind};

    fn web() -> ObservedResource {
        ObservedResource {
            id: "web".into(),
            kind: ResourceKind::Instance,
            physical_id: "i-0123456789abcdef0".into(),
            fingerprint: Fingerprint::from("abc".to_string()),
            attributes: BTreeMap::from([
                ("public_ip".to_string(), "3.80.1.2".to_string()),
                (
                    "public_dns".to_string(),
                    "ec2-3-80-1-2.compute-1.amazonaws.com".to_string(),
                ),
            ]),
            config: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_collect_resolves_attributes() {
        let state: AppliedState = [web()].into_iter().collect();
        let outputs = vec![
            OutputSpec::new("ec2PublicIp", "web", "public_ip"),
            OutputSpec::new("ec2PublicDnsName", "web", "public_dns"),
            OutputSpec::new("instanceId", "web", "id"),
        ];
        let collected = collect(&outputs, &state);
        assert!(collected.is_complete());
        assert_eq!(collected.get("ec2PublicIp"), Some("3.80.1.2"));
        assert_eq!(
            collected.get("ec2PublicDnsName"),
            Some("ec2-3-80-1-2.compute-1.amazonaws.com")
        );
        assert_eq!(collected.get("instanceId"), Some("i-0123456789abcdef0"));
    }

    #[test]
    fn test_collect_reports_unresolved() {
        let state: AppliedState = [web()].into_iter().collect();
        let outputs = vec![
            OutputSpec::new("lbDns", "alb", "dns_name"),
            OutputSpec::new("arn", "web", "arn"),
        ];
        let collected = collect(&outputs, &state);
        assert!(collected.values.is_empty());
        assert_eq!(collected.unresolved, vec!["lbDns", "arn"]);
    }

    #[test]
    fn test_collect_exports_resolved_values_only() {
        let state: AppliedState = [web()].into_iter().collect();
        let exported = |name: &str, resource: &str, attribute: &str| OutputSpec {
            export_name: Some(format!("{name}Export")),
            ..OutputSpec::new(name, resource, attribute)
        };
        let outputs = vec![
            exported("ec2PublicIp", "web", "public_ip"),
            exported("lbDns", "alb", "dns_name"),
            OutputSpec::new("instanceId", "web", "id"),
        ];
        let collected = collect(&outputs, &state);
        assert_eq!(
            collected.exports,
            BTreeMap::from([("ec2PublicIpExport".to_string(), "3.80.1.2".to_string())])
        );
        assert_eq!(collected.unresolved, vec!["lbDns".to_string()]);
    }
}
