//! Core types for declarative provisioning
//!
//! Resource configurations are plain data. Every field that names another
//! resource is a [`ResourceId`] and implies a dependency edge.

use crate::cidr::Cidr;
use serde::{Deserialize, Serialize, Serializer};
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

/// Logical name of a declared resource, unique within a stack.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ResourceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ResourceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ResourceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Provider-agnostic resource kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Network,
    Subnet,
    SecurityGroup,
    Instance,
    LaunchTemplate,
    LoadBalancer,
    TargetGroup,
    AutoScalingGroup,
    IamRole,
    InstanceProfile,
    GatewayEndpoint,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 11] = [
        Self::Network,
        Self::Subnet,
        Self::SecurityGroup,
        Self::Instance,
        Self::LaunchTemplate,
        Self::LoadBalancer,
        Self::TargetGroup,
        Self::AutoScalingGroup,
        Self::IamRole,
        Self::InstanceProfile,
        Self::GatewayEndpoint,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Subnet => "subnet",
            Self::SecurityGroup => "security_group",
            Self::Instance => "instance",
            Self::LaunchTemplate => "launch_template",
            Self::LoadBalancer => "load_balancer",
            Self::TargetGroup => "target_group",
            Self::AutoScalingGroup => "auto_scaling_group",
            Self::IamRole => "iam_role",
            Self::InstanceProfile => "instance_profile",
            Self::GatewayEndpoint => "gateway_endpoint",
        }
    }

    /// Parse a kind name, accepting the snake_case form used in documents.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }

    /// Kinds that cannot be changed in place; any config change replaces them.
    pub fn is_immutable(&self) -> bool {
        matches!(self, Self::Instance | Self::LaunchTemplate)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing tier of a subnet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubnetTier {
    Public,
    PrivateWithEgress,
    Isolated,
}

impl SubnetTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::PrivateWithEgress => "private_with_egress",
            Self::Isolated => "isolated",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    All,
}

/// Where ingress traffic may come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSource {
    Cidr(Cidr),
    SecurityGroup(ResourceId),
}

/// One ingress rule of a security group. Port range is inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressRule {
    pub protocol: Protocol,
    pub from_port: u16,
    pub to_port: u16,
    pub source: RuleSource,
    pub description: Option<String>,
}

impl IngressRule {
    /// TCP on a single port from any IPv4 address.
    pub fn tcp_from_anywhere(port: u16) -> Self {
        Self {
            protocol: Protocol::Tcp,
            from_port: port,
            to_port: port,
            source: RuleSource::Cidr(Cidr::any_ipv4()),
            description: None,
        }
    }
}

/// Opaque provisioning payload attached to compute resources.
///
/// Only the digest takes part in serialization, so the payload never ends up
/// in state files and is never interpreted.
#[derive(Clone, PartialEq, Eq)]
pub struct UserData(Vec<u8>);

impl UserData {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn digest(&self) -> String {
        blake3::hash(&self.0).to_hex().to_string()
    }
}

impl fmt::Debug for UserData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserData({} bytes)", self.0.len())
    }
}

impl Serialize for UserData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("UserData", 2)?;
        s.serialize_field("bytes", &self.0.len())?;
        s.serialize_field("blake3", &self.digest())?;
        s.end()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkConfig {
    pub cidr: Cidr,
    pub max_azs: u8,
    pub nat_gateways: u8,
    pub enable_dns_hostnames: bool,
    pub enable_dns_support: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubnetConfig {
    pub network: ResourceId,
    pub cidr: Cidr,
    pub availability_zone: String,
    pub tier: SubnetTier,
    pub map_public_ip_on_launch: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecurityGroupConfig {
    pub network: ResourceId,
    pub description: String,
    pub ingress: Vec<IngressRule>,
    pub allow_all_outbound: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceConfig {
    pub machine_image: String,
    pub instance_type: String,
    pub subnet: ResourceId,
    pub security_group: ResourceId,
    pub instance_profile: Option<ResourceId>,
    pub associate_public_ip: bool,
    pub require_imdsv2: bool,
    pub user_data: Option<UserData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchTemplateConfig {
    pub machine_image: String,
    pub instance_type: String,
    pub security_group: ResourceId,
    pub instance_profile: Option<ResourceId>,
    pub require_imdsv2: bool,
    pub user_data: Option<UserData>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ListenerProtocol {
    Http,
    Https,
    Tcp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Listener {
    pub port: u16,
    pub protocol: ListenerProtocol,
    pub target_group: ResourceId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadBalancerConfig {
    pub internet_facing: bool,
    pub subnets: Vec<ResourceId>,
    pub security_group: ResourceId,
    pub listeners: Vec<Listener>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetGroupConfig {
    pub network: ResourceId,
    pub port: u16,
    pub protocol: ListenerProtocol,
    pub health_check_path: Option<String>,
    pub targets: Vec<ResourceId>,
}

/// Capacity bounds of an auto-scaling group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capacity {
    pub min: u32,
    pub max: u32,
    pub desired: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingMetric {
    CpuUtilization,
    RequestCountPerTarget,
    NetworkIn,
    NetworkOut,
}

/// Target-tracking policy: keep `metric` near `target`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScalingPolicy {
    pub metric: ScalingMetric,
    pub target: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AutoScalingGroupConfig {
    pub launch_template: ResourceId,
    pub subnets: Vec<ResourceId>,
    pub capacity: Capacity,
    pub scaling_policy: Option<ScalingPolicy>,
    pub target_group: Option<ResourceId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IamRoleConfig {
    pub assumed_by: String,
    pub managed_policies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceProfileConfig {
    pub role: ResourceId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewayEndpointConfig {
    pub network: ResourceId,
    pub service: String,
    pub subnet_tier: SubnetTier,
    pub policy_actions: Vec<String>,
}

/// Desired configuration of a resource; the variant determines its kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceSpec {
    Network(NetworkConfig),
    Subnet(SubnetConfig),
    SecurityGroup(SecurityGroupConfig),
    Instance(InstanceConfig),
    LaunchTemplate(LaunchTemplateConfig),
    LoadBalancer(LoadBalancerConfig),
    TargetGroup(TargetGroupConfig),
    AutoScalingGroup(AutoScalingGroupConfig),
    IamRole(IamRoleConfig),
    InstanceProfile(InstanceProfileConfig),
    GatewayEndpoint(GatewayEndpointConfig),
}

/// A field of one resource that names another
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference<'a> {
    pub field: &'static str,
    pub target: &'a ResourceId,
    pub expects: ResourceKind,
}

impl ResourceSpec {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Network(_) => ResourceKind::Network,
            Self::Subnet(_) => ResourceKind::Subnet,
            Self::SecurityGroup(_) => ResourceKind::SecurityGroup,
            Self::Instance(_) => ResourceKind::Instance,
            Self::LaunchTemplate(_) => ResourceKind::LaunchTemplate,
            Self::LoadBalancer(_) => ResourceKind::LoadBalancer,
            Self::TargetGroup(_) => ResourceKind::TargetGroup,
            Self::AutoScalingGroup(_) => ResourceKind::AutoScalingGroup,
            Self::IamRole(_) => ResourceKind::IamRole,
            Self::InstanceProfile(_) => ResourceKind::InstanceProfile,
            Self::GatewayEndpoint(_) => ResourceKind::GatewayEndpoint,
        }
    }

    /// Every reference this configuration makes, in field order.
    pub fn references(&self) -> Vec<Reference<'_>> {
        fn r<'a>(field: &'static str, target: &'a ResourceId, expects: ResourceKind) -> Reference<'a> {
            Reference {
                field,
                target,
                expects,
            }
        }

        let mut refs = Vec::new();
        match self {
            Self::Network(_) | Self::IamRole(_) => {}
            Self::Subnet(c) => refs.push(r("network", &c.network, ResourceKind::Network)),
            Self::SecurityGroup(c) => {
                refs.push(r("network", &c.network, ResourceKind::Network));
                for rule in &c.ingress {
                    if let RuleSource::SecurityGroup(sg) = &rule.source {
                        refs.push(r("ingress.source", sg, ResourceKind::SecurityGroup));
                    }
                }
            }
            Self::Instance(c) => {
                refs.push(r("subnet", &c.subnet, ResourceKind::Subnet));
                refs.push(r(
                    "security_group",
                    &c.security_group,
                    ResourceKind::SecurityGroup,
                ));
                if let Some(profile) = &c.instance_profile {
                    refs.push(r(
                        "instance_profile",
                        profile,
                        ResourceKind::InstanceProfile,
                    ));
                }
            }
            Self::LaunchTemplate(c) => {
                refs.push(r(
                    "security_group",
                    &c.security_group,
                    ResourceKind::SecurityGroup,
                ));
                if let Some(profile) = &c.instance_profile {
                    refs.push(r(
                        "instance_profile",
                        profile,
                        ResourceKind::InstanceProfile,
                    ));
                }
            }
            Self::LoadBalancer(c) => {
                for subnet in &c.subnets {
                    refs.push(r("subnets", subnet, ResourceKind::Subnet));
                }
                refs.push(r(
                    "security_group",
                    &c.security_group,
                    ResourceKind::SecurityGroup,
                ));
                for listener in &c.listeners {
                    refs.push(r(
                        "listeners.target_group",
                        &listener.target_group,
                        ResourceKind::TargetGroup,
                    ));
                }
            }
            Self::TargetGroup(c) => {
                refs.push(r("network", &c.network, ResourceKind::Network));
                for target in &c.targets {
                    refs.push(r("targets", target, ResourceKind::Instance));
                }
            }
            Self::AutoScalingGroup(c) => {
                refs.push(r(
                    "launch_template",
                    &c.launch_template,
                    ResourceKind::LaunchTemplate,
                ));
                for subnet in &c.subnets {
                    refs.push(r("subnets", subnet, ResourceKind::Subnet));
                }
                if let Some(tg) = &c.target_group {
                    refs.push(r("target_group", tg, ResourceKind::TargetGroup));
                }
            }
            Self::InstanceProfile(c) => refs.push(r("role", &c.role, ResourceKind::IamRole)),
            Self::GatewayEndpoint(c) => refs.push(r("network", &c.network, ResourceKind::Network)),
        }
        refs
    }
}

/// Digest of a resource's canonical desired configuration
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(spec: &ResourceSpec) -> Self {
        let mut hasher = blake3::Hasher::new();
        if let Err(err) = serde_json::to_writer(&mut hasher, spec) {
            log::warn!("Fingerprint of {} config is partial: {err}", spec.kind());
        }
        Self(hasher.finalize().to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Fingerprint {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// What the provider reports about a resource that exists remotely
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedResource {
    pub id: ResourceId,
    pub kind: ResourceKind,
    /// Identifier assigned by the provider
    pub physical_id: String,
    /// Fingerprint of the configuration last applied
    pub fingerprint: Fingerprint,
    /// Provider-assigned attributes (addresses, DNS names, ARNs)
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Snapshot of the configuration last applied
    #[serde(default)]
    pub config: serde_json::Value,
}

impl ObservedResource {
    /// Look up an attribute; `id` resolves to the physical id.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        if name == "id" {
            return Some(&self.physical_id);
        }
        self.attributes.get(name).map(String::as_str)
    }
}

/// Observed state of every resource the applier has seen, keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppliedState {
    resources: BTreeMap<ResourceId, ObservedResource>,
}

impl AppliedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&ObservedResource> {
        self.resources.get(id)
    }

    pub fn insert(&mut self, observed: ObservedResource) {
        self.resources.insert(observed.id.clone(), observed);
    }

    pub fn remove(&mut self, id: &str) -> Option<ObservedResource> {
        self.resources.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.resources.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObservedResource> {
        self.resources.values()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Copy of the entries named in `ids` that are present.
    pub fn subset<'a>(&self, ids: impl IntoIterator<Item = &'a ResourceId>) -> Self {
        let resources = ids
            .into_iter()
            .filter_map(|id| self.resources.get(id).map(|o| (id.clone(), o.clone())))
            .collect();
        Self { resources }
    }
}

impl FromIterator<ObservedResource> for AppliedState {
    fn from_iter<T: IntoIterator<Item = ObservedResource>>(iter: T) -> Self {
        let mut state = Self::new();
        for observed in iter {
            state.insert(observed);
        }
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network() -> ResourceSpec {
        ResourceSpec::Network(NetworkConfig {
            cidr: "10.0.0.0/16".parse().unwrap(),
            max_azs: 2,
            nat_gateways: 1,
            enable_dns_hostnames: true,
            enable_dns_support: true,
        })
    }

    #[test]
    fn test_kind_names_round_trip() {
        for kind in ResourceKind::ALL {
            assert_eq!(ResourceKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ResourceKind::parse("bucket"), None);
    }

    #[test]
    fn test_fingerprint_tracks_config() {
        let a = Fingerprint::of(&network());
        assert_eq!(a, Fingerprint::of(&network()));

        let mut changed = network();
        if let ResourceSpec::Network(c) = &mut changed {
            c.nat_gateways = 2;
        }
        assert_ne!(a, Fingerprint::of(&changed));
    }

    #[test]
    fn test_user_data_is_opaque_in_serialization() {
        let data = UserData::new(b"#!/bin/bash\necho secret\n".to_vec());
        let json = serde_json::to_string(&data).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains(&data.digest()));
    }

    #[test]
    fn test_references_cover_every_field() {
        let spec = ResourceSpec::Instance(InstanceConfig {
            machine_image: "al2023".into(),
            instance_type: "t2.micro".into(),
            subnet: "public-1".into(),
            security_group: "web-sg".into(),
            instance_profile: Some("web-profile".into()),
            associate_public_ip: true,
            require_imdsv2: true,
            user_data: None,
        });
        let fields: Vec<_> = spec
            .references()
            .into_iter()
            .map(|r| (r.field, r.target.as_str(), r.expects))
            .collect();
        assert_eq!(
            fields,
            vec![
                ("subnet", "public-1", ResourceKind::Subnet),
                ("security_group", "web-sg", ResourceKind::SecurityGroup),
                (
                    "instance_profile",
                    "web-profile",
                    ResourceKind::InstanceProfile
                ),
            ]
        );
    }

    #[test]
    fn test_observed_attribute_lookup() {
        let observed = ObservedResource {
            id: "web".into(),
            kind: ResourceKind::Instance,
            physical_id: "i-0abc".into(),
            fingerprint: Fingerprint::from("f".to_string()),
            attributes: BTreeMap::from([("public_ip".to_string(), "3.1.2.3".to_string())]),
            config: serde_json::Value::Null,
        };
        assert_eq!(observed.attribute("id"), Some("i-0abc"));
        assert_eq!(observed.attribute("public_ip"), Some("3.1.2.3"));
        assert_eq!(observed.attribute("public_dns"), None);
    }
}
