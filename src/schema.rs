//! Stack document schema
//!
//! The on-disk form of a stack: a `[stack]` table, `[[resources]]` tagged by
//! `kind`, and `[[outputs]]`. [`StackDocument::into_topology`] turns it into
//! a validated-at-registration [`Topology`], expanding network subnet layouts
//! and reading user-data files on the way.

use declarative::{
    AutoScalingGroupConfig, Capacity, Cidr, CidrError, ConfigError, GatewayEndpointConfig,
    IamRoleConfig, IngressRule, InstanceConfig, InstanceProfileConfig, LaunchTemplateConfig,
    Listener, ListenerProtocol, LoadBalancerConfig, NetworkConfig, OutputSpec, Protocol,
    ResourceId, ResourceSpec, RuleSource, ScalingMetric, ScalingPolicy, SecurityGroupConfig,
    StackContext, SubnetConfig, SubnetTier, TargetGroupConfig, Topology, UserData,
};
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;

use crate::paths;

static NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*$").unwrap_or_else(|e| panic!("name pattern: {e}"))
});

/// Errors turning a parsed document into a topology
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("invalid {what} name '{name}' (letters, digits, '-' and '_', starting with a letter)")]
    InvalidName { what: &'static str, name: String },

    #[error("{resource}: {source}")]
    Cidr {
        resource: String,
        #[source]
        source: CidrError,
    },

    #[error("{network}: subnet layout does not fit (no room for a /{mask} after {placed} subnets)")]
    LayoutExhausted {
        network: String,
        mask: u8,
        placed: usize,
    },

    #[error("{resource}: {message}")]
    Invalid { resource: String, message: String },

    #[error("{resource}: could not read user data from {path}")]
    UserDataFile {
        resource: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ============================================================================
// Document
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StackDocument {
    pub stack: StackSection,
    #[serde(default)]
    pub resources: Vec<ResourceDecl>,
    #[serde(default)]
    pub outputs: Vec<OutputDecl>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StackSection {
    pub name: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_account")]
    pub account: String,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_account() -> String {
    "000000000000".to_string()
}

#[derive(Debug, Deserialize)]
pub struct ResourceDecl {
    pub name: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(flatten)]
    pub body: ResourceBody,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceBody {
    Network(NetworkDecl),
    Subnet(SubnetDecl),
    SecurityGroup(SecurityGroupDecl),
    Instance(InstanceDecl),
    LaunchTemplate(LaunchTemplateDecl),
    LoadBalancer(LoadBalancerDecl),
    TargetGroup(TargetGroupDecl),
    AutoScalingGroup(AutoScalingGroupDecl),
    IamRole(IamRoleDecl),
    InstanceProfile(InstanceProfileDecl),
    GatewayEndpoint(GatewayEndpointDecl),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputDecl {
    pub name: String,
    pub resource: String,
    pub attribute: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub export_name: Option<String>,
}

const fn yes() -> bool {
    true
}

const fn default_max_azs() -> u8 {
    2
}

const fn default_nat_gateways() -> u8 {
    1
}

const fn default_http() -> ListenerProtocol {
    ListenerProtocol::Http
}

const fn default_tcp() -> Protocol {
    Protocol::Tcp
}

const fn default_endpoint_tier() -> SubnetTier {
    SubnetTier::PrivateWithEgress
}

fn default_image() -> String {
    "al2023".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkDecl {
    pub cidr: String,
    #[serde(default = "default_max_azs")]
    pub max_azs: u8,
    #[serde(default = "default_nat_gateways")]
    pub nat_gateways: u8,
    #[serde(default = "yes")]
    pub enable_dns_hostnames: bool,
    #[serde(default = "yes")]
    pub enable_dns_support: bool,
    #[serde(default)]
    pub subnet_layout: Option<SubnetLayout>,
}

/// Subnets derived from a network: one per tier per availability zone
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubnetLayout {
    /// Defaults to the network's `max_azs`
    #[serde(default)]
    pub azs: Option<u8>,
    pub tiers: Vec<TierDecl>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TierDecl {
    pub name: String,
    pub tier: SubnetTier,
    pub mask: u8,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubnetDecl {
    pub network: String,
    pub cidr: String,
    pub availability_zone: String,
    pub tier: SubnetTier,
    /// Defaults to true for public subnets
    #[serde(default)]
    pub map_public_ip_on_launch: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecurityGroupDecl {
    pub network: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub ingress: Vec<RuleDecl>,
    #[serde(default = "yes")]
    pub allow_all_outbound: bool,
}

/// Ingress rule. `port` is shorthand for `from_port = to_port = port`; the
/// source is `cidr` or `security_group`, and any IPv4 when neither is given.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleDecl {
    #[serde(default = "default_tcp")]
    pub protocol: Protocol,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub from_port: Option<u16>,
    #[serde(default)]
    pub to_port: Option<u16>,
    #[serde(default)]
    pub cidr: Option<String>,
    #[serde(default)]
    pub security_group: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstanceDecl {
    #[serde(default = "default_image")]
    pub machine_image: String,
    pub instance_type: String,
    pub subnet: String,
    pub security_group: String,
    #[serde(default)]
    pub instance_profile: Option<String>,
    #[serde(default)]
    pub associate_public_ip: bool,
    #[serde(default = "yes")]
    pub require_imdsv2: bool,
    #[serde(default)]
    pub user_data: Option<String>,
    #[serde(default)]
    pub user_data_file: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LaunchTemplateDecl {
    #[serde(default = "default_image")]
    pub machine_image: String,
    pub instance_type: String,
    pub security_group: String,
    #[serde(default)]
    pub instance_profile: Option<String>,
    #[serde(default = "yes")]
    pub require_imdsv2: bool,
    #[serde(default)]
    pub user_data: Option<String>,
    #[serde(default)]
    pub user_data_file: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListenerDecl {
    pub port: u16,
    #[serde(default = "default_http")]
    pub protocol: ListenerProtocol,
    pub target_group: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoadBalancerDecl {
    #[serde(default = "yes")]
    pub internet_facing: bool,
    pub subnets: Vec<String>,
    pub security_group: String,
    #[serde(default)]
    pub listeners: Vec<ListenerDecl>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetGroupDecl {
    pub network: String,
    pub port: u16,
    #[serde(default = "default_http")]
    pub protocol: ListenerProtocol,
    #[serde(default)]
    pub health_check_path: Option<String>,
    #[serde(default)]
    pub targets: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScalingPolicyDecl {
    pub metric: ScalingMetric,
    pub target: f64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AutoScalingGroupDecl {
    pub launch_template: String,
    pub subnets: Vec<String>,
    pub min: u32,
    pub max: u32,
    /// Defaults to `min`
    #[serde(default)]
    pub desired: Option<u32>,
    #[serde(default)]
    pub scaling_policy: Option<ScalingPolicyDecl>,
    #[serde(default)]
    pub target_group: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IamRoleDecl {
    pub assumed_by: String,
    #[serde(default)]
    pub managed_policies: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstanceProfileDecl {
    pub role: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayEndpointDecl {
    pub network: String,
    pub service: String,
    #[serde(default = "default_endpoint_tier")]
    pub subnet_tier: SubnetTier,
    #[serde(default)]
    pub policy_actions: Vec<String>,
}

// ============================================================================
// Conversion
// ============================================================================

impl StackDocument {
    /// Build the topology. `source` is the path of the document; user-data
    /// files are resolved relative to it.
    pub fn into_topology(self, source: &Path) -> Result<Topology, SchemaError> {
        check_name("stack", &self.stack.name)?;
        let context = StackContext::new(self.stack.name, self.stack.region, self.stack.account);
        let mut topology = Topology::new(context);

        for decl in self.resources {
            check_name("resource", &decl.name)?;
            let depends_on: Vec<ResourceId> =
                decl.depends_on.iter().map(|d| ResourceId::new(d.as_str())).collect();
            let name = decl.name;

            if let ResourceBody::Network(network) = decl.body {
                let layout = network.subnet_layout;
                let config = NetworkConfig {
                    cidr: parse_cidr(&name, &network.cidr)?,
                    max_azs: network.max_azs,
                    nat_gateways: network.nat_gateways,
                    enable_dns_hostnames: network.enable_dns_hostnames,
                    enable_dns_support: network.enable_dns_support,
                };
                let subnets = match &layout {
                    Some(layout) => {
                        expand_layout(&name, &config, layout, &topology.context().region)?
                    }
                    None => Vec::new(),
                };
                topology.add_resource(name, ResourceSpec::Network(config), &depends_on)?;
                for (subnet_name, subnet) in subnets {
                    check_name("subnet", &subnet_name)?;
                    log::debug!(
                        "Layout subnet {subnet_name}: {} in {}",
                        subnet.cidr,
                        subnet.availability_zone
                    );
                    topology.add_resource(subnet_name, ResourceSpec::Subnet(subnet), &[])?;
                }
                continue;
            }

            let spec = convert(&name, decl.body, source)?;
            topology.add_resource(name, spec, &depends_on)?;
        }

        for output in self.outputs {
            check_name("output", &output.name)?;
            topology.add_output(OutputSpec {
                name: output.name,
                resource: ResourceId::new(output.resource),
                attribute: output.attribute,
                description: output.description,
                export_name: output.export_name,
            })?;
        }

        Ok(topology)
    }
}

fn check_name(what: &'static str, name: &str) -> Result<(), SchemaError> {
    if NAME.is_match(name) {
        Ok(())
    } else {
        Err(SchemaError::InvalidName {
            what,
            name: name.to_string(),
        })
    }
}

fn parse_cidr(resource: &str, value: &str) -> Result<Cidr, SchemaError> {
    value.parse().map_err(|source| SchemaError::Cidr {
        resource: resource.to_string(),
        source,
    })
}

fn id(name: &str) -> ResourceId {
    ResourceId::new(name)
}

fn ids(names: &[String]) -> Vec<ResourceId> {
    names.iter().map(|n| id(n)).collect()
}

/// Carve the layout's subnets out of the network block, tier-major and
/// AZ-minor. Each block starts at the first free address aligned to its size.
fn expand_layout(
    network: &str,
    config: &NetworkConfig,
    layout: &SubnetLayout,
    region: &str,
) -> Result<Vec<(String, SubnetConfig)>, SchemaError> {
    let azs = layout.azs.unwrap_or(config.max_azs);
    if azs == 0 || azs > 26 {
        return Err(SchemaError::Invalid {
            resource: network.to_string(),
            message: format!("subnet layout needs 1-26 availability zones (got {azs})"),
        });
    }

    let start = |block: &Cidr| u64::from(u32::from(block.network()));
    let mut next_free = start(&config.cidr);
    let mut subnets = Vec::new();

    for tier in &layout.tiers {
        if tier.mask < config.cidr.prefix() || tier.mask > 28 {
            return Err(SchemaError::Invalid {
                resource: network.to_string(),
                message: format!(
                    "tier {} mask /{} must be between /{} and /28",
                    tier.name,
                    tier.mask,
                    config.cidr.prefix()
                ),
            });
        }
        for az in 0..azs {
            let block = config
                .cidr
                .subnets(tier.mask)
                .and_then(|mut blocks| blocks.find(|b| start(b) >= next_free))
                .ok_or_else(|| SchemaError::LayoutExhausted {
                    network: network.to_string(),
                    mask: tier.mask,
                    placed: subnets.len(),
                })?;
            next_free = start(&block) + (1u64 << (32 - u32::from(tier.mask)));

            let zone = char::from(b'a' + az);
            subnets.push((
                format!("{network}-{}-{}", tier.name, az + 1),
                SubnetConfig {
                    network: id(network),
                    cidr: block,
                    availability_zone: format!("{region}{zone}"),
                    tier: tier.tier,
                    map_public_ip_on_launch: tier.tier == SubnetTier::Public,
                },
            ));
        }
    }
    Ok(subnets)
}

fn user_data(
    resource: &str,
    inline: Option<String>,
    file: Option<String>,
    source: &Path,
) -> Result<Option<UserData>, SchemaError> {
    match (inline, file) {
        (Some(_), Some(_)) => Err(SchemaError::Invalid {
            resource: resource.to_string(),
            message: "set either user_data or user_data_file, not both".to_string(),
        }),
        (Some(text), None) => Ok(Some(UserData::new(text))),
        (None, Some(file)) => {
            let path = paths::resolve_relative(source, &file);
            let bytes = std::fs::read(&path).map_err(|e| SchemaError::UserDataFile {
                resource: resource.to_string(),
                path: path.clone(),
                source: e,
            })?;
            log::debug!("Read {} bytes of user data from {}", bytes.len(), path.display());
            Ok(Some(UserData::new(bytes)))
        }
        (None, None) => Ok(None),
    }
}

fn rule(resource: &str, decl: RuleDecl) -> Result<IngressRule, SchemaError> {
    let invalid = |message: &str| SchemaError::Invalid {
        resource: resource.to_string(),
        message: message.to_string(),
    };
    let (from_port, to_port) = match (decl.port, decl.from_port, decl.to_port) {
        (Some(port), None, None) => (port, port),
        (None, Some(from), Some(to)) => (from, to),
        (None, None, None) if matches!(decl.protocol, Protocol::All | Protocol::Icmp) => {
            (0, u16::MAX)
        }
        (Some(_), _, _) => return Err(invalid("ingress rule sets both port and a port range")),
        _ => return Err(invalid("ingress rule needs port, or from_port and to_port")),
    };
    let source = match (decl.cidr, decl.security_group) {
        (Some(_), Some(_)) => {
            return Err(invalid("ingress rule sets both cidr and security_group"));
        }
        (Some(cidr), None) => RuleSource::Cidr(parse_cidr(resource, &cidr)?),
        (None, Some(group)) => RuleSource::SecurityGroup(id(&group)),
        (None, None) => RuleSource::Cidr(Cidr::any_ipv4()),
    };
    Ok(IngressRule {
        protocol: decl.protocol,
        from_port,
        to_port,
        source,
        description: decl.description,
    })
}

fn convert(name: &str, body: ResourceBody, source: &Path) -> Result<ResourceSpec, SchemaError> {
    let spec = match body {
        ResourceBody::Network(_) => {
            return Err(SchemaError::Invalid {
                resource: name.to_string(),
                message: "networks are registered with their layout".to_string(),
            });
        }
        ResourceBody::Subnet(s) => ResourceSpec::Subnet(SubnetConfig {
            network: id(&s.network),
            cidr: parse_cidr(name, &s.cidr)?,
            availability_zone: s.availability_zone,
            map_public_ip_on_launch: s
                .map_public_ip_on_launch
                .unwrap_or(s.tier == SubnetTier::Public),
            tier: s.tier,
        }),
        ResourceBody::SecurityGroup(sg) => ResourceSpec::SecurityGroup(SecurityGroupConfig {
            network: id(&sg.network),
            description: sg.description,
            ingress: sg
                .ingress
                .into_iter()
                .map(|r| rule(name, r))
                .collect::<Result<_, _>>()?,
            allow_all_outbound: sg.allow_all_outbound,
        }),
        ResourceBody::Instance(i) => ResourceSpec::Instance(InstanceConfig {
            user_data: user_data(name, i.user_data, i.user_data_file, source)?,
            machine_image: i.machine_image,
            instance_type: i.instance_type,
            subnet: id(&i.subnet),
            security_group: id(&i.security_group),
            instance_profile: i.instance_profile.as_deref().map(id),
            associate_public_ip: i.associate_public_ip,
            require_imdsv2: i.require_imdsv2,
        }),
        ResourceBody::LaunchTemplate(lt) => ResourceSpec::LaunchTemplate(LaunchTemplateConfig {
            user_data: user_data(name, lt.user_data, lt.user_data_file, source)?,
            machine_image: lt.machine_image,
            instance_type: lt.instance_type,
            security_group: id(&lt.security_group),
            instance_profile: lt.instance_profile.as_deref().map(id),
            require_imdsv2: lt.require_imdsv2,
        }),
        ResourceBody::LoadBalancer(lb) => ResourceSpec::LoadBalancer(LoadBalancerConfig {
            internet_facing: lb.internet_facing,
            subnets: ids(&lb.subnets),
            security_group: id(&lb.security_group),
            listeners: lb
                .listeners
                .into_iter()
                .map(|l| Listener {
                    port: l.port,
                    protocol: l.protocol,
                    target_group: id(&l.target_group),
                })
                .collect(),
        }),
        ResourceBody::TargetGroup(tg) => ResourceSpec::TargetGroup(TargetGroupConfig {
            network: id(&tg.network),
            port: tg.port,
            protocol: tg.protocol,
            health_check_path: tg.health_check_path,
            targets: ids(&tg.targets),
        }),
        ResourceBody::AutoScalingGroup(asg) => {
            ResourceSpec::AutoScalingGroup(AutoScalingGroupConfig {
                launch_template: id(&asg.launch_template),
                subnets: ids(&asg.subnets),
                capacity: Capacity {
                    min: asg.min,
                    max: asg.max,
                    desired: asg.desired.unwrap_or(asg.min),
                },
                scaling_policy: asg.scaling_policy.map(|p| ScalingPolicy {
                    metric: p.metric,
                    target: p.target,
                }),
                target_group: asg.target_group.as_deref().map(id),
            })
        }
        ResourceBody::IamRole(role) => ResourceSpec::IamRole(IamRoleConfig {
            assumed_by: role.assumed_by,
            managed_policies: role.managed_policies,
        }),
        ResourceBody::InstanceProfile(profile) => {
            ResourceSpec::InstanceProfile(InstanceProfileConfig {
                role: id(&profile.role),
            })
        }
        ResourceBody::GatewayEndpoint(endpoint) => {
            ResourceSpec::GatewayEndpoint(GatewayEndpointConfig {
                network: id(&endpoint.network),
                service: endpoint.service,
                subnet_tier: endpoint.subnet_tier,
                policy_actions: endpoint.policy_actions,
            })
        }
    };
    Ok(spec)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::ResourceKind;
    use std::fs;
    use tempfile::TempDir;

    fn parse(doc: &str) -> StackDocument {
        toml::from_str(doc).unwrap()
    }

    fn topology(doc: &str) -> Result<Topology, SchemaError> {
        parse(doc).into_topology(Path::new("stack.toml"))
    }

    const LAYOUT: &str = r#"
[stack]
name = "demo"

[[resources]]
name = "vpc"
kind = "network"
cidr = "10.0.0.0/16"
subnet_layout = { tiers = [
  { name = "public", tier = "public", mask = 24 },
  { name = "private", tier = "private_with_egress", mask = 24 },
] }
"#;

    #[test]
    fn test_subnet_layout_expansion() {
        let t = topology(LAYOUT).unwrap();
        let names: Vec<&str> = t.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "vpc",
                "vpc-public-1",
                "vpc-public-2",
                "vpc-private-1",
                "vpc-private-2"
            ]
        );

        let ResourceSpec::Subnet(s) = &t.get("vpc-private-2").unwrap().spec else {
            panic!("expected subnet");
        };
        assert_eq!(s.cidr.to_string(), "10.0.3.0/24");
        assert_eq!(s.availability_zone, "us-east-1b");
        assert_eq!(s.tier, SubnetTier::PrivateWithEgress);
        assert!(!s.map_public_ip_on_launch);
        assert!(t.validate().is_ok());
    }

    #[test]
    fn test_layout_aligns_mixed_masks() {
        let doc = r#"
[stack]
name = "demo"

[[resources]]
name = "vpc"
kind = "network"
cidr = "10.0.0.0/22"
max_azs = 1
subnet_layout = { tiers = [
  { name = "small", tier = "public", mask = 26 },
  { name = "big", tier = "isolated", mask = 24 },
] }
"#;
        let t = topology(doc).unwrap();
        let cidr = |name: &str| match &t.get(name).unwrap().spec {
            ResourceSpec::Subnet(s) => s.cidr.to_string(),
            _ => panic!("expected subnet"),
        };
        assert_eq!(cidr("vpc-small-1"), "10.0.0.0/26");
        assert_eq!(cidr("vpc-big-1"), "10.0.1.0/24");
    }

    #[test]
    fn test_layout_exhaustion() {
        let doc = r#"
[stack]
name = "demo"

[[resources]]
name = "vpc"
kind = "network"
cidr = "10.0.0.0/24"
max_azs = 3
subnet_layout = { tiers = [{ name = "public", tier = "public", mask = 25 }] }
"#;
        assert!(matches!(
            topology(doc).unwrap_err(),
            SchemaError::LayoutExhausted { placed: 2, .. }
        ));
    }

    #[test]
    fn test_rules_and_defaults() {
        let doc = format!(
            r#"{LAYOUT}
[[resources]]
name = "web-sg"
kind = "security_group"
network = "vpc"
ingress = [
  {{ port = 80 }},
  {{ from_port = 8000, to_port = 8100, cidr = "10.0.0.0/16" }},
  {{ protocol = "all", security_group = "web-sg-peer" }},
]
"#
        );
        // The peer group does not exist, so registration fails on the reference.
        assert!(matches!(
            topology(&doc).unwrap_err(),
            SchemaError::Config(ConfigError::DanglingReference { .. })
        ));

        let doc = doc.replace("security_group = \"web-sg-peer\"", "cidr = \"0.0.0.0/0\"");
        let t = topology(&doc).unwrap();
        let ResourceSpec::SecurityGroup(sg) = &t.get("web-sg").unwrap().spec else {
            panic!("expected security group");
        };
        assert_eq!(sg.ingress[0], IngressRule::tcp_from_anywhere(80));
        assert_eq!((sg.ingress[1].from_port, sg.ingress[1].to_port), (8000, 8100));
        assert_eq!((sg.ingress[2].from_port, sg.ingress[2].to_port), (0, u16::MAX));
        assert!(sg.allow_all_outbound);
    }

    #[test]
    fn test_rule_needs_ports() {
        let decl = RuleDecl {
            protocol: Protocol::Tcp,
            port: None,
            from_port: Some(80),
            to_port: None,
            cidr: None,
            security_group: None,
            description: None,
        };
        assert!(matches!(rule("sg", decl), Err(SchemaError::Invalid { .. })));
    }

    #[test]
    fn test_user_data_file_relative_to_document() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("web.sh"), "#!/bin/bash\nyum install -y httpd\n").unwrap();
        let doc = format!(
            r#"{LAYOUT}
[[resources]]
name = "web-sg"
kind = "security_group"
network = "vpc"

[[resources]]
name = "web"
kind = "instance"
instance_type = "t2.micro"
subnet = "vpc-public-1"
security_group = "web-sg"
associate_public_ip = true
user_data_file = "web.sh"
"#
        );
        let t = parse(&doc)
            .into_topology(&dir.path().join("stack.toml"))
            .unwrap();
        let ResourceSpec::Instance(instance) = &t.get("web").unwrap().spec else {
            panic!("expected instance");
        };
        let data = instance.user_data.as_ref().unwrap();
        assert!(data.as_bytes().starts_with(b"#!/bin/bash"));
        assert!(instance.require_imdsv2);
        assert_eq!(instance.machine_image, "al2023");

        let missing = doc.replace("web.sh", "missing.sh");
        assert!(matches!(
            parse(&missing).into_topology(&dir.path().join("stack.toml")),
            Err(SchemaError::UserDataFile { .. })
        ));
    }

    #[test]
    fn test_invalid_names() {
        let doc = LAYOUT.replace("name = \"vpc\"", "name = \"1vpc\"");
        assert!(matches!(
            topology(&doc).unwrap_err(),
            SchemaError::InvalidName { what: "resource", .. }
        ));
        assert!(check_name("output", "ec2PublicIp").is_ok());
        assert!(check_name("output", "has space").is_err());
    }

    #[test]
    fn test_unknown_kind_and_field() {
        let doc = r#"
[stack]
name = "demo"

[[resources]]
name = "db"
kind = "database"
"#;
        assert!(toml::from_str::<StackDocument>(doc).is_err());

        let doc = LAYOUT.replace("max_azs", "maxAzs").replace("cidr =", "maxAzs = 2\ncidr =");
        assert!(toml::from_str::<StackDocument>(&doc).is_err());
    }

    #[test]
    fn test_outputs_and_kinds() {
        let doc = format!(
            r#"{LAYOUT}
[[outputs]]
name = "vpcId"
resource = "vpc"
attribute = "id"
"#
        );
        let t = topology(&doc).unwrap();
        assert_eq!(t.outputs().len(), 1);
        assert!(t.kinds().contains(&ResourceKind::Subnet));

        let dangling = doc.replace("resource = \"vpc\"", "resource = \"nope\"");
        assert!(topology(&dangling).is_err());
    }
}
