//! Provider-assigned identifiers and attributes
//!
//! Everything here is derived from a blake3 digest of
//! `stack|resource|generation`, so the same stack applied the same way always
//! yields the same ids and addresses.

use declarative::{
    AppliedState, Cidr, ProviderError, Resource, ResourceId, ResourceKind, ResourceSpec,
    StackContext,
};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

/// Digest seeding every derived value of one resource generation
pub(crate) struct Seed([u8; 32]);

impl Seed {
    pub(crate) fn new(ctx: &StackContext, id: &ResourceId, generation: u64) -> Self {
        let input = format!("{}|{}|{}|{generation}", ctx.name, ctx.region, id);
        Self(*blake3::hash(input.as_bytes()).as_bytes())
    }

    fn hex(&self, len: usize) -> String {
        let hex: String = self.0.iter().map(|b| format!("{b:02x}")).collect();
        hex[..len.min(hex.len())].to_string()
    }

    fn byte(&self, index: usize) -> u8 {
        self.0[index % self.0.len()]
    }

    fn number(&self, offset: usize) -> u32 {
        u32::from_le_bytes([
            self.byte(offset),
            self.byte(offset + 1),
            self.byte(offset + 2),
            self.byte(offset + 3),
        ])
    }
}

/// Name a provider would give a named resource: `<stack>-<id>-<SUFFIX>`
fn physical_name(ctx: &StackContext, id: &ResourceId, seed: &Seed) -> String {
    format!("{}-{}-{}", ctx.name, id, seed.hex(12).to_uppercase())
}

fn arn(ctx: &StackContext, service: &str, resource: &str) -> String {
    format!(
        "arn:aws:{service}:{}:{}:{resource}",
        ctx.region, ctx.account
    )
}

/// Provider identifier for a new resource
pub(crate) fn physical_id(ctx: &StackContext, resource: &Resource, seed: &Seed) -> String {
    let short = seed.hex(17);
    match resource.kind() {
        ResourceKind::Network => format!("vpc-{short}"),
        ResourceKind::Subnet => format!("subnet-{short}"),
        ResourceKind::SecurityGroup => format!("sg-{short}"),
        ResourceKind::Instance => format!("i-{short}"),
        ResourceKind::LaunchTemplate => format!("lt-{short}"),
        ResourceKind::GatewayEndpoint => format!("vpce-{short}"),
        ResourceKind::LoadBalancer => arn(
            ctx,
            "elasticloadbalancing",
            &format!("loadbalancer/app/{}/{}", lb_name(ctx, &resource.id), seed.hex(16)),
        ),
        ResourceKind::TargetGroup => arn(
            ctx,
            "elasticloadbalancing",
            &format!("targetgroup/{}/{}", lb_name(ctx, &resource.id), seed.hex(16)),
        ),
        ResourceKind::AutoScalingGroup
        | ResourceKind::IamRole
        | ResourceKind::InstanceProfile => physical_name(ctx, &resource.id, seed),
    }
}

/// Load balancer and target group names are capped at 32 characters
fn lb_name(ctx: &StackContext, id: &ResourceId) -> String {
    let name = format!("{}-{}", ctx.name, id);
    name.chars().take(32).collect()
}

/// Attributes reported for a resource, derived from its config and the
/// observed state of what it references.
pub(crate) fn synthesize(
    ctx: &StackContext,
    resource: &Resource,
    physical_id: &str,
    seed: &Seed,
    deps: &AppliedState,
) -> Result<BTreeMap<String, String>, ProviderError> {
    let mut attrs = BTreeMap::new();
    let mut set = |key: &str, value: String| {
        attrs.insert(key.to_string(), value);
    };

    match &resource.spec {
        ResourceSpec::Network(c) => {
            set("cidr", c.cidr.to_string());
            set("arn", arn(ctx, "ec2", &format!("vpc/{physical_id}")));
        }
        ResourceSpec::Subnet(c) => {
            set("cidr", c.cidr.to_string());
            set("availability_zone", c.availability_zone.clone());
            set("vpc_id", dependency(deps, &c.network)?.physical_id.clone());
            set("arn", arn(ctx, "ec2", &format!("subnet/{physical_id}")));
        }
        ResourceSpec::SecurityGroup(c) => {
            set("vpc_id", dependency(deps, &c.network)?.physical_id.clone());
            set("arn", arn(ctx, "ec2", &format!("security-group/{physical_id}")));
        }
        ResourceSpec::Instance(c) => {
            let subnet = dependency(deps, &c.subnet)?;
            let block = subnet_block(subnet.attribute("cidr"), &c.subnet)?;
            let private_ip = private_address(&block, seed).ok_or_else(|| ProviderError::Invalid {
                message: format!("subnet {} has no free addresses", c.subnet),
            })?;
            set("private_ip", private_ip.to_string());
            set("private_dns", private_dns(ctx, private_ip));
            if let Some(az) = subnet.attribute("availability_zone") {
                set("availability_zone", az.to_string());
            }
            if c.associate_public_ip {
                let public_ip = public_address(seed);
                set("public_ip", public_ip.to_string());
                set("public_dns", public_dns(ctx, public_ip));
            }
            set("arn", arn(ctx, "ec2", &format!("instance/{physical_id}")));
        }
        ResourceSpec::LaunchTemplate(_) => {
            set("latest_version", "1".to_string());
            set("arn", arn(ctx, "ec2", &format!("launch-template/{physical_id}")));
        }
        ResourceSpec::LoadBalancer(c) => {
            let scheme = if c.internet_facing { "" } else { "internal-" };
            set(
                "dns_name",
                format!(
                    "{scheme}{}-{}.{}.elb.amazonaws.com",
                    lb_name(ctx, &resource.id),
                    seed.number(0) % 1_000_000_000,
                    ctx.region
                ),
            );
            set("arn", physical_id.to_string());
        }
        ResourceSpec::TargetGroup(_) => {
            set("arn", physical_id.to_string());
        }
        ResourceSpec::AutoScalingGroup(c) => {
            set("desired_capacity", c.capacity.desired.to_string());
            set(
                "arn",
                arn(
                    ctx,
                    "autoscaling",
                    &format!(
                        "autoScalingGroup:{}:autoScalingGroupName/{physical_id}",
                        uuid_like(seed)
                    ),
                ),
            );
        }
        ResourceSpec::IamRole(_) => {
            set(
                "arn",
                format!("arn:aws:iam::{}:role/{physical_id}", ctx.account),
            );
        }
        ResourceSpec::InstanceProfile(_) => {
            set(
                "arn",
                format!("arn:aws:iam::{}:instance-profile/{physical_id}", ctx.account),
            );
        }
        ResourceSpec::GatewayEndpoint(c) => {
            set(
                "service_name",
                format!("com.amazonaws.{}.{}", ctx.region, c.service),
            );
            set("arn", arn(ctx, "ec2", &format!("vpc-endpoint/{physical_id}")));
        }
    }
    Ok(attrs)
}

fn dependency<'a>(
    deps: &'a AppliedState,
    id: &ResourceId,
) -> Result<&'a declarative::ObservedResource, ProviderError> {
    deps.get(id.as_str()).ok_or_else(|| ProviderError::NotFound {
        id: id.to_string(),
    })
}

fn subnet_block(cidr: Option<&str>, subnet: &ResourceId) -> Result<Cidr, ProviderError> {
    cidr.and_then(|c| c.parse().ok())
        .ok_or_else(|| ProviderError::Invalid {
            message: format!("subnet {subnet} reports no usable cidr"),
        })
}

/// A host address inside `block`, clear of the three addresses reserved
/// after the network address
fn private_address(block: &Cidr, seed: &Seed) -> Option<Ipv4Addr> {
    let usable = block.hosts().count().checked_sub(3).filter(|n| *n > 0)?;
    let offset = 3 + seed.number(4) as usize % usable;
    block.hosts().nth(offset)
}

/// Addresses in 3.0.0.0/8, clear of network and broadcast octets
fn public_address(seed: &Seed) -> Ipv4Addr {
    Ipv4Addr::new(3, seed.byte(8), seed.byte(9), 1 + seed.byte(10) % 254)
}

fn dashed(ip: Ipv4Addr) -> String {
    ip.octets()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("-")
}

fn public_dns(ctx: &StackContext, ip: Ipv4Addr) -> String {
    if ctx.region == "us-east-1" {
        format!("ec2-{}.compute-1.amazonaws.com", dashed(ip))
    } else {
        format!("ec2-{}.{}.compute.amazonaws.com", dashed(ip), ctx.region)
    }
}

fn private_dns(ctx: &StackContext, ip: Ipv4Addr) -> String {
    if ctx.region == "us-east-1" {
        format!("ip-{}.ec2.internal", dashed(ip))
    } else {
        format!("ip-{}.{}.compute.internal", dashed(ip), ctx.region)
    }
}

fn uuid_like(seed: &Seed) -> String {
    let hex = seed.hex(32);
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}
