//! Topology model - declared resources and their dependency edges
//!
//! A [`Topology`] is the stack aggregate: it owns every declared resource and
//! output. Resources are kept in declaration order, which the planner uses to
//! break ties between independent resources.

use crate::cidr::Cidr;
use crate::context::StackContext;
use crate::error::ConfigError;
use crate::outputs::OutputSpec;
use crate::resource::Resource;
use crate::types::{ResourceId, ResourceKind, ResourceSpec, SubnetTier};
use std::collections::{BTreeSet, HashMap};

/// Resources of a stack and the edges between them
#[derive(Debug, Clone, Default)]
pub struct Topology {
    context: StackContext,
    resources: Vec<Resource>,
    index: HashMap<ResourceId, usize>,
    /// `dependencies[i]` holds the declaration indices resource `i` depends on
    dependencies: Vec<BTreeSet<usize>>,
    outputs: Vec<OutputSpec>,
}

impl Topology {
    pub fn new(context: StackContext) -> Self {
        Self {
            context,
            ..Self::default()
        }
    }

    pub fn context(&self) -> &StackContext {
        &self.context
    }

    /// Register a resource.
    ///
    /// Every explicit dependency and every reference in `spec` must name a
    /// resource that is already registered.
    pub fn add_resource(
        &mut self,
        id: impl Into<ResourceId>,
        spec: ResourceSpec,
        depends_on: &[ResourceId],
    ) -> Result<ResourceId, ConfigError> {
        let id = id.into();
        if self.index.contains_key(&id) {
            return Err(ConfigError::DuplicateId(id));
        }

        let mut edges = BTreeSet::new();
        for reference in spec.references() {
            let target = self.lookup(&id, reference.target)?;
            let found = self.resources[target].kind();
            if found != reference.expects {
                return Err(ConfigError::WrongKind {
                    resource: id,
                    field: reference.field,
                    target: reference.target.clone(),
                    expected: reference.expects,
                    found,
                });
            }
            edges.insert(target);
        }
        for dep in depends_on {
            edges.insert(self.lookup(&id, dep)?);
        }

        log::debug!(
            "Registered {} {} ({} dependencies)",
            spec.kind(),
            id,
            edges.len()
        );
        self.index.insert(id.clone(), self.resources.len());
        self.resources.push(Resource::new(id.clone(), spec));
        self.dependencies.push(edges);
        Ok(id)
    }

    /// Add an edge `from -> to` between two registered resources.
    pub fn add_dependency(&mut self, from: &ResourceId, to: &ResourceId) -> Result<(), ConfigError> {
        let from_idx = self
            .position(from.as_str())
            .ok_or_else(|| ConfigError::UnknownResource(from.clone()))?;
        let to_idx = self.lookup(from, to)?;
        self.dependencies[from_idx].insert(to_idx);
        Ok(())
    }

    /// Register a named output. Its resource must exist.
    pub fn add_output(&mut self, output: OutputSpec) -> Result<(), ConfigError> {
        if self.outputs.iter().any(|o| o.name == output.name) {
            return Err(ConfigError::DuplicateOutput(output.name));
        }
        if let Some(export) = &output.export_name
            && self
                .outputs
                .iter()
                .any(|o| o.export_name.as_ref() == Some(export))
        {
            return Err(ConfigError::DuplicateExport(export.clone()));
        }
        if !self.index.contains_key(&output.resource) {
            return Err(ConfigError::DanglingReference {
                resource: ResourceId::new(format!("output.{}", output.name)),
                reference: output.resource,
            });
        }
        self.outputs.push(output);
        Ok(())
    }

    fn lookup(&self, owner: &ResourceId, target: &ResourceId) -> Result<usize, ConfigError> {
        self.position(target.as_str())
            .ok_or_else(|| ConfigError::DanglingReference {
                resource: owner.clone(),
                reference: target.clone(),
            })
    }

    /// Declaration index of a resource
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn get(&self, id: &str) -> Option<&Resource> {
        self.position(id).map(|i| &self.resources[i])
    }

    /// Resources in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter()
    }

    pub fn outputs(&self) -> &[OutputSpec] {
        &self.outputs
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Direct dependencies of `id`, in declaration order
    pub fn dependencies(&self, id: &str) -> Vec<&ResourceId> {
        self.position(id)
            .map(|i| {
                self.dependencies[i]
                    .iter()
                    .map(|&d| &self.resources[d].id)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Resources that depend directly on `id`, in declaration order
    pub fn dependents(&self, id: &str) -> Vec<&ResourceId> {
        let Some(target) = self.position(id) else {
            return Vec::new();
        };
        self.dependencies
            .iter()
            .enumerate()
            .filter(|(_, deps)| deps.contains(&target))
            .map(|(i, _)| &self.resources[i].id)
            .collect()
    }

    pub(crate) fn dependency_indices(&self, index: usize) -> &BTreeSet<usize> {
        &self.dependencies[index]
    }

    pub(crate) fn resource_at(&self, index: usize) -> &Resource {
        &self.resources[index]
    }

    /// Check the data-model invariants, returning the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.violations().into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Every data-model invariant violation, in declaration order.
    pub fn violations(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let mut subnets_by_network: HashMap<&ResourceId, Vec<(&ResourceId, Cidr)>> =
            HashMap::new();

        for resource in &self.resources {
            let id = &resource.id;
            match &resource.spec {
                ResourceSpec::Subnet(subnet) => {
                    if let Some(ResourceSpec::Network(network)) =
                        self.get(subnet.network.as_str()).map(|r| &r.spec)
                        && !network.cidr.contains(&subnet.cidr)
                    {
                        errors.push(ConfigError::invariant(
                            id,
                            format!(
                                "subnet {} is outside network {} ({})",
                                subnet.cidr, subnet.network, network.cidr
                            ),
                        ));
                    }
                    if subnet.availability_zone.trim().is_empty() {
                        errors.push(ConfigError::invariant(id, "availability zone is empty"));
                    }
                    let siblings = subnets_by_network.entry(&subnet.network).or_default();
                    for (other, cidr) in siblings.iter() {
                        if cidr.overlaps(&subnet.cidr) {
                            errors.push(ConfigError::invariant(
                                id,
                                format!("subnet {} overlaps {other} ({cidr})", subnet.cidr),
                            ));
                        }
                    }
                    siblings.push((id, subnet.cidr));
                }
                ResourceSpec::SecurityGroup(sg) => {
                    for rule in &sg.ingress {
                        if rule.from_port > rule.to_port {
                            errors.push(ConfigError::invariant(
                                id,
                                format!(
                                    "ingress port range {}-{} is reversed",
                                    rule.from_port, rule.to_port
                                ),
                            ));
                        }
                    }
                }
                ResourceSpec::Instance(instance) => {
                    if let (Some(subnet_net), Some(sg_net)) = (
                        self.subnet_network(&instance.subnet),
                        self.security_group_network(&instance.security_group),
                    ) && subnet_net != sg_net
                    {
                        errors.push(ConfigError::invariant(
                            id,
                            format!(
                                "subnet {} is in network {subnet_net} but security group {} is in {sg_net}",
                                instance.subnet, instance.security_group
                            ),
                        ));
                    }
                    if instance.associate_public_ip
                        && self.subnet_tier(&instance.subnet) != Some(SubnetTier::Public)
                    {
                        errors.push(ConfigError::invariant(
                            id,
                            format!(
                                "a public IP needs a public subnet, but {} is not public",
                                instance.subnet
                            ),
                        ));
                    }
                }
                ResourceSpec::LoadBalancer(lb) => {
                    if lb.subnets.is_empty() {
                        errors.push(ConfigError::invariant(id, "load balancer has no subnets"));
                    }
                    if let Some(sg_net) = self.security_group_network(&lb.security_group) {
                        for subnet in &lb.subnets {
                            if let Some(subnet_net) = self.subnet_network(subnet)
                                && subnet_net != sg_net
                            {
                                errors.push(ConfigError::invariant(
                                    id,
                                    format!(
                                        "subnet {subnet} is in network {subnet_net} but security group {} is in {sg_net}",
                                        lb.security_group
                                    ),
                                ));
                            }
                        }
                    }
                    let mut ports = BTreeSet::new();
                    for listener in &lb.listeners {
                        if listener.port == 0 {
                            errors.push(ConfigError::invariant(id, "listener port 0"));
                        } else if !ports.insert(listener.port) {
                            errors.push(ConfigError::invariant(
                                id,
                                format!("duplicate listener on port {}", listener.port),
                            ));
                        }
                    }
                }
                ResourceSpec::TargetGroup(tg) => {
                    for target in &tg.targets {
                        let network = self.instance_network(target);
                        if network.is_some() && network != Some(&tg.network) {
                            errors.push(ConfigError::invariant(
                                id,
                                format!("target {target} is not in network {}", tg.network),
                            ));
                        }
                    }
                }
                ResourceSpec::AutoScalingGroup(asg) => {
                    let c = asg.capacity;
                    if !(c.min <= c.desired && c.desired <= c.max) {
                        errors.push(ConfigError::invariant(
                            id,
                            format!(
                                "capacity must satisfy min <= desired <= max (got {}/{}/{})",
                                c.min, c.desired, c.max
                            ),
                        ));
                    }
                    if asg.subnets.is_empty() {
                        errors.push(ConfigError::invariant(id, "auto-scaling group has no subnets"));
                    }
                    if let Some(policy) = &asg.scaling_policy
                        && !(policy.target.is_finite() && policy.target > 0.0)
                    {
                        errors.push(ConfigError::invariant(
                            id,
                            format!("scaling target must be positive (got {})", policy.target),
                        ));
                    }
                }
                ResourceSpec::GatewayEndpoint(endpoint) => {
                    let routed = self.resources.iter().any(|r| {
                        matches!(&r.spec, ResourceSpec::Subnet(s)
                            if s.network == endpoint.network && s.tier == endpoint.subnet_tier)
                    });
                    if !routed {
                        errors.push(ConfigError::invariant(
                            id,
                            format!(
                                "network {} has no {} subnets to route",
                                endpoint.network,
                                endpoint.subnet_tier.as_str()
                            ),
                        ));
                    }
                }
                ResourceSpec::Network(_)
                | ResourceSpec::LaunchTemplate(_)
                | ResourceSpec::IamRole(_)
                | ResourceSpec::InstanceProfile(_) => {}
            }
        }
        errors
    }

    fn subnet_tier(&self, id: &ResourceId) -> Option<SubnetTier> {
        match self.get(id.as_str()).map(|r| &r.spec) {
            Some(ResourceSpec::Subnet(s)) => Some(s.tier),
            _ => None,
        }
    }

    fn subnet_network(&self, id: &ResourceId) -> Option<&ResourceId> {
        match &self.get(id.as_str())?.spec {
            ResourceSpec::Subnet(s) => Some(&s.network),
            _ => None,
        }
    }

    fn security_group_network(&self, id: &ResourceId) -> Option<&ResourceId> {
        match &self.get(id.as_str())?.spec {
            ResourceSpec::SecurityGroup(sg) => Some(&sg.network),
            _ => None,
        }
    }

    fn instance_network(&self, id: &ResourceId) -> Option<&ResourceId> {
        match &self.get(id.as_str())?.spec {
            ResourceSpec::Instance(instance) => self.subnet_network(&instance.subnet),
            _ => None,
        }
    }

    /// Kinds present in this topology, deduplicated
    pub fn kinds(&self) -> BTreeSet<ResourceKind> {
        self.resources.iter().map(Resource::kind).collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::*;

    pub(crate) fn network(cidr: &str) -> ResourceSpec {
        ResourceSpec::Network(NetworkConfig {
            cidr: cidr.parse().unwrap(),
            max_azs: 2,
            nat_gateways: 1,
            enable_dns_hostnames: true,
            enable_dns_support: true,
        })
    }

    pub(crate) fn subnet(network: &str, cidr: &str, tier: SubnetTier) -> ResourceSpec {
        ResourceSpec::Subnet(SubnetConfig {
            network: network.into(),
            cidr: cidr.parse().unwrap(),
            availability_zone: "us-east-1a".into(),
            tier,
            map_public_ip_on_launch: tier == SubnetTier::Public,
        })
    }

    pub(crate) fn security_group(network: &str) -> ResourceSpec {
        ResourceSpec::SecurityGroup(SecurityGroupConfig {
            network: network.into(),
            description: "Web Server Security Group".into(),
            ingress: vec![
                IngressRule::tcp_from_anywhere(80),
                IngressRule::tcp_from_anywhere(22),
            ],
            allow_all_outbound: true,
        })
    }

    pub(crate) fn instance(subnet: &str, sg: &str) -> ResourceSpec {
        ResourceSpec::Instance(InstanceConfig {
            machine_image: "amazon-linux-2023-x86_64".into(),
            instance_type: "t2.micro".into(),
            subnet: subnet.into(),
            security_group: sg.into(),
            instance_profile: None,
            associate_public_ip: true,
            require_imdsv2: true,
            user_data: Some(UserData::new(b"dnf install -y httpd".to_vec())),
        })
    }

    pub(crate) fn iam_role() -> ResourceSpec {
        ResourceSpec::IamRole(IamRoleConfig {
            assumed_by: "ec2.amazonaws.com".into(),
            managed_policies: vec!["AmazonSSMManagedInstanceCore".into()],
        })
    }

    /// network -> subnet -> sg -> instance, plus an unrelated role
    pub(crate) fn web_stack() -> Topology {
        let mut t = Topology::new(StackContext::default());
        t.add_resource("vpc", network("10.0.0.0/16"), &[]).unwrap();
        t.add_resource("role", iam_role(), &[]).unwrap();
        t.add_resource("public-1", subnet("vpc", "10.0.0.0/24", SubnetTier::Public), &[])
            .unwrap();
        t.add_resource("web-sg", security_group("vpc"), &[]).unwrap();
        t.add_resource("web", instance("public-1", "web-sg"), &[])
            .unwrap();
        t
    }

    #[test]
    fn test_add_resource_records_implicit_dependencies() {
        let t = web_stack();
        assert_eq!(t.len(), 5);
        let deps: Vec<_> = t.dependencies("web").iter().map(|d| d.as_str()).collect();
        assert_eq!(deps, vec!["public-1", "web-sg"]);
        let dependents: Vec<_> = t.dependents("vpc").iter().map(|d| d.as_str()).collect();
        assert_eq!(dependents, vec!["public-1", "web-sg"]);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut t = web_stack();
        let err = t.add_resource("vpc", network("10.1.0.0/16"), &[]).unwrap_err();
        assert_eq!(err, ConfigError::DuplicateId("vpc".into()));
    }

    #[test]
    fn test_dangling_reference_rejected() {
        let mut t = Topology::default();
        let err = t
            .add_resource("sg", security_group("missing"), &[])
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::DanglingReference {
                resource: "sg".into(),
                reference: "missing".into()
            }
        );

        let err = t
            .add_resource("vpc", network("10.0.0.0/16"), &["later".into()])
            .unwrap_err();
        assert!(matches!(err, ConfigError::DanglingReference { .. }));
        assert!(t.is_empty());
    }

    #[test]
    fn test_wrong_kind_rejected() {
        let mut t = web_stack();
        let err = t
            .add_resource("web2", instance("vpc", "web-sg"), &[])
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::WrongKind {
                field: "subnet",
                found: ResourceKind::Network,
                ..
            }
        ));
    }

    #[test]
    fn test_subnet_containment_and_disjointness() {
        let mut t = Topology::default();
        t.add_resource("vpc", network("10.0.0.0/16"), &[]).unwrap();
        t.add_resource("a", subnet("vpc", "10.0.0.0/24", SubnetTier::Public), &[])
            .unwrap();
        t.add_resource("b", subnet("vpc", "10.0.0.128/25", SubnetTier::Public), &[])
            .unwrap();
        t.add_resource("c", subnet("vpc", "10.1.0.0/24", SubnetTier::Public), &[])
            .unwrap();

        let violations = t.violations();
        assert_eq!(violations.len(), 2);
        assert!(violations[0].to_string().contains("overlaps a"));
        assert!(violations[1].to_string().contains("outside network vpc"));
    }

    #[test]
    fn test_public_ip_needs_public_subnet() {
        let mut t = Topology::default();
        t.add_resource("vpc", network("10.0.0.0/16"), &[]).unwrap();
        t.add_resource(
            "private-1",
            subnet("vpc", "10.0.1.0/24", SubnetTier::PrivateWithEgress),
            &[],
        )
        .unwrap();
        t.add_resource("sg", security_group("vpc"), &[]).unwrap();
        t.add_resource("web", instance("private-1", "sg"), &[])
            .unwrap();
        let err = t.validate().unwrap_err();
        assert!(err.to_string().contains("needs a public subnet"));
    }

    #[test]
    fn test_capacity_bounds() {
        let mut t = Topology::default();
        t.add_resource("vpc", network("10.0.0.0/16"), &[]).unwrap();
        t.add_resource("p", subnet("vpc", "10.0.0.0/24", SubnetTier::Public), &[])
            .unwrap();
        t.add_resource("sg", security_group("vpc"), &[]).unwrap();
        t.add_resource(
            "lt",
            ResourceSpec::LaunchTemplate(LaunchTemplateConfig {
                machine_image: "al2023".into(),
                instance_type: "t3.micro".into(),
                security_group: "sg".into(),
                instance_profile: None,
                require_imdsv2: true,
                user_data: None,
            }),
            &[],
        )
        .unwrap();
        t.add_resource(
            "asg",
            ResourceSpec::AutoScalingGroup(AutoScalingGroupConfig {
                launch_template: "lt".into(),
                subnets: vec!["p".into()],
                capacity: Capacity {
                    min: 2,
                    max: 4,
                    desired: 1,
                },
                scaling_policy: None,
                target_group: None,
            }),
            &[],
        )
        .unwrap();
        let err = t.validate().unwrap_err();
        assert!(err.to_string().contains("min <= desired <= max"));
    }

    #[test]
    fn test_add_dependency_requires_known_ids() {
        let mut t = web_stack();
        assert!(t.add_dependency(&"role".into(), &"vpc".into()).is_ok());
        assert_eq!(t.dependencies("role").len(), 1);
        assert!(matches!(
            t.add_dependency(&"nope".into(), &"vpc".into()),
            Err(ConfigError::UnknownResource(_))
        ));
        assert!(matches!(
            t.add_dependency(&"role".into(), &"nope".into()),
            Err(ConfigError::DanglingReference { .. })
        ));
    }

    #[test]
    fn test_output_must_reference_resource() {
        let mut t = web_stack();
        t.add_output(OutputSpec::new("ip", "web", "public_ip")).unwrap();
        assert!(matches!(
            t.add_output(OutputSpec::new("ip", "web", "public_dns")),
            Err(ConfigError::DuplicateOutput(_))
        ));
        assert!(matches!(
            t.add_output(OutputSpec::new("dns", "ghost", "public_dns")),
            Err(ConfigError::DanglingReference { .. })
        ));
    }

    #[test]
    fn test_output_export_names_are_unique() {
        let mut t = web_stack();
        let exported = |name: &str, attribute: &str| OutputSpec {
            export_name: Some("webAddress".into()),
            ..OutputSpec::new(name, "web", attribute)
        };
        t.add_output(exported("ip", "public_ip")).unwrap();
        assert_eq!(
            t.add_output(exported("dns", "public_dns")),
            Err(ConfigError::DuplicateExport("webAddress".into()))
        );
        t.add_output(OutputSpec::new("dns", "web", "public_dns")).unwrap();
        assert_eq!(t.outputs().len(), 2);
    }

    /// Two networks, each with one public subnet and one security group
    fn two_networks() -> Topology {
        let mut t = Topology::default();
        t.add_resource("vpc-a", network("10.0.0.0/16"), &[]).unwrap();
        t.add_resource("vpc-b", network("10.1.0.0/16"), &[]).unwrap();
        t.add_resource("a-1", subnet("vpc-a", "10.0.0.0/24", SubnetTier::Public), &[])
            .unwrap();
        t.add_resource("b-1", subnet("vpc-b", "10.1.0.0/24", SubnetTier::Public), &[])
            .unwrap();
        t.add_resource("sg-a", security_group("vpc-a"), &[]).unwrap();
        t.add_resource("sg-b", security_group("vpc-b"), &[]).unwrap();
        t
    }

    #[test]
    fn test_instance_subnet_and_security_group_share_network() {
        let mut t = two_networks();
        t.add_resource("good", instance("a-1", "sg-a"), &[]).unwrap();
        assert!(t.validate().is_ok());

        t.add_resource("bad", instance("a-1", "sg-b"), &[]).unwrap();
        let violations = t.violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(
            violations[0].to_string(),
            "bad: subnet a-1 is in network vpc-a but security group sg-b is in vpc-b"
        );
    }

    #[test]
    fn test_load_balancer_subnets_and_security_group_share_network() {
        let mut t = two_networks();
        t.add_resource(
            "lb",
            ResourceSpec::LoadBalancer(LoadBalancerConfig {
                internet_facing: true,
                subnets: vec!["a-1".into(), "b-1".into()],
                security_group: "sg-a".into(),
                listeners: vec![],
            }),
            &[],
        )
        .unwrap();
        let violations = t.violations();
        assert_eq!(violations.len(), 1);
        assert!(
            violations[0]
                .to_string()
                .contains("subnet b-1 is in network vpc-b but security group sg-a is in vpc-a")
        );
    }
}
