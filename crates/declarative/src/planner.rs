//! Plan builder - orders operations by dependency

use crate::context::StackContext;
use crate::error::CycleError;
use crate::resource::Resource;
use crate::topology::Topology;
use crate::types::{ResourceId, ResourceKind};
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet};
use std::fmt;

/// What an operation intends to do with its resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Converge to the desired configuration (create or update)
    Ensure,
    /// Remove the resource
    Delete,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ensure => f.write_str("ensure"),
            Self::Delete => f.write_str("delete"),
        }
    }
}

/// One step of a plan
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub resource: Resource,
    pub action: Action,
    /// Operations that must succeed before this one runs
    pub requires: Vec<ResourceId>,
}

impl Operation {
    pub fn id(&self) -> &ResourceId {
        &self.resource.id
    }

    pub fn kind(&self) -> ResourceKind {
        self.resource.kind()
    }
}

/// An ordered list of operations
///
/// Every operation appears after everything it requires.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub context: StackContext,
    pub operations: Vec<Operation>,
}

impl Plan {
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.operations.iter()
    }

    pub fn ids(&self) -> Vec<&ResourceId> {
        self.operations.iter().map(Operation::id).collect()
    }

    /// Keep operations matching a target pattern and everything they require.
    ///
    /// Target format: "kind" or "kind.name"; a bare name also matches.
    pub fn filter_by_target(self, target: Option<&str>) -> Self {
        let Some(target) = target else {
            return self;
        };
        let (kind, name) = parse_target(target);

        let by_id: HashMap<&ResourceId, &Operation> =
            self.operations.iter().map(|op| (op.id(), op)).collect();
        let mut keep: HashSet<ResourceId> = HashSet::new();
        let mut stack: Vec<&Operation> = self
            .operations
            .iter()
            .filter(|op| matches_filter(op, kind.as_deref(), name.as_deref()))
            .collect();
        while let Some(op) = stack.pop() {
            if keep.insert(op.id().clone()) {
                stack.extend(op.requires.iter().filter_map(|r| by_id.get(r).copied()));
            }
        }

        let operations = self
            .operations
            .into_iter()
            .filter(|op| keep.contains(op.id()))
            .collect();
        Self {
            context: self.context,
            operations,
        }
    }
}

/// Order the topology for creation.
///
/// Kahn's algorithm; among ready resources the earliest declared goes first,
/// so the order is deterministic.
pub fn build_plan(topology: &Topology) -> Result<Plan, CycleError> {
    let order = creation_order(topology)?;
    let operations = order
        .into_iter()
        .map(|i| {
            let resource = topology.resource_at(i);
            Operation {
                resource: resource.clone(),
                action: Action::Ensure,
                requires: topology
                    .dependency_indices(i)
                    .iter()
                    .map(|&d| topology.resource_at(d).id.clone())
                    .collect(),
            }
        })
        .collect();
    log::debug!("Built plan for {} resources", topology.len());
    Ok(Plan {
        context: topology.context().clone(),
        operations,
    })
}

/// Order the topology for deletion: reverse of creation, with every delete
/// waiting for the deletion of the resources that depend on it.
pub fn build_destroy_plan(topology: &Topology) -> Result<Plan, CycleError> {
    let order = creation_order(topology)?;
    let operations = order
        .into_iter()
        .rev()
        .map(|i| {
            let resource = topology.resource_at(i);
            Operation {
                resource: resource.clone(),
                action: Action::Delete,
                requires: topology
                    .dependents(resource.id.as_str())
                    .into_iter()
                    .cloned()
                    .collect(),
            }
        })
        .collect();
    Ok(Plan {
        context: topology.context().clone(),
        operations,
    })
}

fn creation_order(topology: &Topology) -> Result<Vec<usize>, CycleError> {
    let n = topology.len();
    let mut remaining: Vec<usize> = (0..n).map(|i| topology.dependency_indices(i).len()).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, deps) in (0..n).map(|i| (i, topology.dependency_indices(i))) {
        for &d in deps {
            dependents[d].push(i);
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = remaining
        .iter()
        .enumerate()
        .filter(|(_, count)| **count == 0)
        .map(|(i, _)| Reverse(i))
        .collect();

    let mut order = Vec::with_capacity(n);
    while let Some(Reverse(i)) = ready.pop() {
        order.push(i);
        for &dependent in &dependents[i] {
            remaining[dependent] -= 1;
            if remaining[dependent] == 0 {
                ready.push(Reverse(dependent));
            }
        }
    }

    if order.len() < n {
        let stuck: BTreeSet<usize> = (0..n).filter(|&i| remaining[i] > 0).collect();
        return Err(CycleError {
            path: find_cycle(topology, &stuck),
        });
    }
    Ok(order)
}

/// Walk dependency edges inside `stuck` until a node repeats.
///
/// Every stuck node has at least one stuck dependency, so the walk always
/// closes a loop.
fn find_cycle(topology: &Topology, stuck: &BTreeSet<usize>) -> Vec<ResourceId> {
    let Some(&start) = stuck.iter().next() else {
        return Vec::new();
    };
    let mut seen: HashMap<usize, usize> = HashMap::new();
    let mut walk = Vec::new();
    let mut current = start;
    loop {
        if let Some(&at) = seen.get(&current) {
            let mut path: Vec<ResourceId> = walk[at..]
                .iter()
                .map(|&i| topology.resource_at(i).id.clone())
                .collect();
            path.push(topology.resource_at(current).id.clone());
            return path;
        }
        seen.insert(current, walk.len());
        walk.push(current);
        match topology
            .dependency_indices(current)
            .iter()
            .find(|d| stuck.contains(d))
        {
            Some(&next) => current = next,
            None => {
                return walk
                    .iter()
                    .map(|&i| topology.resource_at(i).id.clone())
                    .collect();
            }
        }
    }
}

/// Parse a target string like "kind.name" into (kind, name)
fn parse_target(target: &str) -> (Option<String>, Option<String>) {
    match target.split_once('.') {
        None => (Some(target.to_string()), None),
        Some((kind, name)) if !name.contains('.') => {
            (Some(kind.to_string()), Some(name.to_string()))
        }
        Some(_) => (None, Some(target.to_string())),
    }
}

/// Check if an operation matches the filter criteria
fn matches_filter(op: &Operation, kind: Option<&str>, name: Option<&str>) -> bool {
    match (kind, name) {
        // A lone word is a kind ("subnet"), an alias, or a resource name
        (Some(k), None) => kind_matches(op.kind(), k) || op.id().as_str() == k,
        (Some(k), Some(n)) => kind_matches(op.kind(), k) && op.id().as_str() == n,
        (None, Some(n)) => op.id().as_str() == n,
        (None, None) => true,
    }
}

fn kind_matches(kind: ResourceKind, filter: &str) -> bool {
    match filter {
        "networking" => matches!(
            kind,
            ResourceKind::Network
                | ResourceKind::Subnet
                | ResourceKind::SecurityGroup
                | ResourceKind::GatewayEndpoint
        ),
        "compute" => matches!(
            kind,
            ResourceKind::Instance | ResourceKind::LaunchTemplate | ResourceKind::AutoScalingGroup
        ),
        "iam" => matches!(kind, ResourceKind::IamRole | ResourceKind::InstanceProfile),
        _ => kind.as_str() == filter,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::tests::{network, web_stack};

    fn names(plan: &Plan) -> Vec<&str> {
        plan.operations.iter().map(|op| op.id().as_str()).collect()
    }

    fn strs(ids: &[ResourceId]) -> Vec<&str> {
        ids.iter().map(ResourceId::as_str).collect()
    }

    #[test]
    fn test_plan_respects_dependencies_and_declaration_order() {
        let plan = build_plan(&web_stack()).unwrap();
        assert_eq!(names(&plan), vec!["vpc", "role", "public-1", "web-sg", "web"]);
        assert!(plan.operations.iter().all(|op| op.action == Action::Ensure));
        let web = &plan.operations[4];
        assert_eq!(strs(&web.requires), vec!["public-1", "web-sg"]);
    }

    #[test]
    fn test_cycle_detected() {
        let mut t = Topology::default();
        t.add_resource("a", network("10.0.0.0/16"), &[]).unwrap();
        t.add_resource("b", network("10.1.0.0/16"), &["a".into()])
            .unwrap();
        t.add_dependency(&"a".into(), &"b".into()).unwrap();

        let err = build_plan(&t).unwrap_err();
        assert_eq!(strs(&err.path), vec!["a", "b", "a"]);
        assert!(build_destroy_plan(&t).is_err());
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let mut t = Topology::default();
        t.add_resource("a", network("10.0.0.0/16"), &[]).unwrap();
        t.add_dependency(&"a".into(), &"a".into()).unwrap();
        assert_eq!(strs(&build_plan(&t).unwrap_err().path), vec!["a", "a"]);
    }

    #[test]
    fn test_cycle_reported_without_bystanders() {
        let mut t = Topology::default();
        t.add_resource("root", network("10.0.0.0/16"), &[]).unwrap();
        t.add_resource("x", network("10.1.0.0/16"), &["root".into()])
            .unwrap();
        t.add_resource("y", network("10.2.0.0/16"), &["x".into()])
            .unwrap();
        t.add_resource("z", network("10.3.0.0/16"), &["y".into()])
            .unwrap();
        t.add_dependency(&"x".into(), &"z".into()).unwrap();

        let path = build_plan(&t).unwrap_err().path;
        assert_eq!(path.first(), path.last());
        assert!(!strs(&path).contains(&"root"));
        assert_eq!(path.len(), 4);
    }

    #[test]
    fn test_destroy_plan_reverses_order() {
        let plan = build_destroy_plan(&web_stack()).unwrap();
        assert_eq!(names(&plan), vec!["web", "web-sg", "public-1", "role", "vpc"]);
        assert!(plan.operations.iter().all(|op| op.action == Action::Delete));
        let vpc = plan.operations.last().unwrap();
        assert_eq!(strs(&vpc.requires), vec!["public-1", "web-sg"]);
    }

    #[test]
    fn test_filter_by_target_keeps_prerequisites() {
        let plan = build_plan(&web_stack()).unwrap();
        let filtered = plan.clone().filter_by_target(Some("instance.web"));
        assert_eq!(names(&filtered), vec!["vpc", "public-1", "web-sg", "web"]);

        let filtered = plan.clone().filter_by_target(Some("iam"));
        assert_eq!(names(&filtered), vec!["role"]);

        let filtered = plan.clone().filter_by_target(Some("web-sg"));
        assert_eq!(names(&filtered), vec!["vpc", "web-sg"]);

        assert_eq!(plan.clone().filter_by_target(None).len(), 5);
    }

    #[test]
    fn test_parse_target() {
        assert_eq!(parse_target("subnet"), (Some("subnet".to_string()), None));
        assert_eq!(
            parse_target("subnet.public-1"),
            (Some("subnet".to_string()), Some("public-1".to_string()))
        );
        assert_eq!(parse_target("a.b.c"), (None, Some("a.b.c".to_string())));
    }
}
