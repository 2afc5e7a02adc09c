//! Node-aware placement
//!
//! A new Drone's pod goes on an eligible machine that no other pod in the
//! namespace is bound to. Running out of free machines is a steady state,
//! reported as [`Placement::Exhausted`], not an error.

use drone_types::{Machine, Pod, RoleSelector};
use std::collections::BTreeSet;

/// Result of a placement decision
#[derive(Debug, Clone, PartialEq)]
pub enum Placement {
    Assigned(Machine),
    Exhausted,
}

impl Placement {
    pub fn machine_name(&self) -> Option<&str> {
        match self {
            Placement::Assigned(machine) => Some(machine.name()),
            Placement::Exhausted => None,
        }
    }
}

/// Picks a machine for a new workload unit
pub trait PlacementPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Choose one of `eligible` whose name is not in `occupied`
    fn select(&self, eligible: &[Machine], occupied: &BTreeSet<String>) -> Placement;
}

/// First free machine in listing order
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstFree;

impl PlacementPolicy for FirstFree {
    fn name(&self) -> &'static str {
        "first-free"
    }

    fn select(&self, eligible: &[Machine], occupied: &BTreeSet<String>) -> Placement {
        eligible
            .iter()
            .find(|machine| !occupied.contains(machine.name()))
            .cloned()
            .map(Placement::Assigned)
            .unwrap_or(Placement::Exhausted)
    }
}

/// Machines carrying the role label, in listing order
pub fn eligible_machines(machines: Vec<Machine>, selector: &RoleSelector) -> Vec<Machine> {
    machines
        .into_iter()
        .filter(|machine| selector.matches(machine))
        .collect()
}

/// Machine names bound by any of `pods`
pub fn occupied_machines(pods: &[Pod]) -> BTreeSet<String> {
    pods.iter()
        .filter_map(|pod| pod.node_name())
        .map(str::to_string)
        .collect()
}

/// A pod bound to the same machine as `pod` and created before it.
///
/// Creation order is `(creationTimestamp, name)`, so the two tenants of a
/// double-booked machine agree on which one keeps it.
pub fn earlier_tenant<'a>(pod: &Pod, pods: &'a [Pod]) -> Option<&'a Pod> {
    let node = pod.node_name()?;
    pods.iter().find(|other| {
        other.metadata.name != pod.metadata.name
            && other.node_name() == Some(node)
            && created_before(other, pod)
    })
}

fn created_before(a: &Pod, b: &Pod) -> bool {
    (a.metadata.creation_timestamp, a.metadata.name.as_str())
        < (b.metadata.creation_timestamp, b.metadata.name.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use drone_types::ObjectMeta;

    fn machines(names: &[&str]) -> Vec<Machine> {
        names.iter().map(|n| Machine::new(*n)).collect()
    }

    fn occupied(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_picks_first_free_in_order() {
        let placement = FirstFree.select(&machines(&["a", "b", "c"]), &occupied(&["a"]));
        assert_eq!(placement.machine_name(), Some("b"));
    }

    #[test]
    fn test_exhausted_when_all_taken() {
        let placement = FirstFree.select(&machines(&["a", "b"]), &occupied(&["b", "a"]));
        assert_eq!(placement, Placement::Exhausted);
    }

    #[test]
    fn test_no_eligible_machines() {
        assert_eq!(
            FirstFree.select(&[], &BTreeSet::new()),
            Placement::Exhausted
        );
    }

    #[test]
    fn test_filters_by_role() {
        let selector = RoleSelector::new("node-role.kubernetes.io/drone");
        let eligible = eligible_machines(
            vec![
                Machine::new("gateway"),
                Machine::new("rockpi0").with_label("node-role.kubernetes.io/drone", ""),
            ],
            &selector,
        );
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].name(), "rockpi0");
    }

    #[test]
    fn test_unbound_pods_occupy_nothing() {
        let mut bound = Pod {
            metadata: ObjectMeta::new("fleet", "p1"),
            spec: Default::default(),
            status: Default::default(),
        };
        let unbound = bound.clone();
        bound.spec.node_name = Some("rockpi1".into());

        assert_eq!(occupied_machines(&[bound, unbound]), occupied(&["rockpi1"]));
    }

    fn bound_pod(name: &str, node: &str, created_secs: i64) -> Pod {
        let mut pod = Pod {
            metadata: ObjectMeta::new("fleet", name),
            spec: Default::default(),
            status: Default::default(),
        };
        pod.spec.node_name = Some(node.into());
        pod.metadata.creation_timestamp = chrono::DateTime::from_timestamp(created_secs, 0);
        pod
    }

    #[test]
    fn test_later_tenant_yields_machine() {
        let first = bound_pod("zulu", "rockpi0", 10);
        let second = bound_pod("alpha", "rockpi0", 20);
        let elsewhere = bound_pod("bravo", "rockpi1", 5);
        let pods = vec![first.clone(), second.clone(), elsewhere.clone()];

        let holder = earlier_tenant(&second, &pods).map(|p| p.metadata.name.as_str());
        assert_eq!(holder, Some("zulu"));
        assert!(earlier_tenant(&first, &pods).is_none());
        assert!(earlier_tenant(&elsewhere, &pods).is_none());
    }

    #[test]
    fn test_same_creation_time_breaks_tie_by_name() {
        let a = bound_pod("a", "rockpi0", 10);
        let b = bound_pod("b", "rockpi0", 10);
        let pods = vec![b.clone(), a.clone()];

        assert!(earlier_tenant(&a, &pods).is_none());
        assert_eq!(
            earlier_tenant(&b, &pods).map(|p| p.metadata.name.as_str()),
            Some("a")
        );
    }
}
