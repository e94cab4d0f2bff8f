//! Reconciliation planning.
//!
//! Planning is a pure diff of the previous inventory snapshot against the
//! authority's index. It decides, for one class, which credentials are
//! carried forward unchanged, which must be fetched and which must be
//! deleted. Applying the plan is the engine's job.

use std::collections::HashMap;

use credcache_core::{CredentialDescriptor, CredentialSchema, InventorySnapshot};

/// One index-driven decision, in index order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step<'a> {
    /// Version marker unchanged; keep the cached entry without fetching.
    Carry { name: &'a str, version: &'a str },

    /// New or changed; fetch payloads and rewrite the entry.
    ///
    /// `previous` is the marker currently cached, if any. A failed fetch
    /// keeps that marker in the next snapshot.
    Fetch {
        descriptor: &'a CredentialDescriptor,
        previous: Option<&'a str>,
    },
}

/// Full plan for one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan<'a> {
    pub steps: Vec<Step<'a>>,
    /// Cached names absent from the filtered index, with their cached marker.
    pub deletions: Vec<(&'a str, &'a str)>,
}

impl ReconcilePlan<'_> {
    /// Number of fetches the plan will perform.
    pub fn fetch_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| matches!(step, Step::Fetch { .. }))
            .count()
    }
}

/// Diff `snapshot` against `index` for the class described by `schema`.
///
/// Descriptors of other classes (and unrecognized ones) are ignored. When the
/// index lists a name more than once, the last occurrence wins.
pub fn plan<'a>(
    schema: &CredentialSchema,
    snapshot: &'a InventorySnapshot,
    index: &'a [CredentialDescriptor],
) -> ReconcilePlan<'a> {
    let filtered: Vec<(&'a CredentialDescriptor, &'a str, &'a str)> = index
        .iter()
        .filter(|descriptor| descriptor.class() == Some(schema.class))
        .filter_map(|descriptor| Some((descriptor, descriptor.name()?, descriptor.version()?)))
        .collect();

    let mut last_position: HashMap<&str, usize> = HashMap::with_capacity(filtered.len());
    for (position, (_, name, _)) in filtered.iter().enumerate() {
        last_position.insert(name, position);
    }

    let steps = filtered
        .iter()
        .enumerate()
        .filter(|(position, (_, name, _))| last_position.get(name) == Some(position))
        .map(|(_, &(descriptor, name, version))| match snapshot.get(name) {
            Some(cached) if cached == version => Step::Carry { name, version },
            previous => Step::Fetch {
                descriptor,
                previous,
            },
        })
        .collect();

    let deletions = snapshot
        .iter()
        .filter(|(name, _)| !last_position.contains_key(name))
        .collect();

    ReconcilePlan { steps, deletions }
}

#[cfg(test)]
mod tests {
    use super::*;
    use credcache_core::{PROBE_SCHEMA, VPN_SERVICE_SCHEMA};
    use credcache_test_utils::fixtures::{probe_descriptor, vpn_descriptor};
    use credcache_test_utils::generators::{arb_inventory, arb_version};
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn snapshot(entries: &[(&str, &str)]) -> InventorySnapshot {
        entries
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_empty_snapshot_fetches_everything() {
        let snap = InventorySnapshot::new();
        let index = vec![probe_descriptor("alice", "v1"), probe_descriptor("bob", "v1")];

        let plan = plan(&PROBE_SCHEMA, &snap, &index);
        assert_eq!(plan.fetch_count(), 2);
        assert!(plan.deletions.is_empty());
    }

    #[test]
    fn test_unchanged_is_carried() {
        let snap = snapshot(&[("alice", "v1")]);
        let index = vec![probe_descriptor("alice", "v1")];

        let plan = plan(&PROBE_SCHEMA, &snap, &index);
        assert_eq!(
            plan.steps,
            vec![Step::Carry {
                name: "alice",
                version: "v1"
            }]
        );
    }

    #[test]
    fn test_changed_marker_is_fetched_with_previous() {
        let snap = snapshot(&[("alice", "v1")]);
        let index = vec![probe_descriptor("alice", "v2")];

        let plan = plan(&PROBE_SCHEMA, &snap, &index);
        assert_eq!(
            plan.steps,
            vec![Step::Fetch {
                descriptor: &index[0],
                previous: Some("v1"),
            }]
        );
    }

    #[test]
    fn test_missing_names_are_deleted() {
        let snap = snapshot(&[("alice", "v1"), ("bob", "v4")]);
        let index = vec![probe_descriptor("alice", "v1")];

        let plan = plan(&PROBE_SCHEMA, &snap, &index);
        assert_eq!(plan.deletions, vec![("bob", "v4")]);
    }

    #[test]
    fn test_other_classes_are_ignored() {
        let snap = snapshot(&[("shared", "v1")]);
        let index = vec![
            vpn_descriptor("shared", "v9"),
            vpn_descriptor("vpn-only", "v1"),
            CredentialDescriptor::Unrecognized,
        ];

        // The vpn-service descriptor named "shared" does not keep the probe
        // entry alive.
        let plan = plan(&PROBE_SCHEMA, &snap, &index);
        assert!(plan.steps.is_empty());
        assert_eq!(plan.deletions, vec![("shared", "v1")]);

        let empty = InventorySnapshot::new();
        assert_eq!(plan_vpn(&empty, &index).fetch_count(), 2);
    }

    fn plan_vpn<'a>(
        snap: &'a InventorySnapshot,
        index: &'a [CredentialDescriptor],
    ) -> ReconcilePlan<'a> {
        plan(&VPN_SERVICE_SCHEMA, snap, index)
    }

    #[test]
    fn test_duplicate_names_last_wins() {
        let snap = InventorySnapshot::new();
        let index = vec![
            probe_descriptor("alice", "v1"),
            probe_descriptor("bob", "v1"),
            probe_descriptor("alice", "v2"),
        ];

        let plan = plan(&PROBE_SCHEMA, &snap, &index);
        let fetched: Vec<(&str, &str)> = plan
            .steps
            .iter()
            .filter_map(|step| match step {
                Step::Fetch { descriptor, .. } => descriptor.name().zip(descriptor.version()),
                Step::Carry { .. } => None,
            })
            .collect();
        assert_eq!(fetched, vec![("bob", "v1"), ("alice", "v2")]);
    }

    #[test]
    fn test_steps_follow_index_order() {
        let snap = snapshot(&[("m", "v1")]);
        let index = vec![
            probe_descriptor("z", "v1"),
            probe_descriptor("m", "v1"),
            probe_descriptor("a", "v1"),
        ];

        let plan = plan(&PROBE_SCHEMA, &snap, &index);
        let names: Vec<&str> = plan
            .steps
            .iter()
            .map(|step| match step {
                Step::Carry { name, .. } => *name,
                Step::Fetch { descriptor, .. } => descriptor.name().unwrap_or_default(),
            })
            .collect();
        assert_eq!(names, vec!["z", "m", "a"]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Planning a snapshot against an index that matches it exactly does
        /// no work.
        #[test]
        fn prop_matching_index_is_a_noop(inventory in arb_inventory(12)) {
            let snap: InventorySnapshot = inventory.iter().cloned().collect();
            let index: Vec<CredentialDescriptor> = inventory
                .iter()
                .map(|(n, v)| probe_descriptor(n, v))
                .collect();

            let plan = plan(&PROBE_SCHEMA, &snap, &index);
            prop_assert_eq!(plan.fetch_count(), 0);
            prop_assert!(plan.deletions.is_empty());
            prop_assert_eq!(plan.steps.len(), inventory.len());
        }

        /// Every cached name is either kept by the index or deleted, never both,
        /// and every index name gets exactly one step.
        #[test]
        fn prop_plan_partitions_names(
            cached in arb_inventory(10),
            remote in arb_inventory(10),
            bump in arb_version(),
        ) {
            let snap: InventorySnapshot = cached.iter().cloned().collect();
            let index: Vec<CredentialDescriptor> = remote
                .iter()
                .map(|(n, v)| probe_descriptor(n, &format!("{}{}", v, bump)))
                .collect();

            let plan = plan(&PROBE_SCHEMA, &snap, &index);

            let remote_names: BTreeSet<&str> = remote.iter().map(|(n, _)| n.as_str()).collect();
            let deleted: BTreeSet<&str> = plan.deletions.iter().map(|(n, _)| *n).collect();
            prop_assert!(deleted.is_disjoint(&remote_names));
            for (name, _) in &cached {
                prop_assert!(remote_names.contains(name.as_str()) || deleted.contains(name.as_str()));
            }
            prop_assert_eq!(plan.steps.len(), remote_names.len());

            // Carried steps only ever carry the exact cached marker.
            for step in &plan.steps {
                if let Step::Carry { name, version } = step {
                    prop_assert_eq!(snap.get(name), Some(*version));
                }
            }
        }
    }
}
