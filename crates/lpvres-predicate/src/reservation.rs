use crate::accessor::{OptionalExt, ResourceAccessor};
use crate::config::PredicateConfig;
use crate::error::Result;
use crate::volume;
use lpvres_core::resources::{claim_names, pod_requests, DEFAULT_NAMESPACE};
use lpvres_core::{CoreError, PersistentVolume, Pod, Quantity, ResourceTotals, Subtraction};
use std::sync::Arc;
use tracing::{debug, warn};

/// Whether a volume takes part in reservation accounting at all
///
/// Only local volumes carrying at least one reservation annotation do.
pub fn is_reservation_candidate(pv: &PersistentVolume, config: &PredicateConfig) -> bool {
    volume::is_local(pv)
        && (volume::annotation(pv, &config.reserved_cpu_annotation).is_some()
            || volume::annotation(pv, &config.reserved_memory_annotation).is_some())
}

/// What is left of a volume's reservation on one node
#[derive(Debug, Default)]
pub struct RemainingReservation {
    /// Remaining reserved cpu, `None` when cpu is not reserved
    pub cpu: Option<Quantity>,
    /// Remaining reserved memory, `None` when memory is not reserved
    pub memory: Option<Quantity>,
    /// The volume no longer restricts anything: its reservation is used up
    /// in some dimension, or every annotation it carries is malformed
    pub exhausted_or_invalid: bool,
    /// Parse errors of the annotations that were ignored
    pub malformed: Vec<CoreError>,
}

impl RemainingReservation {
    /// Whether at least one dimension is reserved
    pub fn is_configured(&self) -> bool {
        self.cpu.is_some() || self.memory.is_some()
    }
}

/// Computes remaining reservations from the pods already using a volume
pub struct ReservationAccountant<'a, A: ?Sized> {
    accessor: &'a A,
    config: &'a PredicateConfig,
}

impl<'a, A: ResourceAccessor + ?Sized> ReservationAccountant<'a, A> {
    pub fn new(accessor: &'a A, config: &'a PredicateConfig) -> Self {
        Self { accessor, config }
    }

    /// Reservation of `pv` left after subtracting the pods on `node_name`
    /// that mount its claim
    ///
    /// Counting only the pods of this volume means a pod mounting several
    /// reserving volumes is charged against each of them exactly once.
    pub fn remaining(&self, pv: &PersistentVolume, node_name: &str) -> Result<RemainingReservation> {
        let mut remaining = RemainingReservation::default();
        let name = volume::name(pv);

        remaining.cpu = self.reserved(pv, &self.config.reserved_cpu_annotation, &mut remaining.malformed);
        remaining.memory =
            self.reserved(pv, &self.config.reserved_memory_annotation, &mut remaining.malformed);

        if !remaining.is_configured() {
            remaining.exhausted_or_invalid = !remaining.malformed.is_empty();
            return Ok(remaining);
        }

        let pods = self.mounting_pods(name, node_name)?;
        if pods.is_empty() {
            return Ok(remaining);
        }

        let consumed: Vec<ResourceTotals> = pods.iter().map(|pod| pod_requests(pod)).collect();
        let mut sufficient = true;

        if let Some(cpu) = remaining.cpu {
            let left = consume(cpu, consumed.iter().map(|t| t.cpu));
            sufficient &= left.sufficient;
            remaining.cpu = Some(left.remaining);
        }
        if let Some(memory) = remaining.memory {
            let left = consume(memory, consumed.iter().map(|t| t.memory));
            sufficient &= left.sufficient;
            remaining.memory = Some(left.remaining);
        }

        if !sufficient {
            debug!(
                "Reservation of local persistent volume {} on node {} is used up by {} pod(s)",
                name,
                node_name,
                pods.len()
            );
        }
        remaining.exhausted_or_invalid = !sufficient;

        Ok(remaining)
    }

    /// Pods scheduled on `node_name` that mount the claim bound to the volume
    ///
    /// The volume is re-read by name; a missing, unbound or unclaimed volume
    /// has no mounting pods.
    pub fn mounting_pods(&self, pv_name: &str, node_name: &str) -> Result<Vec<Arc<Pod>>> {
        let Some(pv) = self.accessor.get_persistent_volume(pv_name).optional()? else {
            return Ok(Vec::new());
        };
        if !volume::is_bound(&pv) {
            return Ok(Vec::new());
        }
        let Some(reference) = volume::claim_ref(&pv) else {
            return Ok(Vec::new());
        };

        let namespace = reference.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE);
        let claim = reference.name.as_deref().unwrap_or_default();

        let pods = self.accessor.list_pods_in_namespace(namespace)?;
        Ok(pods
            .into_iter()
            .filter(|pod| {
                pod.spec
                    .as_ref()
                    .and_then(|spec| spec.node_name.as_deref())
                    == Some(node_name)
            })
            .filter(|pod| claim_names(pod).any(|name| name == claim))
            .collect())
    }

    fn reserved(
        &self,
        pv: &PersistentVolume,
        key: &str,
        malformed: &mut Vec<CoreError>,
    ) -> Option<Quantity> {
        let value = volume::annotation(pv, key)?;
        match Quantity::parse(value) {
            Ok(quantity) => Some(quantity),
            Err(e) => {
                warn!(
                    "Ignoring malformed {} annotation on local persistent volume {}: {}",
                    key,
                    volume::name(pv),
                    e
                );
                malformed.push(e);
                None
            }
        }
    }
}

/// Subtract each request in turn, stopping at the first shortfall
fn consume(reserved: Quantity, requests: impl Iterator<Item = Quantity>) -> Subtraction {
    let start = Subtraction {
        remaining: reserved,
        sufficient: true,
    };
    requests.fold(start, |left, request| {
        if left.sufficient {
            left.remaining.checked_sub(&request)
        } else {
            left
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    fn q(s: &str) -> Quantity {
        Quantity::parse(s).unwrap()
    }

    #[test]
    fn test_candidate_needs_local_and_annotation() {
        let config = config(false);
        assert!(is_reservation_candidate(
            &build_pv("pv1", Some("node1"), Some("1"), None),
            &config
        ));
        assert!(is_reservation_candidate(
            &build_pv("pv1", Some("node1"), None, Some("1G")),
            &config
        ));
        assert!(!is_reservation_candidate(
            &build_pv("pv1", Some("node1"), None, None),
            &config
        ));
        // no node means no local source in the fixture
        assert!(!is_reservation_candidate(
            &build_pv("pv1", None, Some("1"), None),
            &config
        ));
    }

    #[test]
    fn test_remaining_subtracts_mounting_pods_on_node() {
        let mut pv = build_pv("pv1", Some("node1"), Some("4"), Some("2G"));
        let mut pvc = build_pvc("test", "pvc1");
        bind(&mut pv, &mut pvc);

        let mut here = build_pod("test", "pod1", &["pvc1"], &[("1", "512M")]);
        bind_node(&mut here, "node1");
        let mut elsewhere = build_pod("test", "pod2", &["pvc1"], &[("1", "512M")]);
        bind_node(&mut elsewhere, "node2");
        let mut unrelated = build_pod("test", "pod3", &[], &[("1", "512M")]);
        bind_node(&mut unrelated, "node1");

        let snapshot = snapshot(vec![], vec![here, elsewhere, unrelated], vec![pv.clone()], vec![pvc]);
        let config = config(false);
        let accountant = ReservationAccountant::new(&snapshot, &config);

        let remaining = accountant.remaining(&pv, "node1").unwrap();
        assert_eq!(remaining.cpu, Some(q("3")));
        assert_eq!(remaining.memory, Some(q("1488M")));
        assert!(!remaining.exhausted_or_invalid);
    }

    #[test]
    fn test_unbound_volume_keeps_full_reservation() {
        let pv = build_pv("pv1", Some("node1"), Some("2"), None);
        let mut pod = build_pod("test", "pod1", &["pvc1"], &[("2", "1G")]);
        bind_node(&mut pod, "node1");

        let snapshot = snapshot(vec![], vec![pod], vec![pv.clone()], vec![build_pvc("test", "pvc1")]);
        let config = config(true);
        let accountant = ReservationAccountant::new(&snapshot, &config);

        let remaining = accountant.remaining(&pv, "node1").unwrap();
        assert_eq!(remaining.cpu, Some(q("2")));
        assert_eq!(remaining.memory, None);
        assert!(accountant.mounting_pods("pv1", "node1").unwrap().is_empty());
        assert!(accountant.mounting_pods("missing", "node1").unwrap().is_empty());
    }

    #[test]
    fn test_exhausted_when_either_dimension_runs_out() {
        let mut pv = build_pv("pv1", Some("node1"), Some("4"), Some("1G"));
        let mut pvc = build_pvc("test", "pvc1");
        bind(&mut pv, &mut pvc);
        let mut pod = build_pod("test", "pod1", &["pvc1"], &[("1", "2G")]);
        bind_node(&mut pod, "node1");

        let snapshot = snapshot(vec![], vec![pod], vec![pv.clone()], vec![pvc]);
        let config = config(false);
        let remaining = ReservationAccountant::new(&snapshot, &config)
            .remaining(&pv, "node1")
            .unwrap();

        assert!(remaining.exhausted_or_invalid);
    }

    #[test]
    fn test_exact_use_is_not_exhausted() {
        let mut pv = build_pv("pv1", Some("node1"), Some("2"), None);
        let mut pvc = build_pvc("test", "pvc1");
        bind(&mut pv, &mut pvc);
        let mut pod = build_pod("test", "pod1", &["pvc1"], &[("2", "1G")]);
        bind_node(&mut pod, "node1");

        let snapshot = snapshot(vec![], vec![pod], vec![pv.clone()], vec![pvc]);
        let config = config(false);
        let remaining = ReservationAccountant::new(&snapshot, &config)
            .remaining(&pv, "node1")
            .unwrap();

        assert_eq!(remaining.cpu, Some(Quantity::zero()));
        assert!(!remaining.exhausted_or_invalid);
    }

    #[test]
    fn test_malformed_dimension_is_unconfigured() {
        let pv = build_pv("pv1", Some("node1"), Some("lots"), Some("1G"));
        let snapshot = snapshot(vec![], vec![], vec![pv.clone()], vec![]);
        let config = config(false);
        let remaining = ReservationAccountant::new(&snapshot, &config)
            .remaining(&pv, "node1")
            .unwrap();

        assert_eq!(remaining.cpu, None);
        assert_eq!(remaining.memory, Some(q("1G")));
        assert_eq!(remaining.malformed.len(), 1);
        assert!(!remaining.exhausted_or_invalid);
    }

    #[test]
    fn test_all_malformed_is_invalid() {
        let pv = build_pv("pv1", Some("node1"), Some("lots"), Some(""));
        let snapshot = snapshot(vec![], vec![], vec![pv.clone()], vec![]);
        let config = config(false);
        let remaining = ReservationAccountant::new(&snapshot, &config)
            .remaining(&pv, "node1")
            .unwrap();

        assert!(!remaining.is_configured());
        assert_eq!(remaining.malformed.len(), 2);
        assert!(remaining.exhausted_or_invalid);
    }

    #[test]
    fn test_consume_stops_at_shortfall() {
        let left = consume(q("3"), vec![q("2"), q("2"), q("1")].into_iter());
        assert!(!left.sufficient);
        assert_eq!(left.remaining, q("-1"));

        let left = consume(q("3"), std::iter::empty());
        assert!(left.sufficient);
        assert_eq!(left.remaining, q("3"));
    }
}
