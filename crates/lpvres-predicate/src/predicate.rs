use crate::accessor::{OptionalExt, ResourceAccessor};
use crate::config::PredicateConfig;
use crate::error::{PredicateError, Result};
use crate::matcher::find_candidate_volumes;
use crate::reservation::{is_reservation_candidate, ReservationAccountant};
use crate::types::{ExtenderArgs, ExtenderFilterResult, NodeVerdict};
use crate::volume;
use lpvres_core::resources::{claim_names, node_matches_selector_terms, pod_namespace, pod_requests};
use lpvres_core::{Node, PersistentVolume, Pod, Quantity, ResourceTotals};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

type VolumesByName = BTreeMap<String, Arc<PersistentVolume>>;

/// Decides which nodes can host a pod given the reservations of local volumes
///
/// This check runs in addition to the scheduler's standard resource fit. A
/// pod that mounts reserving volumes on a node is only checked against what
/// is left of those reservations; a dimension none of them reserves is left
/// to the standard check. Any other pod is checked against the node's
/// allocatable resources minus running pods and every outstanding
/// reservation.
pub struct PredicateEngine {
    config: PredicateConfig,
}

impl PredicateEngine {
    pub fn new(config: PredicateConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PredicateConfig {
        &self.config
    }

    /// Answer an extender filter request
    ///
    /// Never fails: an evaluation error is reported in the result's `error`.
    pub fn filter<A: ResourceAccessor + ?Sized>(
        &self,
        accessor: &A,
        args: &ExtenderArgs,
    ) -> ExtenderFilterResult {
        let Some(pod) = args.pod.as_ref() else {
            debug!("Filter request without a pod");
            return ExtenderFilterResult::empty();
        };
        let node_names = args.candidate_node_names();

        match self.predicate(accessor, &node_names, pod) {
            Ok(mut result) => {
                if let Some(supplied) = args.supplied_nodes() {
                    result.attach_nodes(supplied);
                }
                debug!(
                    "Predicate pod {} on nodes {:?}, fit nodes: {:?}",
                    pod_name(pod),
                    node_names,
                    result.node_names
                );
                result
            }
            Err(e) => {
                error!(
                    "Failed to predicate pod {} on nodes {:?}: {}",
                    pod_name(pod),
                    node_names,
                    e
                );
                ExtenderFilterResult::from_error(e.to_string())
            }
        }
    }

    /// Evaluate `pod` on every node in `node_names`, in order
    pub fn predicate<A: ResourceAccessor + ?Sized>(
        &self,
        accessor: &A,
        node_names: &[String],
        pod: &Pod,
    ) -> Result<ExtenderFilterResult> {
        if node_names.is_empty() {
            return Ok(ExtenderFilterResult::empty());
        }

        info!("Predicating pod {} on {} node(s)", pod_name(pod), node_names.len());
        let start = Instant::now();

        let mut verdicts = Vec::with_capacity(node_names.len());
        for node_name in node_names {
            let verdict = self
                .evaluate(accessor, node_name, pod)
                .map_err(|e| PredicateError::node_evaluation(pod_name(pod), node_name, e))?;
            if let Some(reason) = &verdict.reason {
                debug!("Node {} is unfit for pod {}: {}", node_name, pod_name(pod), reason);
            }
            verdicts.push(verdict);
        }

        debug!("Predicate pod {} took {:?}", pod_name(pod), start.elapsed());
        Ok(ExtenderFilterResult::from_verdicts(verdicts))
    }

    fn evaluate<A: ResourceAccessor + ?Sized>(
        &self,
        accessor: &A,
        node_name: &str,
        pod: &Pod,
    ) -> Result<NodeVerdict> {
        match accessor.get_node(node_name).optional()? {
            Some(node) => self.predicate_node(accessor, &node, pod),
            None => Ok(NodeVerdict::fail(node_name, format!("node {} not found", node_name))),
        }
    }

    /// Evaluate `pod` on a single node
    pub fn predicate_node<A: ResourceAccessor + ?Sized>(
        &self,
        accessor: &A,
        node: &Node,
        pod: &Pod,
    ) -> Result<NodeVerdict> {
        let node_name = node.metadata.name.as_deref().unwrap_or_default();
        let requests = pod_requests(pod);
        let accountant = ReservationAccountant::new(accessor, &self.config);

        let (bound_on_node, unbound_on_node) = self.reserving_volumes_on_node(accessor, node)?;
        let direct = self.volumes_of_pod(accessor, pod, node, &bound_on_node, &unbound_on_node)?;

        if !direct.is_empty() {
            for (name, pv) in &direct {
                let remaining = accountant.remaining(pv, node_name)?;
                if remaining.exhausted_or_invalid {
                    continue;
                }
                if let Some(cpu) = remaining.cpu {
                    if !cpu.checked_sub(&requests.cpu).sufficient {
                        return Ok(NodeVerdict::fail(
                            node_name,
                            format!("reserved cpu of local persistent volume {} is not enough", name),
                        ));
                    }
                }
                if let Some(memory) = remaining.memory {
                    if !memory.checked_sub(&requests.memory).sufficient {
                        return Ok(NodeVerdict::fail(
                            node_name,
                            format!("reserved memory of local persistent volume {} is not enough", name),
                        ));
                    }
                }
            }
            return Ok(NodeVerdict::pass(node_name));
        }

        let mut considered = bound_on_node;
        if self.config.consider_unbound_local_pv {
            considered.extend(unbound_on_node);
        }

        let mut available = self.available_resources(accessor, node)?;
        for pv in considered.values() {
            let remaining = accountant.remaining(pv, node_name)?;
            if remaining.exhausted_or_invalid {
                continue;
            }
            if let Some(cpu) = remaining.cpu {
                available.cpu = available.cpu - cpu;
            }
            if let Some(memory) = remaining.memory {
                available.memory = available.memory - memory;
            }
        }

        if !available.cpu.checked_sub(&requests.cpu).sufficient {
            return Ok(NodeVerdict::fail(
                node_name,
                "cpu not enough after reserving for local persistent volume",
            ));
        }
        if !available.memory.checked_sub(&requests.memory).sufficient {
            return Ok(NodeVerdict::fail(
                node_name,
                "memory not enough after reserving for local persistent volume",
            ));
        }

        Ok(NodeVerdict::pass(node_name))
    }

    /// Reserving local volumes whose affinity selects `node`, split into
    /// bound and not yet bound
    fn reserving_volumes_on_node<A: ResourceAccessor + ?Sized>(
        &self,
        accessor: &A,
        node: &Node,
    ) -> Result<(VolumesByName, VolumesByName)> {
        let mut bound = VolumesByName::new();
        let mut unbound = VolumesByName::new();

        for pv in accessor.list_persistent_volumes()? {
            if !is_reservation_candidate(&pv, &self.config) {
                continue;
            }
            let Some(terms) = volume::affinity_terms(&pv) else {
                info!(
                    "Local persistent volume {} reserves resources but has a malformed node affinity",
                    volume::name(&pv)
                );
                continue;
            };
            if !node_matches_selector_terms(node, terms) {
                continue;
            }

            let name = volume::name(&pv).to_string();
            if volume::is_bound(&pv) {
                bound.insert(name, pv);
            } else {
                unbound.insert(name, pv);
            }
        }

        Ok((bound, unbound))
    }

    /// Reserving volumes on this node that the pod's own claims use or may use
    ///
    /// A bound claim contributes its volume. An unbound claim contributes
    /// every unbound volume it could be matched to, since the binding that
    /// will eventually be chosen is not known yet.
    fn volumes_of_pod<A: ResourceAccessor + ?Sized>(
        &self,
        accessor: &A,
        pod: &Pod,
        node: &Node,
        bound_on_node: &VolumesByName,
        unbound_on_node: &VolumesByName,
    ) -> Result<VolumesByName> {
        let namespace = pod_namespace(pod);
        let unbound: Vec<Arc<PersistentVolume>> = unbound_on_node.values().cloned().collect();
        let mut volumes = VolumesByName::new();

        for claim_name in claim_names(pod) {
            let Some(claim) = accessor
                .get_persistent_volume_claim(namespace, claim_name)
                .optional()?
            else {
                debug!(
                    "Claim {}/{} of pod {} not found, skipping",
                    namespace,
                    claim_name,
                    pod_name(pod)
                );
                continue;
            };

            match volume::bound_volume_name(&claim) {
                Some(volume_name) => {
                    if let Some(pv) = bound_on_node.get(volume_name) {
                        volumes.insert(volume_name.to_string(), Arc::clone(pv));
                    }
                }
                None if self.config.consider_unbound_local_pv => {
                    match find_candidate_volumes(&claim, &unbound, Some(node), &HashSet::new()) {
                        Ok(candidates) => {
                            for pv in candidates {
                                volumes.insert(volume::name(&pv).to_string(), pv);
                            }
                        }
                        Err(e) => warn!(
                            "Failed to match unbound local volumes for claim {} of pod {}: {}",
                            claim_name,
                            pod_name(pod),
                            e
                        ),
                    }
                }
                None => {}
            }
        }

        Ok(volumes)
    }

    /// Allocatable resources of the node minus the requests of its pods
    ///
    /// May go negative on an overcommitted node.
    fn available_resources<A: ResourceAccessor + ?Sized>(
        &self,
        accessor: &A,
        node: &Node,
    ) -> Result<ResourceTotals> {
        let allocatable = node.status.as_ref().and_then(|s| s.allocatable.as_ref());
        let start = ResourceTotals {
            cpu: Quantity::from_resource_map(allocatable, "cpu"),
            memory: Quantity::from_resource_map(allocatable, "memory"),
        };
        let node_name = node.metadata.name.as_deref();

        let available = accessor
            .list_pods()?
            .iter()
            .filter(|pod| pod.spec.as_ref().and_then(|s| s.node_name.as_deref()) == node_name)
            .map(|pod| pod_requests(pod))
            .fold(start, |left, used| ResourceTotals {
                cpu: left.cpu - used.cpu,
                memory: left.memory - used.memory,
            });

        Ok(available)
    }
}

fn pod_name(pod: &Pod) -> &str {
    pod.metadata.name.as_deref().unwrap_or_default()
}
