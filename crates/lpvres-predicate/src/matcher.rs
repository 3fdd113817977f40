use crate::error::{PredicateError, Result};
use crate::volume;
use lpvres_core::resources::{node_matches_selector_terms, CompiledLabelSelector};
use lpvres_core::{Node, PersistentVolume, PersistentVolumeClaim};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Find the volumes that could satisfy a claim
///
/// A volume bound or pre-bound to the claim that is large enough is the only
/// candidate returned; if it does not fit `target_node`, the claim cannot be
/// placed there and no candidates are returned at all. Any other volume must
/// be unclaimed and agree with the claim on selector, storage class, access
/// modes and size. Survivors keep their input order.
///
/// Fails only when the claim carries a malformed label selector.
pub fn find_candidate_volumes(
    claim: &PersistentVolumeClaim,
    volumes: &[Arc<PersistentVolume>],
    target_node: Option<&Node>,
    excluded: &HashSet<String>,
) -> Result<Vec<Arc<PersistentVolume>>> {
    let requested = volume::requested_storage(claim);
    let requested_class = volume::claim_storage_class(claim);
    let selector = claim
        .spec
        .as_ref()
        .and_then(|spec| spec.selector.as_ref())
        .map(CompiledLabelSelector::compile)
        .transpose()
        .map_err(|e| PredicateError::invalid_claim_selector(volume::claim_key(claim), e))?;

    let mut candidates = Vec::new();

    for pv in volumes {
        if excluded.contains(volume::name(pv)) {
            continue;
        }

        if volume_mode_conflicts(claim, pv) || volume::is_deleting(pv) {
            continue;
        }

        let affinity_fits = target_node.is_none_or(|node| fits_node(pv, node));
        let large_enough = volume::capacity(pv) >= requested;

        if volume::is_bound_to_claim(pv, claim) {
            if !large_enough {
                continue;
            }
            if !affinity_fits {
                debug!(
                    "Volume {} pre-bound to claim {} does not fit the target node",
                    volume::name(pv),
                    volume::claim_key(claim)
                );
                return Ok(Vec::new());
            }
            return Ok(vec![Arc::clone(pv)]);
        }

        if volume::claim_ref(pv).is_some() {
            continue;
        }
        if let Some(selector) = &selector {
            if !selector.matches(pv.metadata.labels.as_ref()) {
                continue;
            }
        }
        if volume::volume_storage_class(pv) != requested_class {
            continue;
        }
        if !affinity_fits || !access_modes_cover(claim, pv) || !large_enough {
            continue;
        }

        candidates.push(Arc::clone(pv));
    }

    Ok(candidates)
}

/// Volume node affinity check; a missing affinity allows any node
fn fits_node(pv: &PersistentVolume, node: &Node) -> bool {
    match volume::affinity_terms(pv) {
        Some(terms) => node_matches_selector_terms(node, terms),
        None => true,
    }
}

fn volume_mode_conflicts(claim: &PersistentVolumeClaim, pv: &PersistentVolume) -> bool {
    match (volume::claim_volume_mode(claim), volume::volume_mode(pv)) {
        (Some(requested), Some(offered)) => requested != offered,
        _ => false,
    }
}

fn access_modes_cover(claim: &PersistentVolumeClaim, pv: &PersistentVolume) -> bool {
    let offered: HashSet<&str> = volume::volume_access_modes(pv)
        .iter()
        .map(String::as_str)
        .collect();
    volume::claim_access_modes(claim)
        .iter()
        .all(|mode| offered.contains(mode.as_str()))
}
