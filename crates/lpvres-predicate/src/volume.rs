//! Accessors over persistent volume and claim objects

use k8s_openapi::api::core::v1::{NodeSelectorTerm, ObjectReference};
use lpvres_core::resources::DEFAULT_NAMESPACE;
use lpvres_core::{PersistentVolume, PersistentVolumeClaim, Quantity};

/// Phase of a volume associated with a claim
pub const PHASE_BOUND: &str = "Bound";

/// Legacy storage-class annotation, takes precedence over `storageClassName`
pub const STORAGE_CLASS_ANNOTATION: &str = "volume.beta.kubernetes.io/storage-class";

const STORAGE: &str = "storage";

pub fn name(pv: &PersistentVolume) -> &str {
    pv.metadata.name.as_deref().unwrap_or_default()
}

pub fn is_local(pv: &PersistentVolume) -> bool {
    pv.spec.as_ref().is_some_and(|spec| spec.local.is_some())
}

pub fn is_bound(pv: &PersistentVolume) -> bool {
    pv.status
        .as_ref()
        .and_then(|status| status.phase.as_deref())
        == Some(PHASE_BOUND)
}

pub fn annotation<'a>(pv: &'a PersistentVolume, key: &str) -> Option<&'a str> {
    pv.metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(key))
        .map(String::as_str)
}

/// Required node selector terms, `None` when the affinity is missing or empty
pub fn affinity_terms(pv: &PersistentVolume) -> Option<&[NodeSelectorTerm]> {
    let terms = &pv
        .spec
        .as_ref()?
        .node_affinity
        .as_ref()?
        .required
        .as_ref()?
        .node_selector_terms;
    if terms.is_empty() {
        None
    } else {
        Some(terms.as_slice())
    }
}

pub fn claim_ref(pv: &PersistentVolume) -> Option<&ObjectReference> {
    pv.spec.as_ref().and_then(|spec| spec.claim_ref.as_ref())
}

pub fn capacity(pv: &PersistentVolume) -> Quantity {
    Quantity::from_resource_map(pv.spec.as_ref().and_then(|s| s.capacity.as_ref()), STORAGE)
}

pub fn volume_storage_class(pv: &PersistentVolume) -> &str {
    pv.metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(STORAGE_CLASS_ANNOTATION))
        .or_else(|| pv.spec.as_ref().and_then(|s| s.storage_class_name.as_ref()))
        .map(String::as_str)
        .unwrap_or_default()
}

pub fn volume_access_modes(pv: &PersistentVolume) -> &[String] {
    pv.spec
        .as_ref()
        .and_then(|s| s.access_modes.as_deref())
        .unwrap_or_default()
}

pub fn volume_mode(pv: &PersistentVolume) -> Option<&str> {
    pv.spec.as_ref().and_then(|s| s.volume_mode.as_deref())
}

pub fn is_deleting(pv: &PersistentVolume) -> bool {
    pv.metadata.deletion_timestamp.is_some()
}

pub fn claim_name(claim: &PersistentVolumeClaim) -> &str {
    claim.metadata.name.as_deref().unwrap_or_default()
}

pub fn claim_namespace(claim: &PersistentVolumeClaim) -> &str {
    claim
        .metadata
        .namespace
        .as_deref()
        .unwrap_or(DEFAULT_NAMESPACE)
}

/// `namespace/name` of a claim, for logs and errors
pub fn claim_key(claim: &PersistentVolumeClaim) -> String {
    format!("{}/{}", claim_namespace(claim), claim_name(claim))
}

/// Name of the volume a claim is bound to, `None` while unbound
pub fn bound_volume_name(claim: &PersistentVolumeClaim) -> Option<&str> {
    claim
        .spec
        .as_ref()
        .and_then(|s| s.volume_name.as_deref())
        .filter(|name| !name.is_empty())
}

pub fn requested_storage(claim: &PersistentVolumeClaim) -> Quantity {
    Quantity::from_resource_map(
        claim
            .spec
            .as_ref()
            .and_then(|s| s.resources.as_ref())
            .and_then(|r| r.requests.as_ref()),
        STORAGE,
    )
}

pub fn claim_storage_class(claim: &PersistentVolumeClaim) -> &str {
    claim
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(STORAGE_CLASS_ANNOTATION))
        .or_else(|| claim.spec.as_ref().and_then(|s| s.storage_class_name.as_ref()))
        .map(String::as_str)
        .unwrap_or_default()
}

pub fn claim_access_modes(claim: &PersistentVolumeClaim) -> &[String] {
    claim
        .spec
        .as_ref()
        .and_then(|s| s.access_modes.as_deref())
        .unwrap_or_default()
}

pub fn claim_volume_mode(claim: &PersistentVolumeClaim) -> Option<&str> {
    claim.spec.as_ref().and_then(|s| s.volume_mode.as_deref())
}

/// Whether the volume is bound or pre-bound to exactly this claim
///
/// Namespace and name must match; the uid must match too when the reference
/// records one.
pub fn is_bound_to_claim(pv: &PersistentVolume, claim: &PersistentVolumeClaim) -> bool {
    let Some(reference) = claim_ref(pv) else {
        return false;
    };
    if reference.name.as_deref().unwrap_or_default() != claim_name(claim)
        || reference.namespace.as_deref().unwrap_or_default() != claim_namespace(claim)
    {
        return false;
    }
    match reference.uid.as_deref().filter(|uid| !uid.is_empty()) {
        Some(uid) => claim.metadata.uid.as_deref() == Some(uid),
        None => true,
    }
}
