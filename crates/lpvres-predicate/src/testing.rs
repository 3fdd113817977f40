//! Object builders shared by the unit tests

use crate::config::PredicateConfig;
use crate::snapshot::ClusterSnapshot;
use k8s_openapi::api::core::v1::{
    Container, LocalVolumeSource, NodeSelector, NodeSelectorRequirement, NodeSelectorTerm,
    NodeStatus, ObjectReference, PersistentVolumeClaimSpec, PersistentVolumeClaimStatus,
    PersistentVolumeClaimVolumeSource, PersistentVolumeSpec, PersistentVolumeStatus, PodSpec,
    ResourceRequirements, Volume, VolumeNodeAffinity, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity as K8sQuantity;
use lpvres_core::{Node, PersistentVolume, PersistentVolumeClaim, Pod};
use std::collections::BTreeMap;

pub const CPU_KEY: &str = "reserved-cpu";
pub const MEM_KEY: &str = "reserved-mem";
pub const NODE_LABEL: &str = "nodeName";

fn resources(cpu: &str, memory: &str) -> BTreeMap<String, K8sQuantity> {
    BTreeMap::from([
        ("cpu".to_string(), K8sQuantity(cpu.to_string())),
        ("memory".to_string(), K8sQuantity(memory.to_string())),
    ])
}

pub fn config(consider_unbound_local_pv: bool) -> PredicateConfig {
    PredicateConfig {
        reserved_cpu_annotation: CPU_KEY.to_string(),
        reserved_memory_annotation: MEM_KEY.to_string(),
        consider_unbound_local_pv,
    }
}

pub fn snapshot(
    nodes: Vec<Node>,
    pods: Vec<Pod>,
    volumes: Vec<PersistentVolume>,
    claims: Vec<PersistentVolumeClaim>,
) -> ClusterSnapshot {
    ClusterSnapshot::new(nodes, pods, volumes, claims)
}

/// Node with the given allocatable resources, labelled with its own name
pub fn build_node(name: &str, cpu: &str, memory: &str) -> Node {
    let mut node = Node::default();
    node.metadata.name = Some(name.to_string());
    node.metadata.labels = Some(BTreeMap::from([(NODE_LABEL.to_string(), name.to_string())]));
    node.status = Some(NodeStatus {
        allocatable: Some(resources(cpu, memory)),
        ..Default::default()
    });
    node
}

/// Available volume; with a node it is a local volume pinned to that node
pub fn build_pv(
    name: &str,
    node: Option<&str>,
    reserved_cpu: Option<&str>,
    reserved_memory: Option<&str>,
) -> PersistentVolume {
    let mut pv = PersistentVolume::default();
    pv.metadata.name = Some(name.to_string());

    let annotations: BTreeMap<String, String> = [(CPU_KEY, reserved_cpu), (MEM_KEY, reserved_memory)]
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| (key.to_string(), v.to_string())))
        .collect();
    if !annotations.is_empty() {
        pv.metadata.annotations = Some(annotations);
    }

    let mut spec = PersistentVolumeSpec::default();
    if let Some(node) = node {
        spec.local = Some(LocalVolumeSource {
            path: "/tmp".to_string(),
            fs_type: None,
        });
        spec.node_affinity = Some(VolumeNodeAffinity {
            required: Some(NodeSelector {
                node_selector_terms: vec![NodeSelectorTerm {
                    match_expressions: Some(vec![NodeSelectorRequirement {
                        key: NODE_LABEL.to_string(),
                        operator: "In".to_string(),
                        values: Some(vec![node.to_string()]),
                    }]),
                    match_fields: None,
                }],
            }),
        });
    }
    pv.spec = Some(spec);
    pv.status = Some(PersistentVolumeStatus {
        phase: Some("Available".to_string()),
        ..Default::default()
    });
    pv
}

pub fn with_capacity(mut pv: PersistentVolume, storage: &str) -> PersistentVolume {
    pv.spec.get_or_insert_with(Default::default).capacity = Some(BTreeMap::from([(
        "storage".to_string(),
        K8sQuantity(storage.to_string()),
    )]));
    pv
}

/// Pending claim without requests
pub fn build_pvc(namespace: &str, name: &str) -> PersistentVolumeClaim {
    let mut pvc = PersistentVolumeClaim::default();
    pvc.metadata.name = Some(name.to_string());
    pvc.metadata.namespace = Some(namespace.to_string());
    pvc.spec = Some(PersistentVolumeClaimSpec::default());
    pvc.status = Some(PersistentVolumeClaimStatus {
        phase: Some("Pending".to_string()),
        ..Default::default()
    });
    pvc
}

pub fn with_storage_request(mut pvc: PersistentVolumeClaim, storage: &str) -> PersistentVolumeClaim {
    pvc.spec.get_or_insert_with(Default::default).resources = Some(VolumeResourceRequirements {
        requests: Some(BTreeMap::from([(
            "storage".to_string(),
            K8sQuantity(storage.to_string()),
        )])),
        limits: None,
    });
    pvc
}

/// Bind volume and claim to each other
pub fn bind(pv: &mut PersistentVolume, pvc: &mut PersistentVolumeClaim) {
    pv.spec.get_or_insert_with(Default::default).claim_ref = Some(ObjectReference {
        name: pvc.metadata.name.clone(),
        namespace: pvc.metadata.namespace.clone(),
        ..Default::default()
    });
    pv.status.get_or_insert_with(Default::default).phase = Some("Bound".to_string());

    pvc.spec.get_or_insert_with(Default::default).volume_name = pv.metadata.name.clone();
    pvc.status.get_or_insert_with(Default::default).phase = Some("Bound".to_string());
}

/// Reserve a volume for a claim without binding it; the volume stays Available
pub fn pre_bind(pv: &mut PersistentVolume, pvc: &PersistentVolumeClaim, uid: Option<&str>) {
    pv.spec.get_or_insert_with(Default::default).claim_ref = Some(ObjectReference {
        name: pvc.metadata.name.clone(),
        namespace: pvc.metadata.namespace.clone(),
        uid: uid.map(str::to_string),
        ..Default::default()
    });
}

/// Pod mounting `claims`, one container per `(cpu, memory)` request
pub fn build_pod(namespace: &str, name: &str, claims: &[&str], requests: &[(&str, &str)]) -> Pod {
    let volumes = claims
        .iter()
        .map(|claim| Volume {
            name: format!("vol-{}", claim),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: claim.to_string(),
                read_only: None,
            }),
            ..Default::default()
        })
        .collect();
    let containers = requests
        .iter()
        .enumerate()
        .map(|(i, (cpu, memory))| Container {
            name: format!("c{}", i),
            resources: Some(ResourceRequirements {
                requests: Some(resources(cpu, memory)),
                ..Default::default()
            }),
            ..Default::default()
        })
        .collect();

    let mut pod = Pod::default();
    pod.metadata.name = Some(name.to_string());
    pod.metadata.namespace = Some(namespace.to_string());
    pod.spec = Some(PodSpec {
        volumes: Some(volumes),
        containers,
        ..Default::default()
    });
    pod
}

pub fn bind_node(pod: &mut Pod, node_name: &str) {
    pod.spec.get_or_insert_with(Default::default).node_name = Some(node_name.to_string());
}
