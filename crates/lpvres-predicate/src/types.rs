use k8s_openapi::apimachinery::pkg::apis::meta::v1::ListMeta;
use lpvres_core::{Node, Pod};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A list of nodes as carried by the extender protocol
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeList {
    #[serde(rename = "apiVersion", default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ListMeta>,
    #[serde(default, alias = "Items")]
    pub items: Vec<Node>,
}

/// Filter request sent by the scheduler
///
/// Field names follow the extender protocol; the capitalised spellings are
/// accepted too.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtenderArgs {
    /// Pod being scheduled
    #[serde(default, alias = "Pod", skip_serializing_if = "Option::is_none")]
    pub pod: Option<Pod>,
    /// Full candidate node objects
    #[serde(default, alias = "Nodes", skip_serializing_if = "Option::is_none")]
    pub nodes: Option<NodeList>,
    /// Candidate node names, used instead of `nodes` when present
    #[serde(
        rename = "nodenames",
        default,
        alias = "NodeNames",
        alias = "nodeNames",
        skip_serializing_if = "Option::is_none"
    )]
    pub node_names: Option<Vec<String>>,
}

impl ExtenderArgs {
    /// Names of the candidate nodes, in request order
    ///
    /// Empty when the request carries no pod or no candidates.
    pub fn candidate_node_names(&self) -> Vec<String> {
        if self.pod.is_none() {
            return Vec::new();
        }
        if let Some(names) = &self.node_names {
            return names.clone();
        }
        self.nodes
            .iter()
            .flat_map(|list| list.items.iter())
            .filter_map(|node| node.metadata.name.clone())
            .collect()
    }

    /// The supplied node objects, when the request sent objects rather than names
    pub fn supplied_nodes(&self) -> Option<&NodeList> {
        match (&self.pod, &self.node_names, &self.nodes) {
            (Some(_), None, Some(nodes)) => Some(nodes),
            _ => None,
        }
    }
}

/// Filter response returned to the scheduler
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtenderFilterResult {
    /// Fit node objects, only when the request supplied node objects
    #[serde(default, alias = "Nodes", skip_serializing_if = "Option::is_none")]
    pub nodes: Option<NodeList>,
    /// Fit node names
    #[serde(
        rename = "nodenames",
        default,
        alias = "NodeNames",
        skip_serializing_if = "Option::is_none"
    )]
    pub node_names: Option<Vec<String>>,
    /// Unfit node name to reason
    #[serde(rename = "failedNodes", default, alias = "FailedNodes")]
    pub failed_nodes: BTreeMap<String, String>,
    /// Set when the request could not be evaluated
    #[serde(default, alias = "Error", skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExtenderFilterResult {
    /// Successful result with no candidates
    pub fn empty() -> Self {
        Self {
            node_names: Some(Vec::new()),
            ..Default::default()
        }
    }

    /// Result carrying only an error
    pub fn from_error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }

    /// Collect per-node verdicts, keeping the fit nodes in input order
    pub fn from_verdicts(verdicts: impl IntoIterator<Item = NodeVerdict>) -> Self {
        let mut result = Self::empty();
        for verdict in verdicts {
            match verdict.reason {
                None => result
                    .node_names
                    .get_or_insert_with(Vec::new)
                    .push(verdict.node_name),
                Some(reason) => {
                    result.failed_nodes.insert(verdict.node_name, reason);
                }
            }
        }
        result
    }

    /// Fill `nodes` with the supplied objects of every fit node, in fit order
    pub fn attach_nodes(&mut self, supplied: &NodeList) {
        let by_name: HashMap<&str, &Node> = supplied
            .items
            .iter()
            .filter_map(|node| node.metadata.name.as_deref().map(|name| (name, node)))
            .collect();

        let items = self
            .node_names
            .iter()
            .flatten()
            .filter_map(|name| by_name.get(name.as_str()).map(|node| (*node).clone()))
            .collect();

        self.nodes = Some(NodeList {
            items,
            ..supplied.clone()
        });
    }

    /// Whether the request was evaluated without error
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of evaluating one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeVerdict {
    /// Node name
    pub node_name: String,
    /// Reason for failure, `None` when the node passed
    pub reason: Option<String>,
}

impl NodeVerdict {
    /// Create a passing verdict
    pub fn pass(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
            reason: None,
        }
    }

    /// Create a failing verdict
    pub fn fail(node_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
            reason: Some(reason.into()),
        }
    }

    /// Whether the node passed
    pub fn passed(&self) -> bool {
        self.reason.is_none()
    }
}
