use crate::{CoreError, Result};
use k8s_openapi::api::core::v1::{Node, NodeSelectorRequirement, NodeSelectorTerm};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Node field usable in `matchFields`
const NODE_NAME_FIELD: &str = "metadata.name";

/// Whether a node satisfies any of the given node selector terms
///
/// Terms are ORed and the requirements inside a term are ANDed. A term with
/// neither expressions nor fields matches nothing, and a term holding an
/// invalid requirement does not match.
pub fn node_matches_selector_terms(node: &Node, terms: &[NodeSelectorTerm]) -> bool {
    let labels = node.metadata.labels.as_ref();
    let name = node.metadata.name.as_deref().unwrap_or_default();

    terms.iter().any(|term| term_matches(term, labels, name))
}

fn term_matches(
    term: &NodeSelectorTerm,
    labels: Option<&BTreeMap<String, String>>,
    node_name: &str,
) -> bool {
    let expressions = term.match_expressions.as_deref().unwrap_or_default();
    let fields = term.match_fields.as_deref().unwrap_or_default();
    if expressions.is_empty() && fields.is_empty() {
        return false;
    }

    let evaluated = expressions
        .iter()
        .map(|req| expression_matches(req, labels.and_then(|l| l.get(&req.key)).map(String::as_str)))
        .chain(fields.iter().map(|req| field_matches(req, node_name)))
        .collect::<Result<Vec<bool>>>();

    match evaluated {
        Ok(results) => results.into_iter().all(|matched| matched),
        Err(e) => {
            debug!("Node selector term ignored: {}", e);
            false
        }
    }
}

fn expression_matches(req: &NodeSelectorRequirement, value: Option<&str>) -> Result<bool> {
    let values = req.values.as_deref().unwrap_or_default();

    match req.operator.as_str() {
        "Gt" | "Lt" => {
            let [bound] = values else {
                return Err(CoreError::invalid_selector(format!(
                    "operator {} on '{}' needs exactly one value",
                    req.operator, req.key
                )));
            };
            let bound: i64 = bound.parse().map_err(|_| {
                CoreError::invalid_selector(format!(
                    "operator {} on '{}' needs an integer value, got '{}'",
                    req.operator, req.key, bound
                ))
            })?;
            let Some(actual) = value.and_then(|v| v.parse::<i64>().ok()) else {
                return Ok(false);
            };
            Ok(if req.operator == "Gt" {
                actual > bound
            } else {
                actual < bound
            })
        }
        _ => Requirement::new(&req.key, &req.operator, values).map(|r| r.matches(value)),
    }
}

fn field_matches(req: &NodeSelectorRequirement, node_name: &str) -> Result<bool> {
    if req.key != NODE_NAME_FIELD {
        return Err(CoreError::invalid_selector(format!(
            "unsupported node field '{}'",
            req.key
        )));
    }
    if !matches!(req.operator.as_str(), "In" | "NotIn") {
        return Err(CoreError::invalid_selector(format!(
            "operator {} is not supported for node fields",
            req.operator
        )));
    }
    let values = req.values.as_deref().unwrap_or_default();
    Requirement::new(&req.key, &req.operator, values).map(|r| r.matches(Some(node_name)))
}

/// One set-based requirement on a single key
#[derive(Debug, Clone, PartialEq, Eq)]
enum Requirement {
    In { key: String, values: BTreeSet<String> },
    NotIn { key: String, values: BTreeSet<String> },
    Exists { key: String },
    DoesNotExist { key: String },
}

impl Requirement {
    fn new(key: &str, operator: &str, values: &[String]) -> Result<Self> {
        if key.is_empty() {
            return Err(CoreError::invalid_selector("requirement key is empty"));
        }
        let key = key.to_string();
        let set: BTreeSet<String> = values.iter().cloned().collect();

        match operator {
            "In" | "NotIn" if set.is_empty() => Err(CoreError::invalid_selector(format!(
                "operator {} on '{}' needs at least one value",
                operator, key
            ))),
            "Exists" | "DoesNotExist" if !set.is_empty() => Err(CoreError::invalid_selector(
                format!("operator {} on '{}' takes no values", operator, key),
            )),
            "In" => Ok(Self::In { key, values: set }),
            "NotIn" => Ok(Self::NotIn { key, values: set }),
            "Exists" => Ok(Self::Exists { key }),
            "DoesNotExist" => Ok(Self::DoesNotExist { key }),
            other => Err(CoreError::invalid_selector(format!(
                "operator '{}' is not supported",
                other
            ))),
        }
    }

    fn key(&self) -> &str {
        match self {
            Self::In { key, .. }
            | Self::NotIn { key, .. }
            | Self::Exists { key }
            | Self::DoesNotExist { key } => key,
        }
    }

    /// `value` is the object's value for this requirement's key, if any
    fn matches(&self, value: Option<&str>) -> bool {
        match self {
            Self::In { values, .. } => value.is_some_and(|v| values.contains(v)),
            Self::NotIn { values, .. } => !value.is_some_and(|v| values.contains(v)),
            Self::Exists { .. } => value.is_some(),
            Self::DoesNotExist { .. } => value.is_none(),
        }
    }
}

/// A validated label selector, ready to test label sets
///
/// An empty selector matches everything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledLabelSelector {
    requirements: Vec<Requirement>,
}

impl CompiledLabelSelector {
    /// Validate and compile a selector; malformed selectors fail here
    pub fn compile(selector: &LabelSelector) -> Result<Self> {
        let from_labels = selector
            .match_labels
            .iter()
            .flatten()
            .map(|(key, value)| Requirement::new(key, "In", std::slice::from_ref(value)));
        let from_expressions = selector
            .match_expressions
            .iter()
            .flatten()
            .map(|req| Requirement::new(&req.key, &req.operator, req.values.as_deref().unwrap_or_default()));

        let requirements = from_labels
            .chain(from_expressions)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { requirements })
    }

    /// Whether a label set satisfies every requirement
    pub fn matches(&self, labels: Option<&BTreeMap<String, String>>) -> bool {
        self.requirements.iter().all(|req| {
            let value = labels.and_then(|l| l.get(req.key())).map(String::as_str);
            req.matches(value)
        })
    }

    /// Whether this selector has no requirements
    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }
}
