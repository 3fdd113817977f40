// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use crate::accessor::AccessError;
use miette::Diagnostic;
use thiserror::Error;

/// Predicate error type
#[derive(Error, Debug, Diagnostic)]
pub enum PredicateError {
    /// Reading cluster state failed
    #[error("Failed to read cluster state: {0}")]
    #[diagnostic(
        code(predicate::access_error),
        help("Check the cluster cache and the API server it syncs from")
    )]
    Access(#[from] AccessError),

    /// A claim carries a label selector that cannot be evaluated
    #[error("Invalid label selector on claim {claim}: {source}")]
    #[diagnostic(
        code(predicate::invalid_claim_selector),
        help("Fix the claim's spec.selector; matching is skipped for it until then")
    )]
    InvalidClaimSelector {
        claim: String,
        #[source]
        source: lpvres_core::CoreError,
    },

    /// Evaluating one node failed; the whole request is aborted
    #[error("Failed to predicate pod {pod} on node {node}: {source}")]
    #[diagnostic(
        code(predicate::node_evaluation_failed),
        help("The request is retried by the scheduler once cluster state is readable")
    )]
    NodeEvaluation {
        pod: String,
        node: String,
        #[source]
        source: Box<PredicateError>,
    },
}

/// Result type for predicate operations
pub type Result<T> = std::result::Result<T, PredicateError>;

impl PredicateError {
    /// Create an InvalidClaimSelector error
    pub fn invalid_claim_selector(claim: impl Into<String>, source: lpvres_core::CoreError) -> Self {
        Self::InvalidClaimSelector {
            claim: claim.into(),
            source,
        }
    }

    /// Wrap an error with the pod and node being evaluated
    pub fn node_evaluation(pod: impl Into<String>, node: impl Into<String>, source: PredicateError) -> Self {
        Self::NodeEvaluation {
            pod: pod.into(),
            node: node.into(),
            source: Box::new(source),
        }
    }
}
