//! lpvres Predicate - Admission decisions for local PV reservations
//!
//! This crate provides:
//! - The data-access seam (`ResourceAccessor`) and an in-memory snapshot
//! - Candidate matching of unbound local volumes to claims
//! - Remaining-reservation accounting per volume and node
//! - The predicate engine and scheduler extender wire types

pub mod accessor;
pub mod config;
pub mod error;
pub mod matcher;
pub mod predicate;
pub mod reservation;
pub mod snapshot;
pub mod types;
pub mod volume;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use accessor::{AccessError, AccessResult, OptionalExt, ResourceAccessor};
pub use config::PredicateConfig;
pub use error::{PredicateError, Result};
pub use matcher::find_candidate_volumes;
pub use predicate::PredicateEngine;
pub use reservation::{RemainingReservation, ReservationAccountant};
pub use snapshot::ClusterSnapshot;
pub use types::{ExtenderArgs, ExtenderFilterResult, NodeList, NodeVerdict};
