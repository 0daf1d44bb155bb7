//! Typed identifiers shared across execution components.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique per-query identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryId(
    /// Raw uuid value.
    pub Uuid,
);

impl QueryId {
    /// Generate a fresh random query id.
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable plan-node identifier assigned by the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlanNodeId(
    /// Raw numeric id value.
    pub u64,
);

impl fmt::Display for PlanNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one function call site inside a node's expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CallSiteId(
    /// Raw numeric id value.
    pub u64,
);

impl fmt::Display for CallSiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_ids_are_unique() {
        assert_ne!(QueryId::new_v4(), QueryId::new_v4());
    }

    #[test]
    fn ids_round_trip_through_json() {
        let id = PlanNodeId(7);
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "7");
        let back: PlanNodeId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, id);
        assert_eq!(CallSiteId(3).to_string(), "3");
    }
}
