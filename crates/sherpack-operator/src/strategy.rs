//! Choosing how dependent events are mapped back to their owner
//!
//! Owner references are only valid when the API server would accept them:
//!
//! | owner     | dependent  | owner references |
//! |-----------|------------|------------------|
//! | Cluster   | Cluster    | yes              |
//! | Cluster   | Namespaced | yes              |
//! | Namespaced| Namespaced | yes              |
//! | Namespaced| Cluster    | no               |
//!
//! Retained resources (`resource-policy: keep`) never get owner references,
//! otherwise garbage collection would delete them with the owner.

use std::fmt;

use crate::scope::ResourceScope;

/// Event correlation strategy for one dependent kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchStrategy {
    /// Follow the controller owner reference on the dependent
    OwnerReference,
    /// Follow the primary-resource annotations on the dependent
    Annotation,
}

impl fmt::Display for WatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OwnerReference => write!(f, "owner-reference"),
            Self::Annotation => write!(f, "annotation"),
        }
    }
}

/// Whether an owner of `owner` scope may own a dependent of `dependent` scope
/// through owner references
///
/// Namespace equality is not considered: this is about API mechanics only.
pub fn supports_owner_references(owner: ResourceScope, dependent: ResourceScope) -> bool {
    owner == ResourceScope::Cluster || dependent == ResourceScope::Namespaced
}

/// Select the strategy for a dependent kind
pub fn select_strategy(
    owner: ResourceScope,
    dependent: ResourceScope,
    retained: bool,
) -> WatchStrategy {
    if retained || !supports_owner_references(owner, dependent) {
        WatchStrategy::Annotation
    } else {
        WatchStrategy::OwnerReference
    }
}

#[cfg(test)]
mod tests {
    use super::ResourceScope::{Cluster, Namespaced};
    use super::*;

    #[test]
    fn test_supports_owner_references() {
        assert!(supports_owner_references(Cluster, Cluster));
        assert!(supports_owner_references(Cluster, Namespaced));
        assert!(supports_owner_references(Namespaced, Namespaced));
        assert!(!supports_owner_references(Namespaced, Cluster));
    }

    #[test]
    fn test_select_strategy_table() {
        let cases = [
            (Cluster, Cluster, false, WatchStrategy::OwnerReference),
            (Cluster, Namespaced, false, WatchStrategy::OwnerReference),
            (Namespaced, Namespaced, false, WatchStrategy::OwnerReference),
            (Namespaced, Cluster, false, WatchStrategy::Annotation),
            (Namespaced, Namespaced, true, WatchStrategy::Annotation),
            (Cluster, Cluster, true, WatchStrategy::Annotation),
            (Cluster, Namespaced, true, WatchStrategy::Annotation),
            (Namespaced, Cluster, true, WatchStrategy::Annotation),
        ];

        for (owner, dependent, retained, expected) in cases {
            assert_eq!(
                select_strategy(owner, dependent, retained),
                expected,
                "owner={owner} dependent={dependent} retained={retained}"
            );
        }
    }

    #[test]
    fn test_strategy_display() {
        assert_eq!(WatchStrategy::OwnerReference.to_string(), "owner-reference");
        assert_eq!(WatchStrategy::Annotation.to_string(), "annotation");
    }
}
