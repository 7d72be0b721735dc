//! Annotation handling for dependent resources
//!
//! Sherpack reads both `sherpack.io/*` and `helm.sh/*` resource policies so
//! that charts migrated from Helm keep their retention semantics.
//!
//! Dependents that cannot carry an owner reference are correlated with their
//! owner through the primary-resource annotations:
//!
//! ```yaml
//! metadata:
//!   annotations:
//!     sherpack.io/primary-resource: ns/app
//!     sherpack.io/primary-resource-type: Deployment.apps
//! ```

use std::collections::BTreeMap;

use kube::core::GroupVersionKind;

use crate::owner::Owner;

/// Sherpack-native annotations
pub mod sherpack {
    /// Resource policy (keep on uninstall)
    pub const RESOURCE_POLICY: &str = "sherpack.io/resource-policy";
    /// `namespace/name` (or `name`) of the owning resource
    pub const PRIMARY_RESOURCE: &str = "sherpack.io/primary-resource";
    /// `Kind.group` of the owning resource
    pub const PRIMARY_RESOURCE_TYPE: &str = "sherpack.io/primary-resource-type";
}

/// Helm-compatible annotations (for migration)
pub mod helm {
    /// Resource policy (keep on uninstall)
    pub const RESOURCE_POLICY: &str = "helm.sh/resource-policy";
}

/// Resource policy value that retains a resource when its owner goes away
pub const RESOURCE_POLICY_KEEP: &str = "keep";

/// Get annotation value, preferring Sherpack over Helm
pub fn get_annotation<'a>(
    annotations: &'a BTreeMap<String, String>,
    sherpack_key: &str,
    helm_key: &str,
) -> Option<&'a str> {
    annotations
        .get(sherpack_key)
        .or_else(|| annotations.get(helm_key))
        .map(|s| s.as_str())
}

/// Check if a resource must survive deletion of its owner
pub fn is_retained(annotations: &BTreeMap<String, String>) -> bool {
    get_annotation(
        annotations,
        sherpack::RESOURCE_POLICY,
        helm::RESOURCE_POLICY,
    )
    .is_some_and(|policy| policy.trim() == RESOURCE_POLICY_KEEP)
}

/// Format the primary-resource-type value for a kind
///
/// - `apps/v1 Deployment` -> `Deployment.apps`
/// - `v1 ConfigMap` -> `ConfigMap`
pub fn type_annotation_for(gvk: &GroupVersionKind) -> String {
    if gvk.group.is_empty() {
        gvk.kind.clone()
    } else {
        format!("{}.{}", gvk.kind, gvk.group)
    }
}

/// Tag a dependent's annotations with its owner
pub fn set_owner_annotations(annotations: &mut BTreeMap<String, String>, owner: &Owner) {
    annotations.insert(
        sherpack::PRIMARY_RESOURCE.to_string(),
        owner.namespaced_name(),
    );
    annotations.insert(
        sherpack::PRIMARY_RESOURCE_TYPE.to_string(),
        type_annotation_for(&owner.gvk),
    );
}

/// Parse the primary-resource annotation into `(namespace, name)`
///
/// Returns `None` when the annotation is missing or has an empty name.
pub fn parse_primary_resource(
    annotations: &BTreeMap<String, String>,
) -> Option<(Option<String>, String)> {
    let value = annotations.get(sherpack::PRIMARY_RESOURCE)?.trim();
    let (namespace, name) = match value.split_once('/') {
        Some((ns, name)) if !ns.is_empty() => (Some(ns.to_string()), name),
        Some((_, name)) => (None, name),
        None => (None, value),
    };

    if name.is_empty() {
        return None;
    }
    Some((namespace, name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotations(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_is_retained_helm_key() {
        assert!(is_retained(&annotations(&[("helm.sh/resource-policy", "keep")])));
    }

    #[test]
    fn test_is_retained_sherpack_key() {
        assert!(is_retained(&annotations(&[(
            "sherpack.io/resource-policy",
            "keep"
        )])));
    }

    #[test]
    fn test_sherpack_policy_wins_over_helm() {
        let a = annotations(&[
            ("sherpack.io/resource-policy", "delete"),
            ("helm.sh/resource-policy", "keep"),
        ]);
        assert!(!is_retained(&a));
    }

    #[test]
    fn test_not_retained() {
        assert!(!is_retained(&BTreeMap::new()));
        assert!(!is_retained(&annotations(&[("helm.sh/resource-policy", "Keep")])));
        assert!(!is_retained(&annotations(&[("other", "keep")])));
    }

    #[test]
    fn test_type_annotation_for() {
        let apps = GroupVersionKind::gvk("apps", "v1", "Deployment");
        assert_eq!(type_annotation_for(&apps), "Deployment.apps");

        let core = GroupVersionKind::gvk("", "v1", "ConfigMap");
        assert_eq!(type_annotation_for(&core), "ConfigMap");
    }

    #[test]
    fn test_set_and_parse_owner_annotations() {
        let owner = Owner::new(
            GroupVersionKind::gvk("apps", "v1", "Deployment"),
            Some("ns".to_string()),
            "app",
        );
        let mut a = BTreeMap::new();
        set_owner_annotations(&mut a, &owner);

        assert_eq!(a[sherpack::PRIMARY_RESOURCE], "ns/app");
        assert_eq!(a[sherpack::PRIMARY_RESOURCE_TYPE], "Deployment.apps");
        assert_eq!(
            parse_primary_resource(&a),
            Some((Some("ns".to_string()), "app".to_string()))
        );
    }

    #[test]
    fn test_parse_primary_resource_cluster_scoped() {
        let a = annotations(&[(sherpack::PRIMARY_RESOURCE, "global")]);
        assert_eq!(parse_primary_resource(&a), Some((None, "global".to_string())));

        let a = annotations(&[(sherpack::PRIMARY_RESOURCE, "/global")]);
        assert_eq!(parse_primary_resource(&a), Some((None, "global".to_string())));
    }

    #[test]
    fn test_parse_primary_resource_invalid() {
        assert_eq!(parse_primary_resource(&BTreeMap::new()), None);
        let a = annotations(&[(sherpack::PRIMARY_RESOURCE, "ns/")]);
        assert_eq!(parse_primary_resource(&a), None);
    }
}
