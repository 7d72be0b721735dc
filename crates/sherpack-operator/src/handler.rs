//! Event handlers mapping dependent events to owner reconcile requests

use std::collections::BTreeSet;

use kube::api::DynamicObject;
use kube::core::GroupVersionKind;
use tracing::trace;

use crate::annotations::{self, sherpack};
use crate::event::{DependentEvent, ReconcileRequest};
use crate::manifest::gvk_from_api_version;
use crate::queue::RequestQueue;
use crate::scope::ResourceScope;
use crate::strategy::WatchStrategy;

/// Turns dependent events into queued reconcile requests
pub trait EnqueueHandler: Send + Sync {
    fn handle(&self, event: &DependentEvent, queue: &dyn RequestQueue);
}

/// Handler attached to one dependent kind subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependentHandler {
    OwnerReference(OwnerReferenceHandler),
    Annotation(AnnotationHandler),
}

impl DependentHandler {
    /// Build the handler for a strategy and owner kind
    pub fn for_owner(
        strategy: WatchStrategy,
        owner: &GroupVersionKind,
        owner_scope: ResourceScope,
    ) -> Self {
        match strategy {
            WatchStrategy::OwnerReference => Self::OwnerReference(OwnerReferenceHandler {
                group: owner.group.clone(),
                kind: owner.kind.clone(),
                owner_namespaced: owner_scope == ResourceScope::Namespaced,
            }),
            WatchStrategy::Annotation => Self::Annotation(AnnotationHandler {
                owner_type: annotations::type_annotation_for(owner),
            }),
        }
    }

    pub fn strategy(&self) -> WatchStrategy {
        match self {
            Self::OwnerReference(_) => WatchStrategy::OwnerReference,
            Self::Annotation(_) => WatchStrategy::Annotation,
        }
    }

    /// Owners to reconcile for an event, deduplicated and sorted
    pub fn requests(&self, event: &DependentEvent) -> Vec<ReconcileRequest> {
        let requests: BTreeSet<ReconcileRequest> = event
            .objects()
            .into_iter()
            .filter_map(|obj| match self {
                Self::OwnerReference(h) => h.request_for(obj),
                Self::Annotation(h) => h.request_for(obj),
            })
            .collect();
        requests.into_iter().collect()
    }
}

impl EnqueueHandler for DependentHandler {
    fn handle(&self, event: &DependentEvent, queue: &dyn RequestQueue) {
        for request in self.requests(event) {
            trace!(event = event.name(), owner = %request, "enqueue owner");
            queue.add(request);
        }
    }
}

/// Correlates through the controller owner reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerReferenceHandler {
    group: String,
    kind: String,
    owner_namespaced: bool,
}

impl OwnerReferenceHandler {
    fn request_for(&self, obj: &DynamicObject) -> Option<ReconcileRequest> {
        let owner_ref = obj
            .metadata
            .owner_references
            .as_deref()?
            .iter()
            .find(|r| {
                r.controller == Some(true)
                    && r.kind == self.kind
                    && gvk_from_api_version(&r.api_version, &r.kind).group == self.group
            })?;

        let namespace = if self.owner_namespaced {
            obj.metadata.namespace.clone()
        } else {
            None
        };
        Some(ReconcileRequest::new(namespace, owner_ref.name.clone()))
    }
}

/// Correlates through the primary-resource annotations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationHandler {
    owner_type: String,
}

impl AnnotationHandler {
    fn request_for(&self, obj: &DynamicObject) -> Option<ReconcileRequest> {
        let annotations = obj.metadata.annotations.as_ref()?;
        if annotations
            .get(sherpack::PRIMARY_RESOURCE_TYPE)
            .map(String::as_str)
            != Some(self.owner_type.as_str())
        {
            return None;
        }

        let (namespace, name) = annotations::parse_primary_resource(annotations)?;
        Some(ReconcileRequest::new(namespace, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::WorkQueue;

    fn deployment() -> GroupVersionKind {
        GroupVersionKind::gvk("apps", "v1", "Deployment")
    }

    fn object(yaml: &str) -> DynamicObject {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn by_owner_ref(owner: &GroupVersionKind, scope: ResourceScope) -> DependentHandler {
        DependentHandler::for_owner(WatchStrategy::OwnerReference, owner, scope)
    }

    fn by_annotation(owner: &GroupVersionKind) -> DependentHandler {
        DependentHandler::for_owner(WatchStrategy::Annotation, owner, ResourceScope::Namespaced)
    }

    fn owned_replica_set(owner: &str, controller: bool) -> DynamicObject {
        object(&format!(
            r#"
apiVersion: apps/v1
kind: ReplicaSet
metadata:
  name: rs
  namespace: ns
  ownerReferences:
    - apiVersion: apps/v1
      kind: Deployment
      name: {owner}
      uid: 0a1b2c
      controller: {controller}
"#
        ))
    }

    fn annotated_cluster_role(owner_type: &str, owner: &str) -> DynamicObject {
        object(&format!(
            r#"
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRole
metadata:
  name: role
  annotations:
    sherpack.io/primary-resource: {owner}
    sherpack.io/primary-resource-type: {owner_type}
"#
        ))
    }

    #[test]
    fn test_for_owner_strategy() {
        let owner = deployment();
        assert_eq!(
            by_owner_ref(&owner, ResourceScope::Namespaced).strategy(),
            WatchStrategy::OwnerReference
        );
        assert_eq!(by_annotation(&owner).strategy(), WatchStrategy::Annotation);
    }

    #[test]
    fn test_owner_reference_namespaced_owner() {
        let handler = by_owner_ref(&deployment(), ResourceScope::Namespaced);
        let event = DependentEvent::Create(owned_replica_set("app", true));

        assert_eq!(
            handler.requests(&event),
            vec![ReconcileRequest::new(Some("ns".to_string()), "app")]
        );
    }

    #[test]
    fn test_owner_reference_cluster_owner_has_no_namespace() {
        let owner = GroupVersionKind::gvk("apps", "v1", "Deployment");
        let handler = by_owner_ref(&owner, ResourceScope::Cluster);
        let event = DependentEvent::Delete(owned_replica_set("app", true));

        assert_eq!(handler.requests(&event), vec![ReconcileRequest::new(None, "app")]);
    }

    #[test]
    fn test_owner_reference_ignores_non_controller() {
        let handler = by_owner_ref(&deployment(), ResourceScope::Namespaced);
        let event = DependentEvent::Create(owned_replica_set("app", false));
        assert!(handler.requests(&event).is_empty());
    }

    #[test]
    fn test_owner_reference_ignores_other_kind() {
        let owner = GroupVersionKind::gvk("apps", "v1", "StatefulSet");
        let handler = by_owner_ref(&owner, ResourceScope::Namespaced);
        let event = DependentEvent::Create(owned_replica_set("app", true));
        assert!(handler.requests(&event).is_empty());
    }

    #[test]
    fn test_owner_reference_update_deduplicates_and_tracks_moves() {
        let handler = by_owner_ref(&deployment(), ResourceScope::Namespaced);

        let same = DependentEvent::Update {
            old: owned_replica_set("app", true),
            new: owned_replica_set("app", true),
        };
        assert_eq!(handler.requests(&same).len(), 1);

        let moved = DependentEvent::Update {
            old: owned_replica_set("old-app", true),
            new: owned_replica_set("app", true),
        };
        assert_eq!(
            handler.requests(&moved),
            vec![
                ReconcileRequest::new(Some("ns".to_string()), "app"),
                ReconcileRequest::new(Some("ns".to_string()), "old-app"),
            ]
        );
    }

    #[test]
    fn test_annotation_handler() {
        let handler = by_annotation(&deployment());
        let role = annotated_cluster_role("Deployment.apps", "ns/app");
        let event = DependentEvent::Create(role);

        assert_eq!(
            handler.requests(&event),
            vec![ReconcileRequest::new(Some("ns".to_string()), "app")]
        );
    }

    #[test]
    fn test_annotation_handler_other_owner_type() {
        let handler = by_annotation(&deployment());
        let role = annotated_cluster_role("StatefulSet.apps", "ns/app");
        let event = DependentEvent::Create(role);
        assert!(handler.requests(&event).is_empty());
    }

    #[test]
    fn test_annotation_handler_without_annotations() {
        let handler = by_annotation(&deployment());
        let event = DependentEvent::Generic(owned_replica_set("app", true));
        assert!(handler.requests(&event).is_empty());
    }

    #[test]
    fn test_handle_enqueues() {
        let queue: WorkQueue<ReconcileRequest> = WorkQueue::new();
        let handler = by_owner_ref(&deployment(), ResourceScope::Namespaced);

        handler.handle(&DependentEvent::Create(owned_replica_set("app", true)), &queue);
        handler.handle(&DependentEvent::Create(owned_replica_set("app", true)), &queue);
        assert_eq!(queue.len(), 1);
    }
}
