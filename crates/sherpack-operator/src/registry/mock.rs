//! Mock watch registry for testing
//!
//! This registry records subscriptions in memory, useful for unit tests
//! without requiring a Kubernetes cluster.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use kube::core::GroupVersionKind;

use super::{WatchRegistry, kind_label};
use crate::error::{OperatorError, Result};
use crate::event::EventFilter;
use crate::handler::DependentHandler;

/// A recorded subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub kind: GroupVersionKind,
    pub handler: DependentHandler,
    pub filters: Vec<EventFilter>,
}

/// In-memory watch registry for testing
#[derive(Clone, Default)]
pub struct MockWatchRegistry {
    /// Successful subscriptions, in call order
    subscriptions: Arc<Mutex<Vec<Subscription>>>,
    /// Kinds whose subscription fails, with the failure message
    failures: Arc<Mutex<HashMap<GroupVersionKind, String>>>,
    /// Total subscribe calls, including failed ones
    calls: Arc<Mutex<usize>>,
    /// Simulated I/O latency per call
    latency: Option<Duration>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockWatchRegistry {
    /// Create a new empty mock registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long in every subscribe call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make subscriptions for `kind` fail
    pub fn fail_kind(&self, kind: GroupVersionKind, message: impl Into<String>) {
        lock(&self.failures).insert(kind, message.into());
    }

    /// Let subscriptions for `kind` succeed again
    pub fn clear_failure(&self, kind: &GroupVersionKind) {
        lock(&self.failures).remove(kind);
    }

    /// All successful subscriptions
    pub fn subscriptions(&self) -> Vec<Subscription> {
        lock(&self.subscriptions).clone()
    }

    /// Successful subscriptions for one kind
    pub fn subscriptions_for(&self, kind: &GroupVersionKind) -> Vec<Subscription> {
        lock(&self.subscriptions)
            .iter()
            .filter(|s| &s.kind == kind)
            .cloned()
            .collect()
    }

    /// Number of subscribe calls, including failed ones
    pub fn call_count(&self) -> usize {
        *lock(&self.calls)
    }
}

#[async_trait]
impl WatchRegistry for MockWatchRegistry {
    async fn subscribe(
        &self,
        kind: &GroupVersionKind,
        handler: DependentHandler,
        filters: Vec<EventFilter>,
    ) -> Result<()> {
        *lock(&self.calls) += 1;

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let failure = lock(&self.failures).get(kind).cloned();
        if let Some(message) = failure {
            return Err(OperatorError::Subscription {
                kind: kind_label(kind),
                message,
            });
        }

        lock(&self.subscriptions).push(Subscription {
            kind: kind.clone(),
            handler,
            filters,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::ResourceScope;
    use crate::strategy::WatchStrategy;

    fn config_maps() -> GroupVersionKind {
        GroupVersionKind::gvk("", "v1", "ConfigMap")
    }

    fn handler() -> DependentHandler {
        DependentHandler::for_owner(
            WatchStrategy::OwnerReference,
            &GroupVersionKind::gvk("apps", "v1", "Deployment"),
            ResourceScope::Namespaced,
        )
    }

    #[tokio::test]
    async fn test_mock_records_subscriptions() {
        let registry = MockWatchRegistry::new();
        registry
            .subscribe(&config_maps(), handler(), vec![EventFilter::DependentChanges])
            .await
            .unwrap();

        let subs = registry.subscriptions();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].kind, config_maps());
        assert_eq!(subs[0].filters, vec![EventFilter::DependentChanges]);
        assert_eq!(registry.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_does_not_deduplicate() {
        let registry = MockWatchRegistry::new();
        registry.subscribe(&config_maps(), handler(), vec![]).await.unwrap();
        registry.subscribe(&config_maps(), handler(), vec![]).await.unwrap();
        assert_eq!(registry.subscriptions_for(&config_maps()).len(), 2);
    }

    #[tokio::test]
    async fn test_mock_injected_failure() {
        let registry = MockWatchRegistry::new();
        registry.fail_kind(config_maps(), "watch refused");

        let result = registry.subscribe(&config_maps(), handler(), vec![]).await;
        assert!(matches!(result, Err(OperatorError::Subscription { .. })));
        assert!(registry.subscriptions().is_empty());
        assert_eq!(registry.call_count(), 1);

        registry.clear_failure(&config_maps());
        registry.subscribe(&config_maps(), handler(), vec![]).await.unwrap();
        assert_eq!(registry.subscriptions().len(), 1);
    }
}
