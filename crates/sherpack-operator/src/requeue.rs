//! Suppress redundant requeues
//!
//! A burst of dependent events for the same owner would otherwise add the
//! owner again and again while a backed-off retry is already scheduled,
//! bypassing the backoff. [`RequeueFilter`] wraps a handler and drops adds for
//! requests that have a retry outstanding. Requests without one are passed
//! through untouched.

use tracing::trace;

use crate::event::{DependentEvent, ReconcileRequest};
use crate::handler::EnqueueHandler;
use crate::queue::RequestQueue;

/// Handler wrapper that never schedules a second pending retry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequeueFilter<H> {
    inner: H,
}

impl<H> RequeueFilter<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }

    /// The wrapped handler
    pub fn inner(&self) -> &H {
        &self.inner
    }
}

impl<H: EnqueueHandler> EnqueueHandler for RequeueFilter<H> {
    fn handle(&self, event: &DependentEvent, queue: &dyn RequestQueue) {
        self.inner.handle(event, &SkipPendingRetries { queue });
    }
}

struct SkipPendingRetries<'a> {
    queue: &'a dyn RequestQueue,
}

impl RequestQueue for SkipPendingRetries<'_> {
    fn add(&self, request: ReconcileRequest) {
        let requeues = self.queue.num_requeues(&request);
        if requeues > 0 {
            trace!(owner = %request, requeues, "retry already pending, skipping add");
            return;
        }
        self.queue.add(request);
    }

    fn num_requeues(&self, request: &ReconcileRequest) -> u32 {
        self.queue.num_requeues(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackoffConfig;
    use crate::handler::DependentHandler;
    use crate::queue::WorkQueue;
    use crate::scope::ResourceScope;
    use crate::strategy::WatchStrategy;
    use kube::api::DynamicObject;
    use kube::core::GroupVersionKind;
    use std::time::Duration;

    fn owned_pod(owner: &str) -> DependentEvent {
        let obj: DynamicObject = serde_yaml::from_str(&format!(
            r#"
apiVersion: v1
kind: Pod
metadata:
  name: pod
  namespace: ns
  ownerReferences:
    - apiVersion: apps/v1
      kind: Deployment
      name: {owner}
      uid: "1234"
      controller: true
"#
        ))
        .unwrap();
        DependentEvent::Create(obj)
    }

    fn filter() -> RequeueFilter<DependentHandler> {
        RequeueFilter::new(DependentHandler::for_owner(
            WatchStrategy::OwnerReference,
            &GroupVersionKind::gvk("apps", "v1", "Deployment"),
            ResourceScope::Namespaced,
        ))
    }

    fn slow_queue() -> WorkQueue<ReconcileRequest> {
        WorkQueue::with_backoff(BackoffConfig {
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(60),
        })
    }

    #[test]
    fn test_passes_without_pending_retry() {
        let queue = slow_queue();
        filter().handle(&owned_pod("app"), &queue);
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_suppresses_with_pending_retry() {
        let queue = slow_queue();
        let request = ReconcileRequest::new(Some("ns".to_string()), "app");
        queue.add_rate_limited(request.clone());
        assert_eq!(queue.num_requeues(&request), 1);

        filter().handle(&owned_pod("app"), &queue);
        assert_eq!(queue.len(), 0);
    }

    #[tokio::test]
    async fn test_only_affects_requests_with_retries() {
        let queue = slow_queue();
        queue.add_rate_limited(ReconcileRequest::new(Some("ns".to_string()), "app"));

        let filter = filter();
        filter.handle(&owned_pod("app"), &queue);
        filter.handle(&owned_pod("other"), &queue);
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_passes_again_after_forget() {
        let queue = slow_queue();
        let request = ReconcileRequest::new(Some("ns".to_string()), "app");
        queue.add_rate_limited(request.clone());
        queue.forget(&request);

        filter().handle(&owned_pod("app"), &queue);
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_inner_handler_alone_adds_despite_retry() {
        let queue = slow_queue();
        queue.add_rate_limited(ReconcileRequest::new(Some("ns".to_string()), "app"));

        filter().inner().handle(&owned_pod("app"), &queue);
        assert_eq!(queue.len(), 1);
    }
}
