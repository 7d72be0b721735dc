//! Watch registries that dependent subscriptions are issued against
//!
//! - **Cluster** ([`KubeWatchRegistry`]): starts a Kubernetes watch per kind
//!   and feeds the controller's work queue
//! - **Mock** ([`MockWatchRegistry`]): records subscriptions in memory, for
//!   tests without a cluster
//!
//! Registries are not trusted to deduplicate: callers must subscribe each kind
//! once.

mod cluster;
mod mock;

pub use cluster::KubeWatchRegistry;
pub use mock::{MockWatchRegistry, Subscription};

use async_trait::async_trait;
use kube::core::GroupVersionKind;

use crate::error::Result;
use crate::event::EventFilter;
use crate::handler::DependentHandler;

/// Accepts subscriptions for dependent kinds
///
/// Implementations must be Send + Sync for use across async tasks.
#[async_trait]
pub trait WatchRegistry: Send + Sync {
    /// Start observing every resource of `kind`, routing events that pass
    /// `filters` through `handler`
    async fn subscribe(
        &self,
        kind: &GroupVersionKind,
        handler: DependentHandler,
        filters: Vec<EventFilter>,
    ) -> Result<()>;
}

/// `apiVersion/Kind` label for logs and errors
pub fn kind_label(gvk: &GroupVersionKind) -> String {
    format!("{}/{}", gvk.api_version(), gvk.kind)
}
