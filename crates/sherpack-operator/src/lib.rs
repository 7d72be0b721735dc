//! Sherpack Operator - dependent resource watches for release reconcilers
//!
//! This crate provides:
//! - **Dependent Watches**: One subscription per dependent kind and owner kind, registered from rendered manifests
//! - **Watch Strategies**: Owner-reference routing where Kubernetes allows it, annotation routing otherwise
//! - **Scope Resolution**: Discovery-backed lookup of namespaced vs cluster-scoped kinds
//! - **Event Routing**: Dependent events mapped back to owner reconcile requests
//! - **Work Queue**: Deduplicating reconcile queue with exponential retry backoff
//! - **Watches Config**: YAML watch configuration with per-kind selectors and backoff

pub mod annotations;
pub mod config;
pub mod error;
pub mod event;
pub mod handler;
pub mod manifest;
pub mod owner;
pub mod queue;
pub mod registrar;
pub mod registry;
pub mod requeue;
pub mod scope;
pub mod strategy;

pub use config::{BackoffConfig, WatchConfig, WatchesFile};
pub use error::{OperatorError, Result};
pub use event::{DependentEvent, EventFilter, ReconcileRequest};
pub use handler::{AnnotationHandler, DependentHandler, EnqueueHandler, OwnerReferenceHandler};
pub use manifest::{ManifestDocument, ParsedManifest};
pub use owner::Owner;
pub use queue::{RequestQueue, WorkQueue};
pub use registrar::{DependentWatcher, RegistrationSet};
pub use registry::{KubeWatchRegistry, MockWatchRegistry, Subscription, WatchRegistry};
pub use requeue::RequeueFilter;
pub use scope::{DiscoveryScopeResolver, ResourceScope, ScopeResolver, StaticScopeResolver};
pub use strategy::{WatchStrategy, select_strategy, supports_owner_references};
