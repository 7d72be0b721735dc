//! Dependent resource watch registration
//!
//! After every successful release operation the reconciler hands the owner
//! and the rendered manifest to [`DependentWatcher::register_dependents`].
//! Each distinct dependent kind in the manifest gets exactly one subscription
//! with the watch registry for the lifetime of the process:
//!
//! ```text
//! manifest ──► documents ──► kind already watched? ──yes──► skip
//!                                    │ no
//!                                    ▼
//!                      resolve owner + dependent scope
//!                                    │
//!                                    ▼
//!                 select strategy (scope pairing, retention)
//!                                    │
//!                                    ▼
//!                        subscribe ──► record kind
//! ```
//!
//! Registration state is kept per owner kind. Calls for the same owner kind
//! are serialized; calls for different owner kinds never wait on each other.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use kube::core::GroupVersionKind;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::Result;
use crate::event::EventFilter;
use crate::handler::DependentHandler;
use crate::manifest::{ManifestDocument, ParsedManifest};
use crate::owner::Owner;
use crate::registry::{WatchRegistry, kind_label};
use crate::scope::ScopeResolver;
use crate::strategy::select_strategy;

/// Dependent kinds already subscribed for one owner kind
///
/// Grows monotonically. Entries are only added through
/// [`RegistrationSet::register_once`], after the subscription succeeded.
#[derive(Debug, Default)]
pub struct RegistrationSet {
    kinds: HashSet<GroupVersionKind>,
}

impl RegistrationSet {
    /// Run `subscribe` for `kind` unless it already succeeded once
    ///
    /// Returns `Ok(true)` if the subscription ran and succeeded, `Ok(false)` if
    /// the kind was already registered. On error the kind stays unregistered
    /// so a later call retries it.
    pub async fn register_once<F, Fut>(
        &mut self,
        kind: &GroupVersionKind,
        subscribe: F,
    ) -> Result<bool>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        if self.kinds.contains(kind) {
            return Ok(false);
        }
        subscribe().await?;
        self.kinds.insert(kind.clone());
        Ok(true)
    }

    /// Check if a kind is registered
    pub fn contains(&self, kind: &GroupVersionKind) -> bool {
        self.kinds.contains(kind)
    }

    /// Number of registered kinds
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    /// Check if nothing is registered yet
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

/// Registers watches for the dependents of released owners
pub struct DependentWatcher<W: WatchRegistry, S: ScopeResolver> {
    /// Registry subscriptions are issued against
    registry: Arc<W>,
    /// Scope lookups for owner and dependent kinds
    resolver: Arc<S>,
    /// Filters attached to every subscription
    filters: Vec<EventFilter>,
    /// Registration state per owner kind
    owners: Mutex<HashMap<GroupVersionKind, Arc<Mutex<RegistrationSet>>>>,
}

impl<W: WatchRegistry, S: ScopeResolver> DependentWatcher<W, S> {
    /// Create a watcher with the default event filters
    pub fn new(registry: Arc<W>, resolver: Arc<S>) -> Self {
        Self {
            registry,
            resolver,
            filters: vec![EventFilter::DependentChanges],
            owners: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the filters attached to every subscription
    pub fn with_filters(mut self, filters: Vec<EventFilter>) -> Self {
        self.filters = filters;
        self
    }

    /// Get the watch registry
    pub fn registry(&self) -> &W {
        &self.registry
    }

    async fn registration_set(&self, owner: &GroupVersionKind) -> Arc<Mutex<RegistrationSet>> {
        let mut owners = self.owners.lock().await;
        Arc::clone(owners.entry(owner.clone()).or_default())
    }

    /// Number of dependent kinds watched for an owner kind
    pub async fn registered_kinds(&self, owner: &GroupVersionKind) -> usize {
        self.registration_set(owner).await.lock().await.len()
    }

    /// Ensure every dependent kind in `manifest` is watched for `owner`
    ///
    /// Documents are processed in manifest order and the first failure aborts
    /// the pass. Subscriptions issued before the failure stay in effect;
    /// calling again after fixing the cause picks up the remaining kinds.
    pub async fn register_dependents(&self, owner: &Owner, manifest: &str) -> Result<()> {
        let parsed = ParsedManifest::parse(manifest);

        let set = self.registration_set(&owner.gvk).await;
        let mut set = set.lock().await;

        for document in &parsed.documents {
            let kind = &document.gvk;
            let subscribed = set
                .register_once(kind, || self.subscribe_dependent(owner, document))
                .await?;
            if !subscribed {
                debug!(
                    owner = %owner,
                    kind = %kind_label(kind),
                    "dependent kind already watched"
                );
            }
        }

        match parsed.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn subscribe_dependent(&self, owner: &Owner, document: &ManifestDocument) -> Result<()> {
        let owner_scope = self.resolver.resolve_scope(&owner.gvk).await?;
        let dependent_scope = self.resolver.resolve_scope(&document.gvk).await?;
        let strategy = select_strategy(owner_scope, dependent_scope, document.is_retained());

        let handler = DependentHandler::for_owner(strategy, &owner.gvk, owner_scope);
        self.registry
            .subscribe(&document.gvk, handler, self.filters.clone())
            .await?;

        info!(
            owner = %owner,
            kind = %kind_label(&document.gvk),
            resource = %document.display_name(),
            %strategy,
            "watching dependent resources"
        );
        Ok(())
    }
}
