//! Resource scope resolution
//!
//! Deciding how a dependent is correlated with its owner requires knowing
//! whether each kind is namespaced or cluster-wide. That answer comes from
//! API discovery in a cluster, or from a fixed table in tests.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use kube::Client;
use kube::core::GroupVersionKind;
use kube::discovery::{Discovery, Scope};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{OperatorError, Result};

/// Whether a kind lives in a namespace or cluster-wide
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceScope {
    Namespaced,
    Cluster,
}

impl From<Scope> for ResourceScope {
    fn from(scope: Scope) -> Self {
        match scope {
            Scope::Namespaced => Self::Namespaced,
            Scope::Cluster => Self::Cluster,
        }
    }
}

impl fmt::Display for ResourceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Namespaced => write!(f, "Namespaced"),
            Self::Cluster => write!(f, "Cluster"),
        }
    }
}

/// Answers the scope of a kind
///
/// Implementations must return [`OperatorError::KindNotFound`] for kinds they
/// do not know, never a default scope.
#[async_trait]
pub trait ScopeResolver: Send + Sync {
    async fn resolve_scope(&self, gvk: &GroupVersionKind) -> Result<ResourceScope>;
}

/// `KindNotFound` for `gvk`, listing the versions served for its group and
/// kind followed by the requested version
fn kind_not_found(gvk: &GroupVersionKind, mut served: Vec<String>) -> OperatorError {
    if !served.contains(&gvk.version) {
        served.push(gvk.version.clone());
    }
    OperatorError::KindNotFound {
        group: gvk.group.clone(),
        kind: gvk.kind.clone(),
        versions: served,
    }
}

/// Versions of the group that serve `gvk.kind`, in discovery priority order
fn served_versions(discovery: &Discovery, gvk: &GroupVersionKind) -> Vec<String> {
    let Some(group) = discovery.get(&gvk.group) else {
        return Vec::new();
    };
    group
        .versions()
        .filter(|version| {
            group
                .versioned_resources(version)
                .iter()
                .any(|(resource, _)| resource.kind == gvk.kind)
        })
        .map(str::to_string)
        .collect()
}

/// Scope resolver backed by Kubernetes API discovery
///
/// Discovery results are cached. A lookup miss refreshes the cache once, so a
/// CRD installed by the release itself becomes resolvable.
pub struct DiscoveryScopeResolver {
    client: Client,
    discovery: RwLock<Discovery>,
}

impl DiscoveryScopeResolver {
    /// Create a resolver, running discovery against the cluster
    pub async fn new(client: Client) -> Result<Self> {
        let discovery = Discovery::new(client.clone()).run().await?;
        Ok(Self::with_discovery(client, discovery))
    }

    /// Create from an existing discovery (for reuse)
    pub fn with_discovery(client: Client, discovery: Discovery) -> Self {
        Self {
            client,
            discovery: RwLock::new(discovery),
        }
    }

    /// Refresh the discovery cache
    pub async fn refresh(&self) -> Result<()> {
        let discovery = Discovery::new(self.client.clone()).run().await?;
        *self.discovery.write().await = discovery;
        Ok(())
    }

    async fn lookup(&self, gvk: &GroupVersionKind) -> Option<ResourceScope> {
        self.discovery
            .read()
            .await
            .resolve_gvk(gvk)
            .map(|(_, capabilities)| capabilities.scope.into())
    }
}

#[async_trait]
impl ScopeResolver for DiscoveryScopeResolver {
    async fn resolve_scope(&self, gvk: &GroupVersionKind) -> Result<ResourceScope> {
        if let Some(scope) = self.lookup(gvk).await {
            return Ok(scope);
        }

        debug!(
            group = %gvk.group,
            version = %gvk.version,
            kind = %gvk.kind,
            "kind not in discovery cache, refreshing"
        );
        self.refresh().await?;
        let discovery = self.discovery.read().await;
        match discovery.resolve_gvk(gvk) {
            Some((_, capabilities)) => Ok(capabilities.scope.into()),
            None => Err(kind_not_found(gvk, served_versions(&discovery, gvk))),
        }
    }
}

/// Scope resolver over a fixed table of kinds
///
/// Useful for tests and offline tooling. Counts lookups for assertions.
#[derive(Debug, Default)]
pub struct StaticScopeResolver {
    kinds: HashMap<GroupVersionKind, ResourceScope>,
    lookups: AtomicUsize,
}

impl StaticScopeResolver {
    /// Create an empty resolver
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a resolver knowing the common built-in kinds
    pub fn with_builtins() -> Self {
        Self::new()
            .namespaced("", "v1", "ConfigMap")
            .namespaced("", "v1", "Secret")
            .namespaced("", "v1", "Service")
            .namespaced("", "v1", "ServiceAccount")
            .namespaced("", "v1", "PersistentVolumeClaim")
            .cluster("", "v1", "Namespace")
            .cluster("", "v1", "PersistentVolume")
            .namespaced("apps", "v1", "Deployment")
            .namespaced("apps", "v1", "ReplicaSet")
            .namespaced("apps", "v1", "StatefulSet")
            .namespaced("apps", "v1", "DaemonSet")
            .namespaced("batch", "v1", "Job")
            .namespaced("batch", "v1", "CronJob")
            .namespaced("networking.k8s.io", "v1", "Ingress")
            .namespaced("rbac.authorization.k8s.io", "v1", "Role")
            .namespaced("rbac.authorization.k8s.io", "v1", "RoleBinding")
            .cluster("rbac.authorization.k8s.io", "v1", "ClusterRole")
            .cluster("rbac.authorization.k8s.io", "v1", "ClusterRoleBinding")
            .cluster("apiextensions.k8s.io", "v1", "CustomResourceDefinition")
    }

    /// Register a kind with an explicit scope
    pub fn with_kind(mut self, gvk: GroupVersionKind, scope: ResourceScope) -> Self {
        self.kinds.insert(gvk, scope);
        self
    }

    /// Register a namespaced kind
    pub fn namespaced(self, group: &str, version: &str, kind: &str) -> Self {
        self.with_kind(
            GroupVersionKind::gvk(group, version, kind),
            ResourceScope::Namespaced,
        )
    }

    /// Register a cluster-scoped kind
    pub fn cluster(self, group: &str, version: &str, kind: &str) -> Self {
        self.with_kind(
            GroupVersionKind::gvk(group, version, kind),
            ResourceScope::Cluster,
        )
    }

    /// Number of lookups performed
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScopeResolver for StaticScopeResolver {
    async fn resolve_scope(&self, gvk: &GroupVersionKind) -> Result<ResourceScope> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(scope) = self.kinds.get(gvk) {
            return Ok(*scope);
        }

        let mut known: Vec<String> = self
            .kinds
            .keys()
            .filter(|k| k.group == gvk.group && k.kind == gvk.kind)
            .map(|k| k.version.clone())
            .collect();
        known.sort();
        Err(kind_not_found(gvk, known))
    }
}
