//! Dependent resource events and the requests they produce

use std::collections::BTreeMap;
use std::fmt;

use kube::api::DynamicObject;
use serde_json::Value;

/// An observed change to a dependent resource
#[derive(Debug, Clone)]
pub enum DependentEvent {
    Create(DynamicObject),
    Update {
        old: DynamicObject,
        new: DynamicObject,
    },
    Delete(DynamicObject),
    /// Externally triggered event (e.g. a periodic resync)
    Generic(DynamicObject),
}

impl DependentEvent {
    /// Objects carried by the event (old before new for updates)
    pub fn objects(&self) -> Vec<&DynamicObject> {
        match self {
            Self::Create(obj) | Self::Delete(obj) | Self::Generic(obj) => vec![obj],
            Self::Update { old, new } => vec![old, new],
        }
    }

    /// Name of the event type for logging
    pub fn name(&self) -> &'static str {
        match self {
            Self::Create(_) => "create",
            Self::Update { .. } => "update",
            Self::Delete(_) => "delete",
            Self::Generic(_) => "generic",
        }
    }
}

/// Request to reconcile one owner
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReconcileRequest {
    /// Owner namespace (None for cluster-scoped owners)
    pub namespace: Option<String>,
    /// Owner name
    pub name: String,
}

impl ReconcileRequest {
    pub fn new(namespace: Option<String>, name: impl Into<String>) -> Self {
        Self {
            namespace,
            name: name.into(),
        }
    }
}

impl fmt::Display for ReconcileRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Filter applied to dependent events before they reach a handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventFilter {
    /// Drop updates that only touch status or bookkeeping metadata
    DependentChanges,
    /// Only pass objects carrying all of these labels
    MatchLabels(BTreeMap<String, String>),
}

impl EventFilter {
    /// Check whether the event passes this filter
    pub fn allows(&self, event: &DependentEvent) -> bool {
        match self {
            Self::DependentChanges => match event {
                DependentEvent::Update { old, new } => {
                    match (comparable(old), comparable(new)) {
                        (Some(old), Some(new)) => old != new,
                        _ => true,
                    }
                }
                _ => true,
            },
            Self::MatchLabels(selector) => event
                .objects()
                .into_iter()
                .any(|obj| matches_labels(obj, selector)),
        }
    }
}

/// Check whether the event passes every filter
pub fn allows_all(filters: &[EventFilter], event: &DependentEvent) -> bool {
    filters.iter().all(|filter| filter.allows(event))
}

fn matches_labels(obj: &DynamicObject, selector: &BTreeMap<String, String>) -> bool {
    let labels = obj.metadata.labels.as_ref();
    selector
        .iter()
        .all(|(key, value)| labels.and_then(|l| l.get(key)) == Some(value))
}

/// JSON form of an object with status and server bookkeeping removed
fn comparable(obj: &DynamicObject) -> Option<Value> {
    let mut value = serde_json::to_value(obj).ok()?;
    if let Some(map) = value.as_object_mut() {
        map.remove("status");
        if let Some(metadata) = map.get_mut("metadata").and_then(Value::as_object_mut) {
            metadata.remove("resourceVersion");
            metadata.remove("managedFields");
        }
    }
    Some(value)
}
