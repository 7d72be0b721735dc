//! The parent resource whose release produced the dependents

use std::fmt;

use kube::api::DynamicObject;
use kube::core::GroupVersionKind;

use crate::error::{OperatorError, Result};
use crate::manifest::gvk_from_api_version;

/// Identity of an owning resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Owner {
    /// Group-Version-Kind of the owner
    pub gvk: GroupVersionKind,
    /// Namespace (None for cluster-scoped owners)
    pub namespace: Option<String>,
    /// Resource name
    pub name: String,
}

impl Owner {
    pub fn new(gvk: GroupVersionKind, namespace: Option<String>, name: impl Into<String>) -> Self {
        Self {
            gvk,
            namespace,
            name: name.into(),
        }
    }

    /// Build an owner from an object read from the cluster
    pub fn from_object(obj: &DynamicObject) -> Result<Self> {
        let types = obj.types.as_ref().ok_or_else(|| {
            OperatorError::InvalidConfig("owner is missing apiVersion or kind".to_string())
        })?;
        let name = obj.metadata.name.clone().ok_or_else(|| {
            OperatorError::InvalidConfig("owner is missing metadata.name".to_string())
        })?;

        Ok(Self {
            gvk: gvk_from_api_version(&types.api_version, &types.kind),
            namespace: obj.metadata.namespace.clone(),
            name,
        })
    }

    /// `namespace/name`, or just `name` for cluster-scoped owners
    pub fn namespaced_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}/{}", ns, self.name),
            None => self.name.clone(),
        }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.gvk.kind, self.namespaced_name())
    }
}
