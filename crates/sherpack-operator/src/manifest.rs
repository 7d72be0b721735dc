//! Rendered manifest decoding
//!
//! A release manifest is a multi-document YAML stream. Each non-empty
//! document describes one dependent resource, except documents of kind
//! `List`, which are expanded into their `items`:
//!
//! ```yaml
//! apiVersion: v1
//! kind: List
//! items:
//!   - apiVersion: v1
//!     kind: ConfigMap
//!     metadata:
//!       name: a
//! ```
//!
//! Only one level of expansion is performed. A `List` nested inside another
//! `List` is rejected with [`OperatorError::NestedList`].
//!
//! A non-empty document without `apiVersion` or `kind` is an error rather
//! than skipped. It still describes a resource the release applies, and
//! skipping it would leave that resource's kind unwatched without notice.

use std::collections::{BTreeMap, VecDeque};

use kube::core::GroupVersionKind;
use serde::Deserialize;
use serde_yaml::Value;

use crate::annotations;
use crate::error::{OperatorError, Result};

/// Kind of the generic list wrapper
pub const LIST_KIND: &str = "List";

/// A single dependent resource decoded from the manifest
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestDocument {
    /// Position of the YAML document this resource came from
    pub index: usize,
    /// Group-Version-Kind
    pub gvk: GroupVersionKind,
    /// Resource name
    pub name: Option<String>,
    /// Resource namespace (None when unset)
    pub namespace: Option<String>,
    /// Annotations (empty when unset)
    pub annotations: BTreeMap<String, String>,
}

impl ManifestDocument {
    /// Whether the resource must be kept when its owner is deleted
    pub fn is_retained(&self) -> bool {
        annotations::is_retained(&self.annotations)
    }

    /// Get display name for logging
    pub fn display_name(&self) -> String {
        let name = self.name.as_deref().unwrap_or("unnamed");
        match &self.namespace {
            Some(ns) => format!("{}/{}/{}", ns, self.gvk.kind, name),
            None => format!("{}/{}", self.gvk.kind, name),
        }
    }

    fn from_value(value: Value, index: usize) -> Result<Self> {
        let header: DocumentHeader =
            serde_yaml::from_value(value).map_err(|e| OperatorError::ManifestParse {
                index,
                message: e.to_string(),
            })?;

        if header.api_version.trim().is_empty() || header.kind.trim().is_empty() {
            return Err(OperatorError::ManifestParse {
                index,
                message: "resource missing apiVersion or kind".to_string(),
            });
        }

        let metadata = header.metadata.unwrap_or_default();
        Ok(Self {
            index,
            gvk: gvk_from_api_version(&header.api_version, &header.kind),
            name: metadata.name,
            namespace: metadata.namespace,
            annotations: metadata.annotations.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentHeader {
    #[serde(default)]
    api_version: String,
    #[serde(default)]
    kind: String,
    #[serde(default)]
    metadata: Option<DocumentMeta>,
}

#[derive(Debug, Default, Deserialize)]
struct DocumentMeta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    annotations: Option<BTreeMap<String, String>>,
}

/// Lazy iterator over the dependent resources of a manifest
///
/// Yields documents in manifest order with `List` documents expanded in place.
/// After the first error the iterator is exhausted.
pub struct ManifestDocuments<'de> {
    documents: serde_yaml::Deserializer<'de>,
    index: usize,
    pending: VecDeque<ManifestDocument>,
    failed: bool,
}

impl<'de> ManifestDocuments<'de> {
    pub fn new(manifest: &'de str) -> Self {
        Self {
            documents: serde_yaml::Deserializer::from_str(manifest),
            index: 0,
            pending: VecDeque::new(),
            failed: false,
        }
    }

    fn decode(&mut self, document: serde_yaml::Deserializer<'de>) -> Result<()> {
        let index = self.index;
        self.index += 1;

        let value = Value::deserialize(document).map_err(|e| OperatorError::ManifestParse {
            index,
            message: e.to_string(),
        })?;

        match value {
            Value::Null => Ok(()),
            Value::Mapping(_) if is_list(&value) => {
                self.pending.extend(expand_list(value, index)?);
                Ok(())
            }
            Value::Mapping(_) => {
                self.pending.push_back(ManifestDocument::from_value(value, index)?);
                Ok(())
            }
            _ => Err(OperatorError::ManifestParse {
                index,
                message: "document is not a mapping".to_string(),
            }),
        }
    }
}

impl Iterator for ManifestDocuments<'_> {
    type Item = Result<ManifestDocument>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(doc) = self.pending.pop_front() {
                return Some(Ok(doc));
            }
            if self.failed {
                return None;
            }

            let document = self.documents.next()?;
            if let Err(e) = self.decode(document) {
                self.failed = true;
                return Some(Err(e));
            }
        }
    }
}

/// A fully decoded manifest: every document up to the first failure
///
/// Decoding is done eagerly so the result can be held across await points.
#[derive(Debug, Default)]
pub struct ParsedManifest {
    /// Documents decoded before any failure, in manifest order
    pub documents: Vec<ManifestDocument>,
    /// The failure that stopped decoding, if any
    pub error: Option<OperatorError>,
}

impl ParsedManifest {
    pub fn parse(manifest: &str) -> Self {
        let mut parsed = Self::default();
        for document in ManifestDocuments::new(manifest) {
            match document {
                Ok(doc) => parsed.documents.push(doc),
                Err(e) => {
                    parsed.error = Some(e);
                    break;
                }
            }
        }
        parsed
    }

    /// All documents, or the decoding error
    pub fn into_result(self) -> Result<Vec<ManifestDocument>> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.documents),
        }
    }
}

fn is_list(value: &Value) -> bool {
    value.get("kind").and_then(Value::as_str) == Some(LIST_KIND)
}

fn expand_list(value: Value, index: usize) -> Result<Vec<ManifestDocument>> {
    let items = match value {
        Value::Mapping(mut mapping) => mapping.remove("items"),
        _ => None,
    };
    let items = match items {
        Some(Value::Sequence(items)) => items,
        Some(Value::Null) | None => {
            return Err(OperatorError::InvalidList {
                index,
                reason: "missing items".to_string(),
            });
        }
        Some(_) => {
            return Err(OperatorError::InvalidList {
                index,
                reason: "items is not a sequence".to_string(),
            });
        }
    };

    items
        .into_iter()
        .map(|item| {
            if !item.is_mapping() {
                return Err(OperatorError::InvalidList {
                    index,
                    reason: "list item is not a mapping".to_string(),
                });
            }
            if is_list(&item) {
                return Err(OperatorError::NestedList { index });
            }
            ManifestDocument::from_value(item, index)
        })
        .collect()
}

/// Build a GroupVersionKind from `apiVersion` and `kind`
///
/// - "apps/v1" -> group="apps", version="v1"
/// - "v1" -> group="", version="v1" (core API)
pub fn gvk_from_api_version(api_version: &str, kind: &str) -> GroupVersionKind {
    let (group, version) = match api_version.rsplit_once('/') {
        Some((g, v)) => (g, v),
        None => ("", api_version),
    };
    GroupVersionKind::gvk(group, version, kind)
}
