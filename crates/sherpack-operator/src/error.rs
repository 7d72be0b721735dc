//! Error types for sherpack-operator

use thiserror::Error;

/// Result type for sherpack-operator operations
pub type Result<T> = std::result::Result<T, OperatorError>;

/// Errors that can occur while watching dependent resources
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OperatorError {
    /// A manifest document could not be decoded
    #[error("failed to parse manifest document {index}: {message}")]
    ManifestParse { index: usize, message: String },

    /// A `List` document without a usable `items` array
    #[error("invalid List in manifest document {index}: {reason}")]
    InvalidList { index: usize, reason: String },

    /// A `List` document whose items contain another `List`
    #[error("nested List in manifest document {index} is not supported")]
    NestedList { index: usize },

    /// The scope resolver does not know this kind
    #[error("no matches for kind \"{kind}\" in group \"{group}\" (searched versions: {})", .versions.join(", "))]
    KindNotFound {
        group: String,
        kind: String,
        versions: Vec<String>,
    },

    /// The watch registry refused a subscription
    #[error("failed to watch dependent kind {kind}: {message}")]
    Subscription { kind: String, message: String },

    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for OperatorError {
    fn from(e: serde_json::Error) -> Self {
        OperatorError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for OperatorError {
    fn from(e: serde_yaml::Error) -> Self {
        OperatorError::Serialization(e.to_string())
    }
}

impl OperatorError {
    /// Check if the scope resolver could not find a kind
    pub fn is_kind_not_found(&self) -> bool {
        matches!(self, OperatorError::KindNotFound { .. })
    }

    /// Check if this error came from decoding the manifest
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            OperatorError::ManifestParse { .. }
                | OperatorError::InvalidList { .. }
                | OperatorError::NestedList { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_not_found_message() {
        let err = OperatorError::KindNotFound {
            group: "example.com".to_string(),
            kind: "Widget".to_string(),
            versions: vec!["v1".to_string(), "v1beta1".to_string()],
        };

        insta::assert_snapshot!(
            err.to_string(),
            @r#"no matches for kind "Widget" in group "example.com" (searched versions: v1, v1beta1)"#
        );
        assert!(err.is_kind_not_found());
        assert!(!err.is_parse_error());
    }

    #[test]
    fn test_parse_error_classes() {
        assert!(
            OperatorError::ManifestParse {
                index: 0,
                message: "bad".to_string()
            }
            .is_parse_error()
        );
        assert!(
            OperatorError::InvalidList {
                index: 1,
                reason: "missing items".to_string()
            }
            .is_parse_error()
        );
        assert!(OperatorError::NestedList { index: 2 }.is_parse_error());
        assert!(
            !OperatorError::Subscription {
                kind: "v1/ConfigMap".to_string(),
                message: "boom".to_string()
            }
            .is_parse_error()
        );
    }

    #[test]
    fn test_from_serde_yaml() {
        let yaml_err = serde_yaml::from_str::<Vec<u32>>("{").unwrap_err();
        let err: OperatorError = yaml_err.into();
        assert!(matches!(err, OperatorError::Serialization(_)));
    }
}
