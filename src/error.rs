//! Error types shared across the viewer core

use thiserror::Error;

/// Errors raised while registering or constructing components and plugins.
///
/// These signal programming errors (a missing registration, a dependency
/// cycle) and are raised before any part of the requested component is built.
#[derive(Debug, Error)]
pub enum FrameworkError {
    #[error("component '{name}' is not registered{}", required_by_suffix(.required_by))]
    UnregisteredComponent {
        name: String,
        required_by: Option<String>,
    },

    #[error("plugin '{0}' is not registered")]
    UnregisteredPlugin(String),

    #[error("cyclic mixin dependency: {}", .chain.join(" -> "))]
    CyclicDependency { chain: Vec<String> },

    #[error("mixin '{mixin}' of '{component}' has an unexpected type")]
    MixinType { component: String, mixin: String },

    #[error("mixin '{mixin}' was not declared by '{component}'")]
    MissingMixin { component: String, mixin: String },

    #[error("component '{name}' failed to initialise: {detail}")]
    Init { name: String, detail: String },

    #[error("scope has been destroyed")]
    ScopeDestroyed,
}

fn required_by_suffix(required_by: &Option<String>) -> String {
    match required_by {
        Some(parent) => format!(" (required by '{parent}')"),
        None => String::new(),
    }
}

impl FrameworkError {
    pub fn init(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Init {
            name: name.into(),
            detail: detail.into(),
        }
    }
}

/// Failure of a single transport attempt
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("HTTP status {status}")]
    Status { status: u16 },

    #[error("network: {0}")]
    Network(String),

    #[error("I/O: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err.to_string())
    }
}

/// Rejection reason carried by asset promises.
///
/// Every variant names the resource (the request URL) it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssetError {
    #[error("failed to load {resource}: {error}")]
    Transport { resource: String, error: String },

    #[error("failed to decode {resource}: {error}")]
    Decode { resource: String, error: String },

    #[error("failed to parse {resource}: {error}")]
    Parse { resource: String, error: String },
}

impl AssetError {
    /// URL of the resource that failed
    #[must_use]
    pub fn resource(&self) -> &str {
        match self {
            Self::Transport { resource, .. }
            | Self::Decode { resource, .. }
            | Self::Parse { resource, .. } => resource,
        }
    }

    /// Whether another attempt could succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Parse { .. })
    }
}

/// Errors from the realtime event stream
#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("server-sent events are not supported in this environment")]
    Unsupported,

    #[error("failed to start event stream reader: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Errors surfaced by [`Viewer`](crate::viewer::Viewer)
#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("failed to load document: {0}")]
    Load(#[source] AssetError),

    #[error(transparent)]
    Framework(#[from] FrameworkError),

    #[error("viewer has been destroyed")]
    Destroyed,
}

/// Errors from loading a configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_component_mentions_parent() {
        let err = FrameworkError::UnregisteredComponent {
            name: "layout-paged".into(),
            required_by: Some("layout-presentation".into()),
        };
        assert_eq!(
            err.to_string(),
            "component 'layout-paged' is not registered (required by 'layout-presentation')"
        );
    }

    #[test]
    fn parse_errors_are_not_retryable() {
        let parse = AssetError::Parse {
            resource: "info.json".into(),
            error: "EOF".into(),
        };
        let transport = AssetError::Transport {
            resource: "info.json".into(),
            error: "HTTP status 500".into(),
        };
        assert!(!parse.is_retryable());
        assert!(transport.is_retryable());
        assert_eq!(parse.resource(), "info.json");
    }
}
