//! Error types and error handling for lego.
//!
//! This module defines the error taxonomy shared by the registry, the
//! init/shutdown pipelines and the component collaborators, together with
//! the CLI exit codes the entry point maps them to.

use std::fmt;
use thiserror::Error;

/// Error kinds used to branch on a failure without matching on payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// E001: Component kind was never enabled
    NotInitialized,

    /// E002: Component kind is enabled but the instance is absent
    InstanceNotFound,

    /// E003: A required configuration value is absent
    ConfigurationMissing,

    /// E004: A collaborator constructor returned an error
    ConstructionFailed,

    /// E005: Configuration is present but invalid
    ConfigInvalid,

    /// E006: A running component failed
    ComponentFailed,

    /// E007: I/O failure
    Io,
}

impl ErrorKind {
    /// Returns the error code as a string (e.g., "E001").
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotInitialized => "E001",
            ErrorKind::InstanceNotFound => "E002",
            ErrorKind::ConfigurationMissing => "E003",
            ErrorKind::ConstructionFailed => "E004",
            ErrorKind::ConfigInvalid => "E005",
            ErrorKind::ComponentFailed => "E006",
            ErrorKind::Io => "E007",
        }
    }

    /// Returns the default message for this error kind.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorKind::NotInitialized => "Component is not initialized",
            ErrorKind::InstanceNotFound => "Component instance not found",
            ErrorKind::ConfigurationMissing => "Required configuration is missing",
            ErrorKind::ConstructionFailed => "Component construction failed",
            ErrorKind::ConfigInvalid => "Configuration is invalid",
            ErrorKind::ComponentFailed => "Component operation failed",
            ErrorKind::Io => "I/O error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// CLI exit codes.
pub mod exit_code {
    /// Success
    pub const SUCCESS: i32 = 0;
    /// General error
    pub const GENERAL_ERROR: i32 = 1;
    /// Configuration error
    pub const CONFIG_ERROR: i32 = 2;
    /// A required component could not be built
    pub const STARTUP_ERROR: i32 = 3;
    /// Command line argument error
    pub const CLI_ERROR: i32 = 64;
}

/// The main error type for lego.
#[derive(Debug, Error)]
pub enum LegoError {
    /// Component kind was never enabled in the registry.
    #[error("Component not initialized: {kind}")]
    NotInitialized { kind: &'static str },

    /// Component kind is enabled but the named instance is absent.
    #[error("Component instance not found: {kind}/{instance}")]
    InstanceNotFound { kind: &'static str, instance: String },

    /// A required configuration value is absent.
    #[error("Configuration missing: {key}")]
    ConfigurationMissing { key: String },

    /// A collaborator constructor failed.
    #[error("Failed to construct {kind} instance '{instance}': {source}")]
    ConstructionFailed {
        kind: &'static str,
        instance: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Configuration is present but invalid.
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A running component failed (bind, serve, close).
    #[error("Component error: {message}")]
    Component {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl LegoError {
    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LegoError::NotInitialized { .. } => ErrorKind::NotInitialized,
            LegoError::InstanceNotFound { .. } => ErrorKind::InstanceNotFound,
            LegoError::ConfigurationMissing { .. } => ErrorKind::ConfigurationMissing,
            LegoError::ConstructionFailed { .. } => ErrorKind::ConstructionFailed,
            LegoError::Config { .. } | LegoError::Yaml(_) => ErrorKind::ConfigInvalid,
            LegoError::Component { .. } => ErrorKind::ComponentFailed,
            LegoError::Io(_) => ErrorKind::Io,
        }
    }

    /// Returns the CLI exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::ConfigurationMissing | ErrorKind::ConfigInvalid => exit_code::CONFIG_ERROR,
            ErrorKind::ConstructionFailed => exit_code::STARTUP_ERROR,
            _ => exit_code::GENERAL_ERROR,
        }
    }

    /// Creates a not-initialized error for a component kind.
    pub fn not_initialized(kind: &'static str) -> Self {
        LegoError::NotInitialized { kind }
    }

    /// Creates an instance-not-found error.
    pub fn instance_not_found(kind: &'static str, instance: impl Into<String>) -> Self {
        LegoError::InstanceNotFound {
            kind,
            instance: instance.into(),
        }
    }

    /// Creates a configuration-missing error.
    pub fn configuration_missing(key: impl Into<String>) -> Self {
        LegoError::ConfigurationMissing { key: key.into() }
    }

    /// Creates a construction error wrapping the collaborator's failure.
    pub fn construction(
        kind: &'static str,
        instance: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        LegoError::ConstructionFailed {
            kind,
            instance: instance.into(),
            source: source.into(),
        }
    }

    /// Creates a configuration error with a message.
    pub fn config(message: impl Into<String>) -> Self {
        LegoError::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a configuration error with a message and source.
    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        LegoError::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a component error with a message.
    pub fn component(message: impl Into<String>) -> Self {
        LegoError::Component {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a component error with a message and source.
    pub fn component_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        LegoError::Component {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result type alias for lego operations.
pub type Result<T> = std::result::Result<T, LegoError>;
