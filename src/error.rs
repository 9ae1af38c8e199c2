//! Error types for plugin activation and registration.

use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during plugin discovery, activation, and
/// extension registration.
#[derive(Error, Debug)]
pub enum Error {
    /// Plugin not found.
    #[error("plugin not found: {0}")]
    PluginNotFound(String),

    /// A pre-auth hook was registered after the pre-auth phase completed.
    ///
    /// Authentication middleware is immutable once built, so this is a
    /// programming error in the plugin and must surface at load time.
    #[error("`{plugin}` attempted to register a before-auth hook after the auth phase was built")]
    BeforeAuthClosed {
        /// Name of the offending plugin.
        plugin: String,
    },

    /// Handler registered against an extension point the host never defined.
    #[error("unknown extension point: {0}")]
    UnknownExtensionPoint(String),

    /// Mutation attempted on a registry after it was frozen for serving.
    #[error("registry is frozen: {0}")]
    RegistryFrozen(String),

    /// The plugin's setup code failed.
    #[error("plugin source execution failed: {plugin}: {message}")]
    SourceExecution {
        /// Name of the failing plugin.
        plugin: String,
        /// Failure detail.
        message: String,
    },

    /// An initializer ran before the schema it needs was migrated.
    ///
    /// Tolerated during startup: first boot runs initializers before any
    /// migration has created the tables they read.
    #[error("schema not yet migrated: {0}")]
    SchemaPending(String),

    /// An initializer failed for any other reason.
    #[error("initializer failed: {plugin}: {message}")]
    InitializerFailed {
        /// Name of the failing plugin.
        plugin: String,
        /// Failure detail.
        message: String,
    },

    /// Activation step called out of order.
    #[error("invalid activation state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state.
        expected: String,
        /// Actual state.
        actual: String,
    },

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Glob pattern error during discovery.
    #[error("discovery pattern error: {0}")]
    Pattern(#[from] glob::PatternError),
}

impl Error {
    /// Create a plugin not found error.
    pub fn plugin_not_found(name: impl Into<String>) -> Self {
        Self::PluginNotFound(name.into())
    }

    /// Create a before-auth ordering violation error.
    pub fn before_auth_closed(plugin: impl Into<String>) -> Self {
        Self::BeforeAuthClosed {
            plugin: plugin.into(),
        }
    }

    /// Create a source execution error.
    pub fn source_execution(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SourceExecution {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    /// Create a schema pending error.
    pub fn schema_pending(detail: impl Into<String>) -> Self {
        Self::SchemaPending(detail.into())
    }

    /// Create an initializer failure error.
    pub fn initializer_failed(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InitializerFailed {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    /// Create an invalid state error.
    pub fn invalid_state(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::InvalidState {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a frozen registry error.
    pub fn frozen(registry: impl Into<String>) -> Self {
        Self::RegistryFrozen(registry.into())
    }

    /// Returns true if startup may continue despite this error.
    ///
    /// Only the pre-migration schema condition qualifies; everything else
    /// aborts boot.
    pub fn is_tolerated_at_startup(&self) -> bool {
        matches!(self, Self::SchemaPending(_))
    }

    /// Returns true if this error is an activation ordering violation.
    pub fn is_ordering_violation(&self) -> bool {
        matches!(
            self,
            Self::BeforeAuthClosed { .. } | Self::InvalidState { .. }
        )
    }
}
