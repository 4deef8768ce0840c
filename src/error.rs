//! Error types for the gateway.
//!
//! Every failure the gateway can observe is a [`GatewayError`]. Most of them
//! are local to one connection or one pass session and are only logged; the
//! few that stop the process are classified by [`GatewayError::is_fatal`].
//!
//! ## Error Categories
//!
//! - **Configuration Errors**: unreadable or unsupported config files
//! - **Framing Errors**: short or oversized frames on a data channel
//! - **Listener Errors**: a data channel cannot bind its address
//! - **Stream Errors**: the platform refused to open a stream or accept a send
//! - **Plan Errors**: a plan with missing or inconsistent timestamps
//!
//! ## Helper Constructors
//!
//! ```rust
//! use groundgate::GatewayError;
//!
//! let error = GatewayError::invalid_plan("plan-42", "AOS is after LOS");
//! assert!(!error.is_fatal());
//! assert!(error.to_string().contains("plan-42"));
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for gateway operations.
pub type Result<T, E = GatewayError> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for gateway operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GatewayError {
    #[error("Couldn't read config file: {path}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config in {path}: {details}")]
    Config { path: PathBuf, details: String },

    #[error("Unsupported config file type: {extension:?}")]
    UnsupportedConfigFormat { extension: String },

    #[error("Framing error: {details}")]
    Framing { details: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("({channel}) Couldn't start TCP listener on {address}")]
    Bind {
        channel: String,
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Couldn't open stream for plan {plan_id}: {reason}")]
    StreamOpen {
        plan_id: String,
        reason: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Couldn't send telemetry for plan {plan_id}: {reason}")]
    StreamSend {
        plan_id: String,
        reason: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Invalid plan {plan_id}: {reason}")]
    InvalidPlan { plan_id: String, reason: String },

    #[error("({channel}) {direction} slot is held by {holder}")]
    NotBound {
        channel: String,
        direction: &'static str,
        holder: String,
    },

    #[error("Platform error: {reason}")]
    Platform {
        reason: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl GatewayError {
    /// Returns whether this error should stop the process (or, for bind
    /// errors, the data channel that raised it) at startup.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            GatewayError::ConfigFile { .. }
                | GatewayError::Config { .. }
                | GatewayError::UnsupportedConfigFormat { .. }
                | GatewayError::Bind { .. }
        )
    }

    /// Returns whether the failed operation may succeed if attempted again later.
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::StreamOpen { .. } => true,
            GatewayError::StreamSend { .. } => true,
            GatewayError::Platform { .. } => true,
            GatewayError::Io(_) => true,
            GatewayError::ConfigFile { .. } => false,
            GatewayError::Config { .. } => false,
            GatewayError::UnsupportedConfigFormat { .. } => false,
            GatewayError::Framing { .. } => false,
            GatewayError::Bind { .. } => false,
            GatewayError::InvalidPlan { .. } => false,
            GatewayError::NotBound { .. } => false,
        }
    }

    /// Helper constructor for framing errors.
    pub fn framing(details: impl Into<String>) -> Self {
        GatewayError::Framing {
            details: details.into(),
        }
    }

    /// Helper constructor for stream open failures.
    pub fn stream_open(plan_id: impl Into<String>, reason: impl Into<String>) -> Self {
        GatewayError::StreamOpen {
            plan_id: plan_id.into(),
            reason: reason.into(),
            source: None,
        }
    }

    /// Helper constructor for stream open failures with an underlying cause.
    pub fn stream_open_with_source(
        plan_id: impl Into<String>,
        reason: impl Into<String>,
        source: BoxError,
    ) -> Self {
        GatewayError::StreamOpen {
            plan_id: plan_id.into(),
            reason: reason.into(),
            source: Some(source),
        }
    }

    /// Helper constructor for telemetry send failures.
    pub fn stream_send(plan_id: impl Into<String>, reason: impl Into<String>) -> Self {
        GatewayError::StreamSend {
            plan_id: plan_id.into(),
            reason: reason.into(),
            source: None,
        }
    }

    /// Helper constructor for rejected plans.
    pub fn invalid_plan(plan_id: impl Into<String>, reason: impl Into<String>) -> Self {
        GatewayError::InvalidPlan {
            plan_id: plan_id.into(),
            reason: reason.into(),
        }
    }

    /// Helper constructor for generic platform client failures.
    pub fn platform(reason: impl Into<String>) -> Self {
        GatewayError::Platform {
            reason: reason.into(),
            source: None,
        }
    }

    /// Helper constructor for platform client failures with an underlying cause.
    pub fn platform_with_source(reason: impl Into<String>, source: BoxError) -> Self {
        GatewayError::Platform {
            reason: reason.into(),
            source: Some(source),
        }
    }
}
