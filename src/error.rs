//! Error types for directive construction and relationship evaluation.
//!
//! Error codes follow a pattern: S{category}{number}
//! - 1xxx: Directive errors (malformed inclusion specifications)
//! - 2xxx: Load errors (fetch failures, failed branches)
//! - 3xxx: Resolution errors (wrapper lookup)
//! - 9xxx: Internal errors
//!
//! # Creating Errors
//!
//! ```rust
//! use sideload::{ErrorKind, SideloadError};
//!
//! let err = SideloadError::malformed_directive("empty path segment");
//! assert_eq!(err.kind, ErrorKind::MalformedDirective);
//!
//! let err = SideloadError::load_failed("connection reset").with_relationship("comments");
//! assert_eq!(err.kind, ErrorKind::LoadFailed);
//! ```

use std::fmt;

use smol_str::SmolStr;
use thiserror::Error;

use crate::record::KeyValue;

/// Result type for directive and evaluation operations.
pub type SideloadResult<T> = Result<T, SideloadError>;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Inclusion specification could not be normalized (S1001).
    MalformedDirective = 1001,
    /// The underlying fetch for a relationship failed (S2001).
    LoadFailed = 2001,
    /// One or more relationship branches failed during evaluation (S2002).
    BranchesFailed = 2002,
    /// No wrapper definition could be resolved for a nested record (S3001).
    UnresolvedWrapper = 3001,
    /// Internal error (S9001).
    Internal = 9001,
}

impl ErrorKind {
    /// Get the error code string (e.g., "S1001").
    pub fn code(&self) -> String {
        format!("S{}", *self as u16)
    }

    /// Get a short description of the error kind.
    pub fn description(&self) -> &'static str {
        match self {
            Self::MalformedDirective => "Malformed inclusion directive",
            Self::LoadFailed => "Relationship load failed",
            Self::BranchesFailed => "Relationship branches failed",
            Self::UnresolvedWrapper => "No wrapper definition for record type",
            Self::Internal => "Internal error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors raised by directive construction and relationship evaluation.
#[derive(Error, Debug)]
pub struct SideloadError {
    /// The error kind.
    pub kind: ErrorKind,
    /// The error message.
    pub message: String,
    /// The relationship the error is attached to, if any.
    pub relationship: Option<SmolStr>,
    /// The owning record's type name, if known.
    pub owner_type: Option<SmolStr>,
    /// The owning record's key, if known.
    pub owner_key: Option<KeyValue>,
    /// The source error, if any.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for SideloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.code(), self.message)?;
        if let Some(ref rel) = self.relationship {
            write!(f, " (relationship: {})", rel)?;
        }
        if let (Some(ty), Some(key)) = (&self.owner_type, &self.owner_key) {
            write!(f, " (owner: {}({}))", ty, key)?;
        }
        Ok(())
    }
}

impl SideloadError {
    /// Create a new error with the given kind and message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            relationship: None,
            owner_type: None,
            owner_key: None,
            source: None,
        }
    }

    /// Attach the relationship name the error occurred on.
    pub fn with_relationship(mut self, relationship: impl Into<SmolStr>) -> Self {
        self.relationship = Some(relationship.into());
        self
    }

    /// Attach the owning record's identity.
    pub fn with_owner(mut self, owner_type: impl Into<SmolStr>, owner_key: KeyValue) -> Self {
        self.owner_type = Some(owner_type.into());
        self.owner_key = Some(owner_key);
        self
    }

    /// Attach the source error.
    pub fn with_source<E: std::error::Error + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    // ============== Constructor Functions ==============

    /// Create a malformed directive error.
    pub fn malformed_directive(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(
            ErrorKind::MalformedDirective,
            format!("Invalid inclusion directive: {}", message),
        )
    }

    /// Create a load failure error.
    pub fn load_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::LoadFailed, message.into())
    }

    /// Create a failed-branches error summarizing an evaluation pass.
    pub fn branches_failed(count: usize, first: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::BranchesFailed,
            format!(
                "{} relationship branch{} failed; first: {}",
                count,
                if count == 1 { "" } else { "es" },
                first.into()
            ),
        )
    }

    /// Create an unresolved wrapper error for a record type.
    pub fn unresolved_wrapper(type_name: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::UnresolvedWrapper,
            format!(
                "No wrapper definition registered for record type '{}' and no default is set",
                type_name.into()
            ),
        )
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message.into())
    }

    // ============== Error Checks ==============

    /// Check if this is a malformed directive error.
    pub fn is_malformed_directive(&self) -> bool {
        self.kind == ErrorKind::MalformedDirective
    }

    /// Check if this is a load failure.
    pub fn is_load_failed(&self) -> bool {
        self.kind == ErrorKind::LoadFailed
    }

    /// Check if this error reports failed branches.
    pub fn is_branches_failed(&self) -> bool {
        self.kind == ErrorKind::BranchesFailed
    }

    /// Check if this is an unresolved wrapper error.
    pub fn is_unresolved_wrapper(&self) -> bool {
        self.kind == ErrorKind::UnresolvedWrapper
    }
}
