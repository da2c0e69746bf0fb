use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by namespace resolution, mapping composition and jar derivation.
#[derive(Debug, Error)]
pub enum ForgeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error in {path}: {message}")]
    Archive { path: PathBuf, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("No remap path from {from} to {to}")]
    NoRemapPath { from: String, to: String },

    #[error("Unknown namespace {namespace} ({context})")]
    UnknownNamespace { namespace: String, context: String },

    #[error("Namespace {name} already registered with named={existing_named}")]
    DuplicateNamespace { name: String, existing_named: bool },

    #[error(
        "Client and server jars must share a mapping namespace: client {client_namespace}/{client_fallback}, server {server_namespace}/{server_fallback}"
    )]
    IncompatibleMergeInputs {
        client_namespace: String,
        client_fallback: String,
        server_namespace: String,
        server_fallback: String,
    },

    #[error("Error merging class {class}: {reason}")]
    MergeConflict { class: String, reason: String },

    #[error("Merging is not supported: {reason}")]
    MergeUnsupported { reason: String },

    #[error("Remap from {from} to {to} failed: {reason}")]
    RemapFailed { from: String, to: String, reason: String },

    #[error("Patch {patch} failed: {reason}")]
    PatchFailed { patch: String, reason: String },

    #[error("Invalid class file {class}: {reason}")]
    ClassFormat { class: String, reason: String },

    #[error("Access widener error: {message}")]
    AccessWidener { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Cannot modify {what} after it was finalized")]
    AlreadyFinalized { what: String },

    #[error("{what} used before it was finalized")]
    NotFinalized { what: String },
}

pub type Result<T> = std::result::Result<T, ForgeError>;

impl ForgeError {
    pub fn archive<P: Into<PathBuf>, S: Into<String>>(path: P, message: S) -> Self {
        Self::Archive { path: path.into(), message: message.into() }
    }

    pub fn no_remap_path<S1: Into<String>, S2: Into<String>>(from: S1, to: S2) -> Self {
        Self::NoRemapPath { from: from.into(), to: to.into() }
    }

    pub fn unknown_namespace<S1: Into<String>, S2: Into<String>>(namespace: S1, context: S2) -> Self {
        Self::UnknownNamespace { namespace: namespace.into(), context: context.into() }
    }

    pub fn duplicate_namespace<S: Into<String>>(name: S, existing_named: bool) -> Self {
        Self::DuplicateNamespace { name: name.into(), existing_named }
    }

    pub fn merge_conflict<S1: Into<String>, S2: Into<String>>(class: S1, reason: S2) -> Self {
        Self::MergeConflict { class: class.into(), reason: reason.into() }
    }

    pub fn merge_unsupported<S: Into<String>>(reason: S) -> Self {
        Self::MergeUnsupported { reason: reason.into() }
    }

    pub fn remap_failed<S1: Into<String>, S2: Into<String>, S3: Into<String>>(from: S1, to: S2, reason: S3) -> Self {
        Self::RemapFailed { from: from.into(), to: to.into(), reason: reason.into() }
    }

    pub fn patch_failed<S1: Into<String>, S2: Into<String>>(patch: S1, reason: S2) -> Self {
        Self::PatchFailed { patch: patch.into(), reason: reason.into() }
    }

    pub fn class_format<S1: Into<String>, S2: Into<String>>(class: S1, reason: S2) -> Self {
        Self::ClassFormat { class: class.into(), reason: reason.into() }
    }

    pub fn access_widener<S: Into<String>>(message: S) -> Self {
        Self::AccessWidener { message: message.into() }
    }

    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration { message: message.into() }
    }

    pub fn already_finalized<S: Into<String>>(what: S) -> Self {
        Self::AlreadyFinalized { what: what.into() }
    }

    pub fn not_finalized<S: Into<String>>(what: S) -> Self {
        Self::NotFinalized { what: what.into() }
    }

    /// Returns true for errors raised while configuring the build.
    ///
    /// These abort the whole build before any pipeline work begins.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::NoRemapPath { .. }
                | Self::UnknownNamespace { .. }
                | Self::DuplicateNamespace { .. }
                | Self::Configuration { .. }
                | Self::AlreadyFinalized { .. }
                | Self::NotFinalized { .. }
        )
    }

    /// Returns true if a merge failure handler may recover from the error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::MergeConflict { .. })
    }
}

impl From<zip::result::ZipError> for ForgeError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(io) => Self::Io(io),
            other => Self::Archive { path: PathBuf::new(), message: other.to_string() },
        }
    }
}
