//! Error types for the enex2md application.
//!
//! This module defines custom error types that categorize different failures
//! that can occur while converting an export archive to Markdown.

use std::{io, path::PathBuf};

use thiserror::Error;

/// The main error type for the enex2md application.
#[derive(Error, Debug)]
pub enum DumpError {
    /// Errors related to file I/O operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Errors related to serialization/deserialization operations.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Errors raised while reading the export XML.
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Attachment payload could not be decoded. Fatal for the whole run: a
    /// corrupt archive must not produce silently-incomplete output.
    #[error("Corrupt attachment data: {0}")]
    Decode(#[from] base64::DecodeError),

    /// Errors raised while decoding or re-encoding an image attachment.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// An inline media reference points at a fingerprint no registered
    /// attachment carries. Indicates an ordering bug in the caller, since
    /// attachments must be registered before note markup rewriting.
    #[error("No attachment matches inline reference hash: {hash}")]
    AttachmentNotFound { hash: String },

    /// An operation was called in the wrong lifecycle state, e.g. querying
    /// an attachment filename before finalize or finalizing twice.
    #[error("{message}")]
    InvalidState { message: String },

    /// Directory creation or access failed.
    #[error("Failed to create or access directory: {path}")]
    DirectoryError { path: PathBuf },

    /// A timestamp in the archive does not match the expected format.
    #[error("Invalid timestamp: {value}")]
    InvalidTimestamp { value: String },

    /// Errors related to configuration.
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Input file not found.
    #[error("File not found: {file_path}")]
    FileNotFound { file_path: String },
}

impl DumpError {
    /// Convenience constructor for lifecycle violations.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        DumpError::InvalidState {
            message: message.into(),
        }
    }
}
