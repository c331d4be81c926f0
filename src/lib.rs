//! Evernote export conversion library
//!
//! This library converts exported note archives (ENEX XML with embedded
//! base64 attachments) into individual Markdown files with the attachment
//! payloads extracted next to them on disk.

mod attachment;
mod cli;
mod config;
mod errors;
mod image_utils;
mod naming;
mod note;
mod parser;
mod render;
mod types;

// Re-export key components
pub use attachment::*;
pub use cli::*;
pub use config::*;
pub use errors::*;
pub use image_utils::*;
pub use naming::*;
pub use note::*;
pub use parser::*;
pub use render::*;
pub use types::*;
