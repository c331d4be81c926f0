//! Shared types for the enex2md application.
//!
//! This module contains the CLI command definitions and the summary types
//! reported after a conversion run.

use std::path::PathBuf;

use clap::Subcommand;

use crate::DumpError;

/// A specialized Result type for enex2md operations.
pub type Result<T> = std::result::Result<T, DumpError>;

/// Totals for a single conversion run, aggregated across all input files.
#[derive(Debug, Clone, Default)]
pub struct DumpSummary {
    /// Number of export files processed
    pub files_processed: usize,
    /// Number of notes written to disk
    pub notes_converted: usize,
    /// Number of attachment files written to disk
    pub attachments_written: usize,
}

impl DumpSummary {
    /// Folds the counters from one file into the run total.
    pub fn absorb(&mut self, other: &DumpSummary) {
        self.files_processed += other.files_processed;
        self.notes_converted += other.notes_converted;
        self.attachments_written += other.attachments_written;
    }
}

/// Available subcommands for the enex2md application
#[derive(Subcommand)]
pub enum Commands {
    /// Convert export files to Markdown notes with extracted attachments
    Dump {
        /// Export files, or directories to scan for them
        #[clap(required = true)]
        inputs: Vec<PathBuf>,

        /// Directory where converted notes are written
        #[clap(short, long)]
        output: Option<PathBuf>,

        /// Reuse sanitized original attachment filenames instead of
        /// timestamp-derived names
        #[clap(short, long)]
        keep_file_names: bool,
    },

    /// Configuration management
    Config {
        /// Show the effective configuration
        #[clap(short = 'S', long)]
        show: bool,
    },
}
