//! CLI module for the enex2md application
//!
//! This module handles the command-line interface: expanding input paths
//! into export files and driving the conversion pipeline over them.

use std::path::PathBuf;

use log::{info, warn};
use walkdir::WalkDir;

use crate::{
    naming::ensure_dir, render::MarkdownRenderer, Commands, Config, DumpError, DumpSummary,
    EnexParser, Result,
};

/// CLI application handler - processes CLI commands and drives the parser
pub struct App {
    /// Application configuration
    config: Config,

    /// Whether to display verbose output
    verbose: bool,
}

impl App {
    /// Create a new CLI application with the given config
    pub fn new(config: Config, verbose: bool) -> Self {
        Self { config, verbose }
    }

    /// Run the CLI application with the given command
    pub fn run(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Dump {
                inputs,
                output,
                keep_file_names,
            } => self.dump(inputs, output, keep_file_names),

            Commands::Config { show: _ } => self.show_config(),
        }
    }

    /// Converts all export files reachable from `inputs`, strictly
    /// sequentially, aborting on the first error.
    fn dump(
        &self,
        inputs: Vec<PathBuf>,
        output: Option<PathBuf>,
        keep_file_names: bool,
    ) -> Result<()> {
        let mut config = self.config.clone();
        if let Some(output) = output {
            config.output_dir = output;
        }
        if keep_file_names {
            config.keep_original_names = true;
        }
        ensure_dir(&config.output_dir)?;

        let files = Self::expand_inputs(&inputs)?;
        if files.is_empty() {
            warn!("No export files found under the given inputs");
            return Ok(());
        }

        let renderer = MarkdownRenderer;
        let parser = EnexParser::new(&config, &renderer);
        let mut total = DumpSummary::default();
        for file in &files {
            let summary = parser.parse_file(file)?;
            if self.verbose {
                info!(
                    "{}: {} notes, {} attachments",
                    file.display(),
                    summary.notes_converted,
                    summary.attachments_written
                );
            }
            total.absorb(&summary);
        }

        println!(
            "Converted {} notes ({} attachments) from {} files into {}",
            total.notes_converted,
            total.attachments_written,
            total.files_processed,
            config.output_dir.display()
        );
        Ok(())
    }

    /// Expands files and directories into a sorted list of export files.
    /// A directory contributes every `.enex` file below it; a missing path
    /// is an error.
    fn expand_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for input in inputs {
            if input.is_dir() {
                for entry in WalkDir::new(input).into_iter().filter_map(|e| e.ok()) {
                    let path = entry.path();
                    if path.is_file()
                        && path
                            .extension()
                            .is_some_and(|ext| ext.eq_ignore_ascii_case("enex"))
                    {
                        files.push(path.to_path_buf());
                    }
                }
            } else if input.is_file() {
                files.push(input.clone());
            } else {
                return Err(DumpError::FileNotFound {
                    file_path: input.display().to_string(),
                });
            }
        }
        files.sort();
        Ok(files)
    }

    fn show_config(&self) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(&self.config)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn expand_inputs_finds_enex_files_sorted() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.enex"), "").unwrap();
        fs::write(dir.path().join("a.enex"), "").unwrap();
        fs::write(dir.path().join("skip.txt"), "").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("c.ENEX"), "").unwrap();

        let files = App::expand_inputs(&[dir.path().to_path_buf()]).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, ["a.enex", "b.enex", "c.ENEX"]);
    }

    #[test]
    fn expand_inputs_missing_path_is_an_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("gone.enex");
        let result = App::expand_inputs(&[missing]);
        assert!(matches!(result, Err(DumpError::FileNotFound { .. })));
    }

    #[test]
    fn explicit_file_is_taken_as_is() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("export.enex");
        fs::write(&file, "").unwrap();

        let files = App::expand_inputs(&[file.clone()]).unwrap();
        assert_eq!(files, vec![file]);
    }
}
