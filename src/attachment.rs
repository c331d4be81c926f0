//! Attachment assembly.
//!
//! An [`Attachment`] is populated incrementally by the export parser with
//! base64 fragments and metadata, then finalized exactly once: the payload
//! is decoded, fingerprinted, persisted under the owning note's media
//! directory, optionally downscaled, fingerprinted again from disk, and the
//! file timestamps restored to the attachment's creation date.
//!
//! The two fingerprints serve different purposes and may legitimately
//! differ: the original-payload hash is what inline `en-media` references
//! carry, the stored-file hash is what the metadata block displays.

use std::{
    fs::{self, File},
    io::Read,
    path::Path,
};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, NaiveDateTime, Utc};
use filetime::FileTime;
use log::{debug, warn};
use md5::{Digest, Md5};

use crate::{
    image_utils::resize_in_place,
    naming::{ensure_dir, split_ext, truncate_base, unique_in_dir, url_safe_string},
    Config, DumpError, Result,
};

/// Subdirectory of a note's folder holding its attachment files.
pub const MEDIA_PATH: &str = "media";

/// Timestamp format used in the export XML.
pub(crate) const ISO_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Timestamp format for synthesized attachment filenames.
const FILENAME_TIME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Parses an export timestamp such as `20240131T120000Z`.
pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, ISO_DATE_FORMAT)
        .map(|dt| dt.and_utc())
        .map_err(|_| DumpError::InvalidTimestamp {
            value: value.to_string(),
        })
}

/// Knobs the attachment pipeline needs from the [`Config`].
#[derive(Debug, Clone, Copy)]
pub struct AttachmentOptions {
    pub keep_original_names: bool,
    pub max_image_width: u32,
    pub max_image_height: u32,
}

impl From<&Config> for AttachmentOptions {
    fn from(config: &Config) -> Self {
        AttachmentOptions {
            keep_original_names: config.keep_original_names,
            max_image_width: config.max_image_width,
            max_image_height: config.max_image_height,
        }
    }
}

/// Lifecycle state: fragments are only accepted before finalize, queries
/// are only answered after.
enum State {
    Accepting { fragments: Vec<String> },
    Finalized {
        filename: String,
        original_hash: String,
        stored_hash: String,
    },
}

/// One embedded binary resource of a note.
pub struct Attachment {
    created: DateTime<Utc>,
    mime: String,
    declared_name: Option<String>,
    attributes: Vec<(String, String)>,
    state: State,
}

impl Attachment {
    /// Creates an empty attachment. `created` is the owning note's creation
    /// date, used as a fallback until the resource declares its own.
    pub fn new(created: DateTime<Utc>) -> Self {
        Attachment {
            created,
            mime: String::new(),
            declared_name: None,
            attributes: Vec::new(),
            state: State::Accepting {
                fragments: Vec::new(),
            },
        }
    }

    /// Appends one chunk of base64 text. Fragments are concatenated in the
    /// order received; no alignment validation happens here.
    pub fn append_fragment(&mut self, text: &str) -> Result<()> {
        match &mut self.state {
            State::Accepting { fragments } => {
                fragments.push(text.trim_end_matches('\n').to_string());
                Ok(())
            }
            State::Finalized { .. } => Err(DumpError::invalid_state(
                "cannot append fragments to a finalized attachment",
            )),
        }
    }

    pub fn set_mime(&mut self, mime: &str) {
        self.mime = mime.to_string();
    }

    pub fn set_declared_filename(&mut self, name: &str) {
        self.declared_name = Some(name.to_string());
    }

    pub fn add_attribute(&mut self, name: &str, value: &str) {
        self.attributes.push((name.to_string(), value.to_string()));
    }

    /// Overrides the creation date from an export timestamp string.
    pub fn set_created(&mut self, value: &str) -> Result<()> {
        self.created = parse_timestamp(value)?;
        Ok(())
    }

    /// Runs the whole attachment pipeline. Single-shot: a second call is a
    /// lifecycle error, never a silent recompute.
    pub fn finalize(&mut self, media_dir: &Path, options: &AttachmentOptions) -> Result<()> {
        let fragments = match &mut self.state {
            State::Accepting { fragments } => std::mem::take(fragments),
            State::Finalized { .. } => {
                return Err(DumpError::invalid_state("attachment already finalized"))
            }
        };

        let filename = self.resolve_filename(media_dir, options.keep_original_names);

        // Decode failure is fatal for the run: no partial-attachment recovery.
        let mut joined = fragments.concat();
        joined.retain(|c| !c.is_ascii_whitespace());
        let payload = STANDARD.decode(joined.as_bytes())?;

        // Fingerprint of the original payload, computed before any resize.
        // Inline markup references match against this value.
        let original_hash = hex::encode(Md5::digest(&payload));

        ensure_dir(media_dir)?;
        let path = media_dir.join(&filename);
        fs::write(&path, &payload)?;
        drop(payload);
        debug!("Wrote attachment {}", path.display());

        if let Err(e) = resize_in_place(&path, options.max_image_width, options.max_image_height) {
            warn!("Could not resize {}: {}", path.display(), e);
        }

        // Fingerprint of the bytes actually on disk, surfaced in the
        // metadata block. Differs from original_hash when resizing rewrote
        // the file.
        let stored_hash = hash_file(&path)?;

        let stamp = FileTime::from_unix_time(self.created.timestamp(), 0);
        filetime::set_file_times(&path, stamp, stamp)?;

        self.state = State::Finalized {
            filename,
            original_hash,
            stored_hash,
        };
        Ok(())
    }

    /// Picks the on-disk filename: the sanitized declared base name when
    /// `keep_original_names` allows it, a creation-timestamp name
    /// otherwise, with the extension taken from the declared name or
    /// derived from the MIME type. Spaces become underscores because
    /// markdown links break on unescaped spaces.
    fn resolve_filename(&self, media_dir: &Path, keep_original_names: bool) -> String {
        let (base, ext) = match &self.declared_name {
            Some(name) if name.contains('.') => {
                let (base, ext) = split_ext(name);
                (Some(base.to_string()), ext.to_string())
            }
            _ => (None, extension_for_mime(&self.mime)),
        };

        let candidate = match base {
            Some(base) if keep_original_names && !base.is_empty() => {
                format!("{}.{}", url_safe_string(&truncate_base(&base)), ext)
            }
            _ => format!("{}.{}", self.created.format(FILENAME_TIME_FORMAT), ext),
        };

        unique_in_dir(media_dir, &candidate.replace(' ', "_"))
    }

    /// Assigned filename. Only valid after finalize.
    pub fn filename(&self) -> Result<&str> {
        match &self.state {
            State::Finalized { filename, .. } => Ok(filename),
            State::Accepting { .. } => Err(DumpError::invalid_state(
                "attachment filename queried before finalize",
            )),
        }
    }

    /// Fingerprint of the original decoded payload. Only valid after
    /// finalize; never changes afterwards.
    pub fn original_hash(&self) -> Result<&str> {
        match &self.state {
            State::Finalized { original_hash, .. } => Ok(original_hash),
            State::Accepting { .. } => Err(DumpError::invalid_state(
                "attachment hash queried before finalize",
            )),
        }
    }

    /// Fingerprint of the persisted file bytes. Only valid after finalize.
    pub fn stored_hash(&self) -> Result<&str> {
        match &self.state {
            State::Finalized { stored_hash, .. } => Ok(stored_hash),
            State::Accepting { .. } => Err(DumpError::invalid_state(
                "attachment hash queried before finalize",
            )),
        }
    }

    /// Renders the metadata block appended to the owning note: a markdown
    /// link to the file, the stored-file fingerprint, and any captured
    /// attributes as quoted lines.
    pub fn attributes_markdown(&self) -> Result<String> {
        let State::Finalized {
            filename,
            stored_hash,
            ..
        } = &self.state
        else {
            return Err(DumpError::invalid_state(
                "attachment attributes queried before finalize",
            ));
        };

        let mut export = format!("\n[{}]({}/{})", filename, MEDIA_PATH, filename);
        export.push_str(&format!("\n>hash: {}  ", stored_hash));
        for (name, value) in &self.attributes {
            export.push_str(&format!("\n>{}: {}  ", name, value));
        }
        export.push('\n');
        Ok(export)
    }
}

/// Maps a MIME type to a file extension, normalizing the conventional
/// "jpe" spelling to "jpg".
fn extension_for_mime(mime: &str) -> String {
    let subtype = mime.rsplit('/').next().unwrap_or("");
    let ext = match subtype {
        "" => "bin",
        "jpeg" | "jpg" | "jpe" => "jpg",
        "svg+xml" => "svg",
        "plain" => "txt",
        "octet-stream" => "bin",
        other => other,
    };
    ext.to_string()
}

/// MD5 of a file read in 64 KiB chunks.
fn hash_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Md5::new();
    let mut buf = [0u8; 65536];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
