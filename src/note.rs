//! Note assembly.
//!
//! A [`Note`] accumulates rich-content markup, tags, metadata and finalized
//! [`Attachment`]s while the export parser streams a note record. Finalizing
//! rewrites the proprietary inline markup into renderable form (resolving
//! each embedded-media reference to its attachment by content fingerprint),
//! hands the result to the [`Renderer`], appends the structured sections and
//! persists the document with its original timestamps restored.

use std::{collections::HashMap, fs, path::{Path, PathBuf}};

use chrono::{DateTime, Utc};
use filetime::FileTime;
use log::{debug, info};
use regex::Regex;
use uuid::Uuid;

use crate::{
    attachment::{parse_timestamp, Attachment, MEDIA_PATH},
    naming::{ensure_dir, truncate_base, unique_in_dir, url_safe_string},
    render::Renderer,
    DumpError, Result,
};

/// Timestamp format used in the NOTE ATTRIBUTES block.
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Marker standing in for the leading checkbox dash until rendering is
/// done. A plain `-` would be escaped by the renderer as a list marker;
/// the marker is plain text, survives conversion verbatim, and the
/// renderer swaps it for the literal dash afterwards.
pub(crate) const CHECKBOX_MARK: &str = "%%cb%%";

/// Checkbox tag variants and their markdown replacements.
const CHECKBOX_REWRITES: [(&str, &str); 5] = [
    ("<en-todo checked=\"false\"/>", "%%cb%% [ ] "),
    ("<en-todo checked=\"false\">", "%%cb%% [ ] "),
    ("<en-todo checked=\"true\"/>", "%%cb%% [x] "),
    ("<en-todo checked=\"true\">", "%%cb%% [x] "),
    ("</en-todo>", ""),
];

/// One note of an export archive, together with the attachments it owns.
pub struct Note {
    id: Uuid,
    title: String,
    markup: String,
    created: DateTime<Utc>,
    updated: DateTime<Utc>,
    tags: Vec<String>,
    attributes: Vec<(String, String)>,
    base_path: PathBuf,
    attachments: Vec<Attachment>,
    /// Original-payload fingerprint -> index into `attachments`, built at
    /// registration for O(1) lookup during markup rewriting.
    by_hash: HashMap<String, usize>,
    filename: String,
    markdown: String,
    finalized: bool,
}

impl Note {
    /// Creates an empty note targeting `base_path`.
    pub fn new(base_path: &Path) -> Self {
        let now = Utc::now();
        Note {
            id: Uuid::new_v4(),
            title: String::new(),
            markup: String::new(),
            created: now,
            updated: now,
            tags: Vec::new(),
            attributes: Vec::new(),
            base_path: base_path.to_path_buf(),
            attachments: Vec::new(),
            by_hash: HashMap::new(),
            filename: String::new(),
            markdown: String::new(),
            finalized: false,
        }
    }

    pub fn append_markup(&mut self, text: &str) {
        self.markup.push_str(text);
    }

    pub fn append_tag(&mut self, tag: &str) {
        self.tags.push(tag.to_string());
    }

    pub fn add_attribute(&mut self, name: &str, value: &str) {
        self.attributes.push((name.to_string(), value.to_string()));
    }

    pub fn set_created(&mut self, value: &str) -> Result<()> {
        self.created = parse_timestamp(value)?;
        Ok(())
    }

    pub fn set_updated(&mut self, value: &str) -> Result<()> {
        self.updated = parse_timestamp(value)?;
        Ok(())
    }

    /// Sets the title and immediately resolves the note's filename; the
    /// title must be known before attachments can be persisted, since they
    /// nest under a per-note directory named from it.
    pub fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
        self.resolve_filename();
    }

    fn resolve_filename(&mut self) {
        // A title without a single alphanumeric character (including one
        // that was never set) cannot yield a usable filename; substitute
        // the generated identifier.
        if !self.title.chars().any(|c| c.is_alphanumeric()) {
            self.title = format!("_{}", self.id);
        }
        let base = url_safe_string(&truncate_base(&self.title));
        self.filename = unique_in_dir(&self.base_path, &format!("{}.md", base));
        debug!("Note filename resolved: {}", self.filename);
    }

    /// Creation date, used as the fallback for attachments that do not
    /// declare their own.
    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Directory attachment files for this note are written to.
    pub fn media_dir(&self) -> PathBuf {
        self.base_path.join(self.dir_name()).join(MEDIA_PATH)
    }

    /// Per-note subdirectory, named after the sanitized title. Only used
    /// when the note owns attachments.
    fn dir_name(&self) -> String {
        url_safe_string(&truncate_base(&self.title))
    }

    /// Takes ownership of a finalized attachment and indexes it by its
    /// original-payload fingerprint. The first attachment wins when two
    /// share a fingerprint.
    pub fn register_attachment(&mut self, attachment: Attachment) -> Result<()> {
        let hash = attachment.original_hash()?.to_string();
        let index = self.attachments.len();
        self.attachments.push(attachment);
        self.by_hash.entry(hash).or_insert(index);
        Ok(())
    }

    /// Runs the whole note pipeline and writes the markdown document.
    /// Returns the path of the written file. Single-shot.
    pub fn finalize(&mut self, renderer: &dyn Renderer) -> Result<PathBuf> {
        if self.finalized {
            return Err(DumpError::invalid_state("note already finalized"));
        }
        if self.filename.is_empty() {
            self.resolve_filename();
        }

        self.rewrite_media()?;
        self.rewrite_checkboxes();
        self.markup = format!("<h1>{}</h1>{}", self.title, self.markup);

        self.markdown = renderer.render(&self.markup);

        self.append_attachment_section()?;
        self.append_tag_section();
        self.append_attributes_section();

        let path = self.persist()?;
        self.finalized = true;
        info!(
            "Converted note '{}' ({} attachments)",
            self.title,
            self.attachments.len()
        );
        Ok(path)
    }

    /// Replaces every inline media reference tag with a markdown link to
    /// the attachment whose original fingerprint the tag carries. A
    /// reference with no matching attachment is a fatal ordering bug.
    fn rewrite_media(&mut self) -> Result<()> {
        let tag_re = Regex::new(r"<en-media[^>]*>").expect("valid media tag pattern");
        let hash_re = Regex::new(r"[0-9a-fA-F]{32}").expect("valid hash pattern");

        let tags: Vec<String> = tag_re
            .find_iter(&self.markup)
            .map(|m| m.as_str().to_string())
            .collect();

        for tag in tags {
            let hash = hash_re
                .find(&tag)
                .map(|m| m.as_str().to_ascii_lowercase())
                .ok_or_else(|| DumpError::AttachmentNotFound { hash: tag.clone() })?;
            let index = *self
                .by_hash
                .get(&hash)
                .ok_or(DumpError::AttachmentNotFound { hash })?;
            let filename = self.attachments[index].filename()?;

            let image_mark = if tag.contains("image") { "!" } else { "" };
            let placeholder =
                format!("\n{}[{}]({}/{})", image_mark, filename, MEDIA_PATH, filename);
            self.markup = self.markup.replace(&tag, &placeholder);
        }
        self.markup = self.markup.replace("</en-media>", "");
        Ok(())
    }

    fn rewrite_checkboxes(&mut self) {
        for (take, give) in CHECKBOX_REWRITES {
            self.markup = self.markup.replace(take, give);
        }
    }

    fn append_attachment_section(&mut self) -> Result<()> {
        if self.attachments.is_empty() {
            return Ok(());
        }
        self.markdown.push_str("\n---");
        self.markdown.push_str("\n### ATTACHMENTS");
        for attachment in &self.attachments {
            self.markdown.push_str(&attachment.attributes_markdown()?);
        }
        Ok(())
    }

    fn append_tag_section(&mut self) {
        if self.tags.is_empty() {
            return;
        }
        self.markdown.push_str("\n\n---");
        self.markdown.push_str("\n### TAGS\n");
        let tags: Vec<String> = self.tags.iter().map(|t| format!("{{{}}}", t)).collect();
        self.markdown.push_str(&tags.join("  "));
        self.markdown.push('\n');
    }

    fn append_attributes_section(&mut self) {
        self.markdown.push_str("\n---");
        self.markdown.push_str("\n### NOTE ATTRIBUTES");
        self.markdown.push_str(&format!(
            "\n>Created Date: {}  ",
            self.created.format(TIME_FORMAT)
        ));
        self.markdown.push_str(&format!(
            "\n>Last Update Date: {}  ",
            self.updated.format(TIME_FORMAT)
        ));
        for (name, value) in &self.attributes {
            self.markdown.push_str(&format!("\n>{}: {}  ", name, value));
        }
    }

    /// Writes the document: notes owning attachments live in their own
    /// title directory next to the media folder, plain notes sit directly
    /// in the base path. File timestamps are restored to (created, updated).
    fn persist(&mut self) -> Result<PathBuf> {
        let dir = if self.attachments.is_empty() {
            self.base_path.clone()
        } else {
            self.base_path.join(self.dir_name())
        };
        ensure_dir(&dir)?;

        // The filename was resolved against the base path before any
        // attachments were registered; re-check against the directory the
        // note actually lands in.
        self.filename = unique_in_dir(&dir, &self.filename);

        let path = dir.join(&self.filename);
        fs::write(&path, &self.markdown)?;
        filetime::set_file_times(
            &path,
            FileTime::from_unix_time(self.created.timestamp(), 0),
            FileTime::from_unix_time(self.updated.timestamp(), 0),
        )?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::AttachmentOptions;
    use crate::render::MarkdownRenderer;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use md5::{Digest, Md5};
    use tempfile::TempDir;

    /// Renderer stub that leaves markup untouched, so content assertions
    /// do not depend on the real renderer's formatting.
    struct PassThrough;

    impl Renderer for PassThrough {
        fn render(&self, html: &str) -> String {
            html.to_string()
        }
    }

    fn attachment_options() -> AttachmentOptions {
        AttachmentOptions {
            keep_original_names: true,
            max_image_width: 1920,
            max_image_height: 1080,
        }
    }

    /// Builds a finalized attachment under `note`'s media dir and returns
    /// its original fingerprint.
    fn finalized_attachment(note: &Note, name: &str, payload: &[u8]) -> (Attachment, String) {
        let mut att = Attachment::new(note.created());
        att.set_declared_filename(name);
        att.append_fragment(&STANDARD.encode(payload)).unwrap();
        att.finalize(&note.media_dir(), &attachment_options())
            .unwrap();
        let hash = att.original_hash().unwrap().to_string();
        (att, hash)
    }

    #[test]
    fn filename_follows_title() {
        let dir = TempDir::new().unwrap();
        let mut note = Note::new(dir.path());
        note.set_title("Shopping");
        assert_eq!(note.filename(), "Shopping.md");
    }

    #[test]
    fn filename_falls_back_to_identifier() {
        let dir = TempDir::new().unwrap();
        let mut note = Note::new(dir.path());
        note.set_title("???!");
        assert!(note.filename().starts_with('_'));
        assert!(note.filename().ends_with(".md"));
        assert!(note.filename().len() > 5);
    }

    #[test]
    fn finalize_without_title_still_gets_identifier_filename() {
        let dir = TempDir::new().unwrap();
        let mut note = Note::new(dir.path());

        let path = note.finalize(&PassThrough).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with('_'));
        assert!(name.ends_with(".md"));
        assert!(name.len() > 4, "empty filename base: {:?}", name);
    }

    #[test]
    fn filename_collision_resolution() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Shopping.md"), "existing").unwrap();

        let mut note = Note::new(dir.path());
        note.set_title("Shopping");
        assert_eq!(note.filename(), "Shopping_1.md");
    }

    #[test]
    fn checkbox_variants_rewrite() {
        let dir = TempDir::new().unwrap();
        let mut note = Note::new(dir.path());
        note.append_markup("<en-todo checked=\"true\"/>ship it<br/>");
        note.append_markup("<en-todo checked=\"false\">buy milk</en-todo>");
        note.rewrite_checkboxes();

        assert_eq!(
            note.markup,
            "%%cb%% [x] ship it<br/>%%cb%% [ ] buy milk"
        );
        assert!(!note.markup.contains("en-todo"));
    }

    #[test]
    fn checkbox_note_renders_markdown_task_lines() {
        let dir = TempDir::new().unwrap();
        let mut note = Note::new(dir.path());
        note.set_title("Todos");
        note.append_markup("<div><en-todo checked=\"true\"/>ship it</div>");
        note.append_markup("<div><en-todo checked=\"false\">buy milk</en-todo></div>");

        let path = note.finalize(&MarkdownRenderer).unwrap();
        let body = fs::read_to_string(&path).unwrap();

        assert!(
            body.lines().any(|l| l.starts_with("- [x] ship it")),
            "checked todo line escaped or mangled: {:?}",
            body
        );
        assert!(
            body.lines().any(|l| l.starts_with("- [ ] buy milk")),
            "unchecked todo line escaped or mangled: {:?}",
            body
        );
        assert!(!body.contains("en-todo"));
        assert!(!body.contains(CHECKBOX_MARK));
    }

    #[test]
    fn media_reference_resolves_to_attachment_link() {
        let dir = TempDir::new().unwrap();
        let mut note = Note::new(dir.path());
        note.set_title("Trip");
        let (att, hash) = finalized_attachment(&note, "pic.png", b"fake image payload");
        note.register_attachment(att).unwrap();

        note.append_markup(&format!(
            "<div>before</div><en-media type=\"image/png\" hash=\"{}\"/><div>after</div>",
            hash
        ));
        note.rewrite_media().unwrap();

        assert!(note.markup.contains("\n![pic.png](media/pic.png)"));
        assert!(!note.markup.contains("en-media"));
    }

    #[test]
    fn non_image_media_reference_gets_plain_link() {
        let dir = TempDir::new().unwrap();
        let mut note = Note::new(dir.path());
        note.set_title("Docs");
        let (att, hash) = finalized_attachment(&note, "paper.pdf", b"pdf bytes");
        note.register_attachment(att).unwrap();

        note.append_markup(&format!(
            "<en-media type=\"application/pdf\" hash=\"{}\"/>",
            hash
        ));
        note.rewrite_media().unwrap();

        assert!(note.markup.contains("\n[paper.pdf](media/paper.pdf)"));
        assert!(!note.markup.contains("!["));
    }

    #[test]
    fn unmatched_media_reference_is_fatal() {
        let dir = TempDir::new().unwrap();
        let mut note = Note::new(dir.path());
        note.set_title("Broken");
        note.append_markup(&format!(
            "<en-media type=\"image/png\" hash=\"{}\"/>",
            "0".repeat(32)
        ));

        let result = note.rewrite_media();
        assert!(matches!(result, Err(DumpError::AttachmentNotFound { .. })));
    }

    #[test]
    fn plain_note_lands_in_base_path_with_sections() {
        let dir = TempDir::new().unwrap();
        let mut note = Note::new(dir.path());
        note.set_title("Shopping");
        note.set_created("20240131T120000Z").unwrap();
        note.set_updated("20240201T080000Z").unwrap();
        note.append_tag("home");
        note.append_tag("urgent");
        note.append_markup("<div>milk and eggs</div>");

        let path = note.finalize(&MarkdownRenderer).unwrap();
        assert_eq!(path, dir.path().join("Shopping.md"));

        let body = fs::read_to_string(&path).unwrap();
        assert!(body.contains("milk and eggs"));
        assert!(body.contains("### TAGS"));
        assert!(body.contains("{home}  {urgent}"));
        assert!(body.contains("### NOTE ATTRIBUTES"));
        assert!(body.contains(">Created Date: 2024-01-31 12:00:00  "));
        assert!(body.contains(">Last Update Date: 2024-02-01 08:00:00  "));
        assert!(!body.contains("### ATTACHMENTS"));

        let meta = fs::metadata(&path).unwrap();
        let mtime = FileTime::from_last_modification_time(&meta);
        assert_eq!(mtime.unix_seconds(), note.updated.timestamp());
    }

    #[test]
    fn note_with_attachment_gets_own_directory() {
        let dir = TempDir::new().unwrap();
        let mut note = Note::new(dir.path());
        note.set_title("Trip");
        let payload = b"image payload";
        let (att, hash) = finalized_attachment(&note, "pic.png", payload);
        let stored = att.stored_hash().unwrap().to_string();
        note.register_attachment(att).unwrap();
        note.append_markup(&format!(
            "<div><en-media type=\"image/png\" hash=\"{}\"/></div>",
            hash
        ));

        let path = note.finalize(&PassThrough).unwrap();
        assert_eq!(path, dir.path().join("Trip").join("Trip.md"));
        assert!(dir.path().join("Trip").join("media").join("pic.png").exists());

        let body = fs::read_to_string(&path).unwrap();
        assert!(body.starts_with("<h1>Trip</h1>"));
        assert!(body.contains("![pic.png](media/pic.png)"));
        assert!(body.contains("### ATTACHMENTS"));
        assert!(body.contains(&format!(">hash: {}  ", stored)));
        // The fingerprint used for matching equals md5 of the raw payload.
        assert_eq!(hash, hex::encode(Md5::digest(payload)));
    }

    #[test]
    fn persist_re_resolves_collisions_in_the_title_directory() {
        let dir = TempDir::new().unwrap();
        // The title directory already holds a note file with the same name.
        fs::create_dir_all(dir.path().join("Trip")).unwrap();
        fs::write(dir.path().join("Trip").join("Trip.md"), "existing").unwrap();

        let mut note = Note::new(dir.path());
        note.set_title("Trip");
        let (att, hash) = finalized_attachment(&note, "pic.png", b"payload");
        note.register_attachment(att).unwrap();
        note.append_markup(&format!(
            "<en-media type=\"image/png\" hash=\"{}\"/>",
            hash
        ));

        let path = note.finalize(&PassThrough).unwrap();
        assert_eq!(path, dir.path().join("Trip").join("Trip_1.md"));
        assert_eq!(note.filename(), "Trip_1.md");
        assert_eq!(
            fs::read_to_string(dir.path().join("Trip").join("Trip.md")).unwrap(),
            "existing"
        );
    }

    #[test]
    fn finalize_is_single_shot() {
        let dir = TempDir::new().unwrap();
        let mut note = Note::new(dir.path());
        note.set_title("Once");
        note.finalize(&PassThrough).unwrap();

        assert!(matches!(
            note.finalize(&PassThrough),
            Err(DumpError::InvalidState { .. })
        ));
    }
}
