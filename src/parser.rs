//! Streaming driver for Evernote export files.
//!
//! Walks the XML of one `.enex` file event by event and feeds the
//! [`Note`](crate::Note) and [`Attachment`](crate::Attachment) lifecycles:
//! metadata and markup accumulate while elements stream in, each resource
//! is finalized when its element closes, and the note itself is finalized
//! last. Resources always precede the closing note tag in an export, so
//! attachments are registered before markup rewriting runs.

use std::path::Path;

use chrono::Utc;
use log::{debug, info};
use quick_xml::{events::Event, Reader};

use crate::{
    attachment::{Attachment, AttachmentOptions},
    note::Note,
    render::Renderer,
    Config, DumpSummary, Result,
};

/// Parses export files against one configuration and renderer.
pub struct EnexParser<'a> {
    config: &'a Config,
    renderer: &'a dyn Renderer,
}

impl<'a> EnexParser<'a> {
    pub fn new(config: &'a Config, renderer: &'a dyn Renderer) -> Self {
        EnexParser { config, renderer }
    }

    /// Converts every note in `path`. Fails fast: the first malformed
    /// attachment or unresolvable media reference aborts the run.
    pub fn parse_file(&self, path: &Path) -> Result<DumpSummary> {
        info!("Processing {}", path.display());

        let mut reader = Reader::from_file(path)?;
        reader.config_mut().trim_text(true);

        let options = AttachmentOptions::from(self.config);
        let mut summary = DumpSummary {
            files_processed: 1,
            ..Default::default()
        };

        let mut note: Option<Note> = None;
        let mut attachment: Option<Attachment> = None;
        let mut in_note_attributes = false;
        let mut in_resource_attributes = false;
        let mut text = String::new();
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => {
                    text.clear();
                    match e.local_name().as_ref() {
                        b"note" => note = Some(Note::new(&self.config.output_dir)),
                        b"resource" => {
                            // The resource timestamp, if any, arrives later;
                            // start from the note's creation date.
                            let created =
                                note.as_ref().map(|n| n.created()).unwrap_or_else(Utc::now);
                            attachment = Some(Attachment::new(created));
                        }
                        b"note-attributes" => in_note_attributes = true,
                        b"resource-attributes" => in_resource_attributes = true,
                        _ => {}
                    }
                }
                Event::Text(t) => text.push_str(&t.unescape()?),
                Event::CData(t) => {
                    text.push_str(&String::from_utf8_lossy(&t.into_inner()));
                }
                Event::End(e) => {
                    match e.local_name().as_ref() {
                        b"title" => {
                            if let Some(n) = note.as_mut() {
                                n.set_title(&text);
                            }
                        }
                        b"content" => {
                            if let Some(n) = note.as_mut() {
                                n.append_markup(&text);
                            }
                        }
                        b"created" => {
                            if let Some(n) = note.as_mut() {
                                n.set_created(&text)?;
                            }
                        }
                        b"updated" => {
                            if let Some(n) = note.as_mut() {
                                n.set_updated(&text)?;
                            }
                        }
                        b"tag" => {
                            if let Some(n) = note.as_mut() {
                                n.append_tag(&text);
                            }
                        }
                        b"data" => {
                            if let Some(a) = attachment.as_mut() {
                                a.append_fragment(&text)?;
                            }
                        }
                        b"mime" => {
                            if let Some(a) = attachment.as_mut() {
                                a.set_mime(&text);
                            }
                        }
                        b"file-name" => {
                            if let Some(a) = attachment.as_mut() {
                                a.set_declared_filename(&text);
                            }
                        }
                        b"timestamp" if in_resource_attributes => {
                            if let Some(a) = attachment.as_mut() {
                                a.set_created(&text)?;
                            }
                        }
                        b"note-attributes" => in_note_attributes = false,
                        b"resource-attributes" => in_resource_attributes = false,
                        b"resource" => {
                            if let (Some(mut a), Some(n)) = (attachment.take(), note.as_mut()) {
                                a.finalize(&n.media_dir(), &options)?;
                                n.register_attachment(a)?;
                                summary.attachments_written += 1;
                            }
                        }
                        b"note" => {
                            if let Some(mut n) = note.take() {
                                let written = n.finalize(self.renderer)?;
                                debug!("Wrote {}", written.display());
                                summary.notes_converted += 1;
                            }
                        }
                        other => {
                            // Leaf elements inside the attribute blocks are
                            // captured verbatim as (name, value) pairs.
                            if !text.is_empty() {
                                let name = String::from_utf8_lossy(other).to_string();
                                if in_resource_attributes {
                                    if let Some(a) = attachment.as_mut() {
                                        a.add_attribute(&name, &text);
                                    }
                                } else if in_note_attributes {
                                    if let Some(n) = note.as_mut() {
                                        n.add_attribute(&name, &text);
                                    }
                                }
                            }
                        }
                    }
                    text.clear();
                }
                Event::Empty(e) => {
                    // A self-closing element carries no text; `<title/>`
                    // still has to run title resolution so the note gets
                    // its identifier-derived filename.
                    if e.local_name().as_ref() == b"title" {
                        if let Some(n) = note.as_mut() {
                            n.set_title("");
                        }
                    }
                    text.clear();
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        info!(
            "{}: {} notes, {} attachments",
            path.display(),
            summary.notes_converted,
            summary.attachments_written
        );
        Ok(summary)
    }
}
