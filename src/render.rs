//! HTML to Markdown rendering seam.
//!
//! The converter treats the text renderer as a black box behind the
//! [`Renderer`] trait so the note pipeline can be tested without depending
//! on a particular renderer's output quirks.

use crate::note::CHECKBOX_MARK;

/// Converts a note's rewritten rich-content markup into Markdown.
pub trait Renderer {
    fn render(&self, html: &str) -> String;
}

/// Default renderer backed by the `html2md` crate.
///
/// The checkbox rewrite leaves a [`CHECKBOX_MARK`] text token where each
/// todo line's dash belongs; substituting the dash only after conversion
/// keeps the renderer from escaping it as a list marker.
#[derive(Debug, Default)]
pub struct MarkdownRenderer;

impl Renderer for MarkdownRenderer {
    fn render(&self, html: &str) -> String {
        html2md::parse_html(html).replace(CHECKBOX_MARK, "-")
    }
}
