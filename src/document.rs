//! Document capability filled by templates
//!
//! How a document stores and serializes its content is up to the
//! implementation; templates only see the operations below, and the renderer
//! only calls [`Document::save`] once the template has returned.

/// A document a template can fill
pub trait Document {
    /// Add a heading; `level` 1 is the most prominent
    fn add_heading(&mut self, level: i64, text: &str);

    fn add_paragraph(&mut self, text: &str);

    /// Add a table row made of already formatted cells
    fn add_row(&mut self, cells: &[String]);

    fn page_break(&mut self);

    /// Serialize the current state
    fn save(&self) -> Vec<u8>;
}

/// Block of content in a [`TextDocument`]
#[derive(Debug, Clone, PartialEq, Eq)]
enum Block {
    Heading(usize, String),
    Paragraph(String),
    Row(Vec<String>),
    PageBreak,
}

/// Plain text document with deterministic output
///
/// Headings render with `#` markers, rows as `|`-separated cells, page
/// breaks as a form feed line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextDocument {
    blocks: Vec<Block>,
}

impl TextDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Render the content as text
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for block in &self.blocks {
            match block {
                Block::Heading(level, text) => {
                    out.push_str(&"#".repeat(*level));
                    out.push(' ');
                    out.push_str(text);
                }
                Block::Paragraph(text) => out.push_str(text),
                Block::Row(cells) => {
                    out.push_str("| ");
                    out.push_str(&cells.join(" | "));
                    out.push_str(" |");
                }
                Block::PageBreak => out.push('\u{c}'),
            }
            out.push('\n');
        }
        out
    }
}

impl Document for TextDocument {
    fn add_heading(&mut self, level: i64, text: &str) {
        let level = level.clamp(1, 6) as usize;
        self.blocks.push(Block::Heading(level, text.to_string()));
    }

    fn add_paragraph(&mut self, text: &str) {
        self.blocks.push(Block::Paragraph(text.to_string()));
    }

    fn add_row(&mut self, cells: &[String]) {
        self.blocks.push(Block::Row(cells.to_vec()));
    }

    fn page_break(&mut self) {
        self.blocks.push(Block::PageBreak);
    }

    fn save(&self) -> Vec<u8> {
        self.to_text().into_bytes()
    }
}
