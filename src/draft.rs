//! Draft documents as block lists.
//!
//! A draft is stored as a child document of its job. The layout is fixed so
//! that a draft written by [`DraftArtifact::to_blocks`] can be read back by
//! [`DraftArtifact::from_blocks`] after a restart:
//!
//! ```text
//! Callout   "Status: Draft | Generated: ..."
//! Quote     "Meta: <description>"        (optional)
//! Divider
//! ...body blocks...
//! Divider                                (optional script section)
//! Heading2  "Podcast Script"
//! ...script paragraphs...
//! Divider                                (zero or more amendments)
//! Heading2  "Added: <instruction>"
//! ...amendment blocks...
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Longest text a single block may carry.
pub const MAX_BLOCK_CHARS: usize = 1900;
/// Title prefix that marks a job's draft document.
pub const DRAFT_TITLE_PREFIX: &str = "Draft: ";

const META_PREFIX: &str = "Meta: ";
const SCRIPT_HEADING: &str = "Podcast Script";
const AMENDMENT_PREFIX: &str = "Added: ";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "text", rename_all = "snake_case")]
pub enum Block {
    Callout(String),
    Quote(String),
    Divider,
    Heading1(String),
    Heading2(String),
    Heading3(String),
    Paragraph(String),
    Bullet(String),
}

impl Block {
    pub fn text(&self) -> Option<&str> {
        match self {
            Block::Divider => None,
            Block::Callout(t)
            | Block::Quote(t)
            | Block::Heading1(t)
            | Block::Heading2(t)
            | Block::Heading3(t)
            | Block::Paragraph(t)
            | Block::Bullet(t) => Some(t),
        }
    }
}

/// Split markdown on blank lines into headings, bullets and chunked paragraphs.
pub fn markdown_to_blocks(markdown: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    for paragraph in markdown.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }
        if let Some(rest) = paragraph.strip_prefix("### ") {
            blocks.push(Block::Heading3(rest.trim().to_string()));
        } else if let Some(rest) = paragraph.strip_prefix("## ") {
            blocks.push(Block::Heading2(rest.trim().to_string()));
        } else if let Some(rest) = paragraph.strip_prefix("# ") {
            blocks.push(Block::Heading1(rest.trim().to_string()));
        } else if paragraph.starts_with("- ") || paragraph.starts_with("* ") {
            for line in paragraph.lines() {
                let line = line.trim();
                let item = line
                    .strip_prefix("- ")
                    .or_else(|| line.strip_prefix("* "))
                    .unwrap_or(line)
                    .trim();
                if !item.is_empty() {
                    blocks.extend(chunk_chars(item, MAX_BLOCK_CHARS).map(Block::Bullet));
                }
            }
        } else {
            blocks.extend(chunk_chars(paragraph, MAX_BLOCK_CHARS).map(Block::Paragraph));
        }
    }
    blocks
}

/// Inverse of [`markdown_to_blocks`], close enough to re-publish a body.
///
/// A paragraph or bullet block ending in whitespace was split by
/// [`chunk_chars`]; the block after it is appended to the same text.
pub fn blocks_to_markdown(blocks: &[Block]) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut bullets: Vec<String> = Vec::new();
    let mut open_paragraph = false;
    for block in blocks {
        if let Block::Bullet(text) = block {
            match bullets.last_mut() {
                Some(last) if is_continued(last) => last.push_str(text),
                _ => bullets.push(format!("- {text}")),
            }
            continue;
        }
        if !bullets.is_empty() {
            out.push(bullets.join("\n"));
            bullets.clear();
            open_paragraph = false;
        }
        match block {
            Block::Paragraph(t) => match out.last_mut() {
                Some(last) if open_paragraph && is_continued(last) => last.push_str(t),
                _ => out.push(t.clone()),
            },
            Block::Heading1(t) => out.push(format!("# {t}")),
            Block::Heading2(t) => out.push(format!("## {t}")),
            Block::Heading3(t) => out.push(format!("### {t}")),
            Block::Quote(t) | Block::Callout(t) => out.push(t.clone()),
            Block::Divider | Block::Bullet(_) => {}
        }
        open_paragraph = matches!(block, Block::Paragraph(_));
    }
    if !bullets.is_empty() {
        out.push(bullets.join("\n"));
    }
    out.join("\n\n")
}

/// Blocks for one amendment section.
pub fn amendment_blocks(instruction: &str, addition: &str) -> Vec<Block> {
    let heading = truncate_chars(instruction.trim(), 80);
    let mut blocks = vec![
        Block::Divider,
        Block::Heading2(format!("{AMENDMENT_PREFIX}{heading}")),
    ];
    blocks.extend(markdown_to_blocks(addition));
    blocks
}

pub fn word_count(text: &str) -> u32 {
    u32::try_from(text.split_whitespace().count()).unwrap_or(u32::MAX)
}

/// Render markdown to HTML for publishing targets.
pub fn render_html(markdown: &str) -> String {
    let options = pulldown_cmark::Options::ENABLE_TABLES | pulldown_cmark::Options::ENABLE_STRIKETHROUGH;
    let parser = pulldown_cmark::Parser::new_ext(markdown, options);
    let mut html = String::new();
    pulldown_cmark::html::push_html(&mut html, parser);
    html
}

/// The persisted review draft of a job.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DraftArtifact {
    pub title: String,
    pub body: String,
    pub meta_description: Option<String>,
    pub script: Option<String>,
}

impl DraftArtifact {
    pub fn document_title(&self) -> String {
        format!("{DRAFT_TITLE_PREFIX}{}", self.title)
    }

    pub fn to_blocks(&self) -> Vec<Block> {
        let mut blocks = vec![Block::Callout(format!(
            "Status: Draft | Generated: {}",
            Utc::now().format("%Y-%m-%d %H:%M")
        ))];
        if let Some(meta) = self.meta_description.as_deref().filter(|m| !m.is_empty()) {
            blocks.push(Block::Quote(format!("{META_PREFIX}{meta}")));
        }
        blocks.push(Block::Divider);
        blocks.extend(markdown_to_blocks(&self.body));
        if let Some(script) = self.script.as_deref().filter(|s| !s.is_empty()) {
            blocks.push(Block::Divider);
            blocks.push(Block::Heading2(SCRIPT_HEADING.to_string()));
            blocks.extend(chunk_chars(script, MAX_BLOCK_CHARS).map(Block::Paragraph));
        }
        blocks
    }

    /// Rebuild a draft from stored blocks. Amendment sections are folded
    /// back into the body in append order.
    pub fn from_blocks(title: &str, blocks: &[Block]) -> Self {
        let mut sections = blocks.split(|b| *b == Block::Divider);

        let header = sections.next().unwrap_or_default();
        let meta_description = header.iter().find_map(|b| match b {
            Block::Quote(t) => t.strip_prefix(META_PREFIX).map(str::to_string),
            _ => None,
        });

        let mut body_parts = Vec::new();
        let mut script = None;
        for (idx, section) in sections.enumerate() {
            match section.first() {
                Some(Block::Heading2(h)) if h == SCRIPT_HEADING => {
                    let text: String = section[1..].iter().filter_map(Block::text).collect();
                    script = Some(text);
                }
                Some(Block::Heading2(h)) if idx > 0 && h.starts_with(AMENDMENT_PREFIX) => {
                    body_parts.push(blocks_to_markdown(&section[1..]));
                }
                _ => body_parts.push(blocks_to_markdown(section)),
            }
        }

        Self {
            title: title.to_string(),
            body: body_parts
                .into_iter()
                .filter(|p| !p.is_empty())
                .collect::<Vec<_>>()
                .join("\n\n"),
            meta_description,
            script,
        }
    }
}

/// Split `text` into pieces of at most `size` chars, breaking after the last
/// whitespace that fits. Every piece but the last keeps that whitespace, so
/// concatenating the pieces gives back `text`. A run with no whitespace is
/// cut at `size`.
fn chunk_chars(text: &str, size: usize) -> impl Iterator<Item = String> {
    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0;
    while chars.len() - start > size {
        let window = &chars[start..start + size];
        let end = match window.iter().rposition(|c| c.is_whitespace()) {
            Some(idx) if idx > 0 => start + idx + 1,
            _ => start + size,
        };
        chunks.push(chars[start..end].iter().collect::<String>());
        start = end;
    }
    if start < chars.len() {
        chunks.push(chars[start..].iter().collect());
    }
    chunks.into_iter()
}

fn is_continued(text: &str) -> bool {
    text.ends_with(char::is_whitespace)
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DraftArtifact {
        DraftArtifact {
            title: "Disclosure Windows".into(),
            body: "# Intro\n\nVendors get ninety days.\n\n- patch\n- announce\n\n## Details\n\nMore text.".into(),
            meta_description: Some("How long vendors get".into()),
            script: Some("Welcome to the show.".into()),
        }
    }

    #[test]
    fn markdown_splits_into_typed_blocks() {
        let blocks = markdown_to_blocks("# A\n\n## B\n\n### C\n\n- x\n* y\n\nplain");
        assert_eq!(
            blocks,
            vec![
                Block::Heading1("A".into()),
                Block::Heading2("B".into()),
                Block::Heading3("C".into()),
                Block::Bullet("x".into()),
                Block::Bullet("y".into()),
                Block::Paragraph("plain".into()),
            ]
        );
    }

    #[test]
    fn long_paragraphs_are_chunked() {
        let text = "a".repeat(MAX_BLOCK_CHARS * 2 + 5);
        let blocks = markdown_to_blocks(&text);
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[2], Block::Paragraph("a".repeat(5)));
    }

    #[test]
    fn long_paragraph_splits_between_words_and_reads_back() {
        let paragraph = (0..400)
            .map(|i| format!("word{i:03}"))
            .collect::<Vec<_>>()
            .join(" ");
        assert!(paragraph.chars().count() > MAX_BLOCK_CHARS);
        let body = format!("## Timeline\n\n{paragraph}\n\nShort closing line.");

        let blocks = markdown_to_blocks(&body);
        let pieces: Vec<&str> = blocks
            .iter()
            .filter_map(|b| match b {
                Block::Paragraph(t) if t.contains("word") => Some(t.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(pieces.len(), 2);
        assert!(pieces.iter().all(|p| p.chars().count() <= MAX_BLOCK_CHARS));
        assert!(pieces[0].ends_with(' '));
        assert!(pieces[1].starts_with("word"));

        let draft = DraftArtifact {
            title: "Timeline".into(),
            body: body.clone(),
            ..Default::default()
        };
        let restored = DraftArtifact::from_blocks("Timeline", &draft.to_blocks());
        assert_eq!(restored.body, body);
        assert_eq!(word_count(&restored.body), word_count(&body));
    }

    #[test]
    fn bullets_keep_inline_emphasis() {
        let blocks = markdown_to_blocks("- **Patch window**: ninety days\n- *Embargo* rules\n* plain");
        assert_eq!(
            blocks,
            vec![
                Block::Bullet("**Patch window**: ninety days".into()),
                Block::Bullet("*Embargo* rules".into()),
                Block::Bullet("plain".into()),
            ]
        );
    }

    #[test]
    fn long_bullets_are_chunked_not_truncated() {
        let item = vec!["detail"; 400].join(" ");
        let markdown = format!("- {item}\n- next");
        let blocks = markdown_to_blocks(&markdown);
        assert_eq!(blocks.len(), 3);
        assert!(blocks.iter().all(|b| b.text().unwrap().chars().count() <= MAX_BLOCK_CHARS));
        assert_eq!(blocks_to_markdown(&blocks), markdown);
    }

    #[test]
    fn draft_layout_reads_back() {
        let draft = sample();
        let restored = DraftArtifact::from_blocks(&draft.title, &draft.to_blocks());
        assert_eq!(restored.title, draft.title);
        assert_eq!(restored.meta_description, draft.meta_description);
        assert_eq!(restored.script, draft.script);
        assert_eq!(restored.body, draft.body);
    }

    #[test]
    fn amendments_fold_into_body() {
        let draft = sample();
        let mut blocks = draft.to_blocks();
        blocks.extend(amendment_blocks("add a timeline", "2021: first report."));
        let restored = DraftArtifact::from_blocks(&draft.title, &blocks);
        assert!(restored.body.ends_with("2021: first report."));
        assert_eq!(restored.script.as_deref(), Some("Welcome to the show."));
    }

    #[test]
    fn draft_without_meta_or_script() {
        let draft = DraftArtifact {
            title: "T".into(),
            body: "Only body.".into(),
            ..Default::default()
        };
        let blocks = draft.to_blocks();
        assert!(!blocks.iter().any(|b| matches!(b, Block::Quote(_))));
        let restored = DraftArtifact::from_blocks("T", &blocks);
        assert_eq!(restored.body, "Only body.");
        assert!(restored.script.is_none());
        assert!(restored.meta_description.is_none());
    }

    #[test]
    fn amendment_heading_is_truncated() {
        let blocks = amendment_blocks(&"x".repeat(200), "body");
        match &blocks[1] {
            Block::Heading2(h) => assert_eq!(h.chars().count(), AMENDMENT_PREFIX.len() + 80),
            other => panic!("unexpected block {other:?}"),
        }
    }

    #[test]
    fn counts_words_and_renders_html() {
        assert_eq!(word_count("one two\n three"), 3);
        let html = render_html("## Title\n\nSome *text*.");
        assert!(html.contains("<h2>Title</h2>"));
        assert!(html.contains("<em>text</em>"));
    }
}
