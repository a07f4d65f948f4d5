//! Document processors: turn a file on disk into ordered chunks.
//!
//! The processor is a narrow collaborator contract. Unsupported file types
//! yield an empty list (not an error); an empty-content document yields a
//! single empty-content chunk so the document still registers.

use std::path::Path;

use async_trait::async_trait;

use crate::config::ProcessorKind;
use crate::errors::{KnowledgeError, KnowledgeResult};
use crate::models::{DocumentChunk, META_SECTION, META_SOURCE_FILE, MetaValue};

#[async_trait]
pub trait DocumentProcessor: Send + Sync {
    /// Chunk one file. `doc_hash` is the content hash the caller computed;
    /// it becomes the chunks' owner hash and sort-id prefix.
    async fn process(&self, path: &Path, doc_hash: &str) -> KnowledgeResult<Vec<DocumentChunk>>;
}

type ProcessorCtor = fn() -> Box<dyn DocumentProcessor>;

/// Registration table mapping processor kinds to constructors.
const PROCESSOR_TABLE: &[(ProcessorKind, ProcessorCtor)] =
    &[(ProcessorKind::Markdown, MarkdownProcessor::boxed)];

/// Resolve a processor kind through the registration table.
pub fn build_processor(kind: ProcessorKind) -> KnowledgeResult<Box<dyn DocumentProcessor>> {
    PROCESSOR_TABLE
        .iter()
        .find(|(candidate, _)| *candidate == kind)
        .map(|(_, ctor)| ctor())
        .ok_or_else(|| KnowledgeError::UnknownProcessorKind(kind.to_string()))
}

/// Heading-aware markdown chunker with a paragraph fallback for plain text.
#[derive(Debug, Default)]
pub struct MarkdownProcessor;

const SUPPORTED_EXTENSIONS: &[&str] = &["md", "markdown", "txt", "text"];
const MIN_CHUNK_CHARS: usize = 200;
const MAX_PARAGRAPH_CHARS: usize = 1500;

impl MarkdownProcessor {
    fn boxed() -> Box<dyn DocumentProcessor> {
        Box::new(Self)
    }

    fn is_supported(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
    }
}

#[async_trait]
impl DocumentProcessor for MarkdownProcessor {
    async fn process(&self, path: &Path, doc_hash: &str) -> KnowledgeResult<Vec<DocumentChunk>> {
        if !Self::is_supported(path) {
            return Ok(Vec::new());
        }

        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|err| KnowledgeError::Ingestion {
                path: path.to_path_buf(),
                reason: err.to_string(),
            })?;

        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("document")
            .to_string();

        if raw.trim().is_empty() {
            // empty documents still produce one (empty) chunk
            let mut chunk = DocumentChunk::new("", doc_hash);
            stamp(&mut chunk, doc_hash, 0, "Intro", &file_name);
            return Ok(vec![chunk]);
        }

        let is_markdown = matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("md") | Some("markdown")
        );
        let sections = if is_markdown {
            chunk_markdown(&raw)
        } else {
            chunk_plain_text(&raw)
        };

        let mut chunks = Vec::with_capacity(sections.len());
        for (index, section) in sections.into_iter().enumerate() {
            let mut chunk = DocumentChunk::new(section.content, doc_hash);
            stamp(&mut chunk, doc_hash, index, &section.title, &file_name);
            chunks.push(chunk);
        }
        Ok(chunks)
    }
}

fn stamp(chunk: &mut DocumentChunk, doc_hash: &str, index: usize, section: &str, file_name: &str) {
    chunk.assign_sort_id(format!("{doc_hash}:{index}"));
    chunk
        .metadata
        .insert(META_SECTION.to_string(), MetaValue::from(section));
    chunk
        .metadata
        .insert(META_SOURCE_FILE.to_string(), MetaValue::from(file_name));
}

struct Section {
    title: String,
    content: String,
}

fn chunk_markdown(input: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut current_title = String::from("Intro");
    let mut current_lines: Vec<&str> = Vec::new();

    for line in input.lines() {
        if let Some(title) = parse_heading(line) {
            push_section(&mut sections, &current_title, &current_lines);
            current_title = title;
            current_lines.clear();
        } else {
            current_lines.push(line);
        }
    }
    push_section(&mut sections, &current_title, &current_lines);

    merge_small_sections(sections, MIN_CHUNK_CHARS)
}

fn push_section(sections: &mut Vec<Section>, title: &str, lines: &[&str]) {
    if lines.is_empty() {
        return;
    }
    let content = lines.join("\n").trim().to_string();
    if !content.is_empty() {
        sections.push(Section {
            title: title.to_string(),
            content,
        });
    }
}

fn parse_heading(line: &str) -> Option<String> {
    let trimmed = line.trim_start();
    if !trimmed.starts_with('#') {
        return None;
    }
    let hashes = trimmed.chars().take_while(|c| *c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let title = trimmed[hashes..].trim();
    if title.is_empty() { None } else { Some(title.to_string()) }
}

fn merge_small_sections(sections: Vec<Section>, min_chars: usize) -> Vec<Section> {
    if sections.len() <= 1 {
        return sections;
    }

    let mut merged: Vec<Section> = Vec::new();
    let mut i = 0;
    while i < sections.len() {
        let mut current = Section {
            title: sections[i].title.clone(),
            content: sections[i].content.clone(),
        };
        while current.content.len() < min_chars && i + 1 < sections.len() {
            i += 1;
            current.content.push_str("\n\n");
            current.content.push_str(&sections[i].content);
        }
        merged.push(current);
        i += 1;
    }

    merged
}

/// Split plain text on blank lines, packing paragraphs up to a size cap.
fn chunk_plain_text(input: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut current = String::new();

    for paragraph in input.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }
        if !current.is_empty() && current.len() + paragraph.len() > MAX_PARAGRAPH_CHARS {
            sections.push(Section {
                title: format!("Part {}", sections.len() + 1),
                content: std::mem::take(&mut current),
            });
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(paragraph);
    }
    if !current.is_empty() {
        sections.push(Section {
            title: format!("Part {}", sections.len() + 1),
            content: current,
        });
    }

    sections
}
