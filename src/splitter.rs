//! Splits chapters whose content exceeds a word-count threshold into parts,
//! while preserving the surrounding XHTML document structure.

use std::{
    io::{Read, Seek},
    path::Path,
    sync::LazyLock,
};

use regex::Regex;

use crate::{
    chapter::{Chapter, ChapterRef},
    error::EpubError,
};

static OPEN_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<(p|blockquote|div|h[1-6]|section|article|aside|pre|li|tr)\b[^>]*>").unwrap()
});
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"&[^;]+;").unwrap());
static DOCTYPE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<!DOCTYPE[^>]*>").unwrap());
static HTML_OPEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<html[^>]*>").unwrap());
static HEAD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<head\b[^>]*>.*?</head>").unwrap());
static BODY_OPEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<body[^>]*>").unwrap());
static BODY_CLOSE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)</body>").unwrap());

/// Default word-count threshold above which a chapter is split into parts.
pub const DEFAULT_SPLIT_THRESHOLD: usize = crate::config::DEFAULT_SPLIT_THRESHOLD;

pub struct ChapterSplitter {
    threshold: usize,
}

impl ChapterSplitter {
    pub fn new(threshold: usize) -> Self {
        Self { threshold }
    }

    /// Splits an eagerly-loaded chapter. `parent_title` is the caller-supplied
    /// fallback used when neither this chapter nor its own title is available.
    pub fn split(&self, chapter: Chapter, parent_title: Option<&str>) -> Vec<Chapter> {
        let word_count = count_words(&chapter.html);
        let parts_count = self.parts_for(word_count);
        let base = resolve_base_title(&chapter.title, parent_title, &chapter.content_file_name);

        if parts_count <= 1 {
            let sub_chapters = chapter
                .sub_chapters
                .into_iter()
                .flat_map(|sub| self.split(sub, Some(&base)))
                .collect();

            return vec![Chapter {
                sub_chapters,
                ..chapter
            }];
        }

        let shell = parse_document(&chapter.html);
        let body_content = shell.as_ref().map_or_else(|| chapter.html.clone(), |(_, body)| body.clone());
        let body_parts = split_body_content(&body_content, parts_count);
        let total = body_parts.len();

        let mut sub_chapters_split: Option<Vec<Chapter>> = Some(
            chapter
                .sub_chapters
                .into_iter()
                .flat_map(|sub| self.split(sub, Some(&base)))
                .collect(),
        );

        body_parts
            .into_iter()
            .enumerate()
            .map(|(index, body_part)| {
                let html = match &shell {
                    Some((doc_shell, _)) => reassemble(doc_shell, &body_part),
                    None => body_part,
                };

                Chapter {
                    title: format!("{} ({}/{})", base, index + 1, total),
                    content_file_name: chapter.content_file_name.clone(),
                    anchor: if index == 0 { chapter.anchor.clone() } else { None },
                    html,
                    sub_chapters: if index == 0 { sub_chapters_split.take().unwrap_or_default() } else { vec![] },
                }
            })
            .collect()
    }

    /// Splits a lazily-loaded chapter ref. Each resulting ref already holds
    /// its precomputed part content; reading it back never reopens the archive.
    pub fn split_ref<R: Read + Seek>(
        &self,
        chapter: ChapterRef<R>,
        parent_title: Option<&str>,
    ) -> Result<Vec<ChapterRef<R>>, EpubError> {
        let html = chapter.html_content()?;
        let word_count = count_words(&html);
        let parts_count = self.parts_for(word_count);
        let base = resolve_base_title(&chapter.title, parent_title, &chapter.content_file_name);

        if parts_count <= 1 {
            let mut sub_chapters = Vec::with_capacity(chapter.sub_chapters.len());
            for sub in chapter.sub_chapters {
                sub_chapters.extend(self.split_ref(sub, Some(&base))?);
            }
            return Ok(vec![chapter.with_sub_chapters(sub_chapters)]);
        }

        let shell = parse_document(&html);
        let body_content = shell.as_ref().map_or_else(|| html.clone(), |(_, body)| body.clone());
        let body_parts = split_body_content(&body_content, parts_count);
        let total = body_parts.len();

        let mut sub_chapters_split = Vec::with_capacity(chapter.sub_chapters.len());
        for sub in chapter.sub_chapters {
            sub_chapters_split.extend(self.split_ref(sub, Some(&base))?);
        }
        let mut sub_chapters_split = Some(sub_chapters_split);

        let mut result = Vec::with_capacity(total);
        for (index, body_part) in body_parts.into_iter().enumerate() {
            let part_html = match &shell {
                Some((doc_shell, _)) => reassemble(doc_shell, &body_part),
                None => body_part,
            };

            result.push(ChapterRef::from_inline(
                format!("{} ({}/{})", base, index + 1, total),
                chapter.content_file_name.clone(),
                if index == 0 { chapter.anchor.clone() } else { None },
                part_html,
                if index == 0 { sub_chapters_split.take().unwrap_or_default() } else { vec![] },
            ));
        }

        Ok(result)
    }

    fn parts_for(&self, word_count: usize) -> usize {
        if self.threshold == 0 {
            return 1;
        }
        word_count.div_ceil(self.threshold).max(1)
    }
}

fn resolve_base_title(title: &str, parent_title: Option<&str>, file_name: &Path) -> String {
    if !title.trim().is_empty() {
        return title.to_string();
    }
    if let Some(parent) = parent_title.filter(|title| !title.trim().is_empty()) {
        return parent.to_string();
    }
    file_name
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| "Chapter".to_string())
}

fn strip_markup(html: &str) -> String {
    let without_tags = TAG_RE.replace_all(html, " ");
    ENTITY_RE.replace_all(&without_tags, " ").to_string()
}

fn count_words(html: &str) -> usize {
    strip_markup(html).split_whitespace().count()
}

/// The literal markup surrounding the body content of a complete XHTML document.
struct DocumentShell {
    doctype: String,
    html_open: String,
    head: String,
    body_open: String,
    trailing: String,
}

/// If `html` is a complete document (has `<html>`, `<head>`, `<body>`), splits
/// it into its shell and body content. Otherwise returns `None` and the whole
/// input is treated as body content.
fn parse_document(html: &str) -> Option<(DocumentShell, String)> {
    if !HTML_OPEN_RE.is_match(html) || !HEAD_RE.is_match(html) || !BODY_OPEN_RE.is_match(html) {
        return None;
    }

    let doctype = DOCTYPE_RE.find(html).map(|m| m.as_str().to_string()).unwrap_or_default();
    let html_open = HTML_OPEN_RE.find(html)?.as_str().to_string();
    let head = HEAD_RE.find(html)?.as_str().to_string();

    let body_open_match = BODY_OPEN_RE.find(html)?;
    let body_open = body_open_match.as_str().to_string();

    let (body_content, trailing) = match BODY_CLOSE_RE.find_at(html, body_open_match.end()) {
        Some(close_match) => (
            html[body_open_match.end()..close_match.start()].to_string(),
            html[close_match.end()..].to_string(),
        ),
        None => (html[body_open_match.end()..].to_string(), String::new()),
    };

    Some((
        DocumentShell {
            doctype,
            html_open,
            head,
            body_open,
            trailing,
        },
        body_content,
    ))
}

fn reassemble(shell: &DocumentShell, body_part: &str) -> String {
    let mut out = String::with_capacity(
        shell.doctype.len() + shell.html_open.len() + shell.head.len() + shell.body_open.len() + body_part.len() + 16,
    );

    out.push_str(&shell.doctype);
    out.push_str(&shell.html_open);
    out.push_str(&shell.head);
    out.push_str(&shell.body_open);
    out.push_str(body_part);
    out.push_str("</body>");

    if shell.trailing.is_empty() {
        out.push_str("</html>");
    } else {
        out.push_str(&shell.trailing);
    }

    out
}

/// Byte ranges, in order, of every non-overlapping block-level element match.
fn find_blocks(body: &str) -> Vec<(usize, usize)> {
    let mut blocks = Vec::new();
    let mut search_from = 0;

    for captures in OPEN_TAG.captures_iter(body) {
        let whole = captures.get(0).unwrap();
        if whole.start() < search_from {
            continue;
        }

        let tag = &captures[1];
        let close_pattern = format!(r"(?i)</{}>", regex::escape(tag));
        let close_re = Regex::new(&close_pattern).expect("tag name is alphanumeric, always a valid pattern");

        match close_re.find_at(body, whole.end()) {
            Some(close_match) => {
                blocks.push((whole.start(), close_match.end()));
                search_from = close_match.end();
            }
            None => search_from = whole.end(),
        }
    }

    blocks
}

/// Splits body content into `parts` pieces, streaming whole block elements
/// into each part so that no element is cut in half.
fn split_body_content(body: &str, parts: usize) -> Vec<String> {
    let blocks = find_blocks(body);
    if blocks.is_empty() {
        return split_into_equal_chunks(body, parts);
    }

    let prelude = &body[..blocks[0].0];
    let tail = &body[blocks[blocks.len() - 1].1..];

    let word_counts: Vec<usize> = blocks.iter().map(|(start, end)| count_words(&body[*start..*end])).collect();
    let total_words: usize = word_counts.iter().sum();
    let target = total_words.div_ceil(parts).max(1);

    let mut result = Vec::new();
    let mut current = String::new();
    let mut current_words = 0usize;
    let mut current_block_count = 0usize;

    for (index, (start, end)) in blocks.iter().enumerate() {
        let block_words = word_counts[index];

        if current_block_count >= 1 && current_words + block_words > target && result.len() + 1 < parts {
            result.push(std::mem::take(&mut current));
            current_words = 0;
            current_block_count = 0;
        }

        current.push_str(&body[*start..*end]);
        current_words += block_words;
        current_block_count += 1;
    }
    result.push(current);

    if let Some(first) = result.first_mut() {
        first.insert_str(0, prelude);
    }
    if let Some(last) = result.last_mut() {
        last.push_str(tail);
    }

    result
}

fn split_into_equal_chunks(body: &str, parts: usize) -> Vec<String> {
    let chars: Vec<char> = body.chars().collect();
    if chars.is_empty() {
        return vec![String::new(); parts.max(1)];
    }

    let chunk_size = chars.len().div_ceil(parts).max(1);
    chars.chunks(chunk_size).map(|chunk| chunk.iter().collect()).collect()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn chapter(title: &str, html: &str) -> Chapter {
        Chapter {
            title: title.to_string(),
            content_file_name: PathBuf::from("chapter.xhtml"),
            anchor: Some("top".to_string()),
            html: html.to_string(),
            sub_chapters: vec![],
        }
    }

    #[test]
    fn test_no_split_under_threshold() {
        let splitter = ChapterSplitter::new(100);
        let parts = splitter.split(chapter("Intro", "<html><head></head><body><p>short text</p></body></html>"), None);
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].title, "Intro");
    }

    #[test]
    fn test_split_preserves_document_shell() {
        let body_words = (0..30).map(|i| format!("<p>word{}</p>", i)).collect::<Vec<_>>().join("");
        let html = format!("<!DOCTYPE html><html><head><title>T</title></head><body>{}</body></html>", body_words);

        let splitter = ChapterSplitter::new(10);
        let parts = splitter.split(chapter("Long Chapter", &html), None);

        assert!(parts.len() > 1);
        for part in &parts {
            assert!(part.html.starts_with("<!DOCTYPE html><html><head><title>T</title></head><body>"));
            assert!(part.html.ends_with("</body></html>"));
        }

        assert!(parts[0].title.starts_with("Long Chapter (1/"));
        assert_eq!(parts[0].anchor, Some("top".to_string()));
        assert_eq!(parts[1].anchor, None);
    }

    #[test]
    fn test_parent_title_fallback_when_chapter_title_empty() {
        let splitter = ChapterSplitter::new(5);
        let body_words = (0..20).map(|i| format!("<p>word{}</p>", i)).collect::<Vec<_>>().join("");
        let parts = splitter.split(chapter("", &body_words), Some("Part One"));
        assert!(parts[0].title.starts_with("Part One ("));
    }

    #[test]
    fn test_fallback_to_equal_chunks_without_block_elements() {
        let text = "a".repeat(100);
        let chunks = split_body_content(&text, 4);
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks.iter().map(|c| c.len()).sum::<usize>(), 100);
    }

    #[test]
    fn test_count_words_strips_tags_and_entities() {
        assert_eq!(count_words("<p>one&nbsp;two <b>three</b></p>"), 3);
    }
}
