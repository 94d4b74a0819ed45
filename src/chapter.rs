//! Reconciles the navigation tree with the spine into a chapter tree, and
//! derives titles for content that the navigation tree leaves unlabeled.

use std::{
    collections::{HashMap, HashSet},
    io::{Read, Seek},
    path::{Path, PathBuf},
    sync::Arc,
};

use std::sync::LazyLock;

use regex::Regex;

use crate::{
    archive::Archive,
    content_index::ContentIndex,
    error::EpubError,
    package::Package,
    types::{Navigation, NavPoint},
    utils::{DecodeBytes, NormalizeWhitespace},
};

/// A chapter with its HTML content already loaded.
#[derive(Debug, Clone)]
pub struct Chapter {
    pub title: String,
    pub content_file_name: PathBuf,
    pub anchor: Option<String>,
    pub html: String,
    pub sub_chapters: Vec<Chapter>,
}

/// Where a [`ChapterRef`] reads its HTML from.
enum ContentSource<R: Read + Seek> {
    Archive(Arc<Archive<R>>),
    /// Content already materialised by the splitter (a chapter part).
    Inline(String),
}

/// A chapter whose HTML is read on demand.
pub struct ChapterRef<R: Read + Seek> {
    pub title: String,
    pub content_file_name: PathBuf,
    pub anchor: Option<String>,
    pub sub_chapters: Vec<ChapterRef<R>>,
    source: ContentSource<R>,
}

impl<R: Read + Seek> ChapterRef<R> {
    fn from_archive(
        archive: Arc<Archive<R>>,
        title: String,
        content_file_name: PathBuf,
        anchor: Option<String>,
        sub_chapters: Vec<ChapterRef<R>>,
    ) -> Self {
        Self {
            title,
            content_file_name,
            anchor,
            sub_chapters,
            source: ContentSource::Archive(archive),
        }
    }

    /// Builds a ref around content already produced in memory (a split part).
    pub fn from_inline(
        title: String,
        content_file_name: PathBuf,
        anchor: Option<String>,
        content: String,
        sub_chapters: Vec<ChapterRef<R>>,
    ) -> Self {
        Self {
            title,
            content_file_name,
            anchor,
            sub_chapters,
            source: ContentSource::Inline(content),
        }
    }

    pub fn with_sub_chapters(mut self, sub_chapters: Vec<ChapterRef<R>>) -> Self {
        self.sub_chapters = sub_chapters;
        self
    }

    /// Reads the chapter's HTML, from the archive or from a precomputed part.
    pub fn html_content(&self) -> Result<String, EpubError> {
        match &self.source {
            ContentSource::Archive(archive) => {
                let path = self.content_file_name.to_str().ok_or_else(|| EpubError::MissingContent {
                    href: self.content_file_name.to_string_lossy().to_string(),
                })?;
                archive.read_text(path)
            }
            ContentSource::Inline(content) => Ok(content.clone()),
        }
    }
}

/// An NCX/nav point resolved against the spine and content index, independent
/// of whether its HTML will be loaded eagerly or lazily.
#[derive(Debug, Clone)]
struct ResolvedChapter {
    title: String,
    base: String,
    anchor: Option<String>,
    children: Vec<ResolvedChapter>,
}

pub struct ChapterBuilder;

impl ChapterBuilder {
    pub fn build_eager<R: Read + Seek>(
        archive: &Archive<R>,
        package: &Package,
        navigation: &Navigation,
        index: &ContentIndex,
    ) -> Result<Vec<Chapter>, EpubError> {
        let resolved = Self::resolve_all(package, navigation, index, archive)?;
        resolved.into_iter().map(|chapter| Self::materialize(archive, chapter)).collect()
    }

    pub fn build_lazy<R: Read + Seek>(
        archive: Arc<Archive<R>>,
        package: &Package,
        navigation: &Navigation,
        index: &ContentIndex,
    ) -> Result<Vec<ChapterRef<R>>, EpubError> {
        let resolved = Self::resolve_all(package, navigation, index, archive.as_ref())?;
        Ok(resolved
            .into_iter()
            .map(|chapter| Self::to_ref(&archive, chapter))
            .collect())
    }

    fn materialize<R: Read + Seek>(
        archive: &Archive<R>,
        chapter: ResolvedChapter,
    ) -> Result<Chapter, EpubError> {
        let html = archive.read_text(&chapter.base)?;
        let sub_chapters = chapter
            .children
            .into_iter()
            .map(|child| Self::materialize(archive, child))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Chapter {
            title: chapter.title,
            content_file_name: PathBuf::from(chapter.base),
            anchor: chapter.anchor,
            html,
            sub_chapters,
        })
    }

    fn to_ref<R: Read + Seek>(archive: &Arc<Archive<R>>, chapter: ResolvedChapter) -> ChapterRef<R> {
        let sub_chapters = chapter
            .children
            .into_iter()
            .map(|child| Self::to_ref(archive, child))
            .collect();

        ChapterRef::from_archive(
            Arc::clone(archive),
            chapter.title,
            PathBuf::from(chapter.base),
            chapter.anchor,
            sub_chapters,
        )
    }

    fn resolve_all<R: Read + Seek>(
        package: &Package,
        navigation: &Navigation,
        index: &ContentIndex,
        archive: &Archive<R>,
    ) -> Result<Vec<ResolvedChapter>, EpubError> {
        let spine_positions = Self::spine_position_map(package, index);

        let mut seen = HashSet::new();
        let mut handled = HashSet::new();
        let ncx_top = Self::walk(&navigation.nav_map, index, archive, &mut seen, &mut handled)?;

        let orphans = Self::orphans(package, &spine_positions, index, &handled, archive)?;

        Ok(Self::merge(ncx_top, orphans, &spine_positions))
    }

    /// `href -> spine position`, resolved through the manifest, skipping
    /// itemRefs whose idref has no manifest entry.
    fn spine_position_map(package: &Package, index: &ContentIndex) -> HashMap<String, usize> {
        let mut positions = HashMap::new();

        for (position, item) in package.spine.items.iter().enumerate() {
            let Some(manifest_item) = package.manifest.get(&item.idref) else {
                continue;
            };
            let Some(href) = manifest_item.path.to_str() else {
                continue;
            };
            if index.is_html(href) {
                positions.entry(href.to_string()).or_insert(position);
            }
        }

        positions
    }

    fn walk<R: Read + Seek>(
        nav_points: &[NavPoint],
        index: &ContentIndex,
        archive: &Archive<R>,
        seen: &mut HashSet<String>,
        handled: &mut HashSet<String>,
    ) -> Result<Vec<ResolvedChapter>, EpubError> {
        let mut chapters = Vec::new();

        for point in nav_points {
            let Some(content) = &point.content else {
                continue;
            };
            let raw = content.to_string_lossy();
            let (base, anchor) = split_anchor(&raw);
            let base = percent_decode(&base);

            if seen.contains(&base) {
                continue;
            }

            if !index.is_html(&base) {
                return Err(EpubError::MissingContent { href: base });
            }

            seen.insert(base.clone());
            handled.insert(base.clone());

            let title = if point.label.trim().is_empty() {
                extract_title(archive, &base)?
            } else {
                point.label.normalize_whitespace()
            };

            let children = Self::walk(&point.children, index, archive, seen, handled)?;

            chapters.push(ResolvedChapter {
                title,
                base,
                anchor,
                children,
            });
        }

        Ok(chapters)
    }

    fn orphans<R: Read + Seek>(
        package: &Package,
        spine_positions: &HashMap<String, usize>,
        index: &ContentIndex,
        handled: &HashSet<String>,
        archive: &Archive<R>,
    ) -> Result<Vec<ResolvedChapter>, EpubError> {
        let mut orphans = Vec::new();

        let mut ordered: Vec<&String> = spine_positions.keys().collect();
        ordered.sort_by_key(|href| spine_positions[*href]);

        for href in ordered {
            if handled.contains(href) || !index.is_html(href) {
                continue;
            }

            let title = extract_title(archive, href)?;
            orphans.push(ResolvedChapter {
                title,
                base: href.clone(),
                anchor: None,
                children: vec![],
            });
        }

        Ok(orphans)
    }

    fn merge(
        ncx_top: Vec<ResolvedChapter>,
        orphans: Vec<ResolvedChapter>,
        spine_positions: &HashMap<String, usize>,
    ) -> Vec<ResolvedChapter> {
        let mut combined: Vec<ResolvedChapter> = ncx_top.into_iter().chain(orphans).collect();

        // NCX chapters whose base isn't in the spine sort to the end, in their
        // original relative order, per the merge rule's documented edge case.
        combined.sort_by_key(|chapter| spine_positions.get(&chapter.base).copied().unwrap_or(usize::MAX));
        combined
    }
}

/// Splits `raw` at the first `#`, returning `(base, Some(anchor))` or `(raw, None)`.
fn split_anchor(raw: &str) -> (String, Option<String>) {
    match raw.split_once('#') {
        Some((base, anchor)) => (base.to_string(), Some(anchor.to_string())),
        None => (raw.to_string(), None),
    }
}

/// Minimal percent-decoder for the handful of escapes that show up in local hrefs.
fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|hex| u8::from_str_radix(hex, 16).ok()) {
                result.push(byte);
                i += 3;
                continue;
            }
        }
        result.push(bytes[i]);
        i += 1;
    }

    String::from_utf8(result).unwrap_or_else(|_| value.to_string())
}

static TAG_STRIP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());

const TITLE_TAGS: [&str; 9] = ["h1", "h2", "h3", "h4", "h5", "h6", "p", "div", "a"];

/// Derives a title from a chapter's HTML content per the title-extraction algorithm:
/// the first non-empty text found in, in priority order, `h1..h6`, `p`, `div`, `a`;
/// truncated to 10 tokens, falling back to the file name.
fn extract_title<R: Read + Seek>(archive: &Archive<R>, href: &str) -> Result<String, EpubError> {
    let html = archive.read_text(href)?;

    for tag in TITLE_TAGS {
        let pattern = format!(r"(?is)<{tag}\b[^>]*>(.*?)</{tag}>");
        let regex = Regex::new(&pattern).expect("title-extraction pattern is a fixed, valid regex");

        for captures in regex.captures_iter(&html) {
            let inner = &captures[1];
            let text = TAG_STRIP.replace_all(inner, " ").normalize_whitespace();
            if !text.is_empty() {
                return Ok(truncate_title(&text));
            }
        }
    }

    Ok(title_from_filename(href))
}

fn truncate_title(text: &str) -> String {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.len() <= 10 {
        tokens.join(" ")
    } else {
        format!("{}...", tokens[..10].join(" "))
    }
}

fn title_from_filename(href: &str) -> String {
    Path::new(href)
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| href.to_string())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::{archive::test_support::build_zip, content_index::ContentIndex, package::PackageParser};

    const OPF: &str = r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="bookid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="bookid">id-1</dc:identifier>
  </metadata>
  <manifest>
    <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
    <item id="c1" href="chapter1.xhtml" media-type="application/xhtml+xml"/>
    <item id="c2" href="chapter2.xhtml" media-type="application/xhtml+xml"/>
    <item id="c3" href="chapter3.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine>
    <itemref idref="c1"/>
    <itemref idref="c2"/>
    <itemref idref="c3"/>
  </spine>
</package>"#;

    #[test]
    fn test_split_anchor() {
        assert_eq!(split_anchor("chapter1.xhtml#top"), ("chapter1.xhtml".to_string(), Some("top".to_string())));
        assert_eq!(split_anchor("chapter1.xhtml"), ("chapter1.xhtml".to_string(), None));
    }

    #[test]
    fn test_percent_decode() {
        assert_eq!(percent_decode("chapter%201.xhtml"), "chapter 1.xhtml");
    }

    #[test]
    fn test_extract_title_prefers_headings() {
        let bytes = build_zip(&[(
            "c.xhtml",
            b"<html><body><p>intro</p><h1>Real Title</h1></body></html>",
        )]);
        let archive = Archive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(extract_title(&archive, "c.xhtml").unwrap(), "Real Title");
    }

    #[test]
    fn test_extract_title_falls_back_to_filename() {
        let bytes = build_zip(&[("chapter-one.xhtml", b"<html><body></body></html>")]);
        let archive = Archive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(extract_title(&archive, "chapter-one.xhtml").unwrap(), "chapter-one");
    }

    #[test]
    fn test_title_truncated_past_ten_tokens() {
        let text = "one two three four five six seven eight nine ten eleven";
        assert_eq!(
            truncate_title(text),
            "one two three four five six seven eight nine ten..."
        );
    }

    #[test]
    fn test_orphans_fill_in_spine_items_missing_from_ncx() {
        let bytes = build_zip(&[
            ("OEBPS/content.opf", OPF.as_bytes()),
            ("OEBPS/nav.xhtml", b"<html><body></body></html>"),
            ("OEBPS/chapter1.xhtml", b"<html><body><h1>One</h1></body></html>"),
            ("OEBPS/chapter2.xhtml", b"<html><body><h1>Two</h1></body></html>"),
            ("OEBPS/chapter3.xhtml", b"<html><body><h1>Three</h1></body></html>"),
        ]);
        let archive = Archive::new(Cursor::new(bytes)).unwrap();
        let package = PackageParser::parse(&archive, std::path::PathBuf::from("OEBPS/content.opf")).unwrap();
        let index = ContentIndex::build(&package);
        let navigation = Navigation::default();

        let chapters = ChapterBuilder::build_eager(&archive, &package, &navigation, &index).unwrap();
        assert_eq!(chapters.len(), 3);
        assert_eq!(chapters[0].title, "One");
        assert_eq!(chapters[1].title, "Two");
        assert_eq!(chapters[2].title, "Three");
    }
}
