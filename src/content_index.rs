//! Classifies manifest resources by MIME type and indexes them by kind.

use indexmap::IndexSet;

use crate::package::Package;

/// The broad shape a resource's content takes, independent of exact MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Html,
    Css,
    Image,
    Font,
    /// Any other text resource (OEB1 documents, plain XML, etc).
    Text,
    /// Anything not otherwise classified; read as raw bytes.
    Other,
}

/// Classifies a manifest MIME type into a [`ContentKind`].
pub fn classify_mime(mime: &str) -> ContentKind {
    match mime.to_ascii_lowercase().as_str() {
        "application/xhtml+xml" | "text/html" => ContentKind::Html,
        "text/css" => ContentKind::Css,
        "image/gif" | "image/jpeg" | "image/png" | "image/svg+xml" | "image/bmp" => ContentKind::Image,
        "font/truetype" | "font/opentype" | "application/vnd.ms-opentype" => ContentKind::Font,
        "application/x-dtbook+xml" | "application/x-dtbncx+xml" | "text/x-oeb1-document"
        | "application/xml" | "text/x-oeb1-css" => ContentKind::Text,
        _ => ContentKind::Other,
    }
}

/// Every archive path reachable through the manifest, grouped by [`ContentKind`].
/// Each set preserves manifest order, so "the first image" is well-defined.
#[derive(Debug, Clone, Default)]
pub struct ContentIndex {
    pub html: IndexSet<String>,
    pub css: IndexSet<String>,
    pub images: IndexSet<String>,
    pub fonts: IndexSet<String>,
    pub all_files: IndexSet<String>,
}

impl ContentIndex {
    pub fn build(package: &Package) -> Self {
        let mut index = ContentIndex::default();

        for item in package.manifest.values() {
            let Some(path) = item.path.to_str() else {
                continue;
            };

            index.all_files.insert(path.to_string());

            match classify_mime(&item.mime) {
                ContentKind::Html => {
                    index.html.insert(path.to_string());
                }
                ContentKind::Css => {
                    index.css.insert(path.to_string());
                }
                ContentKind::Image => {
                    index.images.insert(path.to_string());
                }
                ContentKind::Font => {
                    index.fonts.insert(path.to_string());
                }
                ContentKind::Text | ContentKind::Other => {}
            }
        }

        index
    }

    pub fn is_html(&self, path: &str) -> bool {
        self.html.contains(path)
    }
}

#[cfg(test)]
mod tests {
    use std::{io::Cursor, path::PathBuf};

    use super::*;
    use crate::{archive::Archive, archive::test_support::build_zip, package::PackageParser};

    const OPF: &str = r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="bookid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="bookid">id-1</dc:identifier>
  </metadata>
  <manifest>
    <item id="c1" href="chapter1.xhtml" media-type="application/xhtml+xml"/>
    <item id="css" href="style.css" media-type="text/css"/>
    <item id="cover" href="cover.jpg" media-type="image/jpeg"/>
  </manifest>
  <spine>
    <itemref idref="c1"/>
  </spine>
</package>"#;

    #[test]
    fn test_classify_and_index() {
        let bytes = build_zip(&[("OEBPS/content.opf", OPF.as_bytes())]);
        let archive = Archive::new(Cursor::new(bytes)).unwrap();
        let package = PackageParser::parse(&archive, PathBuf::from("OEBPS/content.opf")).unwrap();

        let index = ContentIndex::build(&package);
        assert!(index.is_html("OEBPS/chapter1.xhtml"));
        assert!(index.css.contains("OEBPS/style.css"));
        assert!(index.images.contains("OEBPS/cover.jpg"));
        assert_eq!(index.all_files.len(), 3);
    }

    #[test]
    fn test_classify_mime_fallback() {
        assert_eq!(classify_mime("application/octet-stream"), ContentKind::Other);
        assert_eq!(classify_mime("APPLICATION/XHTML+XML"), ContentKind::Html);
    }
}
