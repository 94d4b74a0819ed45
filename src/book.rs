//! The eager, fully-materialised view of a publication.

use std::{
    fs::File,
    io::{BufReader, Read, Seek},
    path::{Path, PathBuf},
};

use crate::{
    archive::Archive,
    book_ref::EpubBookRef,
    chapter::{Chapter, ChapterBuilder},
    config::OpenOptions,
    container::ContainerLocator,
    content_index::ContentIndex,
    cover::{Cover, CoverLocator, read_cover_bytes},
    error::EpubError,
    navigation::NavigationParser,
    package::{Package, PackageParser},
    splitter::ChapterSplitter,
    types::EpubVersion,
};

/// A fully loaded EPUB publication: every chapter's HTML is already in memory.
pub struct EpubBook {
    pub package: Package,
    pub content: ContentIndex,
    pub chapters: Vec<Chapter>,
    pub cover: Option<Cover>,
    archive: Archive<Box<dyn ReadSeek>>,
}

/// Object-safety helper so `EpubBook` doesn't need to be generic over the reader type.
pub trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

/// The single entry point honoring [`OpenOptions::lazy`]: opens eager or
/// lazy depending on the option, rather than requiring the caller to pick a
/// type up front.
pub enum Epub {
    Eager(EpubBook),
    Lazy(EpubBookRef<Box<dyn ReadSeek>>),
}

impl Epub {
    pub fn open<R: Read + Seek + 'static>(reader: R, options: &OpenOptions) -> Result<Self, EpubError> {
        if options.lazy {
            let boxed: Box<dyn ReadSeek> = Box::new(reader);
            Ok(Self::Lazy(EpubBookRef::open(boxed, options)?))
        } else {
            Ok(Self::Eager(EpubBook::open(reader, options)?))
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Self::Eager(book) => book.title(),
            Self::Lazy(book) => book.title(),
        }
    }

    pub fn author(&self) -> String {
        match self {
            Self::Eager(book) => book.author(),
            Self::Lazy(book) => book.author(),
        }
    }
}

impl EpubBook {
    pub fn open<R: Read + Seek + 'static>(reader: R, options: &OpenOptions) -> Result<Self, EpubError> {
        let archive = Archive::new(Box::new(reader) as Box<dyn ReadSeek>)?;
        Self::from_archive(archive, options)
    }

    pub fn open_path<P: AsRef<Path>>(path: P, options: &OpenOptions) -> Result<Self, EpubError> {
        let file = File::open(path)?;
        Self::open(BufReader::new(file), options)
    }

    fn from_archive(archive: Archive<Box<dyn ReadSeek>>, options: &OpenOptions) -> Result<Self, EpubError> {
        let package_path = ContainerLocator::locate(&archive)?;
        let package = PackageParser::parse(&archive, package_path)?;
        let navigation = match package.version {
            EpubVersion::Version2_0 => NavigationParser::from_ncx(&archive, &package)?,
            EpubVersion::Version3_0 => NavigationParser::from_nav3(&archive, &package)?,
        };

        let content = ContentIndex::build(&package);
        let mut chapters = ChapterBuilder::build_eager(&archive, &package, &navigation, &content)?;

        if options.split_enabled {
            let splitter = ChapterSplitter::new(options.split_threshold);
            chapters = chapters.into_iter().flat_map(|chapter| splitter.split(chapter, None)).collect();
        }

        let cover = CoverLocator::locate(&package, &content, options.cover_fallback_to_first_image);

        Ok(Self {
            package,
            content,
            chapters,
            cover,
            archive,
        })
    }

    pub fn title(&self) -> &str {
        self.package.metadata.first_value("title").unwrap_or_default()
    }

    pub fn authors(&self) -> Vec<&str> {
        self.package
            .metadata
            .values("creator")
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect()
    }

    pub fn author(&self) -> String {
        self.authors().join(", ")
    }

    pub fn content_directory_path(&self) -> &Path {
        &self.package.base_path
    }

    pub fn cover_bytes(&self) -> Result<Option<(Vec<u8>, String)>, EpubError> {
        match &self.cover {
            Some(cover) => Ok(Some((read_cover_bytes(&self.archive, cover)?, cover.mime.clone()))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::archive::test_support::build_zip;

    const CONTAINER_XML: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

    const OPF: &str = r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="bookid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>Test Book</dc:title>
    <dc:creator>Author One</dc:creator>
    <dc:identifier id="bookid">id-1</dc:identifier>
  </metadata>
  <manifest>
    <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
    <item id="c1" href="chapter1.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine>
    <itemref idref="c1"/>
  </spine>
</package>"#;

    const NAV_XHTML: &str = r#"<?xml version="1.0"?>
<html xmlns:epub="http://www.idpf.org/2007/ops">
  <body>
    <nav epub:type="toc">
      <ol><li><a href="chapter1.xhtml">Chapter One</a></li></ol>
    </nav>
  </body>
</html>"#;

    fn sample_epub() -> Vec<u8> {
        build_zip(&[
            ("META-INF/container.xml", CONTAINER_XML.as_bytes()),
            ("OEBPS/content.opf", OPF.as_bytes()),
            ("OEBPS/nav.xhtml", NAV_XHTML.as_bytes()),
            ("OEBPS/chapter1.xhtml", b"<html><body><h1>Chapter One</h1><p>Hello.</p></body></html>"),
        ])
    }

    #[test]
    fn test_open_eager_book() {
        let bytes = sample_epub();
        let book = EpubBook::open(Cursor::new(bytes), &OpenOptions::default()).unwrap();

        assert_eq!(book.title(), "Test Book");
        assert_eq!(book.author(), "Author One");
        assert_eq!(book.chapters.len(), 1);
        assert_eq!(book.chapters[0].title, "Chapter One");
        assert!(book.chapters[0].html.contains("Hello."));
    }

    #[test]
    fn test_epub_open_honors_lazy_option() {
        let eager = Epub::open(Cursor::new(sample_epub()), &OpenOptions::default()).unwrap();
        assert!(matches!(eager, Epub::Eager(_)));
        assert_eq!(eager.title(), "Test Book");

        let lazy_options = OpenOptions::new().lazy(true);
        let lazy = Epub::open(Cursor::new(sample_epub()), &lazy_options).unwrap();
        assert!(matches!(lazy, Epub::Lazy(_)));
        assert_eq!(lazy.title(), "Test Book");
    }
}
