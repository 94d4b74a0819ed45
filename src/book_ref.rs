//! The lazy view of a publication: chapter HTML is read from the archive on demand.

use std::{
    fs::File,
    io::{BufReader, Read, Seek},
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    archive::Archive,
    chapter::{ChapterBuilder, ChapterRef},
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

/// A publication whose chapter content is fetched from the archive as needed.
pub struct EpubBookRef<R: Read + Seek> {
    pub package: Package,
    pub content: ContentIndex,
    pub chapters: Vec<ChapterRef<R>>,
    cover: Option<Cover>,
    archive: Arc<Archive<R>>,
}

impl<R: Read + Seek> EpubBookRef<R> {
    pub fn open(reader: R, options: &OpenOptions) -> Result<Self, EpubError> {
        let archive = Arc::new(Archive::new(reader)?);

        let package_path = ContainerLocator::locate(&archive)?;
        let package = PackageParser::parse(&archive, package_path)?;
        let navigation = match package.version {
            EpubVersion::Version2_0 => NavigationParser::from_ncx(&archive, &package)?,
            EpubVersion::Version3_0 => NavigationParser::from_nav3(&archive, &package)?,
        };

        let content = ContentIndex::build(&package);
        let mut chapters = ChapterBuilder::build_lazy(Arc::clone(&archive), &package, &navigation, &content)?;

        if options.split_enabled {
            let splitter = ChapterSplitter::new(options.split_threshold);
            let mut split_chapters = Vec::with_capacity(chapters.len());
            for chapter in chapters {
                split_chapters.extend(splitter.split_ref(chapter, None)?);
            }
            chapters = split_chapters;
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

    pub fn cover(&self) -> Option<&Cover> {
        self.cover.as_ref()
    }

    pub fn cover_bytes(&self) -> Result<Option<(Vec<u8>, String)>, EpubError> {
        match &self.cover {
            Some(cover) => Ok(Some((read_cover_bytes(self.archive.as_ref(), cover)?, cover.mime.clone()))),
            None => Ok(None),
        }
    }
}

impl EpubBookRef<BufReader<File>> {
    pub fn open_path<P: AsRef<Path>>(path: P, options: &OpenOptions) -> Result<Self, EpubError> {
        let file = File::open(path)?;
        Self::open(BufReader::new(file), options)
    }
}
