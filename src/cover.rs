//! Locates the cover image declared (or implied) by a package document.

use std::io::{Read, Seek};

use crate::{archive::Archive, content_index::ContentIndex, package::Package};

/// The manifest item backing the publication's cover image, if one was found.
#[derive(Debug, Clone)]
pub struct Cover {
    pub manifest_id: String,
    pub path: String,
    pub mime: String,
}

pub struct CoverLocator;

impl CoverLocator {
    /// Finds the cover image: first via `meta[name=cover]`, falling back to
    /// the first image in the manifest when `fallback_to_first_image` is set.
    pub fn locate(package: &Package, index: &ContentIndex, fallback_to_first_image: bool) -> Option<Cover> {
        if let Some(cover) = Self::from_meta_cover(package, index) {
            return Some(cover);
        }

        if !fallback_to_first_image {
            return None;
        }

        // `package.manifest` is an IndexMap, so this walks manifest document
        // order and returns the first image deterministically.
        let (id, item) = package
            .manifest
            .iter()
            .find(|(_, item)| item.path.to_str().is_some_and(|path| index.images.contains(path)))?;

        Some(Cover {
            manifest_id: id.clone(),
            path: item.path.to_str()?.to_string(),
            mime: item.mime.clone(),
        })
    }

    fn from_meta_cover(package: &Package, index: &ContentIndex) -> Option<Cover> {
        let meta_cover = package
            .metadata
            .items
            .iter()
            .find(|item| item.property.eq_ignore_ascii_case("cover"))?;

        let manifest_id = &meta_cover.value;
        let item = package.manifest.get(manifest_id)?;
        let path = item.path.to_str()?;

        if !index.images.contains(path) {
            return None;
        }

        Some(Cover {
            manifest_id: manifest_id.clone(),
            path: path.to_string(),
            mime: item.mime.clone(),
        })
    }
}

pub fn read_cover_bytes<R: Read + Seek>(archive: &Archive<R>, cover: &Cover) -> Result<Vec<u8>, crate::error::EpubError> {
    archive.read(&cover.path)
}

#[cfg(test)]
mod tests {
    use std::{io::Cursor, path::PathBuf};

    use super::*;
    use crate::{archive::test_support::build_zip, package::PackageParser};

    const OPF_WITH_META_COVER: &str = r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="bookid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="bookid">id-1</dc:identifier>
    <meta name="cover" content="cover-image"/>
  </metadata>
  <manifest>
    <item id="cover-image" href="images/cover.jpg" media-type="image/jpeg"/>
    <item id="c1" href="chapter1.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine><itemref idref="c1"/></spine>
</package>"#;

    const OPF_WITHOUT_META_COVER: &str = r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="bookid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="bookid">id-1</dc:identifier>
  </metadata>
  <manifest>
    <item id="img1" href="images/first.png" media-type="image/png"/>
    <item id="img2" href="images/second.png" media-type="image/png"/>
    <item id="img3" href="images/third.png" media-type="image/png"/>
    <item id="c1" href="chapter1.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine><itemref idref="c1"/></spine>
</package>"#;

    fn load_package(opf: &str) -> (Archive<Cursor<Vec<u8>>>, crate::package::Package) {
        let bytes = build_zip(&[("OEBPS/content.opf", opf.as_bytes())]);
        let archive = Archive::new(Cursor::new(bytes)).unwrap();
        let package = PackageParser::parse(&archive, PathBuf::from("OEBPS/content.opf")).unwrap();
        (archive, package)
    }

    #[test]
    fn test_locate_via_meta_cover() {
        let (_archive, package) = load_package(OPF_WITH_META_COVER);
        let index = ContentIndex::build(&package);

        let cover = CoverLocator::locate(&package, &index, true).unwrap();
        assert_eq!(cover.path, "OEBPS/images/cover.jpg");
    }

    #[test]
    fn test_falls_back_to_first_image() {
        let (_archive, package) = load_package(OPF_WITHOUT_META_COVER);
        let index = ContentIndex::build(&package);

        let cover = CoverLocator::locate(&package, &index, true).unwrap();
        assert_eq!(cover.path, "OEBPS/images/first.png");
    }

    #[test]
    fn test_fallback_disabled_returns_none() {
        let (_archive, package) = load_package(OPF_WITHOUT_META_COVER);
        let index = ContentIndex::build(&package);

        assert!(CoverLocator::locate(&package, &index, false).is_none());
    }
}
