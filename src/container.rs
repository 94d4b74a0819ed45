//! Locates the package document by reading `META-INF/container.xml`.

use std::path::PathBuf;

use crate::{
    archive::Archive,
    error::EpubError,
    utils::XmlReader,
};
use std::io::{Read, Seek};

/// The fixed location of the OCF container descriptor inside every EPUB.
pub const CONTAINER_PATH: &str = "META-INF/container.xml";

/// Resolves the package document path from the OCF container file.
pub struct ContainerLocator;

impl ContainerLocator {
    /// Reads and parses `META-INF/container.xml`, returning the path to the
    /// first `rootfile` whose media type is the OPF package document.
    pub fn locate<R: Read + Seek>(archive: &Archive<R>) -> Result<PathBuf, EpubError> {
        let content = archive.read_text(CONTAINER_PATH)?;
        let root = XmlReader::parse(&content)?;

        let rootfile = root
            .find_elements_by_name("rootfile")
            .find(|element| {
                element
                    .get_attr("media-type")
                    .is_none_or(|mime| mime == "application/oebps-package+xml")
            })
            .ok_or_else(|| EpubError::MalformedContainer {
                reason: "no rootfile element found".to_string(),
            })?;

        let path = rootfile
            .get_attr("full-path")
            .ok_or_else(|| EpubError::MalformedContainer {
                reason: "rootfile is missing a full-path attribute".to_string(),
            })?;

        Ok(PathBuf::from(path))
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

    #[test]
    fn test_locate_package_path() {
        let bytes = build_zip(&[(CONTAINER_PATH, CONTAINER_XML.as_bytes())]);
        let archive = Archive::new(Cursor::new(bytes)).unwrap();

        let path = ContainerLocator::locate(&archive).unwrap();
        assert_eq!(path, PathBuf::from("OEBPS/content.opf"));
    }

    #[test]
    fn test_missing_container_file() {
        let bytes = build_zip(&[("other.xml", b"<a/>")]);
        let archive = Archive::new(Cursor::new(bytes)).unwrap();

        assert!(ContainerLocator::locate(&archive).is_err());
    }
}
