//! The ZIP-backed archive adapter.
//!
//! The rest of the crate treats an EPUB as an abstract `(path -> bytes)`
//! mapping; this module is the one concrete implementation of that mapping,
//! built directly on the `zip` crate. Lookups are case-insensitive (stored
//! names are preserved), and reads are serialized behind a mutex so that
//! several lazy [`crate::chapter::ChapterRef`]s can share one archive handle.

use std::{
    fs::File,
    io::{BufReader, Read, Seek},
    path::Path,
    sync::Mutex,
};

use indexmap::IndexMap;

use crate::{
    error::EpubError,
    utils::{DecodeBytes, compression_method_check, get_file_in_zip_archive},
};

/// A `(path -> bytes)` view over a ZIP archive, safe for concurrent reads.
pub struct Archive<R: Read + Seek> {
    inner: Mutex<zip::ZipArchive<R>>,

    /// Lower-cased name -> stored (case-preserved) name, built once at open time.
    name_index: IndexMap<String, String>,
}

impl<R: Read + Seek> Archive<R> {
    pub fn new(reader: R) -> Result<Self, EpubError> {
        let mut zip = zip::ZipArchive::new(reader)?;
        compression_method_check(&mut zip)?;

        let mut name_index = IndexMap::with_capacity(zip.len());
        for index in 0..zip.len() {
            let file = zip.by_index(index)?;
            name_index.insert(file.name().to_lowercase(), file.name().to_string());
        }

        Ok(Self {
            inner: Mutex::new(zip),
            name_index,
        })
    }

    /// Resolves `path` case-insensitively to the name actually stored in the archive.
    pub fn resolve(&self, path: &str) -> Option<&str> {
        self.name_index.get(&path.to_lowercase()).map(String::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.resolve(path).is_some()
    }

    /// Reads the raw bytes of an entry, looked up case-insensitively.
    pub fn read(&self, path: &str) -> Result<Vec<u8>, EpubError> {
        let stored = self
            .resolve(path)
            .ok_or_else(|| EpubError::ResourceNotFound {
                resource: path.to_string(),
            })?
            .to_string();

        let mut guard = self.inner.lock()?;
        get_file_in_zip_archive(&mut guard, &stored)
    }

    /// Reads and UTF-8 decodes an entry.
    pub fn read_text(&self, path: &str) -> Result<String, EpubError> {
        self.read(path)?.decode()
    }
}

impl Archive<BufReader<File>> {
    /// Convenience constructor for opening an EPUB file by path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, EpubError> {
        let file = File::open(path)?;
        Self::new(BufReader::new(file))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::{Cursor, Write};

    use zip::{ZipWriter, write::SimpleFileOptions};

    /// Builds an in-memory ZIP archive from `(name, contents)` pairs, stored uncompressed.
    pub fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let buffer = Cursor::new(Vec::new());
        let mut writer = ZipWriter::new(buffer);
        let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);

        for (name, contents) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(contents).unwrap();
        }

        writer.finish().unwrap().into_inner()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::archive::test_support::build_zip;

    #[test]
    fn test_case_insensitive_lookup() {
        let bytes = build_zip(&[("META-INF/container.xml", b"<hello/>")]);
        let archive = Archive::new(Cursor::new(bytes)).unwrap();

        assert!(archive.contains("meta-inf/container.xml"));
        assert_eq!(archive.resolve("META-INF/CONTAINER.XML").unwrap(), "META-INF/container.xml");
    }

    #[test]
    fn test_read_text() {
        let bytes = build_zip(&[("a.txt", "hello world".as_bytes())]);
        let archive = Archive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.read_text("a.txt").unwrap(), "hello world");
    }

    #[test]
    fn test_missing_entry() {
        let bytes = build_zip(&[("a.txt", b"x")]);
        let archive = Archive::new(Cursor::new(bytes)).unwrap();
        assert!(archive.read("missing.txt").is_err());
    }
}
