//! Write-side contract.
//!
//! Serialising an [`crate::book::EpubBook`] back into an EPUB archive is out
//! of scope for this crate; this module only defines the model and trait a
//! concrete writer would implement against, so that round-tripping through
//! `read -> write -> read` stays possible for callers who bring their own
//! serialiser.

use crate::{error::EpubError, types::NavPoint};

/// A manifest entry as a writer would need to emit it, independent of how the
/// resource bytes were produced.
#[derive(Debug, Clone)]
pub struct WriteManifestEntry {
    pub id: String,
    pub href: String,
    pub mime: String,
    pub properties: Option<String>,
}

/// A spine entry as a writer would need to emit it.
#[derive(Debug, Clone)]
pub struct WriteSpineEntry {
    pub idref: String,
    pub linear: bool,
}

/// The minimal description of a publication a writer consumes: enough to
/// regenerate the OPF, NCX/nav, and manifest, but no serialisation logic.
#[derive(Debug, Clone, Default)]
pub struct WriteModel {
    pub title: String,
    pub authors: Vec<String>,
    pub unique_identifier: String,
    pub manifest: Vec<WriteManifestEntry>,
    pub spine: Vec<WriteSpineEntry>,
    pub navigation: Vec<NavPoint>,
}

/// Implemented by a concrete serialiser that turns a [`WriteModel`] plus
/// resource bytes into an EPUB archive. This crate ships no implementation.
pub trait BookWriter {
    /// Writes the publication described by `model` to `sink`, pulling each
    /// manifest entry's bytes from `resource`.
    fn write<W: std::io::Write>(
        &self,
        model: &WriteModel,
        resource: &mut dyn FnMut(&str) -> Result<Vec<u8>, EpubError>,
        sink: W,
    ) -> Result<(), EpubError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_model_defaults_to_empty() {
        let model = WriteModel::default();
        assert!(model.manifest.is_empty());
        assert!(model.spine.is_empty());
        assert_eq!(model.title, "");
    }
}
