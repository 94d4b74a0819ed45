//! Error Type Definition Module
//!
//! This module defines the various error types that may be encountered during
//! EPUB parsing. All errors are wrapped in the `EpubError` enumeration for
//! convenient error handling by the caller.

use thiserror::Error;

/// Types of errors that can occur while opening and navigating an EPUB publication.
#[derive(Debug, Error)]
pub enum EpubError {
    /// ZIP archive related errors.
    #[error("Archive error: {source}")]
    ArchiveError { source: zip::result::ZipError },

    /// The ZIP entries use a compression method other than Stored/Deflated.
    #[error("Unusable compression method: The \"{file}\" file uses the unsupported \"{method}\" compression method.")]
    UnusableCompressionMethod { file: String, method: String },

    #[error("IO error: {source}")]
    IOError { source: std::io::Error },

    /// `META-INF/container.xml` is missing, unreadable, or has no `rootfile`.
    #[error("Malformed container: {reason}")]
    MalformedContainer { reason: String },

    /// `package@version` is neither "2.0" nor "3.0".
    #[error("Unsupported EPUB version: \"{version}\"")]
    UnsupportedVersion { version: String },

    #[error("Malformed metadata: {reason}")]
    MalformedMetadata { reason: String },

    #[error("Malformed manifest: {reason}")]
    MalformedManifest { reason: String },

    #[error("Malformed spine: {reason}")]
    MalformedSpine { reason: String },

    #[error("Malformed guide: {reason}")]
    MalformedGuide { reason: String },

    /// The spine names a `toc` manifest id that does not resolve, or no NCX/nav item was found.
    #[error("Missing table of contents: {reason}")]
    MissingTOC { reason: String },

    #[error("Malformed NCX document: {reason}")]
    MalformedNCX { reason: String },

    #[error("Malformed EPUB 3 navigation document: {reason}")]
    MalformedNav3 { reason: String },

    /// A manifest/spine/navigation reference points at a file absent from the archive,
    /// or at an href not present in `ContentIndex.html`.
    #[error("Missing content: \"{href}\"")]
    MissingContent { href: String },

    #[error("Invalid MIME type: \"{mime}\"")]
    InvalidMimeType { mime: String },

    /// The requested manifest id/href does not exist.
    #[error("Resource not found: \"{resource}\"")]
    ResourceNotFound { resource: String },

    /// A relative path link resolves outside the archive root.
    #[error("Relative link leakage: path \"{path}\" is out of container range.")]
    RelativeLinkLeakage { path: String },

    /// Underlying XML is not well-formed, or an expected element/attribute is missing.
    #[error("Malformed XML: {reason}")]
    MalformedXml { reason: String },

    #[error("QuickXml error: {source}")]
    QuickXmlError { source: quick_xml::Error },

    /// Text resource bytes are not valid UTF-8.
    #[error("Decode error: {source}")]
    DecodeError { source: std::string::FromUtf8Error },

    /// A shared archive handle's lock was poisoned by a panicking reader.
    #[error("Mutex error: mutex was poisoned.")]
    MutexError,
}

impl From<zip::result::ZipError> for EpubError {
    fn from(value: zip::result::ZipError) -> Self {
        EpubError::ArchiveError { source: value }
    }
}

impl From<quick_xml::Error> for EpubError {
    fn from(value: quick_xml::Error) -> Self {
        EpubError::QuickXmlError { source: value }
    }
}

impl From<std::io::Error> for EpubError {
    fn from(value: std::io::Error) -> Self {
        EpubError::IOError { source: value }
    }
}

impl From<std::string::FromUtf8Error> for EpubError {
    fn from(value: std::string::FromUtf8Error) -> Self {
        EpubError::DecodeError { source: value }
    }
}

impl<T> From<std::sync::PoisonError<T>> for EpubError {
    fn from(_value: std::sync::PoisonError<T>) -> Self {
        EpubError::MutexError
    }
}

#[cfg(test)]
impl PartialEq for EpubError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::MalformedContainer { reason: l }, Self::MalformedContainer { reason: r }) => {
                l == r
            }
            (Self::UnsupportedVersion { version: l }, Self::UnsupportedVersion { version: r }) => {
                l == r
            }
            (Self::MalformedMetadata { reason: l }, Self::MalformedMetadata { reason: r }) => {
                l == r
            }
            (Self::MalformedManifest { reason: l }, Self::MalformedManifest { reason: r }) => {
                l == r
            }
            (Self::MalformedSpine { reason: l }, Self::MalformedSpine { reason: r }) => l == r,
            (Self::MalformedGuide { reason: l }, Self::MalformedGuide { reason: r }) => l == r,
            (Self::MissingTOC { reason: l }, Self::MissingTOC { reason: r }) => l == r,
            (Self::MalformedNCX { reason: l }, Self::MalformedNCX { reason: r }) => l == r,
            (Self::MalformedNav3 { reason: l }, Self::MalformedNav3 { reason: r }) => l == r,
            (Self::MissingContent { href: l }, Self::MissingContent { href: r }) => l == r,
            (Self::InvalidMimeType { mime: l }, Self::InvalidMimeType { mime: r }) => l == r,
            (Self::ResourceNotFound { resource: l }, Self::ResourceNotFound { resource: r }) => {
                l == r
            }
            (
                Self::RelativeLinkLeakage { path: l },
                Self::RelativeLinkLeakage { path: r },
            ) => l == r,
            (Self::MalformedXml { reason: l }, Self::MalformedXml { reason: r }) => l == r,
            (
                Self::UnusableCompressionMethod { file: lf, method: lm },
                Self::UnusableCompressionMethod { file: rf, method: rm },
            ) => lf == rf && lm == rm,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}
