//! Options controlling how a publication is opened.

/// Default word-count threshold above which a chapter is split into parts.
pub const DEFAULT_SPLIT_THRESHOLD: usize = 3000;

/// The threshold used by earlier versions of this pipeline; kept available
/// for callers that need to reproduce historical split boundaries.
pub const LEGACY_SPLIT_THRESHOLD: usize = 5000;

/// Options controlling parsing, splitting, and cover resolution.
#[derive(Debug, Clone)]
pub struct OpenOptions {
    pub split_threshold: usize,
    pub split_enabled: bool,
    /// When set, [`crate::book::Epub::open`] returns the lazy, ref-backed view.
    pub lazy: bool,
    pub cover_fallback_to_first_image: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            split_threshold: DEFAULT_SPLIT_THRESHOLD,
            split_enabled: false,
            lazy: false,
            cover_fallback_to_first_image: true,
        }
    }
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_split_threshold(mut self, threshold: usize) -> Self {
        self.split_threshold = threshold;
        self
    }

    pub fn with_split_enabled(mut self, enabled: bool) -> Self {
        self.split_enabled = enabled;
        self
    }

    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    pub fn with_cover_fallback(mut self, fallback: bool) -> Self {
        self.cover_fallback_to_first_image = fallback;
        self
    }
}
