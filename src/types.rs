//! Core data structures for the parsed EPUB package and navigation documents.
//!
//! These types are plain value structures produced by [`crate::package`] and
//! [`crate::navigation`]; they carry no behaviour of their own beyond
//! structural equality and ordering where that is meaningful ([`NavPoint`]).

use std::path::PathBuf;

/// The EPUB version declared by the package document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpubVersion {
    Version2_0,
    Version3_0,
}

/// A single Dublin Core or `meta` metadata entry.
#[derive(Debug, Clone)]
pub struct MetadataItem {
    /// Present when other metadata refines this entry (EPUB 3), or when the
    /// `unique-identifier` attribute of `package` names it.
    pub id: Option<String>,

    /// The metadata property name: `title`, `creator`, `identifier`, a
    /// `meta@property` value, etc.
    pub property: String,

    pub value: String,
    pub lang: Option<String>,

    /// EPUB 3 `meta[refines=#id]` entries that refine this item, or (EPUB 2)
    /// the element's own extra attributes reinterpreted as refinements.
    pub refined: Vec<MetadataRefinement>,
}

/// Additional detail attached to a [`MetadataItem`] via `refines`.
#[derive(Debug, Clone)]
pub struct MetadataRefinement {
    pub refines: String,
    pub property: String,
    pub value: String,
    pub lang: Option<String>,
    pub scheme: Option<String>,
}

/// A `<link>` entry in the metadata section, pointing at an external resource.
#[derive(Debug, Clone)]
pub struct MetadataLinkItem {
    pub href: String,
    pub rel: String,
    pub hreflang: Option<String>,
    pub id: Option<String>,
    pub mime: Option<String>,
    pub properties: Option<String>,
    pub refines: Option<String>,
}

/// All metadata extracted from the package document.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    pub items: Vec<MetadataItem>,
    pub links: Vec<MetadataLinkItem>,
}

impl Metadata {
    /// Values of every metadata item with the given property name, in document order.
    pub fn values(&self, property: &str) -> Vec<&str> {
        self.items
            .iter()
            .filter(|item| item.property == property)
            .map(|item| item.value.as_str())
            .collect()
    }

    pub fn first_value(&self, property: &str) -> Option<&str> {
        self.values(property).into_iter().next()
    }
}

/// A resource declared in the package manifest.
#[derive(Debug, Clone)]
pub struct ManifestItem {
    pub id: String,

    /// Path to the resource, normalized relative to the archive root.
    pub path: PathBuf,

    pub mime: String,
    pub properties: Option<String>,
    pub fallback: Option<String>,
}

impl ManifestItem {
    pub fn has_property(&self, name: &str) -> bool {
        self.properties
            .as_deref()
            .is_some_and(|props| props.split_whitespace().any(|p| p == name))
    }
}

/// A single entry in the spine (reading order).
#[derive(Debug, Clone)]
pub struct SpineItem {
    pub idref: String,
    pub id: Option<String>,
    pub properties: Option<String>,

    /// `linear="no"` maps to `false`; everything else (including absence) is `true`.
    pub linear: bool,
}

/// The package's reading order and declared table-of-contents reference.
#[derive(Debug, Clone, Default)]
pub struct Spine {
    pub items: Vec<SpineItem>,

    /// EPUB 2 `spine@toc`, naming the NCX manifest item.
    pub toc: Option<String>,

    pub page_progression_ltr: bool,
}

/// A single `<reference>` entry of the optional EPUB 2 guide.
#[derive(Debug, Clone)]
pub struct GuideReference {
    pub ref_type: String,
    pub title: Option<String>,
    pub href: String,
}

/// A node of the navigation tree (NCX `navPoint` or EPUB 3 nav `li`).
#[derive(Debug, Clone, Eq)]
pub struct NavPoint {
    pub label: String,
    pub content: Option<PathBuf>,
    pub children: Vec<NavPoint>,
    pub play_order: Option<usize>,
}

impl Ord for NavPoint {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.play_order.cmp(&other.play_order)
    }
}

impl PartialOrd for NavPoint {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for NavPoint {
    fn eq(&self, other: &Self) -> bool {
        self.play_order == other.play_order
    }
}

/// A `head/meta` entry of the NCX document.
#[derive(Debug, Clone)]
pub struct NcxMeta {
    pub name: String,
    pub content: String,
    pub scheme: Option<String>,
}

/// The parsed navigation document (NCX for EPUB 2, nav for EPUB 3).
#[derive(Debug, Clone, Default)]
pub struct Navigation {
    pub head: Vec<NcxMeta>,
    pub doc_title: Vec<String>,
    pub doc_authors: Vec<Vec<String>>,
    pub nav_map: Vec<NavPoint>,
    pub page_list: Vec<NavPoint>,
    pub nav_lists: Vec<NavPoint>,
}
