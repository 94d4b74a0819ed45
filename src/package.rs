//! Parses the package document (`content.opf`): metadata, manifest, spine, and guide.

use std::{
    collections::HashMap,
    io::{Read, Seek},
    path::{Path, PathBuf},
};

use indexmap::IndexMap;

use crate::{
    archive::Archive,
    error::EpubError,
    types::{
        EpubVersion, GuideReference, ManifestItem, Metadata, MetadataItem, MetadataLinkItem,
        MetadataRefinement, Spine, SpineItem,
    },
    utils::{NormalizeWhitespace, XmlElement, XmlReader, check_relative_link_leakage},
};

const DC_NAMESPACE: &str = "http://purl.org/dc/elements/1.1/";
const OPF_NAMESPACE: &str = "http://www.idpf.org/2007/opf";

/// The fully parsed package document, plus the paths needed to resolve it
/// against the rest of the archive.
#[derive(Debug, Clone)]
pub struct Package {
    pub version: EpubVersion,
    pub package_path: PathBuf,
    pub base_path: PathBuf,
    pub unique_identifier: String,
    pub metadata: Metadata,
    pub manifest: IndexMap<String, ManifestItem>,
    pub spine: Spine,
    pub guide: Vec<GuideReference>,
}

impl Package {
    pub fn manifest_item_by_href(&self, href: &str) -> Option<&ManifestItem> {
        self.manifest
            .values()
            .find(|item| item.path.to_str() == Some(href))
    }
}

pub struct PackageParser;

impl PackageParser {
    pub fn parse<R: Read + Seek>(
        archive: &Archive<R>,
        package_path: PathBuf,
    ) -> Result<Package, EpubError> {
        let base_path = package_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let opf_path = package_path.to_str().ok_or_else(|| EpubError::MalformedContainer {
            reason: "package path is not valid UTF-8".to_string(),
        })?;
        let content = archive.read_text(opf_path)?;
        let root = XmlReader::parse(&content)?;

        let version = Self::parse_version(&root)?;

        let metadata_element = root
            .find_elements_by_name("metadata")
            .next()
            .ok_or_else(|| EpubError::MalformedMetadata {
                reason: "package document has no metadata element".to_string(),
            })?;
        let manifest_element = root
            .find_elements_by_name("manifest")
            .next()
            .ok_or_else(|| EpubError::MalformedManifest {
                reason: "package document has no manifest element".to_string(),
            })?;
        let spine_element = root
            .find_elements_by_name("spine")
            .next()
            .ok_or_else(|| EpubError::MalformedSpine {
                reason: "package document has no spine element".to_string(),
            })?;

        let metadata = Self::parse_metadata(metadata_element, version)?;
        let manifest = Self::parse_manifest(manifest_element, &base_path)?;
        let spine = Self::parse_spine(spine_element)?;
        let guide = root
            .find_elements_by_name("guide")
            .next()
            .map(Self::parse_guide)
            .transpose()?
            .unwrap_or_default();

        let unique_identifier = Self::resolve_unique_identifier(&root, &metadata)?;

        Ok(Package {
            version,
            package_path,
            base_path,
            unique_identifier,
            metadata,
            manifest,
            spine,
            guide,
        })
    }

    fn parse_version(package: &XmlElement) -> Result<EpubVersion, EpubError> {
        match package.get_attr("version").as_deref() {
            Some("2.0") => Ok(EpubVersion::Version2_0),
            Some("3.0") => Ok(EpubVersion::Version3_0),
            Some(other) => Err(EpubError::UnsupportedVersion {
                version: other.to_string(),
            }),
            None => Err(EpubError::UnsupportedVersion {
                version: String::new(),
            }),
        }
    }

    fn resolve_unique_identifier(
        package: &XmlElement,
        metadata: &Metadata,
    ) -> Result<String, EpubError> {
        let item = if let Some(uid) = package.get_attr("unique-identifier") {
            metadata
                .items
                .iter()
                .find(|item| item.property == "identifier" && item.id.as_deref() == Some(&uid))
        } else {
            metadata.items.iter().find(|item| item.property == "identifier")
        };

        item.map(|item| item.value.clone())
            .ok_or_else(|| EpubError::MalformedMetadata {
                reason: "no dc:identifier element found".to_string(),
            })
    }

    fn parse_metadata(
        metadata_element: &XmlElement,
        version: EpubVersion,
    ) -> Result<Metadata, EpubError> {
        let mut items = Vec::new();
        let mut links = Vec::new();
        let mut refinements = HashMap::<String, Vec<MetadataRefinement>>::new();

        for element in metadata_element.children() {
            match element.namespace.as_deref() {
                Some(ns) if ns == DC_NAMESPACE => Self::parse_dc_item(element, version, &mut items),
                Some(ns) if ns == OPF_NAMESPACE => {
                    Self::parse_opf_item(element, version, &mut items, &mut links, &mut refinements)?
                }
                _ => {}
            }
        }

        for item in items.iter_mut() {
            if let Some(id) = &item.id {
                if let Some(refined) = refinements.remove(id) {
                    item.refined = refined;
                }
            }
        }

        Ok(Metadata { items, links })
    }

    fn parse_dc_item(element: &XmlElement, version: EpubVersion, items: &mut Vec<MetadataItem>) {
        let id = element.get_attr("id");
        let lang = element.get_attr("lang");
        let property = element.name.clone();
        let value = element.text().normalize_whitespace();

        // EPUB 2 carries refinement-like detail as plain extra attributes on the
        // same element rather than as separate `meta@refines` entries.
        let refined = match version {
            EpubVersion::Version2_0 => element
                .attributes
                .iter()
                .map(|(name, value)| MetadataRefinement {
                    refines: id.clone().unwrap_or_default(),
                    property: name.clone(),
                    value: value.normalize_whitespace(),
                    lang: None,
                    scheme: None,
                })
                .collect(),
            EpubVersion::Version3_0 => vec![],
        };

        items.push(MetadataItem {
            id,
            property,
            value,
            lang,
            refined,
        });
    }

    fn parse_opf_item(
        element: &XmlElement,
        version: EpubVersion,
        items: &mut Vec<MetadataItem>,
        links: &mut Vec<MetadataLinkItem>,
        refinements: &mut HashMap<String, Vec<MetadataRefinement>>,
    ) -> Result<(), EpubError> {
        match element.name.as_str() {
            "meta" => Self::parse_meta(element, version, items, refinements),
            "link" => Self::parse_link(element, links),
            _ => Ok(()),
        }
    }

    fn parse_meta(
        element: &XmlElement,
        version: EpubVersion,
        items: &mut Vec<MetadataItem>,
        refinements: &mut HashMap<String, Vec<MetadataRefinement>>,
    ) -> Result<(), EpubError> {
        match version {
            EpubVersion::Version2_0 => {
                let property = element.get_attr("name").ok_or_else(|| EpubError::MalformedMetadata {
                    reason: "meta element is missing a name attribute".to_string(),
                })?;
                let value = element
                    .get_attr("content")
                    .ok_or_else(|| EpubError::MalformedMetadata {
                        reason: "meta element is missing a content attribute".to_string(),
                    })?
                    .normalize_whitespace();

                items.push(MetadataItem {
                    id: None,
                    property,
                    value,
                    lang: None,
                    refined: vec![],
                });
            }

            EpubVersion::Version3_0 => {
                let property = element.get_attr("property").ok_or_else(|| EpubError::MalformedMetadata {
                    reason: "meta element is missing a property attribute".to_string(),
                })?;
                let value = element.text().normalize_whitespace();
                let lang = element.get_attr("lang");

                if let Some(refines) = element.get_attr("refines") {
                    let id = refines.strip_prefix('#').unwrap_or(&refines).to_string();
                    let scheme = element.get_attr("scheme");
                    refinements.entry(id.clone()).or_default().push(MetadataRefinement {
                        refines: id,
                        property,
                        value,
                        lang,
                        scheme,
                    });
                } else {
                    items.push(MetadataItem {
                        id: element.get_attr("id"),
                        property,
                        value,
                        lang,
                        refined: vec![],
                    });
                }
            }
        }

        Ok(())
    }

    fn parse_link(element: &XmlElement, links: &mut Vec<MetadataLinkItem>) -> Result<(), EpubError> {
        let href = element.get_attr("href").ok_or_else(|| EpubError::MalformedMetadata {
            reason: "link element is missing an href attribute".to_string(),
        })?;
        let rel = element.get_attr("rel").ok_or_else(|| EpubError::MalformedMetadata {
            reason: "link element is missing a rel attribute".to_string(),
        })?;

        links.push(MetadataLinkItem {
            href,
            rel,
            hreflang: element.get_attr("hreflang"),
            id: element.get_attr("id"),
            mime: element.get_attr("media-type"),
            properties: element.get_attr("properties"),
            refines: element.get_attr("refines"),
        });

        Ok(())
    }

    fn parse_manifest(
        manifest_element: &XmlElement,
        base_path: &Path,
    ) -> Result<IndexMap<String, ManifestItem>, EpubError> {
        let mut manifest = IndexMap::with_capacity(manifest_element.children().count());

        for element in manifest_element.children() {
            let id = element.get_attr("id").ok_or_else(|| EpubError::MalformedManifest {
                reason: format!("{} element is missing an id attribute", element.tag_name()),
            })?;
            let href = element.get_attr("href").ok_or_else(|| EpubError::MalformedManifest {
                reason: format!("{} element is missing an href attribute", element.tag_name()),
            })?;
            let mime = element
                .get_attr("media-type")
                .ok_or_else(|| EpubError::MalformedManifest {
                    reason: format!("{} element is missing a media-type attribute", element.tag_name()),
                })?;

            let path = Self::normalize_manifest_path(&href, base_path)?;

            manifest.insert(
                id.clone(),
                ManifestItem {
                    id,
                    path,
                    mime,
                    properties: element.get_attr("properties"),
                    fallback: element.get_attr("fallback"),
                },
            );
        }

        Self::validate_fallback_chains(&manifest);
        Ok(manifest)
    }

    /// Resolves a manifest `href` to a path relative to the archive root.
    fn normalize_manifest_path(href: &str, base_path: &Path) -> Result<PathBuf, EpubError> {
        if href.starts_with("../") {
            check_relative_link_leakage(PathBuf::new(), base_path.to_path_buf(), href)
                .map(PathBuf::from)
                .ok_or_else(|| EpubError::RelativeLinkLeakage {
                    path: href.to_string(),
                })
        } else if let Some(stripped) = href.strip_prefix('/') {
            Ok(PathBuf::from(stripped))
        } else {
            Ok(base_path.join(href))
        }
    }

    fn validate_fallback_chains(manifest: &IndexMap<String, ManifestItem>) {
        for (id, item) in manifest {
            if item.fallback.is_none() {
                continue;
            }

            let mut seen = Vec::new();
            if let Err(reason) = Self::validate_fallback_chain(manifest, id, &mut seen) {
                log::warn!("invalid fallback chain for manifest item {}: {}", id, reason);
            }
        }
    }

    fn validate_fallback_chain(
        manifest: &IndexMap<String, ManifestItem>,
        manifest_id: &str,
        seen: &mut Vec<String>,
    ) -> Result<(), String> {
        if seen.contains(&manifest_id.to_string()) {
            return Err(format!("circular reference in fallback chain at {}", manifest_id));
        }

        let Some(item) = manifest.get(manifest_id) else {
            return Err(format!("manifest item {} does not exist", manifest_id));
        };

        let Some(fallback_id) = &item.fallback else {
            return Ok(());
        };

        if !manifest.contains_key(fallback_id) {
            return Err(format!("fallback resource {} does not exist", fallback_id));
        }

        seen.push(manifest_id.to_string());
        Self::validate_fallback_chain(manifest, fallback_id, seen)
    }

    fn parse_spine(spine_element: &XmlElement) -> Result<Spine, EpubError> {
        let mut items = Vec::new();

        for element in spine_element.children() {
            let idref = element.get_attr("idref").ok_or_else(|| EpubError::MalformedSpine {
                reason: "itemref element is missing an idref attribute".to_string(),
            })?;

            // `linear="no"` is the only value that turns a spine item off;
            // any other value, or the attribute's absence, keeps it linear.
            let linear = element.get_attr("linear").is_none_or(|value| value != "no");

            items.push(SpineItem {
                idref,
                id: element.get_attr("id"),
                properties: element.get_attr("properties"),
                linear,
            });
        }

        Ok(Spine {
            items,
            toc: spine_element.get_attr("toc"),
            page_progression_ltr: spine_element
                .get_attr("page-progression-direction")
                .is_none_or(|dir| dir != "rtl"),
        })
    }

    fn parse_guide(guide_element: &XmlElement) -> Result<Vec<GuideReference>, EpubError> {
        guide_element
            .find_children_by_name("reference")
            .map(|element| {
                let ref_type = element.get_attr("type").ok_or_else(|| EpubError::MalformedGuide {
                    reason: "reference element is missing a type attribute".to_string(),
                })?;
                let href = element.get_attr("href").ok_or_else(|| EpubError::MalformedGuide {
                    reason: "reference element is missing an href attribute".to_string(),
                })?;

                Ok(GuideReference {
                    ref_type,
                    title: element.get_attr("title"),
                    href,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::archive::test_support::build_zip;

    const OPF: &str = r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="bookid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>  Example   Book  </dc:title>
    <dc:identifier id="bookid">urn:uuid:1234</dc:identifier>
    <meta property="dcterms:modified">2024-01-01T00:00:00Z</meta>
  </metadata>
  <manifest>
    <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
    <item id="c1" href="chapter1.xhtml" media-type="application/xhtml+xml"/>
    <item id="img" href="../shared/cover.jpg" media-type="image/jpeg"/>
  </manifest>
  <spine>
    <itemref idref="c1"/>
    <itemref idref="nav" linear="no"/>
  </spine>
</package>"#;

    #[test]
    fn test_parse_package_document() {
        let bytes = build_zip(&[("OEBPS/content.opf", OPF.as_bytes())]);
        let archive = Archive::new(Cursor::new(bytes)).unwrap();

        let package =
            PackageParser::parse(&archive, PathBuf::from("OEBPS/content.opf")).unwrap();

        assert_eq!(package.version, EpubVersion::Version3_0);
        assert_eq!(package.unique_identifier, "urn:uuid:1234");
        assert_eq!(package.metadata.first_value("title"), Some("Example Book"));
        assert_eq!(package.manifest.len(), 3);
        assert_eq!(
            package.manifest.get("c1").unwrap().path,
            PathBuf::from("OEBPS/chapter1.xhtml")
        );
        assert_eq!(
            package.manifest.get("img").unwrap().path,
            PathBuf::from("shared/cover.jpg")
        );

        assert_eq!(package.spine.items.len(), 2);
        assert!(package.spine.items[0].linear);
        assert!(!package.spine.items[1].linear);
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let opf = OPF.replace("version=\"3.0\"", "version=\"1.0\"");
        let bytes = build_zip(&[("OEBPS/content.opf", opf.as_bytes())]);
        let archive = Archive::new(Cursor::new(bytes)).unwrap();

        let err = PackageParser::parse(&archive, PathBuf::from("OEBPS/content.opf")).unwrap_err();
        assert_eq!(
            err,
            EpubError::UnsupportedVersion {
                version: "1.0".to_string()
            }
        );
    }
}
