//! Parses the EPUB 2 NCX and EPUB 3 navigation documents into a [`Navigation`] tree.

use std::{
    io::{Read, Seek},
    path::{Path, PathBuf},
};

use crate::{
    archive::Archive,
    error::EpubError,
    package::Package,
    types::{NavPoint, NcxMeta, Navigation},
    utils::{NormalizeWhitespace, XmlElement, XmlReader},
};

const NCX_NAMESPACE: &str = "http://www.daisy.org/z3986/2005/ncx/";

pub struct NavigationParser;

impl NavigationParser {
    /// Parses the NCX document named by `spine.toc`.
    pub fn from_ncx<R: Read + Seek>(
        archive: &Archive<R>,
        package: &Package,
    ) -> Result<Navigation, EpubError> {
        let toc_id = package.spine.toc.as_ref().ok_or_else(|| EpubError::MissingTOC {
            reason: "spine has no toc attribute".to_string(),
        })?;

        let toc_item = package
            .manifest
            .iter()
            .find(|(id, _)| id.eq_ignore_ascii_case(toc_id))
            .map(|(_, item)| item)
            .ok_or_else(|| EpubError::MissingTOC {
                reason: format!("manifest has no item with id \"{}\"", toc_id),
            })?;

        let ncx_path = toc_item.path.to_str().ok_or_else(|| EpubError::MalformedNCX {
            reason: "toc path is not valid UTF-8".to_string(),
        })?;
        let content = archive.read_text(ncx_path)?;
        let root = XmlReader::parse(&content)?;

        if root.namespace.as_deref() != Some(NCX_NAMESPACE) {
            log::warn!("ncx document at {} is missing its expected namespace", ncx_path);
        }

        // `content@src` in the NCX is relative to the NCX file's own directory,
        // not the archive root; resolve it the same way nav3 hrefs are resolved.
        let ncx_dir = toc_item.path.parent().unwrap_or(Path::new("")).to_path_buf();

        let head = root
            .find_elements_by_name("head")
            .next()
            .map(Self::parse_head)
            .unwrap_or_default();

        let doc_title = root
            .find_elements_by_name("docTitle")
            .next()
            .map(Self::parse_text_children)
            .unwrap_or_default();

        let doc_authors = root
            .find_elements_by_name("docAuthor")
            .map(Self::parse_text_children)
            .collect();

        let nav_map = root
            .find_elements_by_name("navMap")
            .next()
            .map(|nav_map| Self::parse_nav_points(nav_map, &ncx_dir))
            .transpose()?
            .unwrap_or_default();

        let page_list = root
            .find_elements_by_name("pageList")
            .next()
            .map(|list| Self::parse_targets(list, &ncx_dir))
            .transpose()?
            .unwrap_or_default();

        let nav_lists = root
            .find_elements_by_name("navList")
            .flat_map(|list| Self::parse_targets(list, &ncx_dir).unwrap_or_default())
            .collect();

        Ok(Navigation {
            head,
            doc_title,
            doc_authors,
            nav_map,
            page_list,
            nav_lists,
        })
    }

    fn parse_head(head_element: &XmlElement) -> Vec<NcxMeta> {
        head_element
            .find_children_by_name("meta")
            .filter_map(|element| {
                let name = element.get_attr("name")?;
                let content = element.get_attr("content")?;
                Some(NcxMeta {
                    name,
                    content,
                    scheme: element.get_attr("scheme"),
                })
            })
            .collect()
    }

    fn parse_text_children(element: &XmlElement) -> Vec<String> {
        element
            .find_children_by_name("text")
            .map(|text| text.text())
            .collect()
    }

    fn parse_nav_points(nav_map: &XmlElement, ncx_dir: &Path) -> Result<Vec<NavPoint>, EpubError> {
        let mut points = Vec::new();

        for nav_point in nav_map.find_children_by_name("navPoint") {
            let label = nav_point
                .find_children_by_name("navLabel")
                .next()
                .map(|element| element.text())
                .unwrap_or_default();

            let content = nav_point
                .find_children_by_name("content")
                .next()
                .and_then(|element| element.get_attr("src"))
                .map(|src| Self::resolve_nav_href(&src, ncx_dir));

            let play_order = nav_point
                .get_attr("playOrder")
                .and_then(|order| order.parse::<usize>().ok());

            points.push(NavPoint {
                label,
                content,
                play_order,
                children: Self::parse_nav_points(nav_point, ncx_dir)?,
            });
        }

        points.sort();
        Ok(points)
    }

    /// Parses `pageList`/`navList` entries, which share the `navLabel`/`content` shape of nav points.
    fn parse_targets(list_element: &XmlElement, ncx_dir: &Path) -> Result<Vec<NavPoint>, EpubError> {
        let mut points = Vec::new();

        for target in list_element
            .find_children_by_name("pageTarget")
            .chain(list_element.find_children_by_name("navTarget"))
        {
            let label = target
                .find_children_by_name("navLabel")
                .next()
                .map(|element| element.text())
                .unwrap_or_default();
            let content = target
                .find_children_by_name("content")
                .next()
                .and_then(|element| element.get_attr("src"))
                .map(|src| Self::resolve_nav_href(&src, ncx_dir));

            points.push(NavPoint {
                label,
                content,
                play_order: target.get_attr("playOrder").and_then(|order| order.parse().ok()),
                children: vec![],
            });
        }

        Ok(points)
    }

    /// Parses the EPUB 3 navigation document (the manifest item with `properties="nav"`).
    pub fn from_nav3<R: Read + Seek>(
        archive: &Archive<R>,
        package: &Package,
    ) -> Result<Navigation, EpubError> {
        let nav_item = package
            .manifest
            .values()
            .find(|item| item.has_property("nav"))
            .ok_or_else(|| EpubError::MissingTOC {
                reason: "manifest has no item with properties=\"nav\"".to_string(),
            })?;

        let nav_path = nav_item.path.to_str().ok_or_else(|| EpubError::MalformedNav3 {
            reason: "nav path is not valid UTF-8".to_string(),
        })?;
        let content = archive.read_text(nav_path)?;
        let root = XmlReader::parse(&content)?;

        // The directory the nav document lives in; relative hrefs inside it are
        // resolved against this, threaded explicitly rather than stashed in shared state.
        let toc_file_entry_path = nav_item.path.parent().unwrap_or(Path::new("")).to_path_buf();

        // Prefer the nav explicitly marked as the toc; a valid document may omit
        // epub:type on its only nav, so fall back to the first nav element.
        let toc_nav = root
            .find_elements_by_name("nav")
            .find(|element| element.get_attr("epub:type").as_deref() == Some("toc"))
            .or_else(|| root.find_elements_by_name("nav").next())
            .ok_or_else(|| EpubError::MalformedNav3 {
                reason: "no nav element found".to_string(),
            })?;

        let ol = toc_nav
            .find_children_by_name("ol")
            .next()
            .ok_or_else(|| EpubError::MalformedNav3 {
                reason: "nav[epub:type=toc] has no ol child".to_string(),
            })?;

        let nav_map = Self::parse_nav_list(ol, &toc_file_entry_path)?;

        let page_list = root
            .find_elements_by_name("nav")
            .find(|element| element.get_attr("epub:type").as_deref() == Some("page-list"))
            .and_then(|nav| nav.find_children_by_name("ol").next())
            .map(|ol| Self::parse_nav_list(ol, &toc_file_entry_path))
            .transpose()?
            .unwrap_or_default();

        let nav_lists = root
            .find_elements_by_name("nav")
            .filter(|element| {
                !matches!(
                    element.get_attr("epub:type").as_deref(),
                    Some("toc") | Some("page-list")
                )
            })
            .filter_map(|nav| nav.find_children_by_name("ol").next())
            .map(|ol| Self::parse_nav_list(ol, &toc_file_entry_path))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .flatten()
            .collect();

        let doc_title = package.metadata.values("title").into_iter().map(str::to_string).collect();

        Ok(Navigation {
            head: vec![],
            doc_title,
            doc_authors: vec![],
            nav_map,
            page_list,
            nav_lists,
        })
    }

    fn parse_nav_list(ol: &XmlElement, toc_file_entry_path: &Path) -> Result<Vec<NavPoint>, EpubError> {
        let mut points = Vec::new();

        for item in ol.find_children_by_name("li") {
            let label_element = item
                .find_children_by_names(&["a", "span"])
                .next()
                .ok_or_else(|| EpubError::MalformedNav3 {
                    reason: "li element has no a or span child".to_string(),
                })?;

            let content = label_element
                .get_attr("href")
                .map(|href| Self::resolve_nav_href(&href, toc_file_entry_path));

            let children = item
                .find_children_by_name("ol")
                .next()
                .map(|ol| Self::parse_nav_list(ol, toc_file_entry_path))
                .transpose()?
                .unwrap_or_default();

            points.push(NavPoint {
                label: label_element.text().normalize_whitespace(),
                content,
                play_order: None,
                children,
            });
        }

        Ok(points)
    }

    fn resolve_nav_href(href: &str, toc_file_entry_path: &Path) -> PathBuf {
        let prefix = toc_file_entry_path.to_string_lossy();
        if !prefix.is_empty() && href.starts_with(prefix.as_ref()) {
            PathBuf::from(href)
        } else if prefix.is_empty() {
            PathBuf::from(href)
        } else {
            toc_file_entry_path.join(href)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::{archive::test_support::build_zip, package::PackageParser};

    const OPF: &str = r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="bookid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>Book</dc:title>
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
      <ol>
        <li><a href="chapter1.xhtml">Chapter One</a></li>
      </ol>
    </nav>
  </body>
</html>"#;

    #[test]
    fn test_parse_nav3() {
        let bytes = build_zip(&[
            ("OEBPS/content.opf", OPF.as_bytes()),
            ("OEBPS/nav.xhtml", NAV_XHTML.as_bytes()),
        ]);
        let archive = Archive::new(Cursor::new(bytes)).unwrap();
        let package = PackageParser::parse(&archive, PathBuf::from("OEBPS/content.opf")).unwrap();

        let navigation = NavigationParser::from_nav3(&archive, &package).unwrap();
        assert_eq!(navigation.nav_map.len(), 1);
        assert_eq!(navigation.nav_map[0].label, "Chapter One");
        assert_eq!(
            navigation.nav_map[0].content,
            Some(PathBuf::from("OEBPS/chapter1.xhtml"))
        );
    }

    #[test]
    fn test_parse_nav3_accepts_nav_without_epub_type() {
        let nav_xhtml = NAV_XHTML.replace(r#" epub:type="toc""#, "");
        let bytes = build_zip(&[
            ("OEBPS/content.opf", OPF.as_bytes()),
            ("OEBPS/nav.xhtml", nav_xhtml.as_bytes()),
        ]);
        let archive = Archive::new(Cursor::new(bytes)).unwrap();
        let package = PackageParser::parse(&archive, PathBuf::from("OEBPS/content.opf")).unwrap();

        let navigation = NavigationParser::from_nav3(&archive, &package).unwrap();
        assert_eq!(navigation.nav_map.len(), 1);
        assert_eq!(navigation.nav_map[0].label, "Chapter One");
    }

    const NCX_OPF: &str = r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="bookid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>Book</dc:title>
    <dc:identifier id="bookid">id-1</dc:identifier>
  </metadata>
  <manifest>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    <item id="c1" href="chapter1.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine toc="ncx">
    <itemref idref="c1"/>
  </spine>
</package>"#;

    const NCX: &str = r#"<?xml version="1.0"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head/>
  <docTitle><text>Book</text></docTitle>
  <navMap>
    <navPoint id="np1" playOrder="1">
      <navLabel><text>Chapter One</text></navLabel>
      <content src="chapter1.xhtml"/>
    </navPoint>
  </navMap>
</ncx>"#;

    #[test]
    fn test_parse_ncx_resolves_content_src_against_ncx_directory() {
        let bytes = build_zip(&[
            ("OEBPS/content.opf", NCX_OPF.as_bytes()),
            ("OEBPS/toc.ncx", NCX.as_bytes()),
        ]);
        let archive = Archive::new(Cursor::new(bytes)).unwrap();
        let package = PackageParser::parse(&archive, PathBuf::from("OEBPS/content.opf")).unwrap();

        let navigation = NavigationParser::from_ncx(&archive, &package).unwrap();
        assert_eq!(navigation.nav_map.len(), 1);
        assert_eq!(
            navigation.nav_map[0].content,
            Some(PathBuf::from("OEBPS/chapter1.xhtml"))
        );
    }
}
