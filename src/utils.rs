use std::{
    collections::HashMap,
    io::{Read, Seek},
    path::PathBuf,
};

use quick_xml::{NsReader, events::Event};
use zip::{CompressionMethod, ZipArchive};

use crate::error::EpubError;

/// Extracts the contents of a specified file from a ZIP archive.
///
/// This is the low-level primitive every higher-level reader (container,
/// package, navigation) goes through to obtain raw bytes from the archive.
pub fn get_file_in_zip_archive<R: Read + Seek>(
    zip_file: &mut ZipArchive<R>,
    file_name: &str,
) -> Result<Vec<u8>, EpubError> {
    let mut buffer = Vec::<u8>::new();
    let mut file = zip_file.by_name(file_name)?;
    file.read_to_end(&mut buffer)?;
    Ok(buffer)
}

/// Checks that every entry in the archive uses a compression method allowed
/// by the OCF specification (Stored or Deflated only).
pub fn compression_method_check<R: Read + Seek>(
    zip_archive: &mut ZipArchive<R>,
) -> Result<(), EpubError> {
    for index in 0..zip_archive.len() {
        let file = zip_archive.by_index(index)?;

        match file.compression() {
            CompressionMethod::Stored | CompressionMethod::Deflated => continue,
            _ => {
                return Err(EpubError::UnusableCompressionMethod {
                    file: file.name().to_string(),
                    method: file.compression().to_string(),
                });
            }
        };
    }

    Ok(())
}

/// Resolves a `../`-prefixed relative link against a base directory and checks
/// that it does not escape the archive root.
///
/// Returns `None` when the link leaks out of the container.
pub fn check_relative_link_leakage(
    root: PathBuf,
    current_dir: PathBuf,
    check_file: &str,
) -> Option<String> {
    let mut folder_depth = 0;
    let mut remaining = check_file;

    while remaining.starts_with("../") {
        folder_depth += 1;
        remaining = &remaining[3..];
    }

    let mut current_path = root.join(current_dir);
    for _ in 0..folder_depth {
        if !current_path.pop() {
            return None;
        }
    }

    let prefix_path = match current_path.strip_prefix(&root) {
        Ok(path) => path.to_str()?,
        Err(_) => return None,
    };

    let path = match prefix_path {
        "" => remaining.to_string(),
        _ => format!("{}/{}", prefix_path, remaining),
    };
    Some(path)
}

/// Decodes raw bytes from the archive into a string.
///
/// Text resources are always treated as UTF-8; a leading UTF-8 BOM is
/// stripped if present. Anything else is a [`EpubError::DecodeError`].
pub trait DecodeBytes {
    fn decode(&self) -> Result<String, EpubError>;
}

impl DecodeBytes for Vec<u8> {
    fn decode(&self) -> Result<String, EpubError> {
        let bytes = match self.as_slice() {
            [0xEF, 0xBB, 0xBF, rest @ ..] => rest,
            rest => rest,
        };

        String::from_utf8(bytes.to_vec()).map_err(EpubError::from)
    }
}

/// Normalizes runs of whitespace (spaces, tabs, newlines) into single spaces
/// and trims the result.
pub trait NormalizeWhitespace {
    fn normalize_whitespace(&self) -> String;
}

impl NormalizeWhitespace for &str {
    fn normalize_whitespace(&self) -> String {
        self.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

impl NormalizeWhitespace for String {
    fn normalize_whitespace(&self) -> String {
        self.as_str().normalize_whitespace()
    }
}

/// An element node of a parsed XML document.
#[derive(Debug)]
pub struct XmlElement {
    /// The local name of the element (excluding namespace prefix).
    pub name: String,
    pub prefix: Option<String>,
    pub namespace: Option<String>,
    pub attributes: HashMap<String, String>,
    pub text: Option<String>,
    pub cdata: Option<String>,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    pub fn new(name: String) -> Self {
        Self {
            name,
            prefix: None,
            namespace: None,
            attributes: HashMap::new(),
            text: None,
            cdata: None,
            children: Vec::new(),
        }
    }

    /// Returns "prefix:name" if the element has a namespace prefix, else just "name".
    pub fn tag_name(&self) -> String {
        if let Some(prefix) = &self.prefix {
            format!("{}:{}", prefix, self.name)
        } else {
            self.name.clone()
        }
    }

    /// Text content of this element and all descendants, concatenated and trimmed.
    pub fn text(&self) -> String {
        let mut result = String::new();

        if let Some(text_value) = &self.text {
            result.push_str(text_value);
        }

        for child in &self.children {
            result.push_str(&child.text());
        }

        result.trim().to_string()
    }

    pub fn get_attr(&self, name: &str) -> Option<String> {
        self.attributes.get(name).cloned()
    }

    /// Depth-first search for every descendant (including self) with a given local name.
    pub fn find_elements_by_name(&self, name: &str) -> impl Iterator<Item = &XmlElement> {
        SearchElementsByNameIter::new(self, name)
    }

    pub fn find_children_by_name(&self, name: &str) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter(move |child| child.name == name)
    }

    pub fn find_children_by_names<'a>(
        &'a self,
        names: &'a [&str],
    ) -> impl Iterator<Item = &'a XmlElement> {
        self.children
            .iter()
            .filter(move |child| names.contains(&child.name.as_str()))
    }

    pub fn children(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter()
    }
}

struct SearchElementsByNameIter<'a> {
    elements: Vec<&'a XmlElement>,
    current_index: usize,
    target_name: String,
}

impl<'a> SearchElementsByNameIter<'a> {
    fn new(root: &'a XmlElement, name: &str) -> Self {
        let mut elements = Vec::new();
        Self::collect_elements(root, &mut elements);
        Self {
            elements,
            current_index: 0,
            target_name: name.to_string(),
        }
    }

    fn collect_elements(element: &'a XmlElement, collection: &mut Vec<&'a XmlElement>) {
        collection.push(element);
        for child in &element.children {
            Self::collect_elements(child, collection);
        }
    }
}

impl<'a> Iterator for SearchElementsByNameIter<'a> {
    type Item = &'a XmlElement;

    fn next(&mut self) -> Option<Self::Item> {
        while self.current_index < self.elements.len() {
            let element = self.elements[self.current_index];
            self.current_index += 1;
            if element.name == self.target_name {
                return Some(element);
            }
        }
        None
    }
}

/// Parses XML content into an [`XmlElement`] tree.
///
/// This is deliberately a small custom tree rather than `quick_xml`'s own
/// event model: the parsers in this crate dispatch on local element name and
/// walk the tree repeatedly (metadata, manifest, navigation), which reads far
/// more naturally against a materialized tree than against a stream of events.
pub struct XmlReader {}

impl XmlReader {
    pub fn parse(content: &str) -> Result<XmlElement, EpubError> {
        if content.is_empty() {
            return Err(EpubError::MalformedXml {
                reason: "document is empty".to_string(),
            });
        }

        let mut reader = NsReader::from_str(content);
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();
        let mut stack = Vec::<XmlElement>::new();
        let mut root = None;
        let mut namespace_map = HashMap::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Eof) => break,

                Ok(Event::Start(e)) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                    let mut element = XmlElement::new(name);

                    if let Some(prefix) = e.name().prefix() {
                        element.prefix = Some(String::from_utf8_lossy(prefix.as_ref()).to_string());
                    }

                    for attr in e.attributes().flatten() {
                        let attr_key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
                        let attr_value = String::from_utf8_lossy(&attr.value).to_string();

                        if attr_key.contains("xmlns") {
                            let attr_keys = attr_key.split(':').collect::<Vec<&str>>();
                            if attr_keys.len() >= 2 {
                                namespace_map.insert(attr_keys[1].to_string(), attr_value);
                            } else {
                                namespace_map.insert(attr_key, attr_value);
                            }
                            continue;
                        }

                        element.attributes.insert(attr_key, attr_value);
                    }

                    stack.push(element);
                }

                Ok(Event::End(_)) => {
                    if let Some(element) = stack.pop() {
                        if stack.is_empty() {
                            root = Some(element);
                        } else if let Some(parent) = stack.last_mut() {
                            parent.children.push(element);
                        }
                    }
                }

                Ok(Event::Empty(e)) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                    let mut element = XmlElement::new(name);

                    if let Some(prefix) = e.name().prefix() {
                        element.prefix = Some(String::from_utf8_lossy(prefix.as_ref()).to_string());
                    }

                    for attr in e.attributes().flatten() {
                        let attr_key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
                        let attr_value = String::from_utf8_lossy(&attr.value).to_string();

                        if attr_key.contains("xmlns") {
                            let attr_keys = attr_key.split(':').collect::<Vec<&str>>();
                            if attr_keys.len() >= 2 {
                                namespace_map.insert(attr_keys[1].to_string(), attr_value);
                            } else {
                                namespace_map.insert(attr_key, attr_value);
                            }
                            continue;
                        }

                        element.attributes.insert(attr_key, attr_value);
                    }

                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(element);
                    }
                }

                Ok(Event::Text(e)) => {
                    if let Some(element) = stack.last_mut() {
                        let text = String::from_utf8_lossy(e.as_ref()).to_string();
                        if !text.trim().is_empty() {
                            element.text = Some(text);
                        }
                    }
                }

                Ok(Event::CData(e)) => {
                    if let Some(element) = stack.last_mut() {
                        element.cdata = Some(String::from_utf8_lossy(e.as_ref()).to_string());
                    }
                }

                Err(err) => return Err(err.into()),

                _ => continue,
            }
        }

        if let Some(element) = root.as_mut() {
            Self::assign_namespace(element, &namespace_map);
        }

        root.ok_or_else(|| EpubError::MalformedXml {
            reason: "no root element found".to_string(),
        })
    }

    pub fn parse_bytes(bytes: Vec<u8>) -> Result<XmlElement, EpubError> {
        let content = bytes.decode()?;
        Self::parse(&content)
    }

    fn assign_namespace(element: &mut XmlElement, namespace_map: &HashMap<String, String>) {
        if let Some(prefix) = &element.prefix {
            if let Some(namespace) = namespace_map.get(prefix) {
                element.namespace = Some(namespace.clone());
            }
        } else if let Some(namespace) = namespace_map.get("xmlns") {
            element.namespace = Some(namespace.clone());
        }

        for child in element.children.iter_mut() {
            Self::assign_namespace(child, namespace_map);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::utils::{DecodeBytes, NormalizeWhitespace};

    #[test]
    fn test_decode_utf8_with_bom() {
        let data: Vec<u8> = vec![0xEF, 0xBB, 0xBF, b'H', b'e', b'l', b'l', b'o'];
        let result = data.decode();
        assert!(result.is_ok());
        assert_eq!(result.unwrap(), "Hello");
    }

    #[test]
    fn test_decode_plain_utf8() {
        let data = b"Hello, World!".to_vec();
        let result = data.decode();
        assert!(result.is_ok());
        assert_eq!(result.unwrap(), "Hello, World!");
    }

    #[test]
    fn test_decode_invalid_utf8_errors() {
        let data = vec![0xFF, 0xFE, 0x00, 0x00];
        assert!(data.decode().is_err());
    }

    #[test]
    fn test_normalize_whitespace_trait() {
        let text = "  Hello,\tWorld!\n\nRust  ";
        assert_eq!(text.normalize_whitespace(), "Hello, World! Rust");

        let text_string = String::from("  Hello,\tWorld!\n\nRust  ");
        assert_eq!(text_string.normalize_whitespace(), "Hello, World! Rust");
    }
}
