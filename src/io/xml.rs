//! Minimal element tree over quick-xml events, used for product metadata.
//! Names are local (namespace prefixes dropped); the root keeps its namespace.
use std::collections::BTreeMap;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub attrs: BTreeMap<String, String>,
    pub text: String,
    pub children: Vec<XmlElement>,
}

/// Parsed document: root element plus its default namespace, if declared.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlDoc {
    pub root: XmlElement,
    pub namespace: Option<String>,
}

fn open_element(e: &BytesStart<'_>) -> Result<(XmlElement, Option<String>)> {
    let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
    let mut attrs = BTreeMap::new();
    let mut namespace = None;
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::InvalidAttr)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = attr.unescape_value()?.to_string();
        if key == "xmlns" {
            namespace = Some(value.clone());
        }
        let local = String::from_utf8_lossy(attr.key.local_name().as_ref()).to_string();
        attrs.insert(local, value);
    }
    Ok((
        XmlElement {
            name,
            attrs,
            ..Default::default()
        },
        namespace,
    ))
}

impl XmlDoc {
    pub fn parse(text: &str) -> Result<Self> {
        let mut reader = Reader::from_str(text);
        reader.trim_text(true);
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root = None;
        let mut namespace = None;

        loop {
            match reader.read_event()? {
                Event::Start(ref e) => {
                    let (el, ns) = open_element(e)?;
                    if stack.is_empty() {
                        namespace = ns;
                    }
                    stack.push(el);
                }
                Event::Empty(ref e) => {
                    let (el, ns) = open_element(e)?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(el),
                        None => {
                            namespace = ns;
                            root = Some(el);
                        }
                    }
                }
                Event::End(_) => {
                    if let Some(el) = stack.pop() {
                        match stack.last_mut() {
                            Some(parent) => parent.children.push(el),
                            None => root = Some(el),
                        }
                    }
                }
                Event::Text(e) => {
                    if let Some(el) = stack.last_mut() {
                        el.text.push_str(&e.unescape()?);
                    }
                }
                Event::CData(e) => {
                    if let Some(el) = stack.last_mut() {
                        el.text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }
        let root = root.ok_or_else(|| Error::invalid_product("empty XML document"))?;
        Ok(XmlDoc { root, namespace })
    }
}

impl XmlElement {
    /// First descendant (depth-first, self excluded) named `name`.
    pub fn find(&self, name: &str) -> Option<&XmlElement> {
        for child in &self.children {
            if child.name == name {
                return Some(child);
            }
            if let Some(found) = child.find(name) {
                return Some(found);
            }
        }
        None
    }

    /// Follow a `/`-separated chain of descendant names.
    pub fn find_path(&self, path: &str) -> Option<&XmlElement> {
        path.split('/')
            .try_fold(self, |el, name| el.find(name))
    }

    pub fn find_all<'a>(&'a self, name: &str, out: &mut Vec<&'a XmlElement>) {
        for child in &self.children {
            if child.name == name {
                out.push(child);
            }
            child.find_all(name, out);
        }
    }

    pub fn descendants(&self, name: &str) -> Vec<&XmlElement> {
        let mut out = Vec::new();
        self.find_all(name, &mut out);
        out
    }

    pub fn text_of(&self, path: &str) -> Option<&str> {
        self.find_path(path).map(|e| e.text.trim())
    }

    /// Required text, `InvalidProduct` when missing.
    pub fn require(&self, path: &str) -> Result<&str> {
        self.text_of(path)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::invalid_product(format!("missing `{path}` in metadata")))
    }

    pub fn require_f64(&self, path: &str) -> Result<f64> {
        let text = self.require(path)?;
        text.parse().map_err(|_| {
            Error::invalid_product(format!("`{path}` is not a number: {text}"))
        })
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<?xml version="1.0"?>
<n1:Level-1C_Tile_ID xmlns:n1="https://psd-14.sentinel2.eo.esa.int/PSD/S2_PDI_Level-1C_Tile_Metadata.xsd">
  <n1:Geometric_Info>
    <Tile_Geocoding>
      <HORIZONTAL_CS_CODE>EPSG:32631</HORIZONTAL_CS_CODE>
      <Size resolution="10"><NROWS>10980</NROWS></Size>
      <Size resolution="20"><NROWS>5490</NROWS></Size>
    </Tile_Geocoding>
    <Empty flag="x"/>
  </n1:Geometric_Info>
</n1:Level-1C_Tile_ID>"#;

    #[test]
    fn finds_local_names_through_prefixes() {
        let doc = XmlDoc::parse(DOC).unwrap();
        assert_eq!(doc.root.name, "Level-1C_Tile_ID");
        assert_eq!(
            doc.root.text_of("Tile_Geocoding/HORIZONTAL_CS_CODE"),
            Some("EPSG:32631")
        );
        let sizes = doc.root.descendants("Size");
        assert_eq!(sizes.len(), 2);
        assert_eq!(sizes[1].attr("resolution"), Some("20"));
        assert_eq!(doc.root.find("Empty").and_then(|e| e.attr("flag")), Some("x"));
    }

    #[test]
    fn missing_field_is_invalid_product() {
        let doc = XmlDoc::parse(DOC).unwrap();
        assert!(matches!(
            doc.root.require("ULX"),
            Err(Error::InvalidProduct(_))
        ));
    }
}
