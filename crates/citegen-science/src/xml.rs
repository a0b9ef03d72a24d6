//! Generic XML → JSON flattening.
//!
//! Provider payloads in XML (the arXiv OAI-PMH feed) are turned into plain
//! JSON objects so they can be cached next to the JSON providers' records
//! and read back with the same accessors.
//!
//! Every field is kept as a sequence while flattening. When rendered to JSON
//! a field seen once becomes a scalar and a repeated field becomes an array
//! in document order, so readers that expect a list must go through
//! [`as_sequence`].

use std::collections::BTreeMap;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde_json::{Map, Value};

use crate::error::{Result, ScienceError};

/// Reserved key holding an element's attributes.
pub const ATTRIB_KEY: &str = "_attrib";
/// Key holding the text of a leaf element that also carries attributes.
pub const VALUE_KEY: &str = "value";

/// A parsed XML element, namespace prefixes already stripped from its name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlElement {
    pub name: String,
    pub attributes: BTreeMap<String, String>,
    pub text: Option<String>,
    pub children: Vec<XmlElement>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum XmlValue {
    Text(Option<String>),
    Leaf {
        value: Option<String>,
        attrib: BTreeMap<String, String>,
    },
    Map(XmlMap),
}

/// Flattened children of one element.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlMap {
    fields: BTreeMap<String, Vec<XmlValue>>,
    attrib: BTreeMap<String, String>,
}

impl XmlMap {
    fn insert(&mut self, key: String, value: XmlValue) {
        self.fields.entry(key).or_default().push(value);
    }

    pub fn get(&self, key: &str) -> &[XmlValue] {
        self.fields.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn attrib(&self) -> &BTreeMap<String, String> {
        &self.attrib
    }

    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        for (key, values) in &self.fields {
            let rendered = match values.as_slice() {
                [single] => single.to_json(),
                many => Value::Array(many.iter().map(XmlValue::to_json).collect()),
            };
            out.insert(key.clone(), rendered);
        }
        if !self.attrib.is_empty() {
            out.insert(ATTRIB_KEY.to_string(), attrib_to_json(&self.attrib));
        }
        Value::Object(out)
    }
}

impl XmlValue {
    pub fn to_json(&self) -> Value {
        match self {
            XmlValue::Text(text) => text.clone().map(Value::String).unwrap_or(Value::Null),
            XmlValue::Leaf { value, attrib } => {
                let mut out = Map::new();
                out.insert(
                    VALUE_KEY.to_string(),
                    value.clone().map(Value::String).unwrap_or(Value::Null),
                );
                out.insert(ATTRIB_KEY.to_string(), attrib_to_json(attrib));
                Value::Object(out)
            }
            XmlValue::Map(map) => map.to_json(),
        }
    }
}

fn attrib_to_json(attrib: &BTreeMap<String, String>) -> Value {
    Value::Object(
        attrib
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}

/// Strips a namespace from a tag: `{uri}tag` and `prefix:tag` both give `tag`.
pub fn normalize_tag(name: &str) -> &str {
    let name = name.rfind('}').map_or(name, |i| &name[i + 1..]);
    name.rfind(':').map_or(name, |i| &name[i + 1..])
}

/// Flattens the children of `element`.
pub fn flatten(element: &XmlElement) -> XmlMap {
    let mut out = XmlMap::default();
    for child in &element.children {
        let key = child.name.clone();
        let value = if !child.children.is_empty() {
            let mut nested = flatten(child);
            nested.attrib = child.attributes.clone();
            XmlValue::Map(nested)
        } else if !child.attributes.is_empty() {
            XmlValue::Leaf {
                value: child.text.clone(),
                attrib: child.attributes.clone(),
            }
        } else {
            XmlValue::Text(child.text.clone())
        };
        out.insert(key, value);
    }
    out
}

/// Parses `xml` and flattens its root element into a JSON object.
pub fn flatten_document(xml: &str) -> Result<Value> {
    let root = parse_document(xml)?;
    Ok(flatten(&root).to_json())
}

/// Parses an XML document into an element tree.
pub fn parse_document(xml: &str) -> Result<XmlElement> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| ScienceError::Xml(format!("at byte {}: {e}", reader.buffer_position())))?;

        match event {
            Event::Start(start) => stack.push(open_element(&start)?),
            Event::Empty(start) => {
                let element = open_element(&start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| ScienceError::Xml("unbalanced closing tag".to_string()))?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(|e| ScienceError::Xml(e.to_string()))?;
                push_text(&mut stack, &text);
            }
            Event::CData(data) => {
                let data = data.into_inner();
                push_text(&mut stack, &String::from_utf8_lossy(&data));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(ScienceError::Xml(format!("unclosed element <{}>", open.name)));
    }
    root.ok_or_else(|| ScienceError::Xml("document has no root element".to_string()))
}

fn open_element(start: &BytesStart<'_>) -> Result<XmlElement> {
    let raw_name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attributes = BTreeMap::new();

    for attr in start.attributes() {
        let attr = attr.map_err(|e| ScienceError::Xml(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        if key == "xmlns" || key.starts_with("xmlns:") {
            continue;
        }
        let value = attr
            .unescape_value()
            .map_err(|e| ScienceError::Xml(e.to_string()))?
            .into_owned();
        attributes.insert(key, value);
    }

    Ok(XmlElement {
        name: normalize_tag(&raw_name).to_string(),
        attributes,
        text: None,
        children: Vec::new(),
    })
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(element);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(element);
            Ok(())
        }
        None => Err(ScienceError::Xml("multiple root elements".to_string())),
    }
}

// Only the text ahead of the first child counts, matching leaf semantics.
fn push_text(stack: &mut [XmlElement], text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(top) = stack.last_mut()
        && top.children.is_empty()
    {
        top.text.get_or_insert_with(String::new).push_str(text);
    }
}

/// Views a flattened field as a sequence: arrays as-is, null as empty,
/// anything else as a one-element list.
pub fn as_sequence(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

/// Text of a flattened leaf, whether or not it carried attributes.
pub fn text_of(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => map.get(VALUE_KEY).and_then(Value::as_str),
        _ => None,
    }
}
