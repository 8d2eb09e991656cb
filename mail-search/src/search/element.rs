//! Response tree
//!
//! Search responses are built as a tree of named elements carrying
//! attributes, optional text content and ordered children. The tree
//! serializes to JSON and is also the wire shape exchanged with remote
//! mailboxes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One node of a response tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    /// Element name (e.g. "m", "c", "appt")
    pub name: String,
    /// Attributes
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, Value>,
    /// Text content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Child elements, in document order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: BTreeMap::new(),
            content: None,
            children: Vec::new(),
        }
    }

    /// Set an attribute, replacing any previous value
    pub fn add_attr(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        self.attrs.insert(name.to_string(), value.into());
        self
    }

    /// Builder form of [`Element::add_attr`]
    pub fn with_attr(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.add_attr(name, value);
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn attr(&self, name: &str) -> Option<&Value> {
        self.attrs.get(name)
    }

    pub fn attr_str(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).and_then(Value::as_str)
    }

    pub fn attr_bool(&self, name: &str) -> Option<bool> {
        self.attrs.get(name).and_then(Value::as_bool)
    }

    /// Append a new child and return it for further decoration
    pub fn add_element(&mut self, name: impl Into<String>) -> &mut Element {
        self.children.push(Element::new(name));
        let last = self.children.len() - 1;
        &mut self.children[last]
    }

    /// Append an existing element as the last child
    pub fn add_child(&mut self, child: Element) -> &mut Element {
        self.children.push(child);
        let last = self.children.len() - 1;
        &mut self.children[last]
    }

    /// Append a child with only text content (e.g. `su`, `fr`)
    pub fn add_text_element(&mut self, name: &str, content: impl Into<String>) {
        self.children.push(Element::new(name).with_content(content));
    }

    /// Detach every child from this element, leaving it empty
    pub fn take_children(&mut self) -> Vec<Element> {
        std::mem::take(&mut self.children)
    }

    pub fn first_child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes_and_children() {
        let mut response = Element::new("SearchResponse");
        response.add_attr("more", false).add_attr("offset", 0);
        response.add_element("m").add_attr("id", "42");
        response.add_text_element("su", "hello");

        assert_eq!(response.attr_bool("more"), Some(false));
        assert_eq!(response.children.len(), 2);
        assert_eq!(response.first_child("m").unwrap().attr_str("id"), Some("42"));
        assert_eq!(response.first_child("su").unwrap().content.as_deref(), Some("hello"));
    }

    #[test]
    fn test_take_children_detaches_in_order() {
        let mut remote = Element::new("SearchResponse");
        remote.add_element("appt").add_attr("id", "1");
        remote.add_element("appt").add_attr("id", "2");

        let mut local = Element::new("SearchResponse");
        for child in remote.take_children() {
            local.add_child(child);
        }

        assert!(remote.children.is_empty());
        let ids: Vec<_> = local.children.iter().filter_map(|c| c.attr_str("id")).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn test_json_shape_skips_empty_parts() {
        let element = Element::new("info").with_attr("value", 3);
        let json = serde_json::to_value(&element).unwrap();
        assert_eq!(json, serde_json::json!({ "name": "info", "attrs": { "value": 3 } }));

        let back: Element = serde_json::from_value(json).unwrap();
        assert_eq!(back, element);
    }
}
