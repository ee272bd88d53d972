//! Configuration fragments and namespaced tag identity
//!
//! A [`ConfigElement`] is the unit the registry dispatches on: a tag, a flat
//! set of attributes and any nested child elements. Elements are produced by
//! the TOML configuration loader but nothing here depends on that format.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Namespace every built-in mediator tag lives in
pub const MEDIATION_NAMESPACE: &str = "urn:mediation:config";

/// Namespace-qualified tag name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QName {
    pub namespace: String,
    pub local_name: String,
}

impl QName {
    pub fn new<N: Into<String>, L: Into<String>>(namespace: N, local_name: L) -> Self {
        Self {
            namespace: namespace.into(),
            local_name: local_name.into(),
        }
    }

    /// Tag in the default mediation namespace
    pub fn mediation<L: Into<String>>(local_name: L) -> Self {
        Self::new(MEDIATION_NAMESPACE, local_name)
    }

    /// Parse a bare local name or Clark notation (`{namespace}local`)
    pub fn parse(tag: &str) -> Option<Self> {
        let tag = tag.trim();
        if let Some(rest) = tag.strip_prefix('{') {
            let (namespace, local) = rest.split_once('}')?;
            if namespace.is_empty() || !is_valid_local_name(local) {
                return None;
            }
            return Some(Self::new(namespace, local));
        }

        if is_valid_local_name(tag) {
            Some(Self::mediation(tag))
        } else {
            None
        }
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}{}", self.namespace, self.local_name)
    }
}

fn is_valid_local_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

/// Scalar attribute value as it appears in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Bool(b) => write!(f, "{b}"),
            AttributeValue::Integer(i) => write!(f, "{i}"),
            AttributeValue::Float(x) => write!(f, "{x}"),
            AttributeValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

/// A single configuration fragment
///
/// # Examples
/// ```
/// use mediation_engine::element::{ConfigElement, QName};
///
/// let element = ConfigElement::new("loopback").with_attribute("trace", "enable");
/// assert_eq!(element.qname(), Some(QName::mediation("loopback")));
/// assert_eq!(element.attribute("trace").as_deref(), Some("enable"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigElement {
    /// Local name or `{namespace}local`
    pub tag: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, AttributeValue>,
    #[serde(default, rename = "child", skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ConfigElement>,
}

impl ConfigElement {
    pub fn new<S: Into<String>>(tag: S) -> Self {
        Self {
            tag: tag.into(),
            attributes: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attribute<K: Into<String>, V: Into<AttributeValue>>(
        mut self,
        name: K,
        value: V,
    ) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_child(mut self, child: ConfigElement) -> Self {
        self.children.push(child);
        self
    }

    /// Resolved tag identity, `None` when the tag is malformed
    pub fn qname(&self) -> Option<QName> {
        QName::parse(&self.tag)
    }

    /// Attribute rendered as text
    pub fn attribute(&self, name: &str) -> Option<String> {
        self.attributes.get(name).map(ToString::to_string)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Children whose tag resolves to the given local name in the same namespace
    pub fn children_named<'a>(&'a self, local_name: &'a str) -> impl Iterator<Item = &'a ConfigElement> {
        self.children.iter().filter(move |child| {
            child
                .qname()
                .map(|q| q.local_name == local_name && q.namespace == MEDIATION_NAMESPACE)
                .unwrap_or(false)
        })
    }
}
