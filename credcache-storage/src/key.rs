//! Composite `{name}.{attribute}` keys used inside each collection.
//!
//! Attribute names never contain `.` (enforced by `CredentialSchema::validate`),
//! while credential names may. Decoding therefore splits on the LAST dot, which
//! makes the encoding injective for every name.

/// Separator between credential name and attribute name.
const SEPARATOR: char = '.';

/// A key addressing one attribute of one credential.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttributeKey<'a> {
    name: &'a str,
    attribute: &'a str,
}

impl<'a> AttributeKey<'a> {
    pub fn new(name: &'a str, attribute: &'a str) -> Self {
        Self { name, attribute }
    }

    pub fn name(&self) -> &'a str {
        self.name
    }

    pub fn attribute(&self) -> &'a str {
        self.attribute
    }

    /// Encode to the stored string form.
    pub fn encode(&self) -> String {
        let mut key = String::with_capacity(self.name.len() + 1 + self.attribute.len());
        key.push_str(self.name);
        key.push(SEPARATOR);
        key.push_str(self.attribute);
        key
    }

    /// Decode a stored key. Returns `None` for keys without a separator.
    pub fn decode(key: &'a str) -> Option<Self> {
        key.rsplit_once(SEPARATOR)
            .map(|(name, attribute)| Self { name, attribute })
    }
}
