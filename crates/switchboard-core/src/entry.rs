//! Attribute entries attached to published services.
//!
//! An [`Entry`] is a plain data tag: a *kind* (its shape) plus a set of named
//! fields. The same type is used on both sides of a lookup:
//!
//! - On a [`ServiceItem`](crate::ServiceItem) every field normally carries a value.
//! - On a [`ServiceTemplate`](crate::ServiceTemplate) a field left unset is a
//!   wildcard and matches any value of the corresponding item field.
//!
//! ```rust,ignore
//! let attr = Entry::new("Name").with("name", "pubsub");
//! let query = Entry::new("Name").wildcard("name");
//! assert!(query.matches(&attr));
//! ```

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

// =============================================================================
// AttrValue
// =============================================================================

/// A single attribute field value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AttrValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{i}"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for AttrValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

// =============================================================================
// Entry
// =============================================================================

/// An immutable attribute tag.
///
/// Fields are kept in name order so that two entries built in a different
/// order compare equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    kind: Cow<'static, str>,
    fields: BTreeMap<Cow<'static, str>, Option<AttrValue>>,
}

impl Entry {
    /// Creates an entry of the given kind with no fields.
    pub fn new(kind: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind: kind.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Sets a populated field.
    pub fn with(mut self, field: impl Into<Cow<'static, str>>, value: impl Into<AttrValue>) -> Self {
        self.fields.insert(field.into(), Some(value.into()));
        self
    }

    /// Declares a field without a value.
    ///
    /// In a template this is a wildcard. Declaring it is equivalent to not
    /// mentioning the field at all, but keeps the entry's shape explicit.
    pub fn wildcard(mut self, field: impl Into<Cow<'static, str>>) -> Self {
        self.fields.insert(field.into(), None);
        self
    }

    /// Sets a field to `Some(value)` or leaves it as a wildcard for `None`.
    pub fn with_opt<V: Into<AttrValue>>(
        mut self,
        field: impl Into<Cow<'static, str>>,
        value: Option<V>,
    ) -> Self {
        self.fields.insert(field.into(), value.map(Into::into));
        self
    }

    /// Returns the entry kind.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Returns the value of a field, or `None` when unset or absent.
    pub fn get(&self, field: &str) -> Option<&AttrValue> {
        self.fields.get(field).and_then(Option::as_ref)
    }

    /// Iterates over populated fields.
    pub fn populated(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.fields
            .iter()
            .filter_map(|(k, v)| v.as_ref().map(|v| (k.as_ref(), v)))
    }

    /// Returns `true` when `self`, used as a template entry, matches `item`.
    ///
    /// The kinds must be the same and every populated field of `self` must
    /// be present in `item` with an equal value.
    pub fn matches(&self, item: &Entry) -> bool {
        self.kind == item.kind
            && self
                .populated()
                .all(|(field, value)| item.get(field) == Some(value))
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.kind)?;
        let mut first = true;
        for (field, value) in &self.fields {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            match value {
                Some(v) => write!(f, "{field}={v}")?,
                None => write!(f, "{field}=*")?,
            }
        }
        f.write_str(")")
    }
}

// =============================================================================
// Standard entries
// =============================================================================

/// Kind string of [`Name`] entries.
pub const NAME_ENTRY: &str = "Name";
/// Kind string of [`ServiceInfo`] entries.
pub const SERVICE_INFO_ENTRY: &str = "ServiceInfo";
/// Kind string of [`Comment`] entries.
pub const COMMENT_ENTRY: &str = "Comment";

/// Human-readable service name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Name {
    pub name: Option<String>,
}

impl Name {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
        }
    }
}

impl From<Name> for Entry {
    fn from(value: Name) -> Self {
        Entry::new(NAME_ENTRY).with_opt("name", value.name)
    }
}

/// Free-form comment attached to a service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Comment {
    pub comment: Option<String>,
}

impl From<Comment> for Entry {
    fn from(value: Comment) -> Self {
        Entry::new(COMMENT_ENTRY).with_opt("comment", value.comment)
    }
}

/// Product information about a service.
///
/// Unset fields become wildcards when used in a template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceInfo {
    pub name: Option<String>,
    pub manufacturer: Option<String>,
    pub vendor: Option<String>,
    pub version: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
}

impl From<ServiceInfo> for Entry {
    fn from(value: ServiceInfo) -> Self {
        Entry::new(SERVICE_INFO_ENTRY)
            .with_opt("name", value.name)
            .with_opt("manufacturer", value.manufacturer)
            .with_opt("vendor", value.vendor)
            .with_opt("version", value.version)
            .with_opt("model", value.model)
            .with_opt("serial_number", value.serial_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_fields_are_wildcards() {
        let item: Entry = ServiceInfo {
            name: Some("muc".into()),
            vendor: Some("acme".into()),
            version: Some("1.2".into()),
            ..Default::default()
        }
        .into();

        let by_vendor: Entry = ServiceInfo {
            vendor: Some("acme".into()),
            ..Default::default()
        }
        .into();
        assert!(by_vendor.matches(&item));

        let wrong_version: Entry = ServiceInfo {
            version: Some("2.0".into()),
            ..Default::default()
        }
        .into();
        assert!(!wrong_version.matches(&item));
    }

    #[test]
    fn test_kind_must_agree() {
        let item: Entry = Name::new("muc").into();
        let other = Entry::new(COMMENT_ENTRY);
        assert!(!other.matches(&item));
        assert!(Entry::new(NAME_ENTRY).matches(&item));
    }

    #[test]
    fn test_populated_field_missing_on_item() {
        let item = Entry::new("Location").with("room", "101");
        let query = Entry::new("Location").with("floor", 1);
        assert!(!query.matches(&item));
    }

    #[test]
    fn test_field_order_does_not_matter() {
        let a = Entry::new("K").with("a", 1).with("b", true);
        let b = Entry::new("K").with("b", true).with("a", 1);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "K(a=1, b=true)");
    }
}
