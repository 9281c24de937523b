use std::collections::BTreeMap;
use std::fmt::{self, Debug, Display, Formatter};
use std::hash::Hash;

use serde::Serialize;

/// A single attribute value carried by an entity.
///
/// Absent attributes are always reported as [`Value::Unset`] so that a field
/// the other side does not know about still takes part in the comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// Explicitly absent.
    Unset,
    /// Free-form text.
    Text(String),
    /// Boolean flag.
    Bool(bool),
    /// Ordered list of strings, such as tags.
    List(Vec<String>),
}

impl Value {
    /// Return the text payload, if any.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Return the boolean payload, if any.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(flag) => Some(*flag),
            _ => None,
        }
    }

    /// Return the list payload, if any.
    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Convert a text or unset value back into an optional string.
    pub fn to_option_string(&self) -> Option<String> {
        self.as_text().map(ToString::to_string)
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Value::Unset)
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unset => write!(f, "<unset>"),
            Value::Text(text) => write!(f, "{text:?}"),
            Value::Bool(flag) => write!(f, "{flag}"),
            Value::List(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Option<String>> for Value {
    fn from(value: Option<String>) -> Self {
        value.map_or(Value::Unset, Value::Text)
    }
}

impl From<Option<&str>> for Value {
    fn from(value: Option<&str>) -> Self {
        value.map_or(Value::Unset, Value::from)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<Vec<String>> for Value {
    fn from(value: Vec<String>) -> Self {
        Value::List(value)
    }
}

/// Named attribute values of one entity, keyed by attribute name.
pub type Attributes = BTreeMap<&'static str, Value>;

/// Composite identity key of an entity.
///
/// Renders as its parts joined with `__`, for example `1/1__lb01`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Identity(Vec<String>);

impl Identity {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    /// Key fields in declaration order.
    pub fn parts(&self) -> &[String] {
        &self.0
    }
}

impl Display for Identity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("__"))
    }
}

/// Marker for entity kind discriminants.
pub trait Kind: Copy + Eq + Ord + Hash + Debug + Display + Serialize + 'static {}

impl<T> Kind for T where T: Copy + Eq + Ord + Hash + Debug + Display + Serialize + 'static {}

/// A typed record that can live in a [`crate::Graph`].
///
/// Implementors declare the kind order used for creation
/// ([`Entity::TOP_LEVEL`]) and the child-before-parent order used to flush
/// deferred deletions ([`Entity::DELETE_ORDER`]).
pub trait Entity: Clone + Debug {
    type Kind: Kind;

    /// Kinds diffed as root groupings, parents before children.
    const TOP_LEVEL: &'static [Self::Kind];
    /// Kinds in the order deferred deletions are flushed.
    const DELETE_ORDER: &'static [Self::Kind];

    fn kind(&self) -> Self::Kind;

    /// Immutable key fields.
    fn identity(&self) -> Identity;

    /// Mutable, diffed fields.
    fn attributes(&self) -> Attributes;

    /// Overwrite the named attributes in place. Unknown names are ignored.
    fn set_attributes(&mut self, changes: &Attributes);
}
