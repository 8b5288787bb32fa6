use core::fmt;
use core::hash::{Hash, Hasher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Document,
    Element,
    Attribute,
    Text,
    Comment,
    ProcessingInstruction,
    Namespace,
}

/// Qualified name: an optional prefix plus a local name.
///
/// Equality and hashing only look at `(prefix, local_name)`. The namespace URI is
/// an optional attachment, filled in by the `QName` constructor function and by
/// document adapters that know the binding of the prefix.
#[derive(Debug, Clone, Eq)]
pub struct QName {
    pub prefix: Option<String>,
    pub local_name: String,
    pub namespace: Option<String>,
}

impl QName {
    pub fn new(prefix: Option<&str>, local_name: impl Into<String>) -> Self {
        Self { prefix: prefix.map(str::to_string), local_name: local_name.into(), namespace: None }
    }

    pub fn local(local_name: impl Into<String>) -> Self {
        Self::new(None, local_name)
    }

    pub fn prefixed(prefix: &str, local_name: impl Into<String>) -> Self {
        Self::new(Some(prefix), local_name)
    }

    /// Split `prefix:local` on the first colon; text without a colon is a bare local name.
    pub fn parse(text: &str) -> Self {
        match text.split_once(':') {
            Some((prefix, local)) => Self::prefixed(prefix, local),
            None => Self::local(text),
        }
    }

    #[must_use]
    pub fn with_namespace(mut self, uri: impl Into<String>) -> Self {
        self.namespace = Some(uri.into());
        self
    }

    /// The same local name under `prefix` when this name carries none.
    pub(crate) fn or_prefix(&self, prefix: &str) -> Self {
        match self.prefix {
            Some(_) => self.clone(),
            None => Self::prefixed(prefix, self.local_name.clone()),
        }
    }
}

impl PartialEq for QName {
    fn eq(&self, other: &Self) -> bool {
        self.prefix == other.prefix && self.local_name == other.local_name
    }
}

impl Hash for QName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.prefix.hash(state);
        self.local_name.hash(state);
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(prefix) => write!(f, "{prefix}:{}", self.local_name),
            None => f.write_str(&self.local_name),
        }
    }
}

impl From<&str> for QName {
    fn from(text: &str) -> Self {
        Self::parse(text)
    }
}

impl From<String> for QName {
    fn from(text: String) -> Self {
        Self::parse(&text)
    }
}
