//! Well-known prefixes and namespace URIs.

/// Prefix applied to unprefixed function calls unless the dynamic context overrides it.
pub const FN_PREFIX: &str = "fn";

/// Prefix under which the constructor functions are additionally registered.
pub const XS_PREFIX: &str = "xs";

pub const XML_PREFIX: &str = "xml";
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";
