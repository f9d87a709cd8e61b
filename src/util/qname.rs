//! XML names and `QName`s.
//!
//! Character classes follow XML 1.0 (Fifth Edition) §2.3; the `QName` shape
//! follows Namespaces in XML 1.0 §4. Both the parser and the DOM setters
//! (`set_node_name`, `set_attribute`, `create_element`) go through here so
//! that a name accepted by one is accepted by the other.

/// The namespace URI bound to the reserved `xml` prefix.
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// The namespace URI of `xmlns` declarations themselves.
pub const XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";

/// Splits a `QName` into its prefix and local name parts.
///
/// ```
/// use oxidom::util::qname::split_qname;
///
/// assert_eq!(split_qname("svg:rect"), (Some("svg"), "rect"));
/// assert_eq!(split_qname("div"), (None, "div"));
/// ```
#[must_use]
pub fn split_qname(qname: &str) -> (Option<&str>, &str) {
    match qname.find(':') {
        Some(pos) => (Some(&qname[..pos]), &qname[pos + 1..]),
        None => (None, qname),
    }
}

/// Joins an optional prefix and a local name.
#[must_use]
pub fn join_qname(prefix: Option<&str>, local: &str) -> String {
    match prefix {
        Some(p) if !p.is_empty() => format!("{p}:{local}"),
        _ => local.to_string(),
    }
}

/// `NameStartChar`, XML 1.0 §2.3 `[4]`.
#[must_use]
pub fn is_name_start_char(c: char) -> bool {
    matches!(c,
        ':' | 'A'..='Z' | '_' | 'a'..='z' |
        '\u{C0}'..='\u{D6}' | '\u{D8}'..='\u{F6}' | '\u{F8}'..='\u{2FF}' |
        '\u{370}'..='\u{37D}' | '\u{37F}'..='\u{1FFF}' |
        '\u{200C}'..='\u{200D}' | '\u{2070}'..='\u{218F}' |
        '\u{2C00}'..='\u{2FEF}' | '\u{3001}'..='\u{D7FF}' |
        '\u{F900}'..='\u{FDCF}' | '\u{FDF0}'..='\u{FFFD}' |
        '\u{10000}'..='\u{EFFFF}'
    )
}

/// `NameChar`, XML 1.0 §2.3 `[4a]`.
#[must_use]
pub fn is_name_char(c: char) -> bool {
    is_name_start_char(c)
        || matches!(c,
            '-' | '.' | '0'..='9' | '\u{B7}' |
            '\u{300}'..='\u{36F}' | '\u{203F}'..='\u{2040}'
        )
}

/// Returns `true` if `s` matches the `Name` production.
#[must_use]
pub fn is_valid_name(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next().is_some_and(is_name_start_char) && chars.all(is_name_char)
}

/// Returns `true` if `s` is a `Name` without colons.
#[must_use]
pub fn is_valid_ncname(s: &str) -> bool {
    !s.contains(':') && is_valid_name(s)
}

/// Checks that `name` is a well-formed `QName` and splits it.
///
/// # Errors
///
/// Returns a static description of the first rule the name breaks.
pub fn validate_qname(name: &str) -> Result<(Option<&str>, &str), &'static str> {
    if name.is_empty() {
        return Err("name is empty");
    }
    let (prefix, local) = split_qname(name);
    if local.contains(':') {
        return Err("QName contains multiple colons");
    }
    if let Some(p) = prefix {
        if !is_valid_ncname(p) {
            return Err("QName has an invalid prefix");
        }
    }
    if !is_valid_ncname(local) {
        return Err("QName has an invalid local part");
    }
    Ok((prefix, local))
}
