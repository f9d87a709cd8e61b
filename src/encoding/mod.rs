//! Byte input decoding.
//!
//! BOM sniffing and XML declaration inspection per XML 1.0 §4.3.3 and
//! Appendix F, with `encoding_rs` doing the actual transcoding.
//!
//! 1. A byte order mark, when present, decides the encoding.
//! 2. Otherwise the `encoding="..."` pseudo-attribute of the XML
//!    declaration decides it, unless the caller asked to ignore it.
//! 3. Otherwise the input must be UTF-8.

use encoding_rs::Encoding;
use thiserror::Error;

/// Failure to turn input bytes into text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    #[error("unsupported encoding: {0}")]
    Unsupported(String),
    #[error("malformed byte sequence for encoding {0}")]
    Malformed(String),
}

/// Detects a byte order mark, returning the encoding and BOM length.
///
/// ```
/// use oxidom::encoding::detect_bom;
///
/// assert_eq!(detect_bom(b"\xEF\xBB\xBF<a/>").map(|(e, n)| (e.name(), n)), Some(("UTF-8", 3)));
/// assert!(detect_bom(b"<a/>").is_none());
/// ```
#[must_use]
pub fn detect_bom(bytes: &[u8]) -> Option<(&'static Encoding, usize)> {
    Encoding::for_bom(bytes)
}

/// Reads the `encoding` pseudo-attribute of an XML declaration from the
/// ASCII-compatible prefix of the input.
fn declared_encoding(bytes: &[u8]) -> Option<String> {
    let head = &bytes[..bytes.len().min(256)];
    if !head.starts_with(b"<?xml") {
        return None;
    }
    let end = head.windows(2).position(|w| w == b"?>")?;
    let decl = std::str::from_utf8(&head[..end]).ok()?;
    let after = &decl[decl.find("encoding")? + "encoding".len()..];
    let after = after.trim_start().strip_prefix('=')?.trim_start();
    let quote = after.chars().next().filter(|&q| q == '"' || q == '\'')?;
    let value = &after[1..];
    Some(value[..value.find(quote)?].to_string())
}

/// Decodes raw XML bytes into a UTF-8 string.
///
/// When `honor_declaration` is false the XML declaration's encoding is
/// ignored and BOM-less input is read as UTF-8.
///
/// # Errors
///
/// Returns `EncodingError` if the encoding is unknown or the bytes are
/// malformed for it.
///
/// ```
/// use oxidom::encoding::decode_to_utf8;
///
/// let text = decode_to_utf8(b"<?xml version=\"1.0\"?><root/>", true).unwrap();
/// assert!(text.ends_with("<root/>"));
/// ```
pub fn decode_to_utf8(bytes: &[u8], honor_declaration: bool) -> Result<String, EncodingError> {
    if let Some((encoding, skip)) = detect_bom(bytes) {
        return transcode(&bytes[skip..], encoding);
    }
    if honor_declaration {
        if let Some(label) = declared_encoding(bytes) {
            let encoding = Encoding::for_label(label.as_bytes())
                .ok_or_else(|| EncodingError::Unsupported(label.clone()))?;
            return transcode(bytes, encoding);
        }
    }
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|_| EncodingError::Malformed("UTF-8".to_string()))
}

fn transcode(bytes: &[u8], encoding: &'static Encoding) -> Result<String, EncodingError> {
    let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
    if had_errors {
        return Err(EncodingError::Malformed(encoding.name().to_string()));
    }
    Ok(text.into_owned())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_utf8_passthrough() {
        assert_eq!(decode_to_utf8(b"<a>x</a>", true).unwrap(), "<a>x</a>");
    }

    #[test]
    fn test_utf16le_bom() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "<a/>".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(decode_to_utf8(&bytes, true).unwrap(), "<a/>");
    }

    #[test]
    fn test_declared_latin1() {
        let bytes = b"<?xml version='1.0' encoding='ISO-8859-1'?><a>\xe9</a>";
        let text = decode_to_utf8(bytes, true).unwrap();
        assert!(text.ends_with("<a>\u{e9}</a>"));
    }

    #[test]
    fn test_ignored_declaration_requires_utf8() {
        let bytes = b"<?xml version='1.0' encoding='ISO-8859-1'?><a>\xe9</a>";
        assert_eq!(
            decode_to_utf8(bytes, false),
            Err(EncodingError::Malformed("UTF-8".to_string()))
        );
    }

    #[test]
    fn test_unknown_label() {
        let bytes = b"<?xml version=\"1.0\" encoding=\"x-nope\"?><a/>";
        assert_eq!(
            decode_to_utf8(bytes, true),
            Err(EncodingError::Unsupported("x-nope".to_string()))
        );
    }

    #[test]
    fn test_declared_encoding_parse() {
        assert_eq!(
            declared_encoding(b"<?xml version=\"1.0\" encoding = \"UTF-8\"?>"),
            Some("UTF-8".to_string())
        );
        assert_eq!(declared_encoding(b"<root/>"), None);
    }
}
