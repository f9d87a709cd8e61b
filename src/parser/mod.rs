//! XML 1.0 parser.
//!
//! A hand-rolled recursive descent parser that builds a [`RawDocument`].
//! Behaviour is controlled by [`ParseOptions`], a bit-set whose values
//! match libxml2's `xmlParserOption` so that option words can be passed
//! through unchanged.

pub(crate) mod input;
mod xml;

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use crate::encoding::decode_to_utf8;
use crate::error::ParseError;
use crate::tree::RawDocument;

/// A set of parser behaviour flags, composed with `|`.
///
/// ```
/// use oxidom::ParseOptions;
///
/// let opts = ParseOptions::RECOVER | ParseOptions::NO_BLANKS;
/// assert!(opts.contains(ParseOptions::NO_BLANKS));
/// assert!(!opts.contains(ParseOptions::NO_ENT));
/// assert_eq!(opts.bits(), 1 | 256);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ParseOptions(u32);

impl ParseOptions {
    /// Recover on errors and keep the partial tree.
    pub const RECOVER: Self = Self(1 << 0);
    /// Substitute entities.
    pub const NO_ENT: Self = Self(1 << 1);
    /// Load the external subset.
    pub const DTD_LOAD: Self = Self(1 << 2);
    /// Default DTD attributes.
    pub const DTD_ATTR: Self = Self(1 << 3);
    /// Validate with the DTD.
    pub const DTD_VALID: Self = Self(1 << 4);
    /// Suppress error reports.
    pub const NO_ERROR: Self = Self(1 << 5);
    /// Suppress warning reports.
    pub const NO_WARNING: Self = Self(1 << 6);
    /// Pedantic error reporting.
    pub const PEDANTIC: Self = Self(1 << 7);
    /// Remove blank nodes.
    pub const NO_BLANKS: Self = Self(1 << 8);
    /// Use the SAX1 interface.
    pub const SAX1: Self = Self(1 << 9);
    /// Implement XInclude substitution.
    pub const XINCLUDE: Self = Self(1 << 10);
    /// Forbid network access.
    pub const NO_NET: Self = Self(1 << 11);
    /// Do not reuse the context dictionary.
    pub const NO_DICT: Self = Self(1 << 12);
    /// Remove redundant namespace declarations.
    pub const NS_CLEAN: Self = Self(1 << 13);
    /// Merge CDATA as text nodes.
    pub const NO_CDATA: Self = Self(1 << 14);
    /// Do not generate XInclude start/end nodes.
    pub const NO_XINC_NODE: Self = Self(1 << 15);
    /// Compact small text nodes; the tree becomes read-only.
    pub const COMPACT: Self = Self(1 << 16);
    /// Parse using XML-1.0 before update 5.
    pub const OLD10: Self = Self(1 << 17);
    /// Do not fix up XInclude `xml:base` URIs.
    pub const NO_BASE_FIX: Self = Self(1 << 18);
    /// Relax hardcoded limits.
    pub const HUGE: Self = Self(1 << 19);
    /// Parse using the SAX2 interface before 2.7.0.
    pub const OLD_SAX: Self = Self(1 << 20);
    /// Ignore the internal document encoding hint.
    pub const IGNORE_ENC: Self = Self(1 << 21);
    /// Store big line numbers.
    pub const BIG_LINES: Self = Self(1 << 22);

    const NAMES: [(Self, &'static str); 23] = [
        (Self::RECOVER, "RECOVER"),
        (Self::NO_ENT, "NO_ENT"),
        (Self::DTD_LOAD, "DTD_LOAD"),
        (Self::DTD_ATTR, "DTD_ATTR"),
        (Self::DTD_VALID, "DTD_VALID"),
        (Self::NO_ERROR, "NO_ERROR"),
        (Self::NO_WARNING, "NO_WARNING"),
        (Self::PEDANTIC, "PEDANTIC"),
        (Self::NO_BLANKS, "NO_BLANKS"),
        (Self::SAX1, "SAX1"),
        (Self::XINCLUDE, "XINCLUDE"),
        (Self::NO_NET, "NO_NET"),
        (Self::NO_DICT, "NO_DICT"),
        (Self::NS_CLEAN, "NS_CLEAN"),
        (Self::NO_CDATA, "NO_CDATA"),
        (Self::NO_XINC_NODE, "NO_XINC_NODE"),
        (Self::COMPACT, "COMPACT"),
        (Self::OLD10, "OLD10"),
        (Self::NO_BASE_FIX, "NO_BASE_FIX"),
        (Self::HUGE, "HUGE"),
        (Self::OLD_SAX, "OLD_SAX"),
        (Self::IGNORE_ENC, "IGNORE_ENC"),
        (Self::BIG_LINES, "BIG_LINES"),
    ];

    /// No flags set.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Builds a set from raw bits, dropping bits that name no flag.
    #[must_use]
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & ((1 << 23) - 1))
    }

    /// The raw option word.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns `true` if every flag in `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if no flag is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Sets the flags in `other`.
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Clears the flags in `other`.
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// Sets or clears the flags in `other`.
    pub fn set(&mut self, other: Self, value: bool) {
        if value {
            self.insert(other);
        } else {
            self.remove(other);
        }
    }

    /// Iterates over the names of the set flags, lowest bit first.
    pub fn iter_names(self) -> impl Iterator<Item = &'static str> {
        Self::NAMES
            .into_iter()
            .filter(move |(flag, _)| self.contains(*flag))
            .map(|(_, name)| name)
    }
}

impl BitOr for ParseOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ParseOptions {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for ParseOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("ParseOptions(empty)");
        }
        f.write_str("ParseOptions(")?;
        for (i, name) in self.iter_names().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            f.write_str(name)?;
        }
        f.write_str(")")
    }
}

/// Parses an XML string with default options.
///
/// # Errors
///
/// Returns `ParseError` if the input is not well-formed XML.
pub fn parse_str(input: &str) -> Result<RawDocument, ParseError> {
    parse_str_with_options(input, ParseOptions::default())
}

/// Parses an XML string with the given options.
///
/// # Errors
///
/// Returns `ParseError` if the input is not well-formed XML and
/// [`ParseOptions::RECOVER`] is not set.
pub fn parse_str_with_options(input: &str, options: ParseOptions) -> Result<RawDocument, ParseError> {
    let input = input.strip_prefix('\u{FEFF}').unwrap_or(input);
    xml::XmlParser::new(input, options).parse()
}

/// Parses raw bytes, detecting the encoding from the BOM and the XML
/// declaration. With [`ParseOptions::IGNORE_ENC`] the declaration is
/// ignored and the input is read as UTF-8 unless a BOM says otherwise.
///
/// # Errors
///
/// Returns `ParseError` if the bytes cannot be decoded or the document is
/// not well-formed.
pub fn parse_bytes_with_options(input: &[u8], options: ParseOptions) -> Result<RawDocument, ParseError> {
    let text = decode_to_utf8(input, !options.contains(ParseOptions::IGNORE_ENC))
        .map_err(|e| ParseError::bare(e.to_string()))?;
    parse_str_with_options(&text, options)
}
