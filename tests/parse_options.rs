//! Parser flags as seen through `Document`.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use pretty_assertions::assert_eq;

use oxidom::dom::{Document, DomNode};
use oxidom::{DomError, NodeType, ParseOptions};

#[test]
fn test_options_are_carried_on_the_document() {
    let opts = ParseOptions::NO_NET | ParseOptions::DTD_LOAD | ParseOptions::BIG_LINES;
    let doc = Document::parse_str_with_options("<a/>", opts).unwrap();
    assert_eq!(doc.parse_options(), opts);
    assert!(!doc.is_read_only());
    assert_eq!(Document::new().parse_options(), ParseOptions::empty());
}

#[test]
fn test_malformed_input_without_recover() {
    let err = Document::parse_str("<a><b></a>").unwrap_err();
    assert!(matches!(err, DomError::Parse(_)));
}

#[test]
fn test_recover_keeps_partial_tree() {
    let doc = Document::parse_str_with_options("<a><b>text</a>", ParseOptions::RECOVER).unwrap();
    assert_eq!(doc.document_element().unwrap().node_name().unwrap(), "a");
    assert!(!doc.diagnostics().unwrap().is_empty());

    let quiet = Document::parse_str_with_options(
        "<a><b>text</a>",
        ParseOptions::RECOVER | ParseOptions::NO_ERROR,
    )
    .unwrap();
    assert!(quiet.diagnostics().unwrap().is_empty());
}

#[test]
fn test_entity_substitution() {
    let input = "<!DOCTYPE r [<!ENTITY co 'Acme'>]><r>&co;</r>";
    let kept = Document::parse_str(input).unwrap();
    let r = kept.document_element().unwrap();
    assert_eq!(r.first_child().unwrap().node_type(), NodeType::EntityRef);
    assert_eq!(r.to_xml().unwrap(), "<r>&co;</r>");

    let substituted = Document::parse_str_with_options(input, ParseOptions::NO_ENT).unwrap();
    let r = substituted.document_element().unwrap();
    assert_eq!(r.first_child().unwrap().node_type(), NodeType::Text);
    assert_eq!(r.to_xml().unwrap(), "<r>Acme</r>");
}

#[test]
fn test_no_blanks_and_no_cdata() {
    let input = "<r>\n  <a/>\n  <b><![CDATA[x]]></b>\n</r>";
    let doc = Document::parse_str_with_options(input, ParseOptions::NO_BLANKS | ParseOptions::NO_CDATA)
        .unwrap();
    let r = doc.document_element().unwrap();
    assert_eq!(r.to_xml().unwrap(), "<r><a/><b>x</b></r>");
}

#[test]
fn test_dtd_attr_defaults() {
    let input = "<!DOCTYPE r [<!ATTLIST r k CDATA 'dflt'>]><r/>";
    let plain = Document::parse_str(input).unwrap();
    assert!(!plain.document_element().unwrap().has_attribute("k").unwrap());
    let defaulted = Document::parse_str_with_options(input, ParseOptions::DTD_ATTR).unwrap();
    assert_eq!(
        defaulted.document_element().unwrap().get_attribute("k").unwrap().as_deref(),
        Some("dflt")
    );
}

#[test]
fn test_compact_documents_are_read_only() {
    let doc = Document::parse_str_with_options("<a>t</a>", ParseOptions::COMPACT).unwrap();
    assert!(doc.is_read_only());
    let a = doc.document_element().unwrap();
    assert_eq!(a.text_content().unwrap(), "t");
    assert!(matches!(a.set_attribute("k", "v"), Err(DomError::InvalidArgument(_))));
    assert!(matches!(a.set_node_value("u"), Err(DomError::InvalidArgument(_))));
    assert!(matches!(doc.create_element("x"), Err(DomError::InvalidArgument(_))));
    assert_eq!(doc.find_value("/a").unwrap(), "t");
}

#[test]
fn test_huge_lifts_depth_limit() {
    let deep = format!("{}{}", "<d>".repeat(300), "</d>".repeat(300));
    assert!(Document::parse_str(&deep).is_err());
    let doc = Document::parse_str_with_options(&deep, ParseOptions::HUGE).unwrap();
    assert_eq!(doc.find_value("count(//d)").unwrap(), "300");
}

#[test]
fn test_bytes_with_declared_encoding() {
    let bytes = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><a>caf\xe9</a>";
    let doc = Document::parse_bytes(bytes).unwrap();
    assert_eq!(doc.document_element().unwrap().text_content().unwrap(), "caf\u{e9}");
    assert_eq!(doc.encoding().unwrap().as_deref(), Some("ISO-8859-1"));
}
