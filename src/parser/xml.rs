//! Core XML 1.0 parser state machine.
//!
//! Recursive descent over a [`ParserInput`] cursor that builds a
//! [`RawDocument`] directly. The internal DTD subset is parsed into a `Dtd`
//! node whose children are the declarations; entity and attribute-list
//! declarations also feed entity expansion and default attributes.

use std::collections::{HashMap, HashSet};

use crate::error::{ErrorSeverity, ParseError};
use crate::tree::{NodeId, NodeKind, RawDocument};
use crate::util::qname::{split_qname, XMLNS_NAMESPACE, XML_NAMESPACE};

use super::input::{is_xml_char, Limits, NamespaceResolver, ParserInput, MAX_ENTITY_NESTING};
use super::ParseOptions;

/// Declarations collected from the internal subset.
#[derive(Default)]
struct DtdState {
    /// General entities. `None` marks an external entity with no
    /// replacement text available.
    entities: HashMap<String, Option<String>>,
    /// Declared attribute defaults per element name.
    attr_defaults: HashMap<String, Vec<(String, String)>>,
    /// `(element, attribute)` pairs declared with type `ID`.
    id_attrs: HashSet<(String, String)>,
    /// An external subset or parameter entity reference was seen, so
    /// undeclared entities are not well-formedness errors.
    incomplete: bool,
    /// Entities currently being expanded, innermost last.
    expanding: Vec<String>,
}

/// An attribute as written in a start tag, before namespace processing.
struct RawAttribute {
    qname: String,
    value: String,
}

pub(crate) struct XmlParser<'a> {
    input: ParserInput<'a>,
    doc: RawDocument,
    options: ParseOptions,
    ns: NamespaceResolver,
    dtd: DtdState,
}

impl<'a> XmlParser<'a> {
    pub fn new(input: &'a str, options: ParseOptions) -> Self {
        let limits = if options.contains(ParseOptions::HUGE) {
            Limits::huge()
        } else {
            Limits::standard()
        };
        Self {
            input: ParserInput::new(input, limits, options.contains(ParseOptions::RECOVER)),
            doc: RawDocument::default(),
            options,
            ns: NamespaceResolver::new(),
            dtd: DtdState::default(),
        }
    }

    /// Parses the entire document.
    pub fn parse(mut self) -> Result<RawDocument, ParseError> {
        if let Err(err) = self.parse_document() {
            if !self.input.recover() {
                return Err(err);
            }
            self.input
                .push_diagnostic(ErrorSeverity::Fatal, err.message.clone());
        }
        self.finish_diagnostics();
        Ok(self.doc)
    }

    fn parse_document(&mut self) -> Result<(), ParseError> {
        if self.looking_at_xml_decl() {
            self.parse_xml_declaration()?;
        } else if self.options.contains(ParseOptions::PEDANTIC) {
            self.input
                .push_diagnostic(ErrorSeverity::Warning, "missing XML declaration".to_string());
        }

        let root = self.doc.root();
        self.parse_misc(root)?;
        if self.input.looking_at("<!DOCTYPE") {
            self.parse_doctype()?;
            self.parse_misc(root)?;
        }

        if self.input.peek() == Some(b'<') {
            self.parse_element(root)?;
        } else {
            return Err(self.input.fatal("start tag expected, '<' not found"));
        }

        self.parse_misc(root)?;
        if !self.input.at_end() {
            return Err(self.input.fatal("extra content at the end of the document"));
        }
        Ok(())
    }

    /// Applies NoError/NoWarning filtering and logs what is kept.
    fn finish_diagnostics(&mut self) {
        let quiet_errors = self.options.contains(ParseOptions::NO_ERROR);
        let quiet_warnings = self.options.contains(ParseOptions::NO_WARNING);
        let mut diagnostics = std::mem::take(&mut self.input.diagnostics);
        diagnostics.retain(|d| match d.severity {
            ErrorSeverity::Warning => !quiet_warnings,
            ErrorSeverity::Error | ErrorSeverity::Fatal => !quiet_errors,
        });
        for d in &diagnostics {
            tracing::warn!(
                severity = %d.severity,
                line = d.location.line,
                column = d.location.column,
                "{}",
                d.message
            );
        }
        self.doc.diagnostics = diagnostics;
    }

    // --- XML declaration ---

    fn looking_at_xml_decl(&self) -> bool {
        self.input.looking_at("<?xml")
            && self
                .input
                .peek_at(5)
                .is_some_and(|b| matches!(b, b' ' | b'\t' | b'\n' | b'\r'))
    }

    fn parse_xml_declaration(&mut self) -> Result<(), ParseError> {
        self.input.expect_str("<?xml")?;
        let mut seen_version = false;
        loop {
            let had_ws = self.input.skip_whitespace();
            if self.input.looking_at("?>") {
                self.input.advance(2);
                break;
            }
            if !had_ws {
                return Err(self.input.fatal("whitespace required in XML declaration"));
            }
            let name = self.input.parse_name()?;
            self.input.skip_whitespace();
            self.input.expect_str("=")?;
            self.input.skip_whitespace();
            let value = self.input.parse_quoted()?;
            match name.as_str() {
                "version" => {
                    seen_version = true;
                    self.doc.version = Some(value);
                }
                "encoding" => self.doc.encoding = Some(value),
                "standalone" => {
                    self.doc.standalone = match value.as_str() {
                        "yes" => Some(true),
                        "no" => Some(false),
                        _ => return Err(self.input.fatal("standalone accepts only 'yes' or 'no'")),
                    };
                }
                _ => return Err(self.input.fatal(format!("unexpected '{name}' in XML declaration"))),
            }
        }
        if !seen_version {
            self.input
                .error_or_recover("XML declaration is missing the version".to_string())?;
        }
        Ok(())
    }

    // --- Misc ---

    fn parse_misc(&mut self, parent: NodeId) -> Result<(), ParseError> {
        loop {
            self.input.skip_whitespace();
            if self.input.looking_at("<!--") {
                self.parse_comment(parent)?;
            } else if self.input.looking_at("<?") {
                self.parse_processing_instruction(parent)?;
            } else {
                return Ok(());
            }
        }
    }

    fn parse_comment(&mut self, parent: NodeId) -> Result<(), ParseError> {
        self.input.expect_str("<!--")?;
        let content = self.input.take_until("-->", "comment")?;
        if content.contains("--") || content.ends_with('-') {
            self.input
                .error_or_recover("'--' is not allowed inside a comment".to_string())?;
        }
        let id = self.doc.create_node(NodeKind::Comment { content });
        self.doc.link_last(parent, id);
        Ok(())
    }

    fn parse_processing_instruction(&mut self, parent: NodeId) -> Result<(), ParseError> {
        self.input.expect_str("<?")?;
        let target = self.input.parse_name()?;
        if target.eq_ignore_ascii_case("xml") {
            return Err(self.input.fatal("XML declaration allowed only at the start of the document"));
        }
        let data = if self.input.skip_whitespace() {
            self.input.take_until("?>", "processing instruction")?
        } else {
            self.input.expect_str("?>")?;
            String::new()
        };
        let id = self.doc.create_node(NodeKind::ProcessingInstruction {
            target,
            data: (!data.is_empty()).then_some(data),
        });
        self.doc.link_last(parent, id);
        Ok(())
    }

    // --- Document type declaration ---

    fn parse_external_id(&mut self) -> Result<(Option<String>, Option<String>), ParseError> {
        if self.input.looking_at("SYSTEM") {
            self.input.advance(6);
            self.input.skip_whitespace_required()?;
            return Ok((None, Some(self.input.parse_quoted()?)));
        }
        if self.input.looking_at("PUBLIC") {
            self.input.advance(6);
            self.input.skip_whitespace_required()?;
            let public_id = self.input.parse_quoted()?;
            self.input.skip_whitespace();
            let system_id = if matches!(self.input.peek(), Some(b'"' | b'\'')) {
                Some(self.input.parse_quoted()?)
            } else {
                None
            };
            return Ok((Some(public_id), system_id));
        }
        Ok((None, None))
    }

    fn parse_doctype(&mut self) -> Result<(), ParseError> {
        self.input.expect_str("<!DOCTYPE")?;
        self.input.skip_whitespace_required()?;
        let name = self.input.parse_name()?;
        self.input.skip_whitespace();
        let (public_id, system_id) = self.parse_external_id()?;
        if system_id.is_some() {
            self.dtd.incomplete = true;
        }
        let dtd = self.doc.create_node(NodeKind::Dtd {
            name,
            public_id,
            system_id,
        });
        let root = self.doc.root();
        self.doc.link_last(root, dtd);

        self.input.skip_whitespace();
        if self.input.peek() == Some(b'[') {
            self.input.advance(1);
            self.parse_internal_subset(dtd)?;
            self.input.skip_whitespace();
        }
        self.input.expect_str(">")
    }

    fn parse_internal_subset(&mut self, dtd: NodeId) -> Result<(), ParseError> {
        loop {
            self.input.skip_whitespace();
            if self.input.peek() == Some(b']') {
                self.input.advance(1);
                return Ok(());
            }
            if self.input.at_end() {
                return Err(self.input.fatal("unterminated internal subset"));
            }
            if self.input.looking_at("<!--") {
                self.input.advance(4);
                self.input.take_until("-->", "comment")?;
            } else if self.input.looking_at("<?") {
                self.input.advance(2);
                self.input.take_until("?>", "processing instruction")?;
            } else if self.input.peek() == Some(b'%') {
                self.input.advance(1);
                self.input.parse_name()?;
                self.input.expect_str(";")?;
                self.dtd.incomplete = true;
            } else if self.input.looking_at("<!ELEMENT") {
                self.parse_element_decl(dtd)?;
            } else if self.input.looking_at("<!ATTLIST") {
                self.parse_attlist_decl(dtd)?;
            } else if self.input.looking_at("<!ENTITY") {
                self.parse_entity_decl(dtd)?;
            } else if self.input.looking_at("<!NOTATION") {
                self.parse_notation_decl(dtd)?;
            } else {
                return Err(self.input.fatal("malformed declaration in internal subset"));
            }
        }
    }

    fn parse_element_decl(&mut self, dtd: NodeId) -> Result<(), ParseError> {
        self.input.expect_str("<!ELEMENT")?;
        self.input.skip_whitespace_required()?;
        let name = self.input.parse_name()?;
        self.input.skip_whitespace_required()?;
        let content = self.input.take_until(">", "element declaration")?;
        let decl = self.doc.create_node(NodeKind::ElementDecl {
            name,
            content: content.trim_end().to_string(),
        });
        self.doc.link_last(dtd, decl);
        Ok(())
    }

    fn parse_attlist_decl(&mut self, dtd: NodeId) -> Result<(), ParseError> {
        self.input.expect_str("<!ATTLIST")?;
        self.input.skip_whitespace_required()?;
        let element = self.input.parse_name()?;
        loop {
            self.input.skip_whitespace();
            if self.input.peek() == Some(b'>') {
                self.input.advance(1);
                return Ok(());
            }
            let name = self.input.parse_name()?;
            self.input.skip_whitespace_required()?;
            let attr_type = if self.input.peek() == Some(b'(') {
                self.input.advance(1);
                format!("({})", self.input.take_until(")", "enumeration")?)
            } else {
                let keyword = self.input.parse_name()?;
                if keyword == "NOTATION" {
                    self.input.skip_whitespace_required()?;
                    self.input.expect_str("(")?;
                    format!("NOTATION ({})", self.input.take_until(")", "enumeration")?)
                } else {
                    keyword
                }
            };
            self.input.skip_whitespace_required()?;
            let default = if self.input.looking_at("#REQUIRED") {
                self.input.advance(9);
                None
            } else if self.input.looking_at("#IMPLIED") {
                self.input.advance(8);
                None
            } else {
                if self.input.looking_at("#FIXED") {
                    self.input.advance(6);
                    self.input.skip_whitespace_required()?;
                }
                let raw = self.input.parse_quoted()?;
                Some(self.expand_attribute_value(&raw)?)
            };

            if attr_type == "ID" {
                self.dtd.id_attrs.insert((element.clone(), name.clone()));
            }
            if let Some(value) = &default {
                let defaults = self.dtd.attr_defaults.entry(element.clone()).or_default();
                if !defaults.iter().any(|(n, _)| *n == name) {
                    defaults.push((name.clone(), value.clone()));
                }
            }
            let decl = self.doc.create_node(NodeKind::AttributeDecl {
                element: element.clone(),
                name,
                attr_type,
                default,
            });
            self.doc.link_last(dtd, decl);
        }
    }

    fn parse_entity_decl(&mut self, dtd: NodeId) -> Result<(), ParseError> {
        self.input.expect_str("<!ENTITY")?;
        self.input.skip_whitespace_required()?;
        let parameter = self.input.peek() == Some(b'%');
        if parameter {
            self.input.advance(1);
            self.input.skip_whitespace_required()?;
        }
        let name = self.input.parse_name()?;
        self.input.skip_whitespace_required()?;

        let (value, public_id, system_id) = if matches!(self.input.peek(), Some(b'"' | b'\'')) {
            let raw = self.input.parse_quoted()?;
            (Some(self.expand_char_refs(&raw)?), None, None)
        } else {
            let (public_id, system_id) = self.parse_external_id()?;
            if system_id.is_none() {
                return Err(self.input.fatal(format!("entity '{name}' has no value or system literal")));
            }
            self.input.skip_whitespace();
            if self.input.looking_at("NDATA") {
                self.input.advance(5);
                self.input.skip_whitespace_required()?;
                self.input.parse_name()?;
            }
            (None, public_id, system_id)
        };
        self.input.skip_whitespace();
        self.input.expect_str(">")?;

        if !parameter && !self.dtd.entities.contains_key(&name) {
            self.dtd.entities.insert(name.clone(), value.clone());
        }
        let decl = self.doc.create_node(NodeKind::EntityDecl {
            name,
            parameter,
            value,
            public_id,
            system_id,
        });
        self.doc.link_last(dtd, decl);
        Ok(())
    }

    fn parse_notation_decl(&mut self, dtd: NodeId) -> Result<(), ParseError> {
        self.input.expect_str("<!NOTATION")?;
        self.input.skip_whitespace_required()?;
        let name = self.input.parse_name()?;
        self.input.skip_whitespace_required()?;
        let (public_id, system_id) = self.parse_external_id()?;
        self.input.skip_whitespace();
        self.input.expect_str(">")?;
        let decl = self.doc.create_node(NodeKind::Notation {
            name,
            public_id,
            system_id,
        });
        self.doc.link_last(dtd, decl);
        Ok(())
    }

    /// Replaces character references in an entity value, leaving general
    /// entity references for expansion at the point of use.
    fn expand_char_refs(&self, raw: &str) -> Result<String, ParseError> {
        let mut out = String::with_capacity(raw.len());
        let mut rest = raw;
        while let Some(at) = rest.find("&#") {
            out.push_str(&rest[..at]);
            let end = rest[at..]
                .find(';')
                .ok_or_else(|| self.input.fatal("unterminated character reference"))?;
            out.push(self.decode_char_ref(&rest[at + 2..at + end])?);
            rest = &rest[at + end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }

    fn decode_char_ref(&self, body: &str) -> Result<char, ParseError> {
        let parsed = match body.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16),
            None => body.parse::<u32>(),
        };
        parsed
            .ok()
            .and_then(char::from_u32)
            .filter(|&c| is_xml_char(c))
            .ok_or_else(|| self.input.fatal(format!("invalid character reference &#{body};")))
    }

    // --- Elements ---

    fn parse_element(&mut self, parent: NodeId) -> Result<(), ParseError> {
        if let Some((elem, qname)) = self.start_element(parent)? {
            self.parse_content(elem, false)?;
            self.finish_element(elem, &qname)?;
        }
        Ok(())
    }

    /// Parses a start tag and attaches the element to `parent`. Returns the
    /// element and its qualified name when content and an end tag follow,
    /// or `None` for an empty-element tag.
    fn start_element(&mut self, parent: NodeId) -> Result<Option<(NodeId, String)>, ParseError> {
        self.input.increment_depth()?;
        self.input.expect_str("<")?;
        let qname = self.input.parse_name()?;

        let mut raw_attrs: Vec<RawAttribute> = Vec::new();
        loop {
            let had_ws = self.input.skip_whitespace();
            if matches!(self.input.peek(), Some(b'>')) || self.input.looking_at("/>") {
                break;
            }
            if !had_ws {
                return Err(self.input.fatal("whitespace required between attributes"));
            }
            let name = self.input.parse_name()?;
            self.input.skip_whitespace();
            self.input.expect_str("=")?;
            self.input.skip_whitespace();
            let raw = self.input.parse_quoted()?;
            let value = self.expand_attribute_value(&raw)?;
            if raw_attrs.iter().any(|a| a.qname == name) {
                self.input
                    .error_or_recover(format!("attribute {name} redefined"))?;
                continue;
            }
            raw_attrs.push(RawAttribute { qname: name, value });
        }

        if self.options.contains(ParseOptions::DTD_ATTR) {
            if let Some(defaults) = self.dtd.attr_defaults.get(&qname) {
                for (name, value) in defaults {
                    if !raw_attrs.iter().any(|a| a.qname == *name) {
                        raw_attrs.push(RawAttribute {
                            qname: name.clone(),
                            value: value.clone(),
                        });
                    }
                }
            }
        }

        self.ns.push_scope();
        let elem = self.doc.create_node(NodeKind::element(&qname));
        self.doc.link_last(parent, elem);
        self.bind_namespaces(elem, &raw_attrs)?;

        let (prefix, local) = split_qname(&qname);
        let namespace = self.resolve_prefix(prefix, &qname)?;
        if let NodeKind::Element { name, .. } = &mut self.doc.node_mut(elem).kind {
            *name = local.to_string();
        }
        self.doc
            .set_element_namespace(elem, prefix.filter(|_| namespace.is_some()), namespace.as_deref());
        if namespace.is_none() && prefix.is_some() {
            // An unbound prefix keeps the full qualified name as the local part.
            if let NodeKind::Element { name, .. } = &mut self.doc.node_mut(elem).kind {
                name.clone_from(&qname);
            }
        }

        self.attach_attributes(elem, &qname, raw_attrs)?;

        if self.input.looking_at("/>") {
            self.input.advance(2);
            self.ns.pop_scope();
            self.input.decrement_depth();
            return Ok(None);
        }
        self.input.expect_str(">")?;
        Ok(Some((elem, qname)))
    }

    /// Parses the end tag of an element opened by `start_element`.
    fn finish_element(&mut self, elem: NodeId, qname: &str) -> Result<(), ParseError> {
        self.input.expect_str("</")?;
        let end = self.input.parse_name()?;
        if end != qname {
            self.input.error_or_recover(format!(
                "opening and ending tag mismatch: {qname} and {end}"
            ))?;
        }
        self.input.skip_whitespace();
        self.input.expect_str(">")?;
        if self.options.contains(ParseOptions::NO_BLANKS) {
            self.strip_blanks(elem);
        }
        self.ns.pop_scope();
        self.input.decrement_depth();
        Ok(())
    }

    /// Creates namespace declaration nodes for the `xmlns` attributes of a
    /// start tag and binds them in the current scope.
    fn bind_namespaces(&mut self, elem: NodeId, attrs: &[RawAttribute]) -> Result<(), ParseError> {
        for attr in attrs {
            let prefix = match split_qname(&attr.qname) {
                (None, "xmlns") => None,
                (Some("xmlns"), p) => Some(p.to_string()),
                _ => continue,
            };
            let uri = attr.value.clone();
            match prefix.as_deref() {
                Some("xml") if uri != XML_NAMESPACE => {
                    self.input
                        .error_or_recover("xml namespace prefix mapped to wrong URI".to_string())?;
                    continue;
                }
                Some("xml") => continue,
                Some("xmlns") => {
                    self.input
                        .error_or_recover("redefinition of the xmlns prefix is forbidden".to_string())?;
                    continue;
                }
                Some(p) if uri.is_empty() => {
                    self.input
                        .error_or_recover(format!("xmlns:{p}: empty namespace URI"))?;
                    continue;
                }
                _ => {}
            }
            if uri == XMLNS_NAMESPACE {
                self.input
                    .error_or_recover("reuse of the xmlns namespace name is forbidden".to_string())?;
                continue;
            }
            if self.options.contains(ParseOptions::PEDANTIC) && !uri.is_empty() && !uri.contains(':') {
                self.input.push_diagnostic(
                    ErrorSeverity::Warning,
                    format!("xmlns: URI {uri} is not absolute"),
                );
            }
            if self.options.contains(ParseOptions::NS_CLEAN)
                && self.ns.is_redundant(prefix.as_deref(), &uri)
            {
                continue;
            }
            self.ns.bind(prefix.clone(), uri.clone());
            let decl = self.doc.create_node(NodeKind::NamespaceDecl { prefix, uri });
            self.doc
                .add_ns_decl(elem, decl)
                .map_err(|e| self.input.fatal(e.to_string()))?;
        }
        Ok(())
    }

    fn resolve_prefix(&mut self, prefix: Option<&str>, qname: &str) -> Result<Option<String>, ParseError> {
        let resolved = self.ns.resolve(prefix).map(str::to_string);
        if resolved.is_none() {
            if let Some(p) = prefix {
                self.input.push_diagnostic(
                    ErrorSeverity::Error,
                    format!("namespace prefix {p} on {qname} is not defined"),
                );
            }
        }
        Ok(resolved)
    }

    fn attach_attributes(
        &mut self,
        elem: NodeId,
        elem_qname: &str,
        attrs: Vec<RawAttribute>,
    ) -> Result<(), ParseError> {
        for attr in attrs {
            let (prefix, local) = split_qname(&attr.qname);
            if prefix == Some("xmlns") || (prefix.is_none() && local == "xmlns") {
                continue;
            }
            let namespace = match prefix {
                Some(_) => self.resolve_prefix(prefix, &attr.qname)?,
                None => None,
            };
            if namespace.is_some()
                && self
                    .doc
                    .attribute_node_ns(elem, local, namespace.as_deref())
                    .is_some()
            {
                self.input
                    .error_or_recover(format!("namespaced attribute {} redefined", attr.qname))?;
                continue;
            }
            let is_id = attr.qname == "xml:id"
                || self
                    .dtd
                    .id_attrs
                    .contains(&(elem_qname.to_string(), attr.qname.clone()));
            let (prefix, name) = if namespace.is_some() {
                (prefix.map(str::to_string), local.to_string())
            } else {
                (None, attr.qname.clone())
            };
            let id = self.doc.create_node(NodeKind::Attribute {
                name,
                prefix,
                namespace,
                value: attr.value,
            });
            self.doc
                .set_attribute_node(elem, id)
                .map_err(|e| self.input.fatal(e.to_string()))?;
            if is_id {
                let value = self.doc.content(id).unwrap_or_default().trim().to_string();
                self.doc.set_id(&value, elem);
            }
        }
        Ok(())
    }

    /// Drops whitespace-only text children of an element with element content.
    fn strip_blanks(&mut self, elem: NodeId) {
        let has_elements = self
            .doc
            .children(elem)
            .any(|c| matches!(self.doc.node(c).kind, NodeKind::Element { .. }));
        if !has_elements {
            return;
        }
        let blanks: Vec<NodeId> = self
            .doc
            .children(elem)
            .filter(|&c| {
                matches!(&self.doc.node(c).kind, NodeKind::Text { content }
                    if content.chars().all(|ch| matches!(ch, ' ' | '\t' | '\n' | '\r')))
            })
            .collect();
        for blank in blanks {
            self.doc.detach(blank);
        }
    }

    // --- Content ---

    /// Parses element content up to the end tag of `parent`, or to the end
    /// of input when expanding an entity.
    ///
    /// Nested elements are tracked on an explicit stack of open tags, so
    /// nesting depth is bounded by the depth limit alone.
    fn parse_content(&mut self, parent: NodeId, in_entity: bool) -> Result<(), ParseError> {
        let mut open: Vec<(NodeId, String)> = Vec::new();
        loop {
            let current = open.last().map_or(parent, |(id, _)| *id);
            if self.input.at_end() {
                if in_entity && open.is_empty() {
                    return Ok(());
                }
                return Err(self.input.fatal("premature end of data in element content"));
            }
            if self.input.looking_at("</") {
                match open.pop() {
                    Some((elem, qname)) => {
                        self.finish_element(elem, &qname)?;
                        continue;
                    }
                    None if in_entity => {
                        return Err(self.input.fatal("end tag inside entity replacement text"));
                    }
                    None => return Ok(()),
                }
            }
            if self.input.looking_at("<!--") {
                self.parse_comment(current)?;
            } else if self.input.looking_at("<![CDATA[") {
                self.parse_cdata(current)?;
            } else if self.input.looking_at("<?") {
                self.parse_processing_instruction(current)?;
            } else if self.input.peek() == Some(b'<') {
                if let Some(started) = self.start_element(current)? {
                    open.push(started);
                }
            } else if self.input.peek() == Some(b'&') {
                self.parse_reference(current)?;
            } else {
                self.parse_char_data(current)?;
            }
        }
    }

    fn parse_char_data(&mut self, parent: NodeId) -> Result<(), ParseError> {
        let mut text = String::new();
        while let Some(b) = self.input.peek() {
            if b == b'<' || b == b'&' {
                break;
            }
            if self.input.looking_at("]]>") {
                self.input
                    .error_or_recover("sequence ']]>' not allowed in content".to_string())?;
            }
            text.push(self.input.next_char()?);
        }
        self.push_text(parent, &text)
    }

    fn parse_cdata(&mut self, parent: NodeId) -> Result<(), ParseError> {
        self.input.expect_str("<![CDATA[")?;
        let content = self.input.take_until("]]>", "CDATA section")?;
        if self.options.contains(ParseOptions::NO_CDATA) {
            return self.push_text(parent, &content);
        }
        let id = self.doc.create_node(NodeKind::CData { content });
        self.doc.link_last(parent, id);
        Ok(())
    }

    /// Appends character data, merging with a preceding text node.
    fn push_text(&mut self, parent: NodeId, text: &str) -> Result<(), ParseError> {
        if text.is_empty() {
            return Ok(());
        }
        let max = self.input.limits.max_text_length;
        if let Some(last) = self.doc.last_child(parent) {
            if let NodeKind::Text { content } = &mut self.doc.node_mut(last).kind {
                content.push_str(text);
                if content.len() > max {
                    return Err(self.input.fatal("text node exceeds maximum length"));
                }
                return Ok(());
            }
        }
        if text.len() > max {
            return Err(self.input.fatal("text node exceeds maximum length"));
        }
        let id = self.doc.create_node(NodeKind::text(text));
        self.doc.link_last(parent, id);
        Ok(())
    }

    fn parse_reference(&mut self, parent: NodeId) -> Result<(), ParseError> {
        self.input.expect_str("&")?;
        if self.input.peek() == Some(b'#') {
            self.input.advance(1);
            let ch = self.input.parse_char_ref()?;
            return self.push_text(parent, ch.encode_utf8(&mut [0; 4]));
        }
        let name = self.input.parse_name()?;
        self.input.expect_str(";")?;
        if let Some(ch) = builtin_entity(&name) {
            return self.push_text(parent, ch);
        }

        match self.dtd.entities.get(&name).cloned() {
            Some(Some(replacement)) if self.options.contains(ParseOptions::NO_ENT) => {
                self.expand_entity_content(parent, &name, &replacement)
            }
            Some(value) => {
                let id = self.doc.create_node(NodeKind::EntityRef { name, value });
                self.doc.link_last(parent, id);
                Ok(())
            }
            None => {
                if !self.dtd.incomplete {
                    self.input
                        .error_or_recover(format!("entity '{name}' not defined"))?;
                }
                let id = self.doc.create_node(NodeKind::EntityRef { name, value: None });
                self.doc.link_last(parent, id);
                Ok(())
            }
        }
    }

    /// Marks `name` as being expanded. Fails on a reference loop, past the
    /// expansion budget, or when expansions nest too deeply.
    fn enter_entity(&mut self, name: &str) -> Result<(), ParseError> {
        if self.dtd.expanding.iter().any(|n| n == name) {
            return Err(self.input.fatal(format!("entity reference loop on '{name}'")));
        }
        if self.dtd.expanding.len() >= MAX_ENTITY_NESTING {
            return Err(self.input.fatal(format!(
                "maximum entity nesting depth exceeded ({MAX_ENTITY_NESTING})"
            )));
        }
        self.input.count_expansion()?;
        self.dtd.expanding.push(name.to_string());
        Ok(())
    }

    /// Parses an entity's replacement text as content of `parent`.
    fn expand_entity_content(
        &mut self,
        parent: NodeId,
        name: &str,
        replacement: &str,
    ) -> Result<(), ParseError> {
        self.enter_entity(name)?;

        let mut inner = XmlParser {
            input: self.input.nested(replacement),
            doc: std::mem::take(&mut self.doc),
            options: self.options,
            ns: std::mem::replace(&mut self.ns, NamespaceResolver::new()),
            dtd: std::mem::take(&mut self.dtd),
        };
        let result = inner.parse_content(parent, true);
        self.doc = inner.doc;
        self.ns = inner.ns;
        self.dtd = inner.dtd;
        self.input.absorb(inner.input);

        self.dtd.expanding.pop();
        result
    }

    /// Normalizes an attribute value (XML 1.0 §3.3.3): references are
    /// replaced and literal whitespace becomes a space.
    fn expand_attribute_value(&mut self, raw: &str) -> Result<String, ParseError> {
        let mut out = String::with_capacity(raw.len());
        self.expand_attribute_into(raw, &mut out)?;
        Ok(out)
    }

    fn expand_attribute_into(&mut self, raw: &str, out: &mut String) -> Result<(), ParseError> {
        let mut rest = raw;
        while let Some(ch) = rest.chars().next() {
            match ch {
                '&' => {
                    let end = rest
                        .find(';')
                        .ok_or_else(|| self.input.fatal("unterminated reference in attribute value"))?;
                    let body = &rest[1..end];
                    rest = &rest[end + 1..];
                    if let Some(num) = body.strip_prefix('#') {
                        out.push(self.decode_char_ref(num)?);
                    } else if let Some(text) = builtin_entity(body) {
                        out.push_str(text);
                    } else {
                        self.expand_attribute_entity(body, out)?;
                    }
                }
                '<' => {
                    return Err(self.input.fatal("'<' not allowed in attribute value"));
                }
                '\t' | '\n' | '\r' => {
                    out.push(' ');
                    rest = &rest[1..];
                }
                _ => {
                    out.push(ch);
                    rest = &rest[ch.len_utf8()..];
                }
            }
        }
        Ok(())
    }

    fn expand_attribute_entity(&mut self, name: &str, out: &mut String) -> Result<(), ParseError> {
        match self.dtd.entities.get(name).cloned() {
            Some(Some(replacement)) => {
                self.enter_entity(name)?;
                let result = self.expand_attribute_into(&replacement, out);
                self.dtd.expanding.pop();
                result
            }
            Some(None) => Err(self
                .input
                .fatal(format!("attribute value references external entity '{name}'"))),
            None if self.dtd.incomplete => Ok(()),
            None => self
                .input
                .error_or_recover(format!("entity '{name}' not defined")),
        }
    }
}

fn builtin_entity(name: &str) -> Option<&'static str> {
    match name {
        "lt" => Some("<"),
        "gt" => Some(">"),
        "amp" => Some("&"),
        "apos" => Some("'"),
        "quot" => Some("\""),
        _ => None,
    }
}
