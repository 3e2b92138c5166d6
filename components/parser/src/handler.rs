use std::fmt;

/// One attribute of a start tag, after normalization, defaulting and
/// (in namespace mode) prefix expansion.
#[derive(Clone, PartialEq)]
pub struct Attribute {
    name: String,
    value: String,
}

impl Attribute {
    pub(crate) fn new(name: String, value: String) -> Self {
        Self { name, value }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attribute")
            .field("name", &self.name)
            .field("value", &self.value)
            .finish()
    }
}

/// Reply of [`XmlHandler::external_entity_ref`].
pub enum ExternalEntityReply {
    /// Acknowledge the reference without parsing it.
    Skip,
    /// Abort the parse with `ExternalEntityHandling`.
    Refuse,
    /// Parse the supplied entity body in a sub-parser inheriting this
    /// parser's handlers and declarations.
    Parse {
        text: Vec<u8>,
        encoding: Option<String>,
    },
}

/// A single-byte encoding supplied by [`XmlHandler::unknown_encoding`]:
/// for each byte value the Unicode code point it denotes, or -1 for
/// bytes that cannot occur. ASCII bytes must map to themselves.
pub struct UnknownEncoding {
    map: [i32; 256],
}

impl UnknownEncoding {
    pub fn new(map: [i32; 256]) -> Self {
        Self { map }
    }

    pub(crate) fn map(&self) -> &[i32; 256] {
        &self.map
    }
}

/// Receiver of parse events.
///
/// Every method has a no-op default, so an implementation only spells
/// out the events it cares about. Borrowed arguments are only valid
/// for the duration of the call; copy what must outlive it.
pub trait XmlHandler {
    fn start_element(&mut self, _name: &str, _attributes: &[Attribute]) {}

    fn end_element(&mut self, _name: &str) {}

    fn character_data(&mut self, _data: &str) {}

    fn processing_instruction(&mut self, _target: &str, _data: &str) {}

    fn comment(&mut self, _text: &str) {}

    fn start_cdata_section(&mut self) {}

    fn end_cdata_section(&mut self) {}

    /// Raw text of constructs that have no dedicated event: prolog and
    /// epilog whitespace, the XML declaration, doctype internals,
    /// unexpanded entity references.
    fn default_data(&mut self, _raw: &str) {}

    fn start_doctype(&mut self, _name: &str) {}

    fn end_doctype(&mut self) {}

    fn unparsed_entity_decl(
        &mut self,
        _name: &str,
        _base: Option<&str>,
        _system_id: &str,
        _public_id: Option<&str>,
        _notation: &str,
    ) {
    }

    fn notation_decl(
        &mut self,
        _name: &str,
        _base: Option<&str>,
        _system_id: Option<&str>,
        _public_id: Option<&str>,
    ) {
    }

    /// A namespace declaration coming into scope; `uri` is `None` when
    /// the default namespace is being unbound.
    fn start_namespace_decl(&mut self, _prefix: Option<&str>, _uri: Option<&str>) {}

    fn end_namespace_decl(&mut self, _prefix: Option<&str>) {}

    /// Consulted when the document turns out not to be standalone and
    /// declarations may be missing. Returning `false` aborts with
    /// `NotStandalone`.
    fn not_standalone(&mut self) -> bool {
        true
    }

    /// An external entity (or the external DTD subset, with `context`
    /// `None`) is referenced.
    fn external_entity_ref(
        &mut self,
        _context: Option<&str>,
        _base: Option<&str>,
        _system_id: Option<&str>,
        _public_id: Option<&str>,
    ) -> ExternalEntityReply {
        ExternalEntityReply::Skip
    }

    /// Last chance to provide a byte-to-code-point map for an encoding
    /// name the parser does not recognize.
    fn unknown_encoding(&mut self, _name: &str) -> Option<UnknownEncoding> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Silent;

    impl XmlHandler for Silent {}

    #[test]
    fn defaults_are_no_ops() {
        let mut h = Silent;
        h.start_element("e", &[]);
        h.character_data("x");
        assert!(h.not_standalone());
        assert!(matches!(
            h.external_entity_ref(None, None, None, None),
            ExternalEntityReply::Skip
        ));
        assert!(h.unknown_encoding("x-nope").is_none());
    }

    #[test]
    fn attribute_accessors() {
        let a = Attribute::new("n".to_string(), "v".to_string());
        assert_eq!(a.name(), "n");
        assert_eq!(a.value(), "v");
        assert_eq!(format!("{:?}", a), "Attribute { name: \"n\", value: \"v\" }");
    }
}
