use std::rc::Rc;

use crate::pool::{Name, StringPool};
use crate::table::{Named, NamedTable};

/// Reference to a namespace prefix record; the default prefix has no
/// name and lives outside the prefix table.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum PrefixRef {
    Default,
    Named(Name),
}

/// A general or parameter entity.
#[derive(Clone, Debug)]
pub(crate) struct Entity {
    pub(crate) name: Name,
    /// Replacement text of an internal entity.
    pub(crate) text: Option<Rc<str>>,
    pub(crate) system_id: Option<Rc<str>>,
    pub(crate) base: Option<Rc<str>>,
    pub(crate) public_id: Option<Rc<str>>,
    /// Notation name of an unparsed entity.
    pub(crate) notation: Option<Rc<str>>,
    /// Set while the entity is being expanded.
    pub(crate) open: bool,
    pub(crate) is_predefined: bool,
}

impl Entity {
    pub(crate) fn new(name: Name) -> Entity {
        Entity {
            name,
            text: None,
            system_id: None,
            base: None,
            public_id: None,
            notation: None,
            open: false,
            is_predefined: false,
        }
    }
}

impl Named for Entity {
    fn name(&self) -> &Name {
        &self.name
    }
}

#[derive(Clone, Debug)]
pub(crate) struct DefaultAttribute {
    pub(crate) id_name: Name,
    pub(crate) is_cdata: bool,
    /// `None` for #IMPLIED/#REQUIRED declarations, kept for the
    /// CDATA-ness lookup.
    pub(crate) value: Option<Rc<str>>,
}

#[derive(Clone, Debug)]
pub(crate) struct ElementType {
    pub(crate) name: Name,
    pub(crate) prefix: Option<PrefixRef>,
    pub(crate) default_atts: Vec<DefaultAttribute>,
}

impl ElementType {
    pub(crate) fn new(name: Name) -> ElementType {
        ElementType {
            name,
            prefix: None,
            default_atts: Vec::new(),
        }
    }

    /// Registers a default attribute unless a defaulted duplicate
    /// would result.
    pub(crate) fn define_attribute(
        &mut self,
        id_name: &Name,
        is_cdata: bool,
        value: Option<Rc<str>>,
    ) {
        if value.is_some()
            && self
                .default_atts
                .iter()
                .any(|da| Rc::ptr_eq(&da.id_name, id_name))
        {
            return;
        }
        self.default_atts.push(DefaultAttribute {
            id_name: id_name.clone(),
            is_cdata,
            value,
        });
    }
}

impl Named for ElementType {
    fn name(&self) -> &Name {
        &self.name
    }
}

#[derive(Clone, Debug)]
pub(crate) struct AttributeId {
    pub(crate) name: Name,
    pub(crate) prefix: Option<PrefixRef>,
    /// Declared with a non-CDATA type somewhere.
    pub(crate) maybe_tokenized: bool,
    /// A namespace-binding attribute (`xmlns` or `xmlns:p`).
    pub(crate) xmlns: bool,
    /// Per-start-tag scratch: 0 unseen, 1 specified, 2 prefixed and
    /// awaiting expansion. Always reset before a start tag returns.
    pub(crate) specified: u8,
}

impl AttributeId {
    pub(crate) fn new(name: Name) -> AttributeId {
        AttributeId {
            name,
            prefix: None,
            maybe_tokenized: false,
            xmlns: false,
            specified: 0,
        }
    }
}

impl Named for AttributeId {
    fn name(&self) -> &Name {
        &self.name
    }
}

/// A namespace prefix and its currently active binding (an index into
/// the parser's binding arena).
#[derive(Clone, Debug)]
pub(crate) struct Prefix {
    pub(crate) name: Name,
    pub(crate) binding: Option<usize>,
}

impl Prefix {
    pub(crate) fn new(name: Name) -> Prefix {
        Prefix {
            name,
            binding: None,
        }
    }
}

impl Named for Prefix {
    fn name(&self) -> &Name {
        &self.name
    }
}

/// Name of the pseudo-entity holding the external DTD subset ids.
pub(crate) const EXTERNAL_SUBSET_NAME: &str = "#";

/// Everything the document type declaration contributes.
#[derive(Clone, Debug)]
pub(crate) struct Dtd {
    pub(crate) general_entities: NamedTable<Entity>,
    pub(crate) param_entities: NamedTable<Entity>,
    pub(crate) element_types: NamedTable<ElementType>,
    pub(crate) attribute_ids: NamedTable<AttributeId>,
    pub(crate) prefixes: NamedTable<Prefix>,
    pub(crate) default_prefix_binding: Option<usize>,
    pub(crate) pool: StringPool,
    /// All declarations seen so far; cleared when an unexpanded
    /// parameter entity reference or unread external subset may hide
    /// declarations.
    pub(crate) complete: bool,
    pub(crate) standalone: bool,
}

impl Dtd {
    pub(crate) fn new() -> Dtd {
        let mut dtd = Dtd {
            general_entities: NamedTable::new(),
            param_entities: NamedTable::new(),
            element_types: NamedTable::new(),
            attribute_ids: NamedTable::new(),
            prefixes: NamedTable::new(),
            default_prefix_binding: None,
            pool: StringPool::new(),
            complete: true,
            standalone: false,
        };
        for &(name, text) in &[
            ("lt", "<"),
            ("gt", ">"),
            ("amp", "&"),
            ("apos", "'"),
            ("quot", "\""),
        ] {
            let entity = dtd.general_entities.entry(name, Entity::new);
            entity.text = Some(Rc::from(text));
            entity.is_predefined = true;
        }
        dtd
    }

    /// Deep copy for a sub-parser. Interned strings are shared (they
    /// are immutable); bindings, open flags and per-tag scratch are
    /// parser state and reset.
    pub(crate) fn copied(&self) -> Dtd {
        let mut new = self.clone();
        new.pool = StringPool::new();
        new.default_prefix_binding = None;
        for prefix in new.prefixes.iter_mut() {
            prefix.binding = None;
        }
        for id in new.attribute_ids.iter_mut() {
            id.specified = 0;
        }
        for e in new.general_entities.iter_mut() {
            e.open = false;
        }
        for e in new.param_entities.iter_mut() {
            e.open = false;
        }
        new
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predefined_entities_are_seeded() {
        let dtd = Dtd::new();
        let amp = dtd.general_entities.get("amp").expect("amp");
        assert!(amp.is_predefined);
        assert_eq!(amp.text.as_deref(), Some("&"));
        assert_eq!(dtd.general_entities.len(), 5);
    }

    #[test]
    fn copy_resets_parser_state() {
        let mut dtd = Dtd::new();
        dtd.prefixes.entry("p", Prefix::new).binding = Some(3);
        if let Some(e) = dtd.general_entities.get_mut("amp") {
            e.open = true;
        }
        let copy = dtd.copied();
        assert_eq!(copy.prefixes.get("p").and_then(|p| p.binding), None);
        assert_eq!(copy.general_entities.get("amp").map(|e| e.open), Some(false));
        // the original is untouched
        assert_eq!(dtd.prefixes.get("p").and_then(|p| p.binding), Some(3));
    }

    #[test]
    fn default_attribute_dedup() {
        let mut dtd = Dtd::new();
        let id = dtd.attribute_ids.entry("a", AttributeId::new).name.clone();
        let et = dtd.element_types.entry("e", ElementType::new);
        et.define_attribute(&id, true, Some(Rc::from("x")));
        et.define_attribute(&id, true, Some(Rc::from("y")));
        assert_eq!(et.default_atts.len(), 1);
        et.define_attribute(&id, false, None);
        assert_eq!(et.default_atts.len(), 2);
    }
}
