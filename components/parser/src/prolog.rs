//! Prolog role engine.
//!
//! Consumes prolog tokens and labels each with the semantic role the
//! document processor acts on. The grammar is stepped one token at a
//! time; a token that is legal in the prolog but not in the current
//! step yields [`Role::Error`]. Group nesting of content models is
//! tracked in `level` for the processor's connector check.

use crate::tokenizer::{Encoding, Token};

/// Semantic role of one prolog token in context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Role {
    None,
    XmlDecl,
    DoctypeName,
    DoctypeSystemId,
    DoctypePublicId,
    DoctypeClose,
    GeneralEntityName,
    ParamEntityName,
    EntityValue,
    EntitySystemId,
    EntityPublicId,
    EntityNotationName,
    NotationName,
    NotationSystemId,
    NotationPublicId,
    AttlistElementName,
    AttributeName,
    AttributeTypeCdata,
    DefaultAttributeValue,
    FixedAttributeValue,
    ImpliedAttributeValue,
    RequiredAttributeValue,
    ParamEntityRef,
    InnerParamEntityRef,
    GroupOpen,
    GroupSequence,
    GroupChoice,
    InstanceStart,
    Error,
    IgnoreSect,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    /// Document start; an XML declaration is only legal here.
    Start,
    /// Prolog misc before the doctype declaration.
    Misc,
    /// Prolog misc after the doctype declaration.
    AfterDoctype,
    DoctypeName,
    DoctypeAfterName,
    DoctypeAfterSystemKw,
    DoctypeAfterPublicKw,
    DoctypeAfterPublicLit,
    DoctypeAfterExternalId,
    /// External subset start; a text declaration is only legal here.
    ExtSubsetStart,
    /// Internal or external subset, between declarations.
    Subset,
    SubsetAfterClose,
    EntityDeclStart,
    EntityDeclAfterPercent,
    EntityAfterName,
    EntityAfterSystemKw,
    EntityAfterPublicKw,
    EntityAfterPublicLit,
    EntityAfterSystemLit,
    EntityAfterNdataKw,
    DeclCloseExpected,
    AttlistDeclStart,
    AttlistAfterElementName,
    AttlistAfterAttName,
    AttlistEnumStart,
    AttlistEnumAfterItem,
    AttlistNotationAfterKw,
    AttlistNotationStart,
    AttlistNotationAfterItem,
    AttlistAfterType,
    AttlistAfterFixedKw,
    ElementDeclStart,
    ElementAfterName,
    GroupStart,
    MixedAfterPcdata,
    MixedName,
    GroupAfterItem,
    NotationDeclStart,
    NotationAfterName,
    NotationAfterSystemKw,
    NotationAfterPublicKw,
    NotationAfterPublicLit,
    CondSectStart,
    CondSectInclude,
    CondSectIgnore,
    Error,
}

#[derive(Clone, Debug)]
pub(crate) struct PrologState {
    state: State,
    /// Content-model group nesting depth.
    pub(crate) level: usize,
    /// Open INCLUDE conditional sections (external subset).
    include_level: usize,
    external_subset: bool,
    entity_is_param: bool,
}

impl PrologState {
    pub(crate) fn new() -> PrologState {
        PrologState {
            state: State::Start,
            level: 0,
            include_level: 0,
            external_subset: false,
            entity_is_param: false,
        }
    }

    /// Initial state of an external DTD subset parse.
    pub(crate) fn new_external_subset() -> PrologState {
        PrologState {
            state: State::ExtSubsetStart,
            level: 0,
            include_level: 0,
            external_subset: true,
            entity_is_param: false,
        }
    }

    /// May the input end here? Meaningful for external subsets.
    pub(crate) fn eof_allowed(&self) -> bool {
        matches!(self.state, State::Subset | State::ExtSubsetStart)
            && self.include_level == 0
    }

    fn to(&mut self, state: State, role: Role) -> Role {
        self.state = state;
        role
    }

    fn error(&mut self) -> Role {
        self.state = State::Error;
        Role::Error
    }

    /// Labels `tok` (spanning `start..end` of `buf`) in the current
    /// grammar step and advances the step.
    pub(crate) fn token_role(
        &mut self,
        tok: Token,
        enc: &Encoding,
        buf: &[u8],
        start: usize,
        end: usize,
    ) -> Role {
        let kw = |keyword: &[u8]| enc.name_matches_ascii(buf, start, end, keyword);

        // whitespace separates tokens in every step
        if tok == Token::PrologS {
            if self.state == State::Start {
                self.state = State::Misc;
            } else if self.state == State::ExtSubsetStart {
                self.state = State::Subset;
            }
            return Role::None;
        }
        // parameter entity references are subset-wide
        if tok == Token::ParamEntityRef {
            return match self.state {
                State::Subset => Role::ParamEntityRef,
                State::Start | State::Misc | State::AfterDoctype | State::Error => {
                    self.error()
                }
                _ => Role::InnerParamEntityRef,
            };
        }

        match self.state {
            State::Start => match tok {
                Token::XmlDecl => self.to(State::Misc, Role::XmlDecl),
                Token::Pi | Token::Comment => self.to(State::Misc, Role::None),
                Token::DeclOpen if kw(b"<!DOCTYPE") => {
                    self.to(State::DoctypeName, Role::None)
                }
                Token::InstanceStart => Role::InstanceStart,
                _ => self.error(),
            },
            State::Misc => match tok {
                Token::Pi | Token::Comment => Role::None,
                Token::DeclOpen if kw(b"<!DOCTYPE") => {
                    self.to(State::DoctypeName, Role::None)
                }
                Token::InstanceStart => Role::InstanceStart,
                _ => self.error(),
            },
            State::AfterDoctype => match tok {
                Token::Pi | Token::Comment => Role::None,
                Token::InstanceStart => Role::InstanceStart,
                _ => self.error(),
            },
            State::DoctypeName => match tok {
                Token::Name => self.to(State::DoctypeAfterName, Role::DoctypeName),
                _ => self.error(),
            },
            State::DoctypeAfterName => match tok {
                Token::OpenBracket => self.to(State::Subset, Role::None),
                Token::DeclClose => self.to(State::AfterDoctype, Role::DoctypeClose),
                Token::Name if kw(b"SYSTEM") => {
                    self.to(State::DoctypeAfterSystemKw, Role::None)
                }
                Token::Name if kw(b"PUBLIC") => {
                    self.to(State::DoctypeAfterPublicKw, Role::None)
                }
                _ => self.error(),
            },
            State::DoctypeAfterSystemKw => match tok {
                Token::Literal => {
                    self.to(State::DoctypeAfterExternalId, Role::DoctypeSystemId)
                }
                _ => self.error(),
            },
            State::DoctypeAfterPublicKw => match tok {
                Token::Literal => {
                    self.to(State::DoctypeAfterPublicLit, Role::DoctypePublicId)
                }
                _ => self.error(),
            },
            State::DoctypeAfterPublicLit => match tok {
                Token::Literal => {
                    self.to(State::DoctypeAfterExternalId, Role::DoctypeSystemId)
                }
                _ => self.error(),
            },
            State::DoctypeAfterExternalId => match tok {
                Token::OpenBracket => self.to(State::Subset, Role::None),
                Token::DeclClose => self.to(State::AfterDoctype, Role::DoctypeClose),
                _ => self.error(),
            },
            State::ExtSubsetStart => {
                if tok == Token::XmlDecl {
                    return self.to(State::Subset, Role::XmlDecl);
                }
                self.state = State::Subset;
                self.token_role(tok, enc, buf, start, end)
            }
            State::Subset => match tok {
                Token::Pi | Token::Comment => Role::None,
                Token::DeclOpen => {
                    if kw(b"<!ENTITY") {
                        self.to(State::EntityDeclStart, Role::None)
                    } else if kw(b"<!ATTLIST") {
                        self.to(State::AttlistDeclStart, Role::None)
                    } else if kw(b"<!ELEMENT") {
                        self.to(State::ElementDeclStart, Role::None)
                    } else if kw(b"<!NOTATION") {
                        self.to(State::NotationDeclStart, Role::None)
                    } else {
                        self.error()
                    }
                }
                Token::CloseBracket if !self.external_subset => {
                    self.to(State::SubsetAfterClose, Role::None)
                }
                Token::CondSectOpen if self.external_subset => {
                    self.to(State::CondSectStart, Role::None)
                }
                Token::CondSectClose
                    if self.external_subset && self.include_level > 0 =>
                {
                    self.include_level -= 1;
                    Role::None
                }
                _ => self.error(),
            },
            State::SubsetAfterClose => match tok {
                Token::DeclClose => self.to(State::AfterDoctype, Role::DoctypeClose),
                _ => self.error(),
            },
            State::EntityDeclStart => match tok {
                Token::Percent => {
                    self.entity_is_param = true;
                    self.to(State::EntityDeclAfterPercent, Role::None)
                }
                Token::Name => {
                    self.entity_is_param = false;
                    self.to(State::EntityAfterName, Role::GeneralEntityName)
                }
                _ => self.error(),
            },
            State::EntityDeclAfterPercent => match tok {
                Token::Name => self.to(State::EntityAfterName, Role::ParamEntityName),
                _ => self.error(),
            },
            State::EntityAfterName => match tok {
                Token::Literal => self.to(State::DeclCloseExpected, Role::EntityValue),
                Token::Name if kw(b"SYSTEM") => {
                    self.to(State::EntityAfterSystemKw, Role::None)
                }
                Token::Name if kw(b"PUBLIC") => {
                    self.to(State::EntityAfterPublicKw, Role::None)
                }
                _ => self.error(),
            },
            State::EntityAfterSystemKw => match tok {
                Token::Literal => {
                    self.to(State::EntityAfterSystemLit, Role::EntitySystemId)
                }
                _ => self.error(),
            },
            State::EntityAfterPublicKw => match tok {
                Token::Literal => {
                    self.to(State::EntityAfterPublicLit, Role::EntityPublicId)
                }
                _ => self.error(),
            },
            State::EntityAfterPublicLit => match tok {
                Token::Literal => {
                    self.to(State::EntityAfterSystemLit, Role::EntitySystemId)
                }
                _ => self.error(),
            },
            State::EntityAfterSystemLit => match tok {
                Token::DeclClose => self.to(State::Subset, Role::None),
                Token::Name if !self.entity_is_param && kw(b"NDATA") => {
                    self.to(State::EntityAfterNdataKw, Role::None)
                }
                _ => self.error(),
            },
            State::EntityAfterNdataKw => match tok {
                Token::Name => {
                    self.to(State::DeclCloseExpected, Role::EntityNotationName)
                }
                _ => self.error(),
            },
            State::DeclCloseExpected => match tok {
                Token::DeclClose => self.to(State::Subset, Role::None),
                _ => self.error(),
            },
            State::AttlistDeclStart => match tok {
                Token::Name => {
                    self.to(State::AttlistAfterElementName, Role::AttlistElementName)
                }
                _ => self.error(),
            },
            State::AttlistAfterElementName => match tok {
                Token::Name => self.to(State::AttlistAfterAttName, Role::AttributeName),
                Token::DeclClose => self.to(State::Subset, Role::None),
                _ => self.error(),
            },
            State::AttlistAfterAttName => match tok {
                Token::Name if kw(b"CDATA") => {
                    self.to(State::AttlistAfterType, Role::AttributeTypeCdata)
                }
                Token::Name if kw(b"NOTATION") => {
                    self.to(State::AttlistNotationAfterKw, Role::None)
                }
                Token::Name
                    if kw(b"ID")
                        || kw(b"IDREF")
                        || kw(b"IDREFS")
                        || kw(b"ENTITY")
                        || kw(b"ENTITIES")
                        || kw(b"NMTOKEN")
                        || kw(b"NMTOKENS") =>
                {
                    self.to(State::AttlistAfterType, Role::None)
                }
                Token::OpenParen => self.to(State::AttlistEnumStart, Role::None),
                _ => self.error(),
            },
            State::AttlistEnumStart => match tok {
                Token::Name | Token::Nmtoken => {
                    self.to(State::AttlistEnumAfterItem, Role::None)
                }
                _ => self.error(),
            },
            State::AttlistEnumAfterItem => match tok {
                Token::Or => self.to(State::AttlistEnumStart, Role::None),
                Token::CloseParen => self.to(State::AttlistAfterType, Role::None),
                _ => self.error(),
            },
            State::AttlistNotationAfterKw => match tok {
                Token::OpenParen => self.to(State::AttlistNotationStart, Role::None),
                _ => self.error(),
            },
            State::AttlistNotationStart => match tok {
                Token::Name => self.to(State::AttlistNotationAfterItem, Role::None),
                _ => self.error(),
            },
            State::AttlistNotationAfterItem => match tok {
                Token::Or => self.to(State::AttlistNotationStart, Role::None),
                Token::CloseParen => self.to(State::AttlistAfterType, Role::None),
                _ => self.error(),
            },
            State::AttlistAfterType => match tok {
                Token::PoundName if kw(b"#IMPLIED") => {
                    self.to(State::AttlistAfterElementName, Role::ImpliedAttributeValue)
                }
                Token::PoundName if kw(b"#REQUIRED") => {
                    self.to(State::AttlistAfterElementName, Role::RequiredAttributeValue)
                }
                Token::PoundName if kw(b"#FIXED") => {
                    self.to(State::AttlistAfterFixedKw, Role::None)
                }
                Token::Literal => {
                    self.to(State::AttlistAfterElementName, Role::DefaultAttributeValue)
                }
                _ => self.error(),
            },
            State::AttlistAfterFixedKw => match tok {
                Token::Literal => {
                    self.to(State::AttlistAfterElementName, Role::FixedAttributeValue)
                }
                _ => self.error(),
            },
            State::ElementDeclStart => match tok {
                Token::Name => self.to(State::ElementAfterName, Role::None),
                _ => self.error(),
            },
            State::ElementAfterName => match tok {
                Token::Name if kw(b"EMPTY") || kw(b"ANY") => {
                    self.to(State::DeclCloseExpected, Role::None)
                }
                Token::OpenParen => {
                    self.level = 1;
                    self.to(State::GroupStart, Role::GroupOpen)
                }
                _ => self.error(),
            },
            State::GroupStart => match tok {
                Token::PoundName if kw(b"#PCDATA") => {
                    self.to(State::MixedAfterPcdata, Role::None)
                }
                Token::Name => self.to(State::GroupAfterItem, Role::None),
                Token::OpenParen => {
                    self.level += 1;
                    self.to(State::GroupStart, Role::GroupOpen)
                }
                _ => self.error(),
            },
            State::MixedAfterPcdata => match tok {
                Token::Or => self.to(State::MixedName, Role::GroupChoice),
                Token::CloseParen | Token::CloseParenStar => {
                    self.level -= 1;
                    if self.level == 0 {
                        self.to(State::DeclCloseExpected, Role::None)
                    } else {
                        self.to(State::GroupAfterItem, Role::None)
                    }
                }
                _ => self.error(),
            },
            State::MixedName => match tok {
                Token::Name => self.to(State::MixedAfterPcdata, Role::None),
                _ => self.error(),
            },
            State::GroupAfterItem => match tok {
                Token::Or => self.to(State::GroupStart, Role::GroupChoice),
                Token::Comma => self.to(State::GroupStart, Role::GroupSequence),
                Token::CloseParen
                | Token::CloseParenQuestion
                | Token::CloseParenStar
                | Token::CloseParenPlus => {
                    self.level -= 1;
                    if self.level == 0 {
                        self.to(State::DeclCloseExpected, Role::None)
                    } else {
                        self.to(State::GroupAfterItem, Role::None)
                    }
                }
                _ => self.error(),
            },
            State::NotationDeclStart => match tok {
                Token::Name => self.to(State::NotationAfterName, Role::NotationName),
                _ => self.error(),
            },
            State::NotationAfterName => match tok {
                Token::Name if kw(b"SYSTEM") => {
                    self.to(State::NotationAfterSystemKw, Role::None)
                }
                Token::Name if kw(b"PUBLIC") => {
                    self.to(State::NotationAfterPublicKw, Role::None)
                }
                _ => self.error(),
            },
            State::NotationAfterSystemKw => match tok {
                Token::Literal => {
                    self.to(State::DeclCloseExpected, Role::NotationSystemId)
                }
                _ => self.error(),
            },
            State::NotationAfterPublicKw => match tok {
                Token::Literal => {
                    self.to(State::NotationAfterPublicLit, Role::NotationPublicId)
                }
                _ => self.error(),
            },
            State::NotationAfterPublicLit => match tok {
                Token::Literal => {
                    self.to(State::DeclCloseExpected, Role::NotationSystemId)
                }
                Token::DeclClose => self.to(State::Subset, Role::None),
                _ => self.error(),
            },
            State::CondSectStart => match tok {
                Token::Name if kw(b"INCLUDE") => {
                    self.to(State::CondSectInclude, Role::None)
                }
                Token::Name if kw(b"IGNORE") => {
                    self.to(State::CondSectIgnore, Role::None)
                }
                _ => self.error(),
            },
            State::CondSectInclude => match tok {
                Token::OpenBracket => {
                    self.include_level += 1;
                    self.to(State::Subset, Role::None)
                }
                _ => self.error(),
            },
            State::CondSectIgnore => match tok {
                Token::OpenBracket => self.to(State::Subset, Role::IgnoreSect),
                _ => self.error(),
            },
            State::Error => Role::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::{Encoding, Token, TokenResult};

    /// Runs the prolog tokenizer over `input` and feeds the role
    /// engine, collecting the non-`None` roles.
    fn roles(input: &str) -> Vec<Role> {
        let buf = input.as_bytes();
        let enc = Encoding::Utf8;
        let mut state = PrologState::new();
        let mut s = 0;
        let mut out = Vec::new();
        loop {
            let (kind, end) = match enc.prolog_token(buf, s, buf.len()) {
                TokenResult::Token { kind, end } => (kind, end),
                TokenResult::Tentative { kind, end } => (kind, end),
                TokenResult::Empty => break,
                other => panic!("unexpected scan result {:?} at {}", other, s),
            };
            let role = state.token_role(kind, &enc, buf, s, end);
            assert_ne!(role, Role::Error, "error role at {} in {:?}", s, input);
            if role != Role::None {
                out.push(role);
            }
            if role == Role::InstanceStart {
                break;
            }
            s = end;
        }
        out
    }

    #[test]
    fn minimal_document() {
        assert_eq!(
            roles("<?xml version='1.0'?><r>"),
            vec![Role::XmlDecl, Role::InstanceStart]
        );
    }

    #[test]
    fn doctype_with_internal_subset() {
        assert_eq!(
            roles("<!DOCTYPE r [<!ENTITY e \"hi\">]><r>"),
            vec![
                Role::DoctypeName,
                Role::GeneralEntityName,
                Role::EntityValue,
                Role::DoctypeClose,
                Role::InstanceStart
            ]
        );
    }

    #[test]
    fn doctype_with_external_id() {
        assert_eq!(
            roles("<!DOCTYPE r PUBLIC '-//X//EN' 'r.dtd'><r>"),
            vec![
                Role::DoctypeName,
                Role::DoctypePublicId,
                Role::DoctypeSystemId,
                Role::DoctypeClose,
                Role::InstanceStart
            ]
        );
    }

    #[test]
    fn unparsed_entity_declaration() {
        assert_eq!(
            roles("<!DOCTYPE r [<!ENTITY pic SYSTEM 'p.gif' NDATA gif>]><r>"),
            vec![
                Role::DoctypeName,
                Role::GeneralEntityName,
                Role::EntitySystemId,
                Role::EntityNotationName,
                Role::DoctypeClose,
                Role::InstanceStart
            ]
        );
    }

    #[test]
    fn attlist_declaration() {
        assert_eq!(
            roles("<!DOCTYPE r [<!ATTLIST e a CDATA 'dflt' b ID #IMPLIED>]><r>"),
            vec![
                Role::DoctypeName,
                Role::AttlistElementName,
                Role::AttributeName,
                Role::AttributeTypeCdata,
                Role::DefaultAttributeValue,
                Role::AttributeName,
                Role::ImpliedAttributeValue,
                Role::DoctypeClose,
                Role::InstanceStart
            ]
        );
    }

    #[test]
    fn element_declaration_groups() {
        assert_eq!(
            roles("<!DOCTYPE r [<!ELEMENT r (a,(b|c)*)>]><r>"),
            vec![
                Role::DoctypeName,
                Role::GroupOpen,
                Role::GroupSequence,
                Role::GroupOpen,
                Role::GroupChoice,
                Role::DoctypeClose,
                Role::InstanceStart
            ]
        );
    }

    #[test]
    fn mixed_content() {
        assert_eq!(
            roles("<!DOCTYPE r [<!ELEMENT r (#PCDATA|a)*>]><r>"),
            vec![
                Role::DoctypeName,
                Role::GroupOpen,
                Role::GroupChoice,
                Role::DoctypeClose,
                Role::InstanceStart
            ]
        );
    }

    #[test]
    fn param_entity_reference_in_subset() {
        assert_eq!(
            roles("<!DOCTYPE r [%pe;]><r>"),
            vec![
                Role::DoctypeName,
                Role::ParamEntityRef,
                Role::DoctypeClose,
                Role::InstanceStart
            ]
        );
    }

    #[test]
    fn misplaced_xml_decl_is_an_error() {
        let buf = b" <?xml version='1.0'?>";
        let enc = Encoding::Utf8;
        let mut state = PrologState::new();
        assert_eq!(
            state.token_role(Token::PrologS, &enc, buf, 0, 1),
            Role::None
        );
        assert_eq!(
            state.token_role(Token::XmlDecl, &enc, buf, 1, buf.len()),
            Role::Error
        );
    }

    #[test]
    fn external_subset_accepts_conditional_sections() {
        let input = "<![INCLUDE[<!ENTITY e 'v'>]]>";
        let buf = input.as_bytes();
        let enc = Encoding::Utf8;
        let mut state = PrologState::new_external_subset();
        let mut s = 0;
        let mut seen = Vec::new();
        while s < buf.len() {
            let (kind, end) = match enc.prolog_token(buf, s, buf.len()) {
                TokenResult::Token { kind, end } => (kind, end),
                TokenResult::Tentative { kind, end } => (kind, end),
                other => panic!("unexpected {:?}", other),
            };
            let role = state.token_role(kind, &enc, buf, s, end);
            assert_ne!(role, Role::Error, "at {}", s);
            if role != Role::None {
                seen.push(role);
            }
            s = end;
        }
        assert_eq!(
            seen,
            vec![Role::GeneralEntityName, Role::EntityValue]
        );
        assert!(state.eof_allowed());
    }

    #[test]
    fn notation_without_system_id() {
        assert_eq!(
            roles("<!DOCTYPE r [<!NOTATION n PUBLIC '-//N//EN'>]><r>"),
            vec![
                Role::DoctypeName,
                Role::NotationName,
                Role::NotationPublicId,
                Role::DoctypeClose,
                Role::InstanceStart
            ]
        );
    }

    #[test]
    fn junk_in_prolog_is_an_error() {
        let enc = Encoding::Utf8;
        let mut state = PrologState::new();
        assert_eq!(
            state.token_role(Token::CloseBracket, &enc, b"]", 0, 1),
            Role::Error
        );
    }
}
