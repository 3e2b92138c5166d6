//! Tokenizer and encoding layer.
//!
//! One scanner exists per phase, generic over the active encoding; the
//! [`Encoding`] enum dispatches once per token, so the per-unit loops
//! stay monomorphic.

use std::fmt;
use std::rc::Rc;

use crate::position::Position;

pub(crate) mod classes;
pub(crate) mod map;
pub(crate) mod scan;
pub(crate) mod utf8;
pub(crate) mod utf16;

pub(crate) use map::MapEncoding;
pub(crate) use scan::{RawAttribute, XmlDeclInfo};

use utf16::{Utf16Be, Utf16Le};
use utf8::Utf8;

/// Kinds of complete tokens.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Token {
    // prolog and content
    Bom,
    Comment,
    Pi,
    XmlDecl,
    // prolog only
    PrologS,
    Literal,
    DeclOpen,
    DeclClose,
    Name,
    Nmtoken,
    PoundName,
    Or,
    Comma,
    Percent,
    OpenParen,
    CloseParen,
    CloseParenQuestion,
    CloseParenStar,
    CloseParenPlus,
    OpenBracket,
    CloseBracket,
    CondSectOpen,
    CondSectClose,
    IgnoreSect,
    ParamEntityRef,
    /// A `<` opening the root element; not consumed.
    InstanceStart,
    // content only
    StartTagNoAtts,
    StartTagWithAtts,
    EmptyElemNoAtts,
    EmptyElemWithAtts,
    EndTag,
    DataChars,
    DataNewline,
    TrailingCr,
    TrailingRSqb,
    CdataSectionOpen,
    CdataSectionClose,
    CharRef,
    EntityRef,
    // attribute values
    AttributeValueS,
}

/// Result of scanning for one token inside `ptr..end`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TokenResult {
    Token { kind: Token, end: usize },
    /// Complete only if no further input follows (e.g. a name run
    /// that may continue in the next chunk).
    Tentative { kind: Token, end: usize },
    /// The window is empty.
    Empty,
    /// The token is incomplete; supply more input.
    Partial,
    /// A multi-byte character is split at the window end.
    PartialChar,
    /// `at` is the offset of the offending unit.
    Invalid { at: usize },
}

/// The active encoding of a parser.
#[derive(Clone)]
pub(crate) enum Encoding {
    Utf8,
    Utf16Le,
    Utf16Be,
    Map(Rc<MapEncoding>),
}

impl fmt::Debug for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Encoding::Utf8 => f.write_str("Utf8"),
            Encoding::Utf16Le => f.write_str("Utf16Le"),
            Encoding::Utf16Be => f.write_str("Utf16Be"),
            Encoding::Map(_) => f.write_str("Map"),
        }
    }
}

macro_rules! dispatch {
    ($self:expr, $enc:ident => $body:expr) => {
        match $self {
            Encoding::Utf8 => {
                let $enc = &Utf8;
                $body
            }
            Encoding::Utf16Le => {
                let $enc = &Utf16Le;
                $body
            }
            Encoding::Utf16Be => {
                let $enc = &Utf16Be;
                $body
            }
            Encoding::Map(m) => {
                let $enc = m.as_ref();
                $body
            }
        }
    };
}

impl Encoding {
    pub(crate) fn min_bytes(&self) -> usize {
        match self {
            Encoding::Utf16Le | Encoding::Utf16Be => 2,
            _ => 1,
        }
    }

    /// True when spans need no conversion to the internal encoding.
    pub(crate) fn is_utf8(&self) -> bool {
        matches!(self, Encoding::Utf8)
    }

    pub(crate) fn prolog_token(&self, buf: &[u8], ptr: usize, end: usize) -> TokenResult {
        dispatch!(self, enc => scan::prolog_token(enc, buf, ptr, end))
    }

    pub(crate) fn content_token(&self, buf: &[u8], ptr: usize, end: usize) -> TokenResult {
        dispatch!(self, enc => scan::content_token(enc, buf, ptr, end))
    }

    pub(crate) fn cdata_section_token(
        &self,
        buf: &[u8],
        ptr: usize,
        end: usize,
    ) -> TokenResult {
        dispatch!(self, enc => scan::cdata_section_token(enc, buf, ptr, end))
    }

    pub(crate) fn attribute_value_token(
        &self,
        buf: &[u8],
        ptr: usize,
        end: usize,
    ) -> TokenResult {
        dispatch!(self, enc => scan::attribute_value_token(enc, buf, ptr, end))
    }

    pub(crate) fn entity_value_token(
        &self,
        buf: &[u8],
        ptr: usize,
        end: usize,
    ) -> TokenResult {
        dispatch!(self, enc => scan::entity_value_token(enc, buf, ptr, end))
    }

    pub(crate) fn ignore_section_token(
        &self,
        buf: &[u8],
        ptr: usize,
        end: usize,
    ) -> TokenResult {
        dispatch!(self, enc => scan::ignore_section_token(enc, buf, ptr, end))
    }

    pub(crate) fn get_attributes(
        &self,
        buf: &[u8],
        ptr: usize,
        end: usize,
        atts: &mut Vec<RawAttribute>,
    ) {
        dispatch!(self, enc => scan::get_attributes(enc, buf, ptr, end, atts))
    }

    pub(crate) fn name_length(&self, buf: &[u8], off: usize, end: usize) -> usize {
        dispatch!(self, enc => scan::name_length(enc, buf, off, end))
    }

    pub(crate) fn skip_whitespace(&self, buf: &[u8], off: usize, end: usize) -> usize {
        dispatch!(self, enc => scan::skip_whitespace(enc, buf, off, end))
    }

    pub(crate) fn name_matches_ascii(
        &self,
        buf: &[u8],
        start: usize,
        end: usize,
        keyword: &[u8],
    ) -> bool {
        dispatch!(self, enc => scan::name_matches_ascii(enc, buf, start, end, keyword))
    }

    pub(crate) fn convert(
        &self,
        buf: &[u8],
        start: usize,
        end: usize,
        out: &mut String,
    ) -> Result<(), ()> {
        if let Encoding::Utf8 = self {
            // runs are validated by the scanners; still fail soft
            match std::str::from_utf8(&buf[start..end]) {
                Ok(s) => {
                    out.push_str(s);
                    return Ok(());
                }
                Err(_) => return Err(()),
            }
        }
        dispatch!(self, enc => scan::convert(enc, buf, start, end, out))
    }

    pub(crate) fn check_public_id(
        &self,
        buf: &[u8],
        start: usize,
        end: usize,
    ) -> Result<(), usize> {
        dispatch!(self, enc => scan::check_public_id(enc, buf, start, end))
    }

    pub(crate) fn char_ref_value(&self, buf: &[u8], start: usize, end: usize) -> Option<char> {
        dispatch!(self, enc => scan::char_ref_value(enc, buf, start, end))
    }

    pub(crate) fn predefined_entity(
        &self,
        buf: &[u8],
        start: usize,
        end: usize,
    ) -> Option<char> {
        dispatch!(self, enc => scan::predefined_entity(enc, buf, start, end))
    }

    pub(crate) fn update_position(
        &self,
        buf: &[u8],
        start: usize,
        end: usize,
        pos: &mut Position,
    ) {
        dispatch!(self, enc => scan::update_position(enc, buf, start, end, pos))
    }

    pub(crate) fn parse_xml_decl(
        &self,
        buf: &[u8],
        start: usize,
        end: usize,
        is_text_decl: bool,
    ) -> Result<XmlDeclInfo, ()> {
        dispatch!(self, enc => scan::parse_xml_decl(enc, buf, start, end, is_text_decl))
    }
}

/// Outcome of sniffing the first bytes of a document.
#[derive(Clone, Debug)]
pub(crate) enum Detect {
    /// Not enough bytes yet to decide.
    NeedData,
    Chosen { encoding: Encoding, bom_len: usize },
}

/// Chooses the concrete encoding from the first bytes: `FE FF`/`FF FE`
/// are byte-order marks, `00 3C`/`3C 00` an unmarked UTF-16 `<`, and a
/// UTF-8 BOM is consumed as well; everything else is UTF-8.
pub(crate) fn detect_encoding(buf: &[u8], ptr: usize, end: usize, is_final: bool) -> Detect {
    let avail = end - ptr;
    if avail < 2 {
        return if is_final {
            Detect::Chosen {
                encoding: Encoding::Utf8,
                bom_len: 0,
            }
        } else {
            Detect::NeedData
        };
    }
    match (buf[ptr], buf[ptr + 1]) {
        (0xfe, 0xff) => Detect::Chosen {
            encoding: Encoding::Utf16Be,
            bom_len: 2,
        },
        (0xff, 0xfe) => Detect::Chosen {
            encoding: Encoding::Utf16Le,
            bom_len: 2,
        },
        (0x00, 0x3c) => Detect::Chosen {
            encoding: Encoding::Utf16Be,
            bom_len: 0,
        },
        (0x3c, 0x00) => Detect::Chosen {
            encoding: Encoding::Utf16Le,
            bom_len: 0,
        },
        (0xef, 0xbb) => {
            if avail < 3 {
                if is_final {
                    Detect::Chosen {
                        encoding: Encoding::Utf8,
                        bom_len: 0,
                    }
                } else {
                    Detect::NeedData
                }
            } else if buf[ptr + 2] == 0xbf {
                Detect::Chosen {
                    encoding: Encoding::Utf8,
                    bom_len: 3,
                }
            } else {
                Detect::Chosen {
                    encoding: Encoding::Utf8,
                    bom_len: 0,
                }
            }
        }
        _ => Detect::Chosen {
            encoding: Encoding::Utf8,
            bom_len: 0,
        },
    }
}

/// A recognized built-in encoding name.
pub(crate) enum KnownEncoding {
    Exact(Encoding),
    /// `UTF-16` proper: endianness comes from the byte-order mark,
    /// big-endian when unmarked.
    Utf16AnyEndian,
}

pub(crate) fn known_encoding(name: &str) -> Option<KnownEncoding> {
    let mut folded = name.to_ascii_lowercase();
    folded.retain(|c| c != ' ');
    match folded.as_str() {
        "utf-8" => Some(KnownEncoding::Exact(Encoding::Utf8)),
        "utf-16" => Some(KnownEncoding::Utf16AnyEndian),
        "utf-16le" => Some(KnownEncoding::Exact(Encoding::Utf16Le)),
        "utf-16be" => Some(KnownEncoding::Exact(Encoding::Utf16Be)),
        "iso-8859-1" => Some(KnownEncoding::Exact(Encoding::Map(Rc::new(
            MapEncoding::latin1(),
        )))),
        "us-ascii" => Some(KnownEncoding::Exact(Encoding::Map(Rc::new(
            MapEncoding::us_ascii(),
        )))),
        _ => None,
    }
}
