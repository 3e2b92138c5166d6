//! Document processor and push API.
//!
//! Drives the tokenizer through prolog, content and epilog, routes
//! prolog tokens through the role engine, dispatches handler events,
//! and carries the residual input buffer between `parse` calls. The
//! only state surviving a call is that buffer tail and the phase.

use std::mem;
use std::rc::Rc;

use crate::dtd::{
    AttributeId, DefaultAttribute, Dtd, ElementType, Entity, Prefix, PrefixRef,
    EXTERNAL_SUBSET_NAME,
};
use crate::error::XmlError;
use crate::handler::{Attribute, ExternalEntityReply, XmlHandler};
use crate::pool::{Name, StringPool};
use crate::position::Position;
use crate::prolog::{PrologState, Role};
use crate::tokenizer::{
    detect_encoding, known_encoding, Detect, Encoding, KnownEncoding, MapEncoding,
    RawAttribute, Token, TokenResult,
};

const INIT_BUFFER_SIZE: usize = 1024;
const CONTEXT_SEP: char = '\u{c}';
const IMPLICIT_CONTEXT: &str = "xml=http://www.w3.org/XML/1998/namespace";

/// When external parameter entities (including the external DTD
/// subset) are requested from the external-entity hook.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamEntityParsing {
    Never,
    UnlessStandalone,
    Always,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    PrologInit,
    Prolog,
    Content,
    CdataSection,
    IgnoreSection,
    Epilog,
    Error,
    ExternalEntityInit,
    ExternalEntityStart,
    ExternalParamInit,
}

enum Flow {
    /// Soft stop; input consumed up to the offset.
    Stop(usize),
    /// Phase switched; keep processing from the offset.
    Continue(usize),
    /// End of final input reached successfully.
    Done,
}

enum SectFlow {
    Closed(usize),
    Suspend(usize),
}

struct Tag {
    raw_name: Vec<u8>,
    name: String,
    bindings: Vec<usize>,
}

impl Tag {
    fn new() -> Tag {
        Tag {
            raw_name: Vec::new(),
            name: String::new(),
            bindings: Vec::new(),
        }
    }
}

struct Binding {
    prefix: PrefixRef,
    /// URI with the separator already appended.
    uri: String,
    /// URI length without the separator.
    uri_base_len: usize,
    /// Binding shadowed by this one.
    prev: Option<usize>,
}

#[derive(Clone, Copy, Debug)]
struct ErrorPosition {
    line: u64,
    column: u64,
    byte_index: u64,
}

#[derive(Clone, Debug)]
struct DeclEntityKey {
    is_param: bool,
    name: Name,
}

/// A streaming, push-style XML 1.0 parser delivering events to `H`.
pub struct XmlParser<H: XmlHandler> {
    handler: H,
    inner: Inner,
}

struct Inner {
    // configuration
    ns: bool,
    ns_sep: Option<char>,
    protocol_encoding: Option<String>,
    param_entity_parsing: ParamEntityParsing,
    default_expand_internal_entities: bool,
    base: Option<Rc<str>>,

    encoding: Encoding,

    phase: Phase,
    prolog: PrologState,
    group_connector: Vec<u8>,
    had_external_doctype: bool,
    is_param_entity_subparser: bool,
    subset_completed: bool,

    // content state
    tag_level: usize,
    start_tag_level: usize,
    tag_stack: Vec<Tag>,
    free_tags: Vec<Tag>,
    bindings: Vec<Binding>,
    free_bindings: Vec<usize>,
    inherited_bindings: Vec<usize>,
    n_specified_atts: usize,

    // declaration scratch
    decl_entity: Option<DeclEntityKey>,
    decl_element_type: Option<Name>,
    decl_attribute_id: Option<Name>,
    decl_attribute_is_cdata: bool,
    decl_notation_name: Option<Rc<str>>,
    decl_notation_public_id: Option<Rc<str>>,

    // scratch storage
    temp_pool: StringPool,
    temp2_pool: StringPool,
    raw_atts: Vec<RawAttribute>,
    app_atts: Vec<Attribute>,

    // buffered input
    buffer: Vec<u8>,
    buffer_start: usize,
    data_end: usize,
    parse_end_byte_index: u64,
    position: Position,

    // diagnostics
    error: Option<XmlError>,
    error_position: Option<ErrorPosition>,
    event_off: usize,

    dtd: Dtd,
    /// Context string applied (with events) at the first parse call of
    /// an external entity parser.
    pending_context: Option<String>,
}

impl<H: XmlHandler> XmlParser<H> {
    pub fn new(handler: H) -> XmlParser<H> {
        XmlParser {
            handler,
            inner: Inner::new(false, None),
        }
    }

    /// A namespace-aware parser: qualified names are reported as
    /// `URI<separator>local-part` and `xmlns` attributes become
    /// namespace events instead of attributes.
    pub fn namespace_aware(handler: H, separator: char) -> XmlParser<H> {
        let sep = if separator == '\0' {
            None
        } else {
            Some(separator)
        };
        let mut inner = Inner::new(true, sep);
        inner.set_context_quiet(IMPLICIT_CONTEXT);
        XmlParser { handler, inner }
    }

    /// Overrides encoding auto-detection; effective from the start of
    /// the parse.
    pub fn set_encoding(&mut self, name: Option<&str>) {
        self.inner.protocol_encoding = name.map(str::to_string);
    }

    pub fn set_param_entity_parsing(&mut self, parsing: ParamEntityParsing) {
        self.inner.param_entity_parsing = parsing;
    }

    /// Base URI reported with entity system identifiers.
    pub fn set_base(&mut self, base: Option<&str>) {
        self.inner.base = base.map(Rc::from);
    }

    /// When disabled, references to internal entities in content are
    /// handed to `default_data` unexpanded.
    pub fn set_default_expand_internal_entities(&mut self, expand: bool) {
        self.inner.default_expand_internal_entities = expand;
    }

    /// Pushes a chunk of the document. With `is_final` false the call
    /// may leave an incomplete token buffered for the next chunk.
    pub fn parse(&mut self, input: &[u8], is_final: bool) -> Result<(), XmlError> {
        let XmlParser { handler, inner } = self;
        inner.feed(handler, input, is_final)
    }

    /// A writable region of at least `len` bytes to be filled before
    /// calling [`XmlParser::parse_buffer`].
    pub fn get_buffer(&mut self, len: usize) -> Result<&mut [u8], XmlError> {
        self.inner.get_buffer(len)
    }

    /// Parses `len` bytes previously written into
    /// [`XmlParser::get_buffer`].
    pub fn parse_buffer(&mut self, len: usize, is_final: bool) -> Result<(), XmlError> {
        let XmlParser { handler, inner } = self;
        inner.parse_buffer(handler, len, is_final)
    }

    /// Creates a parser for an external parsed entity, inheriting this
    /// parser's declarations and the given context string.
    pub fn external_entity_parser<H2: XmlHandler>(
        &self,
        mut handler: H2,
        context: &str,
        encoding: Option<&str>,
    ) -> XmlParser<H2> {
        let mut inner = self
            .inner
            .make_external_entity_inner(context.to_string(), encoding.map(str::to_string));
        inner.apply_context(&mut handler);
        XmlParser { handler, inner }
    }

    pub fn error_code(&self) -> Option<XmlError> {
        self.inner.error
    }

    /// One-based line of the latched error, or of the next unparsed
    /// byte.
    pub fn line_number(&self) -> u64 {
        match self.inner.error_position {
            Some(p) => p.line + 1,
            None => self.inner.position.line + 1,
        }
    }

    /// Zero-based column of the latched error, or of the next
    /// unparsed byte.
    pub fn column_number(&self) -> u64 {
        match self.inner.error_position {
            Some(p) => p.column,
            None => self.inner.position.column,
        }
    }

    pub fn byte_index(&self) -> u64 {
        match self.inner.error_position {
            Some(p) => p.byte_index,
            None => {
                let pending = (self.inner.data_end - self.inner.buffer_start) as u64;
                self.inner.parse_end_byte_index - pending
            }
        }
    }

    /// Number of attributes of the last start tag that were written
    /// out, as opposed to defaulted.
    pub fn specified_attribute_count(&self) -> usize {
        self.inner.n_specified_atts
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn into_handler(self) -> H {
        self.handler
    }
}

impl Inner {
    fn new(ns: bool, ns_sep: Option<char>) -> Inner {
        Inner {
            ns,
            ns_sep,
            protocol_encoding: None,
            param_entity_parsing: ParamEntityParsing::Never,
            default_expand_internal_entities: true,
            base: None,
            encoding: Encoding::Utf8,
            phase: Phase::PrologInit,
            prolog: PrologState::new(),
            group_connector: Vec::new(),
            had_external_doctype: false,
            is_param_entity_subparser: false,
            subset_completed: false,
            tag_level: 0,
            start_tag_level: 0,
            tag_stack: Vec::new(),
            free_tags: Vec::new(),
            bindings: Vec::new(),
            free_bindings: Vec::new(),
            inherited_bindings: Vec::new(),
            n_specified_atts: 0,
            decl_entity: None,
            decl_element_type: None,
            decl_attribute_id: None,
            decl_attribute_is_cdata: false,
            decl_notation_name: None,
            decl_notation_public_id: None,
            temp_pool: StringPool::new(),
            temp2_pool: StringPool::new(),
            raw_atts: Vec::new(),
            app_atts: Vec::new(),
            buffer: Vec::new(),
            buffer_start: 0,
            data_end: 0,
            parse_end_byte_index: 0,
            position: Position::default(),
            error: None,
            error_position: None,
            event_off: 0,
            dtd: Dtd::new(),
            pending_context: None,
        }
    }

    fn make_external_entity_inner(
        &self,
        context: String,
        encoding: Option<String>,
    ) -> Inner {
        let mut inner = Inner::new(self.ns, self.ns_sep);
        inner.protocol_encoding = encoding.or_else(|| self.protocol_encoding.clone());
        inner.param_entity_parsing = self.param_entity_parsing;
        inner.default_expand_internal_entities = self.default_expand_internal_entities;
        inner.base = self.base.clone();
        inner.dtd = self.dtd.copied();
        inner.phase = Phase::ExternalEntityInit;
        inner.pending_context = Some(context);
        inner
    }

    fn make_external_param_inner(&self, encoding: Option<String>) -> Inner {
        let mut inner = Inner::new(self.ns, self.ns_sep);
        inner.protocol_encoding = encoding;
        inner.param_entity_parsing = self.param_entity_parsing;
        inner.default_expand_internal_entities = self.default_expand_internal_entities;
        inner.base = self.base.clone();
        inner.phase = Phase::ExternalParamInit;
        inner.prolog = PrologState::new_external_subset();
        inner.is_param_entity_subparser = true;
        inner
    }

    fn apply_context<H: XmlHandler>(&mut self, h: &mut H) {
        if let Some(context) = self.pending_context.take() {
            self.set_context(h, &context);
        }
    }

    // input plumbing

    fn feed<H: XmlHandler>(
        &mut self,
        h: &mut H,
        input: &[u8],
        is_final: bool,
    ) -> Result<(), XmlError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        self.apply_context(h);
        if input.is_empty() {
            if !is_final {
                return Ok(());
            }
            let (start, end) = (self.buffer_start, self.data_end);
            let buf = mem::take(&mut self.buffer);
            let result = self.run_window(h, &buf, start, end, false);
            self.buffer = buf;
            self.buffer_start = self.data_end;
            result.map(|_| ())
        } else if self.buffer_start == self.data_end {
            // the buffer is drained; parse the caller's bytes in place
            self.parse_end_byte_index = self
                .parse_end_byte_index
                .checked_add(input.len() as u64)
                .ok_or(XmlError::NoMemory)?;
            if is_final {
                self.run_window(h, input, 0, input.len(), false)?;
                return Ok(());
            }
            let consumed = self.run_window(h, input, 0, input.len(), true)?;
            self.buffer.clear();
            self.buffer_start = 0;
            self.buffer.extend_from_slice(&input[consumed..]);
            self.data_end = self.buffer.len();
            Ok(())
        } else {
            self.get_buffer(input.len())?.copy_from_slice(input);
            self.parse_buffer(h, input.len(), is_final)
        }
    }

    fn get_buffer(&mut self, len: usize) -> Result<&mut [u8], XmlError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        if self.buffer_start > 0 {
            self.buffer.drain(..self.buffer_start);
            self.data_end -= self.buffer_start;
            self.buffer_start = 0;
        }
        self.buffer.truncate(self.data_end);
        let needed = self
            .data_end
            .checked_add(len)
            .ok_or(XmlError::NoMemory)?;
        if needed > self.buffer.capacity() {
            let mut size = self.buffer.capacity().max(INIT_BUFFER_SIZE);
            while size < needed {
                size = size.checked_mul(2).ok_or(XmlError::NoMemory)?;
            }
            self.buffer
                .try_reserve(size - self.buffer.len())
                .map_err(|_| XmlError::NoMemory)?;
        }
        self.buffer.resize(needed, 0);
        Ok(&mut self.buffer[self.data_end..])
    }

    fn parse_buffer<H: XmlHandler>(
        &mut self,
        h: &mut H,
        len: usize,
        is_final: bool,
    ) -> Result<(), XmlError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        self.apply_context(h);
        let new_end = self.data_end.checked_add(len).ok_or(XmlError::NoMemory)?;
        if new_end > self.buffer.len() {
            return Err(XmlError::NoMemory);
        }
        self.data_end = new_end;
        self.parse_end_byte_index = self
            .parse_end_byte_index
            .checked_add(len as u64)
            .ok_or(XmlError::NoMemory)?;
        let (start, end) = (self.buffer_start, self.data_end);
        let buf = mem::take(&mut self.buffer);
        let result = self.run_window(h, &buf, start, end, !is_final);
        self.buffer = buf;
        match result {
            Ok(consumed) => {
                self.buffer_start = consumed;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Processes one window, updating position on success and latching
    /// the error position on failure.
    fn run_window<H: XmlHandler>(
        &mut self,
        h: &mut H,
        buf: &[u8],
        start: usize,
        end: usize,
        soft: bool,
    ) -> Result<usize, XmlError> {
        self.event_off = start;
        match self.process_window(h, buf, start, end, soft) {
            Ok(consumed) => {
                let enc = self.encoding.clone();
                enc.update_position(buf, start, consumed, &mut self.position);
                Ok(consumed)
            }
            Err(code) => {
                let mut pos = self.position;
                let err_off = self.event_off.min(end);
                let enc = self.encoding.clone();
                enc.update_position(buf, start, err_off, &mut pos);
                self.error_position = Some(ErrorPosition {
                    line: pos.line,
                    column: pos.column,
                    byte_index: self.parse_end_byte_index - (end - err_off) as u64,
                });
                self.error = Some(code);
                self.phase = Phase::Error;
                Err(code)
            }
        }
    }

    fn process_window<H: XmlHandler>(
        &mut self,
        h: &mut H,
        buf: &[u8],
        start: usize,
        end: usize,
        soft: bool,
    ) -> Result<usize, XmlError> {
        let mut s = start;
        loop {
            let flow = match self.phase {
                Phase::PrologInit => {
                    match self.initialize_encoding(h, buf, s, end, soft)? {
                        Some(next) => {
                            self.phase = Phase::Prolog;
                            Flow::Continue(next)
                        }
                        None => Flow::Stop(s),
                    }
                }
                Phase::ExternalParamInit => {
                    match self.initialize_encoding(h, buf, s, end, soft)? {
                        Some(next) => {
                            self.phase = Phase::Prolog;
                            Flow::Continue(next)
                        }
                        None => Flow::Stop(s),
                    }
                }
                Phase::ExternalEntityInit => {
                    match self.initialize_encoding(h, buf, s, end, soft)? {
                        Some(next) => {
                            self.phase = Phase::ExternalEntityStart;
                            Flow::Continue(next)
                        }
                        None => Flow::Stop(s),
                    }
                }
                Phase::ExternalEntityStart => self.external_entity_start(h, buf, s, end, soft)?,
                Phase::Prolog => {
                    let enc = self.encoding.clone();
                    self.do_prolog(h, &enc, buf, s, end, soft, true)?
                }
                Phase::Content => {
                    let enc = self.encoding.clone();
                    let level = self.start_tag_level;
                    self.do_content(h, &enc, buf, s, end, soft, true, level)?
                }
                Phase::CdataSection => {
                    let enc = self.encoding.clone();
                    match self.do_cdata_section(h, &enc, buf, s, end, soft, true)? {
                        SectFlow::Closed(next) => {
                            self.phase = Phase::Content;
                            Flow::Continue(next)
                        }
                        SectFlow::Suspend(at) => Flow::Stop(at),
                    }
                }
                Phase::IgnoreSection => {
                    let enc = self.encoding.clone();
                    match self.do_ignore_section(h, &enc, buf, s, end, soft, true)? {
                        SectFlow::Closed(next) => {
                            self.phase = Phase::Prolog;
                            Flow::Continue(next)
                        }
                        SectFlow::Suspend(at) => Flow::Stop(at),
                    }
                }
                Phase::Epilog => self.do_epilog(h, buf, s, end, soft)?,
                Phase::Error => {
                    return Err(self.error.unwrap_or(XmlError::InvalidToken));
                }
            };
            match flow {
                Flow::Stop(at) => return Ok(at),
                Flow::Continue(at) => s = at,
                Flow::Done => return Ok(end),
            }
        }
    }

    // encoding initialization

    /// Returns the offset content starts at, or `None` when more
    /// bytes are needed for detection.
    fn initialize_encoding<H: XmlHandler>(
        &mut self,
        h: &mut H,
        buf: &[u8],
        s: usize,
        end: usize,
        soft: bool,
    ) -> Result<Option<usize>, XmlError> {
        if let Some(name) = self.protocol_encoding.clone() {
            let encoding = match known_encoding(&name) {
                Some(KnownEncoding::Exact(e)) => e,
                Some(KnownEncoding::Utf16AnyEndian) => {
                    if end - s < 2 {
                        if soft {
                            return Ok(None);
                        }
                        Encoding::Utf16Be
                    } else {
                        match (buf[s], buf[s + 1]) {
                            (0xff, 0xfe) => Encoding::Utf16Le,
                            _ => Encoding::Utf16Be,
                        }
                    }
                }
                None => self.resolve_map_encoding(h, &name, s)?,
            };
            self.encoding = encoding;
            // a byte-order mark is consumed, never reported
            let mut at = s;
            let bom: &[u8] = match self.encoding {
                Encoding::Utf16Le => &[0xff, 0xfe],
                Encoding::Utf16Be => &[0xfe, 0xff],
                Encoding::Utf8 => &[0xef, 0xbb, 0xbf],
                Encoding::Map(_) => &[],
            };
            let avail = &buf[at..end];
            if avail.len() >= bom.len() {
                if !bom.is_empty() && &avail[..bom.len()] == bom {
                    at += bom.len();
                }
            } else if soft && avail == &bom[..avail.len()] {
                // the mark may be split across chunks
                return Ok(None);
            }
            return Ok(Some(at));
        }
        match detect_encoding(buf, s, end, !soft) {
            Detect::NeedData => Ok(None),
            Detect::Chosen { encoding, bom_len } => {
                self.encoding = encoding;
                Ok(Some(s + bom_len))
            }
        }
    }

    fn resolve_map_encoding<H: XmlHandler>(
        &mut self,
        h: &mut H,
        name: &str,
        event: usize,
    ) -> Result<Encoding, XmlError> {
        #[cfg(feature = "encoding")]
        {
            if let Some(map) = MapEncoding::from_label(name) {
                return Ok(Encoding::Map(Rc::new(map)));
            }
        }
        if let Some(info) = h.unknown_encoding(name) {
            if let Some(map) = MapEncoding::from_map(info.map()) {
                return Ok(Encoding::Map(Rc::new(map)));
            }
        }
        self.event_off = event;
        Err(XmlError::UnknownEncoding)
    }

    fn process_xml_decl<H: XmlHandler>(
        &mut self,
        h: &mut H,
        enc: &Encoding,
        buf: &[u8],
        s: usize,
        next: usize,
        is_text_decl: bool,
        is_main: bool,
    ) -> Result<(), XmlError> {
        let info = match enc.parse_xml_decl(buf, s, next, is_text_decl) {
            Ok(info) => info,
            Err(()) => {
                self.set_event(is_main, s);
                return Err(XmlError::Syntax);
            }
        };
        if !is_text_decl && info.standalone == Some(true) {
            self.dtd.standalone = true;
            if self.param_entity_parsing == ParamEntityParsing::UnlessStandalone {
                self.param_entity_parsing = ParamEntityParsing::Never;
            }
        }
        self.report_default(h, enc, buf, s, next);
        if self.protocol_encoding.is_none() && is_main {
            if let Some(name) = info.encoding {
                let new_encoding = match known_encoding(&name) {
                    Some(KnownEncoding::Exact(e)) => Some(e),
                    Some(KnownEncoding::Utf16AnyEndian) => {
                        // keep the endianness chosen from the first bytes
                        if self.encoding.min_bytes() != 2 {
                            self.set_event(is_main, s);
                            return Err(XmlError::IncorrectEncoding);
                        }
                        None
                    }
                    None => Some(self.resolve_map_encoding(h, &name, s)?),
                };
                if let Some(e) = new_encoding {
                    if e.min_bytes() != self.encoding.min_bytes() {
                        self.set_event(is_main, s);
                        return Err(XmlError::IncorrectEncoding);
                    }
                    self.encoding = e;
                }
            }
        }
        Ok(())
    }

    // helpers

    #[inline]
    fn set_event(&mut self, is_main: bool, off: usize) {
        if is_main {
            self.event_off = off;
        }
    }

    fn report_default<H: XmlHandler>(
        &mut self,
        h: &mut H,
        enc: &Encoding,
        buf: &[u8],
        start: usize,
        end: usize,
    ) {
        self.temp2_pool.discard();
        if self
            .temp2_pool
            .append(enc, buf, start, end)
            .is_ok()
        {
            h.default_data(self.temp2_pool.current());
        }
        self.temp2_pool.discard();
    }

    fn convert_to_string(
        &mut self,
        enc: &Encoding,
        buf: &[u8],
        start: usize,
        end: usize,
        is_main: bool,
    ) -> Result<String, XmlError> {
        let mut out = String::new();
        match enc.convert(buf, start, end, &mut out) {
            Ok(()) => Ok(out),
            Err(()) => {
                self.set_event(is_main, start);
                Err(XmlError::InvalidToken)
            }
        }
    }

    // prolog

    #[allow(clippy::too_many_arguments)]
    fn do_prolog<H: XmlHandler>(
        &mut self,
        h: &mut H,
        enc: &Encoding,
        buf: &[u8],
        start: usize,
        end: usize,
        soft: bool,
        is_main: bool,
    ) -> Result<Flow, XmlError> {
        let mut enc = enc.clone();
        let mut s = start;
        loop {
            self.set_event(is_main, s);
            let (tok, next) = match enc.prolog_token(buf, s, end) {
                TokenResult::Token { kind, end } => (kind, end),
                TokenResult::Tentative { kind, end } => {
                    if soft && is_main {
                        return Ok(Flow::Stop(s));
                    }
                    (kind, end)
                }
                TokenResult::Empty => {
                    if soft && is_main {
                        return Ok(Flow::Stop(s));
                    }
                    if !is_main {
                        return Ok(Flow::Done);
                    }
                    if self.is_param_entity_subparser {
                        if !self.prolog.eof_allowed() {
                            return Err(XmlError::Syntax);
                        }
                        self.subset_completed = true;
                        return Ok(Flow::Done);
                    }
                    return Err(XmlError::NoElements);
                }
                TokenResult::Partial => {
                    if soft && is_main {
                        return Ok(Flow::Stop(s));
                    }
                    return Err(XmlError::UnclosedToken);
                }
                TokenResult::PartialChar => {
                    if soft && is_main {
                        return Ok(Flow::Stop(s));
                    }
                    return Err(XmlError::PartialChar);
                }
                TokenResult::Invalid { at } => {
                    self.set_event(is_main, at);
                    return Err(XmlError::InvalidToken);
                }
            };
            let role = self.prolog.token_role(tok, &enc, buf, s, next);
            match role {
                Role::XmlDecl => {
                    let text_decl = self.is_param_entity_subparser;
                    self.process_xml_decl(h, &enc, buf, s, next, text_decl, is_main)?;
                    if is_main {
                        enc = self.encoding.clone();
                    }
                }
                Role::InstanceStart => {
                    self.phase = Phase::Content;
                    return Ok(Flow::Continue(s));
                }
                Role::DoctypeName => {
                    let name = self.convert_to_string(&enc, buf, s, next, is_main)?;
                    h.start_doctype(&name);
                }
                Role::DoctypeClose => {
                    if self.dtd.complete && self.had_external_doctype {
                        self.request_external_subset(h, is_main)?;
                        if !self.dtd.complete
                            && !self.dtd.standalone
                            && !h.not_standalone()
                        {
                            self.set_event(is_main, s);
                            return Err(XmlError::NotStandalone);
                        }
                    }
                    h.end_doctype();
                }
                Role::DoctypeSystemId => {
                    if !self.dtd.standalone
                        && self.param_entity_parsing == ParamEntityParsing::Never
                        && !h.not_standalone()
                    {
                        self.set_event(is_main, s);
                        return Err(XmlError::NotStandalone);
                    }
                    self.had_external_doctype = true;
                    if self.decl_entity.is_none() {
                        let name = self
                            .dtd
                            .param_entities
                            .entry(EXTERNAL_SUBSET_NAME, Entity::new)
                            .name
                            .clone();
                        self.decl_entity = Some(DeclEntityKey {
                            is_param: true,
                            name,
                        });
                    }
                    self.store_entity_system_id(&enc, buf, s, next, is_main)?;
                }
                Role::EntitySystemId => {
                    self.store_entity_system_id(&enc, buf, s, next, is_main)?;
                }
                Role::DoctypePublicId => {
                    let name = self
                        .dtd
                        .param_entities
                        .entry(EXTERNAL_SUBSET_NAME, Entity::new)
                        .name
                        .clone();
                    self.decl_entity = Some(DeclEntityKey {
                        is_param: true,
                        name,
                    });
                    self.store_entity_public_id(&enc, buf, s, next, is_main)?;
                }
                Role::EntityPublicId => {
                    self.store_entity_public_id(&enc, buf, s, next, is_main)?;
                }
                Role::GeneralEntityName => {
                    let name = self.convert_to_string(&enc, buf, s, next, is_main)?;
                    if self.dtd.complete && self.dtd.general_entities.get(&name).is_none()
                    {
                        let name = self
                            .dtd
                            .general_entities
                            .entry(&name, Entity::new)
                            .name
                            .clone();
                        self.decl_entity = Some(DeclEntityKey {
                            is_param: false,
                            name,
                        });
                    } else {
                        self.decl_entity = None;
                    }
                }
                Role::ParamEntityName => {
                    let name = self.convert_to_string(&enc, buf, s, next, is_main)?;
                    if self.dtd.complete && self.dtd.param_entities.get(&name).is_none() {
                        let name = self
                            .dtd
                            .param_entities
                            .entry(&name, Entity::new)
                            .name
                            .clone();
                        self.decl_entity = Some(DeclEntityKey {
                            is_param: true,
                            name,
                        });
                    } else {
                        self.decl_entity = None;
                    }
                }
                Role::EntityValue => {
                    let mb = enc.min_bytes();
                    self.dtd.pool.discard();
                    let result =
                        self.store_entity_value(&enc, buf, s + mb, next - mb, is_main);
                    if let Some(key) = self.decl_entity.clone() {
                        let text: Rc<str> = Rc::from(self.dtd.pool.take().as_str());
                        if let Some(e) = self.lookup_decl_entity(&key) {
                            if e.text.is_none() && e.system_id.is_none() {
                                e.text = Some(text);
                            }
                        }
                    } else {
                        self.dtd.pool.discard();
                    }
                    result?;
                }
                Role::EntityNotationName => {
                    let notation = self.convert_to_string(&enc, buf, s, next, is_main)?;
                    if let Some(key) = self.decl_entity.clone() {
                        let notation: Rc<str> = Rc::from(notation.as_str());
                        let mut report = None;
                        if let Some(e) = self.lookup_decl_entity(&key) {
                            e.notation = Some(notation.clone());
                            report = Some((
                                e.name.clone(),
                                e.base.clone(),
                                e.system_id.clone(),
                                e.public_id.clone(),
                            ));
                        }
                        if let Some((name, base, system_id, public_id)) = report {
                            if let Some(system_id) = system_id {
                                h.unparsed_entity_decl(
                                    &name,
                                    base.as_deref(),
                                    &system_id,
                                    public_id.as_deref(),
                                    &notation,
                                );
                            }
                        }
                    }
                }
                Role::NotationName => {
                    let name = self.convert_to_string(&enc, buf, s, next, is_main)?;
                    self.decl_notation_name = Some(Rc::from(name.as_str()));
                    self.decl_notation_public_id = None;
                }
                Role::NotationPublicId => {
                    let mb = enc.min_bytes();
                    if let Err(at) = enc.check_public_id(buf, s + mb, next - mb) {
                        self.set_event(is_main, at);
                        return Err(XmlError::Syntax);
                    }
                    let mut text =
                        self.convert_to_string(&enc, buf, s + mb, next - mb, is_main)?;
                    normalize_public_id(&mut text);
                    self.decl_notation_public_id = Some(Rc::from(text.as_str()));
                }
                Role::NotationSystemId => {
                    let mb = enc.min_bytes();
                    let system_id =
                        self.convert_to_string(&enc, buf, s + mb, next - mb, is_main)?;
                    if let Some(name) = self.decl_notation_name.take() {
                        h.notation_decl(
                            &name,
                            self.base.as_deref(),
                            Some(&system_id),
                            self.decl_notation_public_id.take().as_deref(),
                        );
                    }
                }
                Role::AttlistElementName => {
                    let name = self.convert_to_string(&enc, buf, s, next, is_main)?;
                    let fresh = self.dtd.element_types.get(&name).is_none();
                    let name = self
                        .dtd
                        .element_types
                        .entry(&name, ElementType::new)
                        .name
                        .clone();
                    if fresh && self.ns {
                        self.set_element_type_prefix(&name);
                    }
                    self.decl_element_type = Some(name);
                }
                Role::AttributeName => {
                    let name = self.convert_to_string(&enc, buf, s, next, is_main)?;
                    let id = self.get_attribute_id(&name);
                    self.decl_attribute_id = Some(id);
                    self.decl_attribute_is_cdata = false;
                }
                Role::AttributeTypeCdata => {
                    self.decl_attribute_is_cdata = true;
                }
                Role::ImpliedAttributeValue | Role::RequiredAttributeValue => {
                    self.define_decl_attribute(None);
                }
                Role::DefaultAttributeValue | Role::FixedAttributeValue => {
                    let mb = enc.min_bytes();
                    let is_cdata = self.decl_attribute_is_cdata;
                    self.dtd.pool.discard();
                    self.store_attribute_value(
                        &enc,
                        buf,
                        s + mb,
                        next - mb,
                        is_cdata,
                        true,
                        is_main,
                    )?;
                    let value: Rc<str> = Rc::from(self.dtd.pool.take().as_str());
                    self.define_decl_attribute(Some(value));
                }
                Role::ParamEntityRef | Role::InnerParamEntityRef => {
                    let mb = enc.min_bytes();
                    let handled = self.handle_param_entity_ref(
                        h,
                        &enc,
                        buf,
                        s + mb,
                        next - mb,
                        role == Role::InnerParamEntityRef,
                        is_main,
                        s,
                    )?;
                    if !handled {
                        if !self.dtd.standalone && !h.not_standalone() {
                            self.set_event(is_main, s);
                            return Err(XmlError::NotStandalone);
                        }
                        self.dtd.complete = false;
                        self.report_default(h, &enc, buf, s, next);
                    }
                }
                Role::GroupOpen => {
                    let level = self.prolog.level;
                    if self.group_connector.len() <= level {
                        self.group_connector.resize(level + 1, 0);
                    }
                    self.group_connector[level] = 0;
                }
                Role::GroupSequence => {
                    let level = self.prolog.level;
                    if self.group_connector.get(level).copied() == Some(b'|') {
                        self.set_event(is_main, s);
                        return Err(XmlError::Syntax);
                    }
                    if let Some(slot) = self.group_connector.get_mut(level) {
                        *slot = b',';
                    }
                }
                Role::GroupChoice => {
                    let level = self.prolog.level;
                    if self.group_connector.get(level).copied() == Some(b',') {
                        self.set_event(is_main, s);
                        return Err(XmlError::Syntax);
                    }
                    if let Some(slot) = self.group_connector.get_mut(level) {
                        *slot = b'|';
                    }
                }
                Role::IgnoreSect => {
                    self.report_default(h, &enc, buf, s, next);
                    match self.do_ignore_section(h, &enc, buf, next, end, soft, is_main)? {
                        SectFlow::Closed(after) => {
                            s = after;
                            continue;
                        }
                        SectFlow::Suspend(at) => {
                            self.phase = Phase::IgnoreSection;
                            return Ok(Flow::Stop(at));
                        }
                    }
                }
                Role::Error => {
                    self.set_event(is_main, s);
                    return Err(match tok {
                        Token::ParamEntityRef => XmlError::ParamEntityRef,
                        Token::XmlDecl => XmlError::MisplacedXmlPi,
                        _ => XmlError::Syntax,
                    });
                }
                Role::None => match tok {
                    Token::Pi => self.report_pi(h, &enc, buf, s, next, is_main)?,
                    Token::Comment => self.report_comment(h, &enc, buf, s, next, is_main)?,
                    Token::DeclClose => {
                        // a public-id-only notation ends here
                        if let Some(name) = self.decl_notation_name.take() {
                            if let Some(public_id) = self.decl_notation_public_id.take()
                            {
                                h.notation_decl(
                                    &name,
                                    self.base.as_deref(),
                                    None,
                                    Some(&public_id),
                                );
                            }
                        }
                        self.report_default(h, &enc, buf, s, next);
                    }
                    _ => self.report_default(h, &enc, buf, s, next),
                },
            }
            // raw text of tokens without a dedicated event
            match role {
                Role::None | Role::Error | Role::IgnoreSect => {}
                _ => match tok {
                    Token::Pi | Token::Comment | Token::XmlDecl | Token::ParamEntityRef => {}
                    _ => self.report_default(h, &enc, buf, s, next),
                },
            }
            s = next;
        }
    }

    fn lookup_decl_entity(&mut self, key: &DeclEntityKey) -> Option<&mut Entity> {
        if key.is_param {
            self.dtd.param_entities.get_mut(&key.name)
        } else {
            self.dtd.general_entities.get_mut(&key.name)
        }
    }

    fn store_entity_system_id(
        &mut self,
        enc: &Encoding,
        buf: &[u8],
        s: usize,
        next: usize,
        is_main: bool,
    ) -> Result<(), XmlError> {
        let mb = enc.min_bytes();
        let system_id = self.convert_to_string(enc, buf, s + mb, next - mb, is_main)?;
        let base = self.base.clone();
        if let Some(key) = self.decl_entity.clone() {
            if let Some(e) = self.lookup_decl_entity(&key) {
                e.system_id = Some(Rc::from(system_id.as_str()));
                e.base = base;
            }
        }
        Ok(())
    }

    fn store_entity_public_id(
        &mut self,
        enc: &Encoding,
        buf: &[u8],
        s: usize,
        next: usize,
        is_main: bool,
    ) -> Result<(), XmlError> {
        let mb = enc.min_bytes();
        if let Err(at) = enc.check_public_id(buf, s + mb, next - mb) {
            self.set_event(is_main, at);
            return Err(XmlError::Syntax);
        }
        let mut public_id = self.convert_to_string(enc, buf, s + mb, next - mb, is_main)?;
        normalize_public_id(&mut public_id);
        if let Some(key) = self.decl_entity.clone() {
            if let Some(e) = self.lookup_decl_entity(&key) {
                e.public_id = Some(Rc::from(public_id.as_str()));
            }
        }
        Ok(())
    }

    fn define_decl_attribute(&mut self, value: Option<Rc<str>>) {
        let is_cdata = self.decl_attribute_is_cdata;
        if !self.dtd.complete {
            return;
        }
        let id_name = match &self.decl_attribute_id {
            Some(id) => id.clone(),
            None => return,
        };
        if !is_cdata {
            if let Some(id) = self.dtd.attribute_ids.get_mut(&id_name) {
                id.maybe_tokenized = true;
            }
        }
        if let Some(et_name) = self.decl_element_type.clone() {
            if let Some(et) = self.dtd.element_types.get_mut(&et_name) {
                et.define_attribute(&id_name, is_cdata, value);
            }
        }
    }

    /// Handles a parameter entity reference; returns true when it was
    /// fully processed (expanded or parsed).
    #[allow(clippy::too_many_arguments)]
    fn handle_param_entity_ref<H: XmlHandler>(
        &mut self,
        h: &mut H,
        enc: &Encoding,
        buf: &[u8],
        name_start: usize,
        name_end: usize,
        inner_ref: bool,
        is_main: bool,
        event: usize,
    ) -> Result<bool, XmlError> {
        let active = self.param_entity_parsing != ParamEntityParsing::Never;
        if !active || !(self.dtd.complete || inner_ref) {
            return Ok(false);
        }
        let name = self.convert_to_string(enc, buf, name_start, name_end, is_main)?;
        let entity = match self.dtd.param_entities.get(&name) {
            Some(e) => e,
            None => {
                self.set_event(is_main, event);
                return Err(XmlError::UndefinedEntity);
            }
        };
        if entity.open {
            self.set_event(is_main, event);
            return Err(XmlError::RecursiveEntityRef);
        }
        if let Some(text) = entity.text.clone() {
            if let Some(e) = self.dtd.param_entities.get_mut(&name) {
                e.open = true;
            }
            let result =
                self.do_prolog(h, &Encoding::Utf8, text.as_bytes(), 0, text.len(), false, false);
            if let Some(e) = self.dtd.param_entities.get_mut(&name) {
                e.open = false;
            }
            result?;
            return Ok(true);
        }
        if inner_ref {
            self.set_event(is_main, event);
            return Err(XmlError::ParamEntityRef);
        }
        let (base, system_id, public_id) = {
            let e = self.dtd.param_entities.get(&name);
            match e {
                Some(e) => (e.base.clone(), e.system_id.clone(), e.public_id.clone()),
                None => (None, None, None),
            }
        };
        self.dtd.complete = false;
        if let Some(e) = self.dtd.param_entities.get_mut(&name) {
            e.open = true;
        }
        let reply =
            h.external_entity_ref(None, base.as_deref(), system_id.as_deref(), public_id.as_deref());
        if let Some(e) = self.dtd.param_entities.get_mut(&name) {
            e.open = false;
        }
        match reply {
            ExternalEntityReply::Refuse => {
                self.set_event(is_main, event);
                Err(XmlError::ExternalEntityHandling)
            }
            ExternalEntityReply::Skip => Ok(false),
            ExternalEntityReply::Parse { text, encoding } => {
                self.run_external_subset(h, &text, encoding, is_main, event)?;
                Ok(self.dtd.complete)
            }
        }
    }

    /// Requests the external DTD subset at doctype close.
    fn request_external_subset<H: XmlHandler>(
        &mut self,
        h: &mut H,
        is_main: bool,
    ) -> Result<(), XmlError> {
        self.dtd.complete = false;
        if self.param_entity_parsing == ParamEntityParsing::Never {
            return Ok(());
        }
        let (base, system_id, public_id) =
            match self.dtd.param_entities.get(EXTERNAL_SUBSET_NAME) {
                Some(e) => (e.base.clone(), e.system_id.clone(), e.public_id.clone()),
                None => return Ok(()),
            };
        let reply =
            h.external_entity_ref(None, base.as_deref(), system_id.as_deref(), public_id.as_deref());
        match reply {
            ExternalEntityReply::Refuse => Err(XmlError::ExternalEntityHandling),
            ExternalEntityReply::Skip => Ok(()),
            ExternalEntityReply::Parse { text, encoding } => {
                self.run_external_subset(h, &text, encoding, is_main, self.event_off)
            }
        }
    }

    fn run_external_subset<H: XmlHandler>(
        &mut self,
        h: &mut H,
        text: &[u8],
        encoding: Option<String>,
        is_main: bool,
        event: usize,
    ) -> Result<(), XmlError> {
        let mut sub = self.make_external_param_inner(encoding);
        mem::swap(&mut sub.dtd, &mut self.dtd);
        sub.dtd.complete = true;
        let result = sub.feed(h, text, true);
        let completed = sub.subset_completed;
        mem::swap(&mut sub.dtd, &mut self.dtd);
        self.dtd.complete = completed;
        if result.is_err() {
            self.set_event(is_main, event);
            return Err(XmlError::ExternalEntityHandling);
        }
        Ok(())
    }

    fn store_entity_value(
        &mut self,
        enc: &Encoding,
        buf: &[u8],
        start: usize,
        end: usize,
        is_main: bool,
    ) -> Result<(), XmlError> {
        let mb = enc.min_bytes();
        let mut s = start;
        loop {
            match enc.entity_value_token(buf, s, end) {
                TokenResult::Empty => return Ok(()),
                TokenResult::Token { kind, end: next } => {
                    match kind {
                        Token::ParamEntityRef => {
                            if self.is_param_entity_subparser || !is_main {
                                let name = self.convert_to_string(
                                    enc,
                                    buf,
                                    s + mb,
                                    next - mb,
                                    is_main,
                                )?;
                                let entity = match self.dtd.param_entities.get(&name) {
                                    Some(e) => e,
                                    None => {
                                        self.set_event(is_main, s);
                                        return Err(XmlError::UndefinedEntity);
                                    }
                                };
                                if entity.open {
                                    self.set_event(is_main, s);
                                    return Err(XmlError::RecursiveEntityRef);
                                }
                                if entity.system_id.is_some() {
                                    self.set_event(is_main, s);
                                    return Err(XmlError::ParamEntityRef);
                                }
                                let text = match entity.text.clone() {
                                    Some(t) => t,
                                    None => {
                                        s = next;
                                        continue;
                                    }
                                };
                                if let Some(e) = self.dtd.param_entities.get_mut(&name) {
                                    e.open = true;
                                }
                                let result = self.store_entity_value(
                                    &Encoding::Utf8,
                                    text.as_bytes(),
                                    0,
                                    text.len(),
                                    false,
                                );
                                if let Some(e) = self.dtd.param_entities.get_mut(&name) {
                                    e.open = false;
                                }
                                result?;
                            } else {
                                self.set_event(is_main, s);
                                return Err(XmlError::Syntax);
                            }
                        }
                        Token::EntityRef | Token::DataChars => {
                            // general entity references stay unexpanded
                            if self.dtd.pool.append(enc, buf, s, next).is_err() {
                                self.set_event(is_main, s);
                                return Err(XmlError::InvalidToken);
                            }
                        }
                        Token::CharRef => {
                            match enc.char_ref_value(buf, s, next) {
                                Some(c) => self.dtd.pool.append_char(c),
                                None => {
                                    self.set_event(is_main, s);
                                    return Err(XmlError::BadCharRef);
                                }
                            }
                        }
                        Token::DataNewline | Token::TrailingCr => {
                            self.dtd.pool.append_char('\n');
                        }
                        _ => {
                            self.set_event(is_main, s);
                            return Err(XmlError::InvalidToken);
                        }
                    }
                    s = next;
                }
                TokenResult::Tentative { .. }
                | TokenResult::Partial
                | TokenResult::PartialChar => {
                    self.set_event(is_main, s);
                    return Err(XmlError::InvalidToken);
                }
                TokenResult::Invalid { at } => {
                    self.set_event(is_main, at);
                    return Err(XmlError::InvalidToken);
                }
            }
        }
    }

    // attribute values

    fn att_pool(&mut self, into_dtd: bool) -> &mut StringPool {
        if into_dtd {
            &mut self.dtd.pool
        } else {
            &mut self.temp_pool
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn store_attribute_value(
        &mut self,
        enc: &Encoding,
        buf: &[u8],
        start: usize,
        end: usize,
        is_cdata: bool,
        into_dtd: bool,
        is_main: bool,
    ) -> Result<(), XmlError> {
        self.append_attribute_value(enc, buf, start, end, is_cdata, into_dtd, is_main)?;
        let pool = self.att_pool(into_dtd);
        if !is_cdata && pool.last_char() == Some(' ') {
            pool.chop();
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn append_attribute_value(
        &mut self,
        enc: &Encoding,
        buf: &[u8],
        start: usize,
        end: usize,
        is_cdata: bool,
        into_dtd: bool,
        is_main: bool,
    ) -> Result<(), XmlError> {
        let mb = enc.min_bytes();
        let mut s = start;
        loop {
            match enc.attribute_value_token(buf, s, end) {
                TokenResult::Empty => return Ok(()),
                TokenResult::Token { kind, end: next } => {
                    match kind {
                        Token::DataChars => {
                            if self
                                .att_pool(into_dtd)
                                .append(enc, buf, s, next)
                                .is_err()
                            {
                                self.set_event(is_main, s);
                                return Err(XmlError::InvalidToken);
                            }
                        }
                        Token::CharRef => {
                            let c = match enc.char_ref_value(buf, s, next) {
                                Some(c) => c,
                                None => {
                                    self.set_event(is_main, s);
                                    return Err(XmlError::BadCharRef);
                                }
                            };
                            let pool = self.att_pool(into_dtd);
                            if !(c == ' '
                                && !is_cdata
                                && (pool.len() == 0 || pool.last_char() == Some(' ')))
                            {
                                pool.append_char(c);
                            }
                        }
                        Token::AttributeValueS | Token::DataNewline | Token::TrailingCr => {
                            let pool = self.att_pool(into_dtd);
                            if is_cdata
                                || !(pool.len() == 0 || pool.last_char() == Some(' '))
                            {
                                pool.append_char(' ');
                            }
                        }
                        Token::EntityRef => {
                            if let Some(c) =
                                enc.predefined_entity(buf, s + mb, next - mb)
                            {
                                self.att_pool(into_dtd).append_char(c);
                            } else {
                                let name = self.convert_to_string(
                                    enc,
                                    buf,
                                    s + mb,
                                    next - mb,
                                    is_main,
                                )?;
                                let entity = self.dtd.general_entities.get(&name);
                                let entity = match entity {
                                    None => {
                                        if self.dtd.complete {
                                            self.set_event(is_main, s);
                                            return Err(XmlError::UndefinedEntity);
                                        }
                                        s = next;
                                        continue;
                                    }
                                    Some(e) => e,
                                };
                                if entity.open {
                                    self.set_event(is_main, s);
                                    return Err(XmlError::RecursiveEntityRef);
                                }
                                if entity.notation.is_some() {
                                    self.set_event(is_main, s);
                                    return Err(XmlError::BinaryEntityRef);
                                }
                                let text = match entity.text.clone() {
                                    Some(t) => t,
                                    None => {
                                        self.set_event(is_main, s);
                                        return Err(XmlError::AttributeExternalEntityRef);
                                    }
                                };
                                if let Some(e) =
                                    self.dtd.general_entities.get_mut(&name)
                                {
                                    e.open = true;
                                }
                                let result = self.append_attribute_value(
                                    &Encoding::Utf8,
                                    text.as_bytes(),
                                    0,
                                    text.len(),
                                    is_cdata,
                                    into_dtd,
                                    false,
                                );
                                if let Some(e) =
                                    self.dtd.general_entities.get_mut(&name)
                                {
                                    e.open = false;
                                }
                                result?;
                            }
                        }
                        _ => {
                            self.set_event(is_main, s);
                            return Err(XmlError::InvalidToken);
                        }
                    }
                    s = next;
                }
                TokenResult::Invalid { at } => {
                    self.set_event(is_main, at);
                    return Err(XmlError::InvalidToken);
                }
                _ => {
                    self.set_event(is_main, s);
                    return Err(XmlError::InvalidToken);
                }
            }
        }
    }

    // attribute ids, prefixes, bindings

    fn get_attribute_id(&mut self, name: &str) -> Name {
        let fresh = self.dtd.attribute_ids.get(name).is_none();
        let id_name = self
            .dtd
            .attribute_ids
            .entry(name, AttributeId::new)
            .name
            .clone();
        if fresh && self.ns {
            let (xmlns, prefix) = if name == "xmlns" {
                (true, Some(PrefixRef::Default))
            } else if let Some(rest) = name.strip_prefix("xmlns:") {
                let p = self.dtd.prefixes.entry(rest, Prefix::new).name.clone();
                (true, Some(PrefixRef::Named(p)))
            } else if let Some(i) = name.find(':') {
                let p = self.dtd.prefixes.entry(&name[..i], Prefix::new).name.clone();
                (false, Some(PrefixRef::Named(p)))
            } else {
                (false, None)
            };
            if let Some(id) = self.dtd.attribute_ids.get_mut(&id_name) {
                id.xmlns = xmlns;
                id.prefix = prefix;
            }
        }
        id_name
    }

    fn set_element_type_prefix(&mut self, elem_name: &Name) {
        if let Some(i) = elem_name.find(':') {
            let p = self
                .dtd
                .prefixes
                .entry(&elem_name[..i], Prefix::new)
                .name
                .clone();
            if let Some(et) = self.dtd.element_types.get_mut(elem_name) {
                et.prefix = Some(PrefixRef::Named(p));
            }
        }
    }

    fn add_binding<H: XmlHandler>(
        &mut self,
        h: &mut H,
        prefix: PrefixRef,
        uri: &str,
        out: &mut Vec<usize>,
    ) {
        let mut full = String::with_capacity(uri.len() + 1);
        full.push_str(uri);
        let uri_base_len = full.len();
        if let Some(sep) = self.ns_sep {
            full.push(sep);
        }
        let prev = match &prefix {
            PrefixRef::Default => self.dtd.default_prefix_binding,
            PrefixRef::Named(p) => {
                self.dtd.prefixes.get(p).and_then(|p| p.binding)
            }
        };
        let binding = Binding {
            prefix: prefix.clone(),
            uri: full,
            uri_base_len,
            prev,
        };
        let id = match self.free_bindings.pop() {
            Some(id) => {
                self.bindings[id] = binding;
                id
            }
            None => {
                self.bindings.push(binding);
                self.bindings.len() - 1
            }
        };
        let unbind_default = uri.is_empty() && prefix == PrefixRef::Default;
        match &prefix {
            PrefixRef::Default => {
                self.dtd.default_prefix_binding =
                    if unbind_default { None } else { Some(id) };
            }
            PrefixRef::Named(p) => {
                if let Some(rec) = self.dtd.prefixes.get_mut(p) {
                    rec.binding = Some(id);
                }
            }
        }
        out.push(id);
        let prefix_name = match &prefix {
            PrefixRef::Default => None,
            PrefixRef::Named(p) => Some(p.clone()),
        };
        let bound_uri = if unbind_default { None } else { Some(uri) };
        h.start_namespace_decl(prefix_name.as_deref(), bound_uri);
    }

    fn remove_bindings<H: XmlHandler>(&mut self, h: &mut H, list: &mut Vec<usize>) {
        while let Some(id) = list.pop() {
            let (prefix, prev) = {
                let b = &self.bindings[id];
                (b.prefix.clone(), b.prev)
            };
            match &prefix {
                PrefixRef::Default => {
                    h.end_namespace_decl(None);
                    self.dtd.default_prefix_binding = prev;
                }
                PrefixRef::Named(p) => {
                    h.end_namespace_decl(Some(&**p));
                    if let Some(rec) = self.dtd.prefixes.get_mut(p) {
                        rec.binding = prev;
                    }
                }
            }
            self.free_bindings.push(id);
        }
    }

    // start tags

    /// Builds the exposed attribute list of a start tag: normalizes
    /// values, detects duplicates, applies declared defaults, and in
    /// namespace mode turns `xmlns` attributes into bindings and
    /// expands prefixed names. Returns the exposed element name.
    #[allow(clippy::too_many_arguments)]
    fn store_atts<H: XmlHandler>(
        &mut self,
        h: &mut H,
        enc: &Encoding,
        buf: &[u8],
        tag_start: usize,
        tag_end: usize,
        element_name: &str,
        bindings_out: &mut Vec<usize>,
        is_main: bool,
    ) -> Result<String, XmlError> {
        let elem_fresh = self.dtd.element_types.get(element_name).is_none();
        let type_name = self
            .dtd
            .element_types
            .entry(element_name, ElementType::new)
            .name
            .clone();
        if elem_fresh && self.ns {
            self.set_element_type_prefix(&type_name);
        }
        let defaults: Vec<DefaultAttribute> = self
            .dtd
            .element_types
            .get(element_name)
            .map(|et| et.default_atts.clone())
            .unwrap_or_default();

        let mut raw = mem::take(&mut self.raw_atts);
        enc.get_attributes(buf, tag_start, tag_end, &mut raw);

        let mut used_ids: Vec<Name> = Vec::with_capacity(raw.len());
        let mut out: Vec<(Name, String)> = Vec::with_capacity(raw.len());
        let result = (|| -> Result<(), XmlError> {
            for ra in &raw {
                let name =
                    self.convert_to_string(enc, buf, ra.name_start, ra.name_end, is_main)?;
                let id_name = self.get_attribute_id(&name);
                let (specified, xmlns, prefix, maybe_tokenized) = {
                    match self.dtd.attribute_ids.get(&id_name) {
                        Some(id) => {
                            (id.specified, id.xmlns, id.prefix.clone(), id.maybe_tokenized)
                        }
                        None => (0, false, None, false),
                    }
                };
                if specified != 0 {
                    self.set_event(is_main, ra.name_start);
                    return Err(XmlError::DuplicateAttribute);
                }
                if let Some(id) = self.dtd.attribute_ids.get_mut(&id_name) {
                    id.specified = 1;
                }
                used_ids.push(id_name.clone());

                let is_cdata = if maybe_tokenized {
                    defaults
                        .iter()
                        .find(|da| Rc::ptr_eq(&da.id_name, &id_name))
                        .map(|da| da.is_cdata)
                        .unwrap_or(true)
                } else {
                    true
                };
                let value = if !ra.normalized || !enc.is_utf8() || !is_cdata {
                    self.temp_pool.discard();
                    self.store_attribute_value(
                        enc,
                        buf,
                        ra.value_start,
                        ra.value_end,
                        is_cdata,
                        false,
                        is_main,
                    )?;
                    self.temp_pool.take()
                } else {
                    self.convert_to_string(enc, buf, ra.value_start, ra.value_end, is_main)?
                };

                if self.ns && xmlns {
                    let prefix = prefix.unwrap_or(PrefixRef::Default);
                    self.add_binding(h, prefix, &value, bindings_out);
                } else {
                    if self.ns && prefix.is_some() {
                        if let Some(id) = self.dtd.attribute_ids.get_mut(&id_name) {
                            id.specified = 2;
                        }
                    }
                    out.push((id_name, value));
                }
            }
            Ok(())
        })();
        self.raw_atts = raw;
        result?;
        self.n_specified_atts = out.len();

        // attribute defaulting
        for da in &defaults {
            let specified = self
                .dtd
                .attribute_ids
                .get(&da.id_name)
                .map(|id| id.specified)
                .unwrap_or(1);
            if specified != 0 {
                continue;
            }
            let value = match &da.value {
                Some(v) => v.clone(),
                None => continue,
            };
            let (xmlns, prefix) = match self.dtd.attribute_ids.get(&da.id_name) {
                Some(id) => (id.xmlns, id.prefix.clone()),
                None => (false, None),
            };
            used_ids.push(da.id_name.clone());
            if self.ns && xmlns {
                let prefix = prefix.unwrap_or(PrefixRef::Default);
                self.add_binding(h, prefix, &value, bindings_out);
            } else {
                let mark = if self.ns && prefix.is_some() { 2 } else { 1 };
                if let Some(id) = self.dtd.attribute_ids.get_mut(&da.id_name) {
                    id.specified = mark;
                }
                out.push((da.id_name.clone(), value.to_string()));
            }
        }

        // expand prefixed attribute names
        let mut app = mem::take(&mut self.app_atts);
        app.clear();
        for (id_name, value) in out {
            let specified = self
                .dtd
                .attribute_ids
                .get(&id_name)
                .map(|id| id.specified)
                .unwrap_or(0);
            let exposed_name = if specified == 2 {
                self.expand_prefixed_name(&id_name)
            } else {
                id_name.to_string()
            };
            app.push(Attribute::new(exposed_name, value));
        }
        self.app_atts = app;

        for id_name in used_ids {
            if let Some(id) = self.dtd.attribute_ids.get_mut(&id_name) {
                id.specified = 0;
            }
        }

        // expand the element type name
        let binding = {
            let et = self.dtd.element_types.get(element_name);
            match et.and_then(|et| et.prefix.as_ref()) {
                Some(PrefixRef::Named(p)) => {
                    self.dtd.prefixes.get(p).and_then(|p| p.binding)
                }
                Some(PrefixRef::Default) => None,
                None => self.dtd.default_prefix_binding,
            }
        };
        Ok(match binding {
            Some(b) => {
                let bind = &self.bindings[b];
                let local = match element_name.find(':') {
                    Some(i) => &element_name[i + 1..],
                    None => element_name,
                };
                let mut expanded = String::with_capacity(bind.uri.len() + local.len());
                expanded.push_str(&bind.uri);
                expanded.push_str(local);
                expanded
            }
            None => element_name.to_string(),
        })
    }

    fn expand_prefixed_name(&self, id_name: &str) -> String {
        let binding = match self
            .dtd
            .attribute_ids
            .get(id_name)
            .and_then(|id| id.prefix.as_ref())
        {
            Some(PrefixRef::Named(p)) => self.dtd.prefixes.get(p).and_then(|p| p.binding),
            _ => None,
        };
        match (binding, id_name.find(':')) {
            (Some(b), Some(i)) => {
                let bind = &self.bindings[b];
                let local = &id_name[i + 1..];
                let mut expanded = String::with_capacity(bind.uri.len() + local.len());
                expanded.push_str(&bind.uri);
                expanded.push_str(local);
                expanded
            }
            _ => id_name.to_string(),
        }
    }

    // content

    #[allow(clippy::too_many_arguments)]
    fn do_content<H: XmlHandler>(
        &mut self,
        h: &mut H,
        enc: &Encoding,
        buf: &[u8],
        start: usize,
        end: usize,
        soft: bool,
        is_main: bool,
        start_tag_level: usize,
    ) -> Result<Flow, XmlError> {
        let mb = enc.min_bytes();
        let mut s = start;
        loop {
            self.set_event(is_main, s);
            let (tok, next) = match enc.content_token(buf, s, end) {
                TokenResult::Token { kind, end } => (kind, end),
                TokenResult::Tentative { kind, end } => (kind, end),
                TokenResult::Empty => {
                    if soft && is_main {
                        return Ok(Flow::Stop(s));
                    }
                    if start_tag_level > 0 {
                        if self.tag_level != start_tag_level {
                            return Err(XmlError::AsyncEntity);
                        }
                        return Ok(Flow::Done);
                    }
                    return Err(XmlError::NoElements);
                }
                TokenResult::Partial => {
                    if soft && is_main {
                        return Ok(Flow::Stop(s));
                    }
                    return Err(XmlError::UnclosedToken);
                }
                TokenResult::PartialChar => {
                    if soft && is_main {
                        return Ok(Flow::Stop(s));
                    }
                    return Err(XmlError::PartialChar);
                }
                TokenResult::Invalid { at } => {
                    self.set_event(is_main, at);
                    return Err(XmlError::InvalidToken);
                }
            };
            match tok {
                Token::TrailingCr => {
                    if soft && is_main {
                        // the next chunk decides LF folding
                        return Ok(Flow::Stop(s));
                    }
                    h.character_data("\n");
                    if start_tag_level == 0 {
                        return Err(XmlError::NoElements);
                    }
                    if self.tag_level != start_tag_level {
                        return Err(XmlError::AsyncEntity);
                    }
                    return Ok(Flow::Done);
                }
                Token::TrailingRSqb => {
                    if soft && is_main {
                        return Ok(Flow::Stop(s));
                    }
                    let data = self.convert_to_string(enc, buf, s, end, is_main)?;
                    h.character_data(&data);
                    if start_tag_level == 0 {
                        return Err(XmlError::NoElements);
                    }
                    if self.tag_level != start_tag_level {
                        return Err(XmlError::AsyncEntity);
                    }
                    return Ok(Flow::Done);
                }
                Token::StartTagNoAtts | Token::StartTagWithAtts => {
                    let mut tag = self.free_tags.pop().unwrap_or_else(Tag::new);
                    let name_start = s + mb;
                    let name_len = enc.name_length(buf, name_start, next);
                    tag.raw_name.clear();
                    tag.raw_name
                        .extend_from_slice(&buf[name_start..name_start + name_len]);
                    tag.name.clear();
                    let element_name = self.convert_to_string(
                        enc,
                        buf,
                        name_start,
                        name_start + name_len,
                        is_main,
                    )?;
                    self.tag_level += 1;
                    let mut new_bindings = mem::take(&mut tag.bindings);
                    let exposed = self.store_atts(
                        h,
                        enc,
                        buf,
                        s,
                        next,
                        &element_name,
                        &mut new_bindings,
                        is_main,
                    );
                    tag.bindings = new_bindings;
                    match exposed {
                        Ok(name) => tag.name = name,
                        Err(e) => {
                            self.tag_stack.push(tag);
                            return Err(e);
                        }
                    }
                    h.start_element(&tag.name, &self.app_atts);
                    self.tag_stack.push(tag);
                    self.temp_pool.discard();
                }
                Token::EmptyElemNoAtts | Token::EmptyElemWithAtts => {
                    let name_start = s + mb;
                    let name_len = enc.name_length(buf, name_start, next);
                    let element_name = self.convert_to_string(
                        enc,
                        buf,
                        name_start,
                        name_start + name_len,
                        is_main,
                    )?;
                    let mut new_bindings = Vec::new();
                    let exposed = self.store_atts(
                        h,
                        enc,
                        buf,
                        s,
                        next,
                        &element_name,
                        &mut new_bindings,
                        is_main,
                    )?;
                    h.start_element(&exposed, &self.app_atts);
                    h.end_element(&exposed);
                    self.remove_bindings(h, &mut new_bindings);
                    self.temp_pool.discard();
                    if self.tag_level == 0 && is_main && start_tag_level == 0 {
                        self.phase = Phase::Epilog;
                        return Ok(Flow::Continue(next));
                    }
                }
                Token::EndTag => {
                    if self.tag_level == start_tag_level {
                        return Err(XmlError::AsyncEntity);
                    }
                    let raw_start = s + 2 * mb;
                    let raw_len = enc.name_length(buf, raw_start, next);
                    let tag = match self.tag_stack.pop() {
                        Some(t) => t,
                        None => {
                            return Err(XmlError::TagMismatch);
                        }
                    };
                    if tag.raw_name != buf[raw_start..raw_start + raw_len] {
                        self.set_event(is_main, raw_start);
                        self.free_tags.push(tag);
                        return Err(XmlError::TagMismatch);
                    }
                    self.tag_level -= 1;
                    h.end_element(&tag.name);
                    let mut tag = tag;
                    let mut bindings = mem::take(&mut tag.bindings);
                    self.remove_bindings(h, &mut bindings);
                    tag.bindings = bindings;
                    self.free_tags.push(tag);
                    if self.tag_level == 0 && is_main && start_tag_level == 0 {
                        self.phase = Phase::Epilog;
                        return Ok(Flow::Continue(next));
                    }
                }
                Token::CharRef => {
                    match enc.char_ref_value(buf, s, next) {
                        Some(c) => {
                            let mut tmp = [0u8; 4];
                            h.character_data(c.encode_utf8(&mut tmp));
                        }
                        None => {
                            return Err(XmlError::BadCharRef);
                        }
                    }
                }
                Token::DataChars => {
                    let data = self.convert_to_string(enc, buf, s, next, is_main)?;
                    h.character_data(&data);
                }
                Token::DataNewline => {
                    h.character_data("\n");
                }
                Token::EntityRef => {
                    if let Some(c) = enc.predefined_entity(buf, s + mb, next - mb) {
                        let mut tmp = [0u8; 4];
                        h.character_data(c.encode_utf8(&mut tmp));
                    } else {
                        self.content_entity_ref(h, enc, buf, s, next, is_main)?;
                    }
                }
                Token::Pi => self.report_pi(h, enc, buf, s, next, is_main)?,
                Token::Comment => self.report_comment(h, enc, buf, s, next, is_main)?,
                Token::XmlDecl => {
                    return Err(XmlError::MisplacedXmlPi);
                }
                Token::CdataSectionOpen => {
                    h.start_cdata_section();
                    let mut at = next;
                    match self.do_cdata_section(h, enc, buf, at, end, soft, is_main)? {
                        SectFlow::Closed(after) => at = after,
                        SectFlow::Suspend(stop) => {
                            self.phase = Phase::CdataSection;
                            return Ok(Flow::Stop(stop));
                        }
                    }
                    s = at;
                    continue;
                }
                _ => {
                    self.set_event(is_main, s);
                    return Err(XmlError::InvalidToken);
                }
            }
            s = next;
        }
    }

    fn content_entity_ref<H: XmlHandler>(
        &mut self,
        h: &mut H,
        enc: &Encoding,
        buf: &[u8],
        s: usize,
        next: usize,
        is_main: bool,
    ) -> Result<(), XmlError> {
        let mb = enc.min_bytes();
        let name = self.convert_to_string(enc, buf, s + mb, next - mb, is_main)?;
        let entity = match self.dtd.general_entities.get(&name) {
            None => {
                if self.dtd.complete || self.dtd.standalone {
                    self.set_event(is_main, s);
                    return Err(XmlError::UndefinedEntity);
                }
                self.report_default(h, enc, buf, s, next);
                return Ok(());
            }
            Some(e) => e,
        };
        if entity.open {
            self.set_event(is_main, s);
            return Err(XmlError::RecursiveEntityRef);
        }
        if entity.notation.is_some() {
            self.set_event(is_main, s);
            return Err(XmlError::BinaryEntityRef);
        }
        if let Some(text) = entity.text.clone() {
            if !self.default_expand_internal_entities {
                self.report_default(h, enc, buf, s, next);
                return Ok(());
            }
            if let Some(e) = self.dtd.general_entities.get_mut(&name) {
                e.open = true;
            }
            let level = self.tag_level;
            let result = self.do_content(
                h,
                &Encoding::Utf8,
                text.as_bytes(),
                0,
                text.len(),
                false,
                false,
                level,
            );
            if let Some(e) = self.dtd.general_entities.get_mut(&name) {
                e.open = false;
            }
            result.map(|_| ())
        } else {
            // external entity
            let (base, system_id, public_id) = {
                let e = self.dtd.general_entities.get(&name);
                match e {
                    Some(e) => (e.base.clone(), e.system_id.clone(), e.public_id.clone()),
                    None => (None, None, None),
                }
            };
            if let Some(e) = self.dtd.general_entities.get_mut(&name) {
                e.open = true;
            }
            let context = self.get_context();
            if let Some(e) = self.dtd.general_entities.get_mut(&name) {
                e.open = false;
            }
            let reply = h.external_entity_ref(
                Some(&context),
                base.as_deref(),
                system_id.as_deref(),
                public_id.as_deref(),
            );
            match reply {
                ExternalEntityReply::Refuse => {
                    self.set_event(is_main, s);
                    Err(XmlError::ExternalEntityHandling)
                }
                ExternalEntityReply::Skip => Ok(()),
                ExternalEntityReply::Parse { text, encoding } => {
                    let mut sub = self.make_external_entity_inner(context, encoding);
                    sub.apply_context(h);
                    if sub.feed(h, &text, true).is_err() {
                        self.set_event(is_main, s);
                        return Err(XmlError::ExternalEntityHandling);
                    }
                    Ok(())
                }
            }
        }
    }

    fn external_entity_start<H: XmlHandler>(
        &mut self,
        h: &mut H,
        buf: &[u8],
        s: usize,
        end: usize,
        soft: bool,
    ) -> Result<Flow, XmlError> {
        let enc = self.encoding.clone();
        match enc.content_token(buf, s, end) {
            TokenResult::Token {
                kind: Token::XmlDecl,
                end: next,
            } => {
                self.process_xml_decl(h, &enc, buf, s, next, true, true)?;
                self.start_content_of_entity();
                Ok(Flow::Continue(next))
            }
            TokenResult::Partial | TokenResult::PartialChar if soft => Ok(Flow::Stop(s)),
            _ => {
                self.start_content_of_entity();
                Ok(Flow::Continue(s))
            }
        }
    }

    fn start_content_of_entity(&mut self) {
        self.phase = Phase::Content;
        self.tag_level = 1;
        self.start_tag_level = 1;
    }

    fn do_cdata_section<H: XmlHandler>(
        &mut self,
        h: &mut H,
        enc: &Encoding,
        buf: &[u8],
        start: usize,
        end: usize,
        soft: bool,
        is_main: bool,
    ) -> Result<SectFlow, XmlError> {
        let mut s = start;
        loop {
            self.set_event(is_main, s);
            match enc.cdata_section_token(buf, s, end) {
                TokenResult::Token { kind, end: next } => {
                    match kind {
                        Token::CdataSectionClose => {
                            h.end_cdata_section();
                            return Ok(SectFlow::Closed(next));
                        }
                        Token::DataNewline => h.character_data("\n"),
                        Token::TrailingCr => {
                            if soft && is_main {
                                return Ok(SectFlow::Suspend(s));
                            }
                            h.character_data("\n");
                        }
                        Token::DataChars => {
                            let data = self.convert_to_string(enc, buf, s, next, is_main)?;
                            h.character_data(&data);
                        }
                        _ => {
                            return Err(XmlError::InvalidToken);
                        }
                    }
                    s = next;
                }
                TokenResult::Invalid { at } => {
                    self.set_event(is_main, at);
                    return Err(XmlError::InvalidToken);
                }
                TokenResult::PartialChar => {
                    if soft && is_main {
                        return Ok(SectFlow::Suspend(s));
                    }
                    return Err(XmlError::PartialChar);
                }
                TokenResult::Partial | TokenResult::Empty | TokenResult::Tentative { .. } => {
                    if soft && is_main {
                        return Ok(SectFlow::Suspend(s));
                    }
                    return Err(XmlError::UnclosedCdataSection);
                }
            }
        }
    }

    fn do_ignore_section<H: XmlHandler>(
        &mut self,
        h: &mut H,
        enc: &Encoding,
        buf: &[u8],
        start: usize,
        end: usize,
        soft: bool,
        is_main: bool,
    ) -> Result<SectFlow, XmlError> {
        self.set_event(is_main, start);
        match enc.ignore_section_token(buf, start, end) {
            TokenResult::Token { end: next, .. } => {
                self.report_default(h, enc, buf, start, next);
                Ok(SectFlow::Closed(next))
            }
            TokenResult::Invalid { at } => {
                self.set_event(is_main, at);
                Err(XmlError::InvalidToken)
            }
            TokenResult::PartialChar => {
                if soft && is_main {
                    return Ok(SectFlow::Suspend(start));
                }
                Err(XmlError::PartialChar)
            }
            _ => {
                if soft && is_main {
                    return Ok(SectFlow::Suspend(start));
                }
                Err(XmlError::Syntax)
            }
        }
    }

    fn do_epilog<H: XmlHandler>(
        &mut self,
        h: &mut H,
        buf: &[u8],
        start: usize,
        end: usize,
        soft: bool,
    ) -> Result<Flow, XmlError> {
        let enc = self.encoding.clone();
        let mut s = start;
        loop {
            self.event_off = s;
            match enc.prolog_token(buf, s, end) {
                TokenResult::Empty => {
                    return if soft { Ok(Flow::Stop(end)) } else { Ok(Flow::Done) };
                }
                TokenResult::Tentative { kind, end: next } => {
                    // trailing whitespace is complete either way
                    if kind == Token::PrologS {
                        self.report_default(h, &enc, buf, s, next);
                        return if soft { Ok(Flow::Stop(end)) } else { Ok(Flow::Done) };
                    }
                    return Err(XmlError::JunkAfterDocElement);
                }
                TokenResult::Token { kind, end: next } => {
                    match kind {
                        Token::PrologS => self.report_default(h, &enc, buf, s, next),
                        Token::Pi => self.report_pi(h, &enc, buf, s, next, true)?,
                        Token::Comment => {
                            self.report_comment(h, &enc, buf, s, next, true)?
                        }
                        _ => {
                            return Err(XmlError::JunkAfterDocElement);
                        }
                    }
                    s = next;
                }
                TokenResult::Partial => {
                    if soft {
                        return Ok(Flow::Stop(s));
                    }
                    return Err(XmlError::UnclosedToken);
                }
                TokenResult::PartialChar => {
                    if soft {
                        return Ok(Flow::Stop(s));
                    }
                    return Err(XmlError::PartialChar);
                }
                TokenResult::Invalid { at } => {
                    self.event_off = at;
                    return Err(XmlError::InvalidToken);
                }
            }
        }
    }

    // reporting

    fn report_pi<H: XmlHandler>(
        &mut self,
        h: &mut H,
        enc: &Encoding,
        buf: &[u8],
        s: usize,
        next: usize,
        is_main: bool,
    ) -> Result<(), XmlError> {
        let mb = enc.min_bytes();
        let target_start = s + 2 * mb;
        let target_len = enc.name_length(buf, target_start, next);
        let target = self.convert_to_string(
            enc,
            buf,
            target_start,
            target_start + target_len,
            is_main,
        )?;
        let data_start = enc.skip_whitespace(buf, target_start + target_len, next - 2 * mb);
        let data = self.convert_to_string(enc, buf, data_start, next - 2 * mb, is_main)?;
        let data = normalize_newlines(data);
        h.processing_instruction(&target, &data);
        Ok(())
    }

    fn report_comment<H: XmlHandler>(
        &mut self,
        h: &mut H,
        enc: &Encoding,
        buf: &[u8],
        s: usize,
        next: usize,
        is_main: bool,
    ) -> Result<(), XmlError> {
        let mb = enc.min_bytes();
        let text = self.convert_to_string(enc, buf, s + 4 * mb, next - 3 * mb, is_main)?;
        let text = normalize_newlines(text);
        h.comment(&text);
        Ok(())
    }

    // context strings

    /// Serializes the active namespace bindings and open entities as a
    /// form-feed separated list.
    fn get_context(&self) -> String {
        let mut out = String::new();
        if let Some(b) = self.dtd.default_prefix_binding {
            let bind = &self.bindings[b];
            out.push('=');
            out.push_str(&bind.uri[..bind.uri_base_len]);
        }
        for prefix in self.dtd.prefixes.iter() {
            if let Some(b) = prefix.binding {
                if !out.is_empty() {
                    out.push(CONTEXT_SEP);
                }
                let bind = &self.bindings[b];
                out.push_str(&prefix.name);
                out.push('=');
                out.push_str(&bind.uri[..bind.uri_base_len]);
            }
        }
        for entity in self.dtd.general_entities.iter() {
            if entity.open {
                if !out.is_empty() {
                    out.push(CONTEXT_SEP);
                }
                out.push_str(&entity.name);
            }
        }
        out
    }

    fn set_context<H: XmlHandler>(&mut self, h: &mut H, context: &str) {
        let mut inherited = mem::take(&mut self.inherited_bindings);
        for piece in context.split(CONTEXT_SEP) {
            if piece.is_empty() {
                continue;
            }
            match piece.find('=') {
                Some(eq) => {
                    let prefix_name = &piece[..eq];
                    let uri = &piece[eq + 1..];
                    let prefix = if prefix_name.is_empty() {
                        PrefixRef::Default
                    } else {
                        let p = self
                            .dtd
                            .prefixes
                            .entry(prefix_name, Prefix::new)
                            .name
                            .clone();
                        PrefixRef::Named(p)
                    };
                    self.add_binding(h, prefix, uri, &mut inherited);
                }
                None => {
                    if let Some(e) = self.dtd.general_entities.get_mut(piece) {
                        e.open = true;
                    }
                }
            }
        }
        self.inherited_bindings = inherited;
    }

    /// Context application without events, for parser construction.
    fn set_context_quiet(&mut self, context: &str) {
        struct Mute;
        impl XmlHandler for Mute {}
        self.set_context(&mut Mute, context);
    }
}

fn normalize_public_id(s: &mut String) {
    if memchr::memchr3(b' ', b'\r', b'\n', s.as_bytes()).is_none() {
        return;
    }
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            ' ' | '\r' | '\n' => {
                if !out.is_empty() && !out.ends_with(' ') {
                    out.push(' ');
                }
            }
            _ => out.push(c),
        }
    }
    if out.ends_with(' ') {
        out.pop();
    }
    *s = out;
}

fn normalize_newlines(input: String) -> String {
    if memchr::memchr(b'\r', input.as_bytes()).is_none() {
        return input;
    }
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\r' {
            if chars.peek() == Some(&'\n') {
                chars.next();
            }
            out.push('\n');
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_id_normalization() {
        let mut s = String::from("  -//A  B\r\nC//EN ");
        normalize_public_id(&mut s);
        assert_eq!(s, "-//A B C//EN");
    }

    #[test]
    fn newline_normalization() {
        assert_eq!(normalize_newlines("a\r\nb\rc\n".to_string()), "a\nb\nc\n");
        assert_eq!(normalize_newlines("plain".to_string()), "plain");
    }
}
