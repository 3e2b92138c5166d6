//! Generic scanner bodies, monomorphized once per encoding.
//!
//! Every function takes an absolute window `ptr..end` into `buf` and
//! never consumes a partially available multi-byte character: a split
//! character yields `PartialChar`, an incomplete construct `Partial`.

use xsp_chars::XmlChar;

use super::classes::ByteClass;
use super::{Token, TokenResult};

/// One concrete encoding as seen by the scanners.
///
/// `byte_class` must only be called on offsets aligned to `MIN_BYTES`
/// with at least one full code unit available.
pub(crate) trait Enc {
    const MIN_BYTES: usize;

    fn byte_class(&self, buf: &[u8], i: usize) -> ByteClass;

    /// Does the code unit at `i` encode the ASCII character `c`?
    fn char_matches(&self, buf: &[u8], i: usize, c: u8) -> bool;

    /// ASCII value of the unit at `i`, if it is an ASCII character.
    fn ascii_at(&self, buf: &[u8], i: usize) -> Option<u8>;

    /// Decodes the single-unit non-ASCII character at `i`
    /// (class `NonAscii`).
    fn decode_single(&self, buf: &[u8], i: usize) -> Option<char>;

    /// Decodes and validates the multi-byte character at `i` whose lead
    /// class promises `n` bytes. `None` means malformed or not an XML
    /// character.
    fn decode_multibyte(&self, buf: &[u8], i: usize, n: usize) -> Option<char>;
}

enum Step {
    /// A name character of this byte length.
    Advance(usize),
    /// Not a name character; the class is returned for further dispatch.
    Other(ByteClass),
    Split,
    Invalid,
}

#[inline]
fn name_step<E: Enc>(enc: &E, buf: &[u8], i: usize, end: usize, start: bool) -> Step {
    let cls = enc.byte_class(buf, i);
    let ascii_ok = if start {
        cls.is_ascii_nmstrt()
    } else {
        cls.is_ascii_name()
    };
    if ascii_ok {
        return Step::Advance(E::MIN_BYTES);
    }
    match cls {
        ByteClass::NonAscii => match enc.decode_single(buf, i) {
            Some(c) if name_char(c, start) => Step::Advance(E::MIN_BYTES),
            _ => Step::Invalid,
        },
        ByteClass::Lead2 | ByteClass::Lead3 | ByteClass::Lead4 => {
            let n = cls.lead_len();
            if end - i < n {
                return Step::Split;
            }
            match enc.decode_multibyte(buf, i, n) {
                Some(c) if name_char(c, start) => Step::Advance(n),
                _ => Step::Invalid,
            }
        }
        other => Step::Other(other),
    }
}

#[inline]
fn name_char(c: char, start: bool) -> bool {
    if start {
        c.is_xml_name_start_char()
    } else {
        c.is_xml_name_char()
    }
}

/// Skips one data character; used by every run scanner.
enum CharStep {
    Advance(usize),
    Other(ByteClass),
    Split,
    Invalid,
}

#[inline]
fn char_step<E: Enc>(enc: &E, buf: &[u8], i: usize, end: usize) -> CharStep {
    match enc.byte_class(buf, i) {
        ByteClass::NonXml | ByteClass::Malform | ByteClass::Trail => CharStep::Invalid,
        cls @ (ByteClass::Lead2 | ByteClass::Lead3 | ByteClass::Lead4) => {
            let n = cls.lead_len();
            if end - i < n {
                CharStep::Split
            } else if enc.decode_multibyte(buf, i, n).is_some() {
                CharStep::Advance(n)
            } else {
                CharStep::Invalid
            }
        }
        other => CharStep::Other(other),
    }
}

#[inline]
fn token(kind: Token, end: usize) -> TokenResult {
    TokenResult::Token { kind, end }
}

/// Aligns the window end down to a whole number of code units.
/// Returns `None` when fewer than one unit is available.
#[inline]
fn align_end<E: Enc>(ptr: usize, end: usize) -> Option<usize> {
    if E::MIN_BYTES == 1 {
        return Some(end);
    }
    let n = (end - ptr) & !(E::MIN_BYTES - 1);
    if n == 0 {
        None
    } else {
        Some(ptr + n)
    }
}

// Content phase

pub(crate) fn content_token<E: Enc>(enc: &E, buf: &[u8], ptr: usize, end: usize) -> TokenResult {
    if ptr == end {
        return TokenResult::Empty;
    }
    let end = match align_end::<E>(ptr, end) {
        Some(end) => end,
        None => return TokenResult::Partial,
    };
    let mb = E::MIN_BYTES;
    let mut ptr = ptr;
    match enc.byte_class(buf, ptr) {
        ByteClass::Lt => return scan_lt(enc, buf, ptr + mb, end),
        ByteClass::Amp => return scan_ref(enc, buf, ptr + mb, end),
        ByteClass::Lf => return token(Token::DataNewline, ptr + mb),
        ByteClass::Cr => {
            ptr += mb;
            if ptr == end {
                return token(Token::TrailingCr, end);
            }
            if enc.byte_class(buf, ptr) == ByteClass::Lf {
                ptr += mb;
            }
            return token(Token::DataNewline, ptr);
        }
        ByteClass::Rsqb => {
            ptr += mb;
            if ptr == end {
                return token(Token::TrailingRSqb, end);
            }
            if enc.char_matches(buf, ptr, b']') {
                ptr += mb;
                if ptr == end {
                    return token(Token::TrailingRSqb, end);
                }
                if enc.char_matches(buf, ptr, b'>') {
                    return TokenResult::Invalid { at: ptr };
                }
                ptr -= mb;
            }
            // lone bracket, part of character data
        }
        _ => match char_step(enc, buf, ptr, end) {
            CharStep::Advance(n) => ptr += n,
            CharStep::Other(_) => ptr += mb,
            CharStep::Split => return TokenResult::PartialChar,
            CharStep::Invalid => return TokenResult::Invalid { at: ptr },
        },
    }
    // coalesce the longest run of plain data characters
    while ptr != end {
        match char_step(enc, buf, ptr, end) {
            CharStep::Advance(n) => ptr += n,
            CharStep::Split => return token(Token::DataChars, ptr),
            CharStep::Invalid => return token(Token::DataChars, ptr),
            CharStep::Other(cls) => match cls {
                ByteClass::Rsqb => {
                    if ptr + mb != end {
                        if !enc.char_matches(buf, ptr + mb, b']') {
                            ptr += mb;
                            continue;
                        }
                        if ptr + 2 * mb != end {
                            if !enc.char_matches(buf, ptr + 2 * mb, b'>') {
                                ptr += mb;
                                continue;
                            }
                            return TokenResult::Invalid { at: ptr + 2 * mb };
                        }
                    }
                    return token(Token::DataChars, ptr);
                }
                ByteClass::Amp | ByteClass::Lt | ByteClass::Cr | ByteClass::Lf => {
                    return token(Token::DataChars, ptr);
                }
                _ => ptr += mb,
            },
        }
    }
    token(Token::DataChars, ptr)
}

/// `ptr` is just past `<`.
fn scan_lt<E: Enc>(enc: &E, buf: &[u8], mut ptr: usize, end: usize) -> TokenResult {
    let mb = E::MIN_BYTES;
    if ptr == end {
        return TokenResult::Partial;
    }
    match name_step(enc, buf, ptr, end, true) {
        Step::Advance(n) => ptr += n,
        Step::Split => return TokenResult::PartialChar,
        Step::Invalid => return TokenResult::Invalid { at: ptr },
        Step::Other(cls) => match cls {
            ByteClass::Excl => {
                ptr += mb;
                if ptr == end {
                    return TokenResult::Partial;
                }
                return match enc.byte_class(buf, ptr) {
                    ByteClass::Minus => scan_comment(enc, buf, ptr + mb, end),
                    ByteClass::Lsqb => scan_cdata_open(enc, buf, ptr + mb, end),
                    _ => TokenResult::Invalid { at: ptr },
                };
            }
            ByteClass::Quest => return scan_pi(enc, buf, ptr + mb, end),
            ByteClass::Sol => return scan_end_tag(enc, buf, ptr + mb, end),
            _ => return TokenResult::Invalid { at: ptr },
        },
    }
    // start-tag name
    while ptr != end {
        match name_step(enc, buf, ptr, end, false) {
            Step::Advance(n) => ptr += n,
            Step::Split => return TokenResult::PartialChar,
            Step::Invalid => return TokenResult::Invalid { at: ptr },
            Step::Other(cls) => match cls {
                ByteClass::Gt => return token(Token::StartTagNoAtts, ptr + mb),
                ByteClass::Sol => {
                    ptr += mb;
                    if ptr == end {
                        return TokenResult::Partial;
                    }
                    if !enc.char_matches(buf, ptr, b'>') {
                        return TokenResult::Invalid { at: ptr };
                    }
                    return token(Token::EmptyElemNoAtts, ptr + mb);
                }
                ByteClass::S | ByteClass::Cr | ByteClass::Lf => {
                    ptr += mb;
                    while ptr != end {
                        match name_step(enc, buf, ptr, end, true) {
                            Step::Advance(n) => return scan_atts(enc, buf, ptr + n, end),
                            Step::Split => return TokenResult::PartialChar,
                            Step::Invalid => return TokenResult::Invalid { at: ptr },
                            Step::Other(cls) => match cls {
                                ByteClass::Gt => {
                                    return token(Token::StartTagNoAtts, ptr + mb)
                                }
                                ByteClass::Sol => {
                                    ptr += mb;
                                    if ptr == end {
                                        return TokenResult::Partial;
                                    }
                                    if !enc.char_matches(buf, ptr, b'>') {
                                        return TokenResult::Invalid { at: ptr };
                                    }
                                    return token(Token::EmptyElemNoAtts, ptr + mb);
                                }
                                ByteClass::S | ByteClass::Cr | ByteClass::Lf => ptr += mb,
                                _ => return TokenResult::Invalid { at: ptr },
                            },
                        }
                    }
                    return TokenResult::Partial;
                }
                _ => return TokenResult::Invalid { at: ptr },
            },
        }
    }
    TokenResult::Partial
}

/// `ptr` is inside the first attribute name, just past its start
/// character.
fn scan_atts<E: Enc>(enc: &E, buf: &[u8], mut ptr: usize, end: usize) -> TokenResult {
    let mb = E::MIN_BYTES;
    'atts: while ptr != end {
        match name_step(enc, buf, ptr, end, false) {
            Step::Advance(n) => {
                ptr += n;
                continue 'atts;
            }
            Step::Split => return TokenResult::PartialChar,
            Step::Invalid => return TokenResult::Invalid { at: ptr },
            Step::Other(cls) => {
                // whitespace before `=` is allowed
                let mut cls = cls;
                while cls.is_ws() {
                    ptr += mb;
                    if ptr == end {
                        return TokenResult::Partial;
                    }
                    cls = enc.byte_class(buf, ptr);
                }
                if cls != ByteClass::Equals {
                    return TokenResult::Invalid { at: ptr };
                }
                // whitespace after `=`
                let open;
                loop {
                    ptr += mb;
                    if ptr == end {
                        return TokenResult::Partial;
                    }
                    match enc.byte_class(buf, ptr) {
                        ByteClass::Quot | ByteClass::Apos => {
                            open = enc.byte_class(buf, ptr);
                            break;
                        }
                        cls if cls.is_ws() => {}
                        _ => return TokenResult::Invalid { at: ptr },
                    }
                }
                ptr += mb;
                // attribute value
                loop {
                    if ptr == end {
                        return TokenResult::Partial;
                    }
                    let t = enc.byte_class(buf, ptr);
                    if t == open {
                        break;
                    }
                    match t {
                        ByteClass::NonXml | ByteClass::Malform | ByteClass::Trail => {
                            return TokenResult::Invalid { at: ptr };
                        }
                        ByteClass::Lead2 | ByteClass::Lead3 | ByteClass::Lead4 => {
                            let n = t.lead_len();
                            if end - ptr < n {
                                return TokenResult::PartialChar;
                            }
                            if enc.decode_multibyte(buf, ptr, n).is_none() {
                                return TokenResult::Invalid { at: ptr };
                            }
                            ptr += n;
                        }
                        ByteClass::Amp => {
                            match scan_ref(enc, buf, ptr + mb, end) {
                                TokenResult::Token { end: e, .. } => ptr = e,
                                other => return other,
                            }
                        }
                        ByteClass::Lt => return TokenResult::Invalid { at: ptr },
                        _ => ptr += mb,
                    }
                }
                // past the closing quote
                ptr += mb;
                if ptr == end {
                    return TokenResult::Partial;
                }
                match enc.byte_class(buf, ptr) {
                    ByteClass::S | ByteClass::Cr | ByteClass::Lf => {
                        ptr += mb;
                        while ptr != end {
                            match name_step(enc, buf, ptr, end, true) {
                                Step::Advance(n) => {
                                    ptr += n;
                                    continue 'atts;
                                }
                                Step::Split => return TokenResult::PartialChar,
                                Step::Invalid => return TokenResult::Invalid { at: ptr },
                                Step::Other(cls) => match cls {
                                    ByteClass::Gt => {
                                        return token(Token::StartTagWithAtts, ptr + mb)
                                    }
                                    ByteClass::Sol => {
                                        ptr += mb;
                                        if ptr == end {
                                            return TokenResult::Partial;
                                        }
                                        if !enc.char_matches(buf, ptr, b'>') {
                                            return TokenResult::Invalid { at: ptr };
                                        }
                                        return token(Token::EmptyElemWithAtts, ptr + mb);
                                    }
                                    ByteClass::S | ByteClass::Cr | ByteClass::Lf => {
                                        ptr += mb
                                    }
                                    _ => return TokenResult::Invalid { at: ptr },
                                },
                            }
                        }
                        return TokenResult::Partial;
                    }
                    ByteClass::Gt => return token(Token::StartTagWithAtts, ptr + mb),
                    ByteClass::Sol => {
                        ptr += mb;
                        if ptr == end {
                            return TokenResult::Partial;
                        }
                        if !enc.char_matches(buf, ptr, b'>') {
                            return TokenResult::Invalid { at: ptr };
                        }
                        return token(Token::EmptyElemWithAtts, ptr + mb);
                    }
                    _ => return TokenResult::Invalid { at: ptr },
                }
            }
        }
    }
    TokenResult::Partial
}

/// `ptr` is just past `</`.
fn scan_end_tag<E: Enc>(enc: &E, buf: &[u8], mut ptr: usize, end: usize) -> TokenResult {
    let mb = E::MIN_BYTES;
    if ptr == end {
        return TokenResult::Partial;
    }
    match name_step(enc, buf, ptr, end, true) {
        Step::Advance(n) => ptr += n,
        Step::Split => return TokenResult::PartialChar,
        _ => return TokenResult::Invalid { at: ptr },
    }
    while ptr != end {
        match name_step(enc, buf, ptr, end, false) {
            Step::Advance(n) => ptr += n,
            Step::Split => return TokenResult::PartialChar,
            Step::Invalid => return TokenResult::Invalid { at: ptr },
            Step::Other(cls) => match cls {
                ByteClass::Gt => return token(Token::EndTag, ptr + mb),
                ByteClass::S | ByteClass::Cr | ByteClass::Lf => {
                    ptr += mb;
                    while ptr != end {
                        match enc.byte_class(buf, ptr) {
                            ByteClass::S | ByteClass::Cr | ByteClass::Lf => ptr += mb,
                            ByteClass::Gt => return token(Token::EndTag, ptr + mb),
                            _ => return TokenResult::Invalid { at: ptr },
                        }
                    }
                    return TokenResult::Partial;
                }
                _ => return TokenResult::Invalid { at: ptr },
            },
        }
    }
    TokenResult::Partial
}

/// `ptr` is just past `&`.
fn scan_ref<E: Enc>(enc: &E, buf: &[u8], mut ptr: usize, end: usize) -> TokenResult {
    let mb = E::MIN_BYTES;
    if ptr == end {
        return TokenResult::Partial;
    }
    match name_step(enc, buf, ptr, end, true) {
        Step::Advance(n) => ptr += n,
        Step::Split => return TokenResult::PartialChar,
        Step::Invalid => return TokenResult::Invalid { at: ptr },
        Step::Other(ByteClass::Num) => return scan_char_ref(enc, buf, ptr + mb, end),
        Step::Other(_) => return TokenResult::Invalid { at: ptr },
    }
    while ptr != end {
        match name_step(enc, buf, ptr, end, false) {
            Step::Advance(n) => ptr += n,
            Step::Split => return TokenResult::PartialChar,
            Step::Invalid => return TokenResult::Invalid { at: ptr },
            Step::Other(ByteClass::Semi) => return token(Token::EntityRef, ptr + mb),
            Step::Other(_) => return TokenResult::Invalid { at: ptr },
        }
    }
    TokenResult::Partial
}

/// `ptr` is just past `&#`.
fn scan_char_ref<E: Enc>(enc: &E, buf: &[u8], mut ptr: usize, end: usize) -> TokenResult {
    let mb = E::MIN_BYTES;
    if ptr == end {
        return TokenResult::Partial;
    }
    if enc.char_matches(buf, ptr, b'x') {
        ptr += mb;
        if ptr == end {
            return TokenResult::Partial;
        }
        match enc.byte_class(buf, ptr) {
            ByteClass::Digit | ByteClass::Hex => ptr += mb,
            _ => return TokenResult::Invalid { at: ptr },
        }
        while ptr != end {
            match enc.byte_class(buf, ptr) {
                ByteClass::Digit | ByteClass::Hex => ptr += mb,
                ByteClass::Semi => return token(Token::CharRef, ptr + mb),
                _ => return TokenResult::Invalid { at: ptr },
            }
        }
        return TokenResult::Partial;
    }
    match enc.byte_class(buf, ptr) {
        ByteClass::Digit => ptr += mb,
        _ => return TokenResult::Invalid { at: ptr },
    }
    while ptr != end {
        match enc.byte_class(buf, ptr) {
            ByteClass::Digit => ptr += mb,
            ByteClass::Semi => return token(Token::CharRef, ptr + mb),
            _ => return TokenResult::Invalid { at: ptr },
        }
    }
    TokenResult::Partial
}

/// `ptr` is just past `<!-`.
fn scan_comment<E: Enc>(enc: &E, buf: &[u8], mut ptr: usize, end: usize) -> TokenResult {
    let mb = E::MIN_BYTES;
    if ptr == end {
        return TokenResult::Partial;
    }
    if !enc.char_matches(buf, ptr, b'-') {
        return TokenResult::Invalid { at: ptr };
    }
    ptr += mb;
    while ptr != end {
        match char_step(enc, buf, ptr, end) {
            CharStep::Advance(n) => ptr += n,
            CharStep::Split => return TokenResult::PartialChar,
            CharStep::Invalid => return TokenResult::Invalid { at: ptr },
            CharStep::Other(ByteClass::Minus) => {
                ptr += mb;
                if ptr == end {
                    return TokenResult::Partial;
                }
                if enc.char_matches(buf, ptr, b'-') {
                    ptr += mb;
                    if ptr == end {
                        return TokenResult::Partial;
                    }
                    if !enc.char_matches(buf, ptr, b'>') {
                        return TokenResult::Invalid { at: ptr };
                    }
                    return token(Token::Comment, ptr + mb);
                }
            }
            CharStep::Other(_) => ptr += mb,
        }
    }
    TokenResult::Partial
}

/// `ptr` is just past `<![` in content; expects the literal `CDATA[`.
fn scan_cdata_open<E: Enc>(enc: &E, buf: &[u8], mut ptr: usize, end: usize) -> TokenResult {
    let mb = E::MIN_BYTES;
    for &c in b"CDATA[" {
        if ptr == end {
            return TokenResult::Partial;
        }
        if !enc.char_matches(buf, ptr, c) {
            return TokenResult::Invalid { at: ptr };
        }
        ptr += mb;
    }
    token(Token::CdataSectionOpen, ptr)
}

/// `ptr` is just past `<?`. A target of exactly `xml` produces
/// `XmlDecl`; any case variant of it is rejected.
fn scan_pi<E: Enc>(enc: &E, buf: &[u8], mut ptr: usize, end: usize) -> TokenResult {
    let mb = E::MIN_BYTES;
    if ptr == end {
        return TokenResult::Partial;
    }
    let target_start = ptr;
    match name_step(enc, buf, ptr, end, true) {
        Step::Advance(n) => ptr += n,
        Step::Split => return TokenResult::PartialChar,
        _ => return TokenResult::Invalid { at: ptr },
    }
    loop {
        if ptr == end {
            return TokenResult::Partial;
        }
        match name_step(enc, buf, ptr, end, false) {
            Step::Advance(n) => {
                ptr += n;
                continue;
            }
            Step::Split => return TokenResult::PartialChar,
            Step::Invalid => return TokenResult::Invalid { at: ptr },
            Step::Other(cls) => {
                let kind = match pi_target_kind(enc, buf, target_start, ptr) {
                    Some(kind) => kind,
                    None => return TokenResult::Invalid { at: target_start },
                };
                match cls {
                    ByteClass::S | ByteClass::Cr | ByteClass::Lf => {
                        ptr += mb;
                        while ptr != end {
                            match char_step(enc, buf, ptr, end) {
                                CharStep::Advance(n) => ptr += n,
                                CharStep::Split => return TokenResult::PartialChar,
                                CharStep::Invalid => {
                                    return TokenResult::Invalid { at: ptr }
                                }
                                CharStep::Other(ByteClass::Quest) => {
                                    ptr += mb;
                                    if ptr == end {
                                        return TokenResult::Partial;
                                    }
                                    if enc.char_matches(buf, ptr, b'>') {
                                        return token(kind, ptr + mb);
                                    }
                                }
                                CharStep::Other(_) => ptr += mb,
                            }
                        }
                        return TokenResult::Partial;
                    }
                    ByteClass::Quest => {
                        ptr += mb;
                        if ptr == end {
                            return TokenResult::Partial;
                        }
                        if enc.char_matches(buf, ptr, b'>') {
                            return token(kind, ptr + mb);
                        }
                        return TokenResult::Invalid { at: ptr };
                    }
                    _ => return TokenResult::Invalid { at: ptr },
                }
            }
        }
    }
}

fn pi_target_kind<E: Enc>(enc: &E, buf: &[u8], start: usize, end: usize) -> Option<Token> {
    let mb = E::MIN_BYTES;
    if end - start != 3 * mb {
        return Some(Token::Pi);
    }
    let mut exact = true;
    let mut folded = true;
    for (k, &c) in b"xml".iter().enumerate() {
        let i = start + k * mb;
        if !enc.char_matches(buf, i, c) {
            exact = false;
            if !enc.char_matches(buf, i, c.to_ascii_uppercase()) {
                folded = false;
            }
        }
    }
    if exact {
        Some(Token::XmlDecl)
    } else if folded {
        // reserved target in a case other than `xml`
        None
    } else {
        Some(Token::Pi)
    }
}

// CDATA section phase

pub(crate) fn cdata_section_token<E: Enc>(
    enc: &E,
    buf: &[u8],
    ptr: usize,
    end: usize,
) -> TokenResult {
    if ptr == end {
        return TokenResult::Empty;
    }
    let end = match align_end::<E>(ptr, end) {
        Some(end) => end,
        None => return TokenResult::Partial,
    };
    let mb = E::MIN_BYTES;
    let mut ptr = ptr;
    match enc.byte_class(buf, ptr) {
        ByteClass::Rsqb => {
            if ptr + mb == end {
                return TokenResult::Partial;
            }
            if enc.char_matches(buf, ptr + mb, b']') {
                if ptr + 2 * mb == end {
                    return TokenResult::Partial;
                }
                if enc.char_matches(buf, ptr + 2 * mb, b'>') {
                    return token(Token::CdataSectionClose, ptr + 3 * mb);
                }
            }
            ptr += mb;
        }
        ByteClass::Lf => return token(Token::DataNewline, ptr + mb),
        ByteClass::Cr => {
            ptr += mb;
            if ptr == end {
                return token(Token::TrailingCr, end);
            }
            if enc.byte_class(buf, ptr) == ByteClass::Lf {
                ptr += mb;
            }
            return token(Token::DataNewline, ptr);
        }
        _ => match char_step(enc, buf, ptr, end) {
            CharStep::Advance(n) => ptr += n,
            CharStep::Other(_) => ptr += mb,
            CharStep::Split => return TokenResult::PartialChar,
            CharStep::Invalid => return TokenResult::Invalid { at: ptr },
        },
    }
    while ptr != end {
        match char_step(enc, buf, ptr, end) {
            CharStep::Advance(n) => ptr += n,
            CharStep::Split => return token(Token::DataChars, ptr),
            CharStep::Invalid => return token(Token::DataChars, ptr),
            CharStep::Other(cls) => match cls {
                ByteClass::Rsqb | ByteClass::Cr | ByteClass::Lf => {
                    return token(Token::DataChars, ptr)
                }
                _ => ptr += mb,
            },
        }
    }
    token(Token::DataChars, ptr)
}

// Attribute value phase

pub(crate) fn attribute_value_token<E: Enc>(
    enc: &E,
    buf: &[u8],
    ptr: usize,
    end: usize,
) -> TokenResult {
    if ptr == end {
        return TokenResult::Empty;
    }
    let mb = E::MIN_BYTES;
    let mut ptr = ptr;
    match enc.byte_class(buf, ptr) {
        ByteClass::Amp => return scan_ref(enc, buf, ptr + mb, end),
        ByteClass::S => return token(Token::AttributeValueS, ptr + mb),
        ByteClass::Lf => return token(Token::DataNewline, ptr + mb),
        ByteClass::Cr => {
            ptr += mb;
            if ptr == end {
                return token(Token::TrailingCr, end);
            }
            if enc.byte_class(buf, ptr) == ByteClass::Lf {
                ptr += mb;
            }
            return token(Token::DataNewline, ptr);
        }
        ByteClass::Lt => return TokenResult::Invalid { at: ptr },
        _ => match char_step(enc, buf, ptr, end) {
            CharStep::Advance(n) => ptr += n,
            CharStep::Other(_) => ptr += mb,
            CharStep::Split => return TokenResult::PartialChar,
            CharStep::Invalid => return TokenResult::Invalid { at: ptr },
        },
    }
    while ptr != end {
        match char_step(enc, buf, ptr, end) {
            CharStep::Advance(n) => ptr += n,
            CharStep::Split => return token(Token::DataChars, ptr),
            CharStep::Invalid => return token(Token::DataChars, ptr),
            CharStep::Other(cls) => match cls {
                ByteClass::Amp
                | ByteClass::Lt
                | ByteClass::S
                | ByteClass::Cr
                | ByteClass::Lf => return token(Token::DataChars, ptr),
                _ => ptr += mb,
            },
        }
    }
    token(Token::DataChars, ptr)
}

// Entity value phase

pub(crate) fn entity_value_token<E: Enc>(
    enc: &E,
    buf: &[u8],
    ptr: usize,
    end: usize,
) -> TokenResult {
    if ptr == end {
        return TokenResult::Empty;
    }
    let mb = E::MIN_BYTES;
    let mut ptr = ptr;
    match enc.byte_class(buf, ptr) {
        ByteClass::Amp => return scan_ref(enc, buf, ptr + mb, end),
        ByteClass::Percnt => return scan_param_ref(enc, buf, ptr + mb, end),
        ByteClass::Lf => return token(Token::DataNewline, ptr + mb),
        ByteClass::Cr => {
            ptr += mb;
            if ptr == end {
                return token(Token::TrailingCr, end);
            }
            if enc.byte_class(buf, ptr) == ByteClass::Lf {
                ptr += mb;
            }
            return token(Token::DataNewline, ptr);
        }
        _ => match char_step(enc, buf, ptr, end) {
            CharStep::Advance(n) => ptr += n,
            CharStep::Other(_) => ptr += mb,
            CharStep::Split => return TokenResult::PartialChar,
            CharStep::Invalid => return TokenResult::Invalid { at: ptr },
        },
    }
    while ptr != end {
        match char_step(enc, buf, ptr, end) {
            CharStep::Advance(n) => ptr += n,
            CharStep::Split => return token(Token::DataChars, ptr),
            CharStep::Invalid => return token(Token::DataChars, ptr),
            CharStep::Other(cls) => match cls {
                ByteClass::Amp | ByteClass::Percnt | ByteClass::Cr | ByteClass::Lf => {
                    return token(Token::DataChars, ptr)
                }
                _ => ptr += mb,
            },
        }
    }
    token(Token::DataChars, ptr)
}

/// `ptr` is just past `%`; a name must follow, terminated by `;`.
fn scan_param_ref<E: Enc>(enc: &E, buf: &[u8], mut ptr: usize, end: usize) -> TokenResult {
    let mb = E::MIN_BYTES;
    if ptr == end {
        return TokenResult::Partial;
    }
    match name_step(enc, buf, ptr, end, true) {
        Step::Advance(n) => ptr += n,
        Step::Split => return TokenResult::PartialChar,
        _ => return TokenResult::Invalid { at: ptr },
    }
    while ptr != end {
        match name_step(enc, buf, ptr, end, false) {
            Step::Advance(n) => ptr += n,
            Step::Split => return TokenResult::PartialChar,
            Step::Invalid => return TokenResult::Invalid { at: ptr },
            Step::Other(ByteClass::Semi) => {
                return token(Token::ParamEntityRef, ptr + mb)
            }
            Step::Other(_) => return TokenResult::Invalid { at: ptr },
        }
    }
    TokenResult::Partial
}

// Ignore section phase

/// Scans a whole `<![IGNORE[ ... ]]>` body (after its opening
/// bracket) with nesting, returning it as one token.
pub(crate) fn ignore_section_token<E: Enc>(
    enc: &E,
    buf: &[u8],
    ptr: usize,
    end: usize,
) -> TokenResult {
    if ptr == end {
        return TokenResult::Empty;
    }
    let end = match align_end::<E>(ptr, end) {
        Some(end) => end,
        None => return TokenResult::Partial,
    };
    let mb = E::MIN_BYTES;
    let mut ptr = ptr;
    let mut level = 0usize;
    while ptr != end {
        match char_step(enc, buf, ptr, end) {
            CharStep::Advance(n) => ptr += n,
            CharStep::Split => return TokenResult::PartialChar,
            CharStep::Invalid => return TokenResult::Invalid { at: ptr },
            CharStep::Other(ByteClass::Lt) => {
                if end - ptr < 3 * mb {
                    return TokenResult::Partial;
                }
                if enc.char_matches(buf, ptr + mb, b'!')
                    && enc.char_matches(buf, ptr + 2 * mb, b'[')
                {
                    level += 1;
                    ptr += 3 * mb;
                } else {
                    ptr += mb;
                }
            }
            CharStep::Other(ByteClass::Rsqb) => {
                if end - ptr < 3 * mb {
                    return TokenResult::Partial;
                }
                if enc.char_matches(buf, ptr + mb, b']')
                    && enc.char_matches(buf, ptr + 2 * mb, b'>')
                {
                    if level == 0 {
                        return token(Token::IgnoreSect, ptr + 3 * mb);
                    }
                    level -= 1;
                    ptr += 3 * mb;
                } else {
                    ptr += mb;
                }
            }
            CharStep::Other(_) => ptr += mb,
        }
    }
    TokenResult::Partial
}

// Prolog phase

pub(crate) fn prolog_token<E: Enc>(enc: &E, buf: &[u8], ptr: usize, end: usize) -> TokenResult {
    if ptr == end {
        return TokenResult::Empty;
    }
    let end = match align_end::<E>(ptr, end) {
        Some(end) => end,
        None => return TokenResult::Partial,
    };
    let mb = E::MIN_BYTES;
    let mut ptr = ptr;
    let first = enc.byte_class(buf, ptr);
    match first {
        ByteClass::Quot | ByteClass::Apos => {
            let open = first;
            ptr += mb;
            while ptr != end {
                match char_step(enc, buf, ptr, end) {
                    CharStep::Advance(n) => ptr += n,
                    CharStep::Split => return TokenResult::PartialChar,
                    CharStep::Invalid => return TokenResult::Invalid { at: ptr },
                    CharStep::Other(cls) if cls == open => {
                        return token(Token::Literal, ptr + mb)
                    }
                    CharStep::Other(_) => ptr += mb,
                }
            }
            TokenResult::Partial
        }
        ByteClass::S | ByteClass::Cr | ByteClass::Lf => {
            ptr += mb;
            while ptr != end {
                match enc.byte_class(buf, ptr) {
                    ByteClass::S | ByteClass::Cr | ByteClass::Lf => ptr += mb,
                    _ => return token(Token::PrologS, ptr),
                }
            }
            TokenResult::Tentative {
                kind: Token::PrologS,
                end: ptr,
            }
        }
        ByteClass::Lt => {
            let lt = ptr;
            ptr += mb;
            if ptr == end {
                return TokenResult::Partial;
            }
            match enc.byte_class(buf, ptr) {
                ByteClass::Excl => {
                    ptr += mb;
                    if ptr == end {
                        return TokenResult::Partial;
                    }
                    match enc.byte_class(buf, ptr) {
                        ByteClass::Minus => scan_comment(enc, buf, ptr + mb, end),
                        ByteClass::Lsqb => token(Token::CondSectOpen, ptr + mb),
                        _ => {
                            // a markup declaration keyword
                            match name_step(enc, buf, ptr, end, true) {
                                Step::Advance(n) => ptr += n,
                                Step::Split => return TokenResult::PartialChar,
                                _ => return TokenResult::Invalid { at: ptr },
                            }
                            while ptr != end {
                                match name_step(enc, buf, ptr, end, false) {
                                    Step::Advance(n) => ptr += n,
                                    Step::Split => return TokenResult::PartialChar,
                                    Step::Invalid => {
                                        return TokenResult::Invalid { at: ptr }
                                    }
                                    Step::Other(_) => {
                                        return token(Token::DeclOpen, ptr)
                                    }
                                }
                            }
                            TokenResult::Partial
                        }
                    }
                }
                ByteClass::Quest => scan_pi(enc, buf, ptr + mb, end),
                cls => {
                    let start_like = cls.is_ascii_nmstrt()
                        || matches!(
                            cls,
                            ByteClass::NonAscii
                                | ByteClass::Lead2
                                | ByteClass::Lead3
                                | ByteClass::Lead4
                        );
                    if start_like {
                        token(Token::InstanceStart, lt)
                    } else {
                        TokenResult::Invalid { at: ptr }
                    }
                }
            }
        }
        ByteClass::Percnt => {
            ptr += mb;
            if ptr == end {
                return TokenResult::Partial;
            }
            match enc.byte_class(buf, ptr) {
                cls if cls.is_ws() => token(Token::Percent, ptr),
                _ => scan_param_ref(enc, buf, ptr, end),
            }
        }
        ByteClass::Num => {
            ptr += mb;
            while ptr != end {
                match name_step(enc, buf, ptr, end, false) {
                    Step::Advance(n) => ptr += n,
                    Step::Split => return TokenResult::PartialChar,
                    Step::Invalid => return TokenResult::Invalid { at: ptr },
                    Step::Other(_) => return token(Token::PoundName, ptr),
                }
            }
            TokenResult::Tentative {
                kind: Token::PoundName,
                end: ptr,
            }
        }
        ByteClass::Lpar => token(Token::OpenParen, ptr + mb),
        ByteClass::Rpar => {
            ptr += mb;
            if ptr == end {
                return TokenResult::Partial;
            }
            match enc.byte_class(buf, ptr) {
                ByteClass::Quest => token(Token::CloseParenQuestion, ptr + mb),
                ByteClass::Ast => token(Token::CloseParenStar, ptr + mb),
                ByteClass::Plus => token(Token::CloseParenPlus, ptr + mb),
                _ => token(Token::CloseParen, ptr),
            }
        }
        ByteClass::Lsqb => token(Token::OpenBracket, ptr + mb),
        ByteClass::Rsqb => {
            ptr += mb;
            if ptr == end {
                return TokenResult::Tentative {
                    kind: Token::CloseBracket,
                    end: ptr,
                };
            }
            if enc.byte_class(buf, ptr) == ByteClass::Rsqb {
                if ptr + mb == end {
                    return TokenResult::Partial;
                }
                if enc.char_matches(buf, ptr + mb, b'>') {
                    return token(Token::CondSectClose, ptr + 2 * mb);
                }
            }
            token(Token::CloseBracket, ptr)
        }
        ByteClass::Gt => token(Token::DeclClose, ptr + mb),
        ByteClass::Vert => token(Token::Or, ptr + mb),
        ByteClass::Comma => token(Token::Comma, ptr + mb),
        ByteClass::Digit | ByteClass::Name | ByteClass::Minus => {
            scan_nmtoken(enc, buf, ptr, end)
        }
        _ => match name_step(enc, buf, ptr, end, true) {
            Step::Advance(n) => scan_prolog_name(enc, buf, ptr + n, end),
            Step::Split => TokenResult::PartialChar,
            _ => TokenResult::Invalid { at: ptr },
        },
    }
}

/// Rest of a `Name` token; absorbs one occurrence indicator so that
/// content-model items arrive as one token.
fn scan_prolog_name<E: Enc>(enc: &E, buf: &[u8], mut ptr: usize, end: usize) -> TokenResult {
    let mb = E::MIN_BYTES;
    while ptr != end {
        match name_step(enc, buf, ptr, end, false) {
            Step::Advance(n) => ptr += n,
            Step::Split => return TokenResult::PartialChar,
            Step::Invalid => return TokenResult::Invalid { at: ptr },
            Step::Other(cls) => {
                return match cls {
                    ByteClass::Quest | ByteClass::Ast | ByteClass::Plus => {
                        token(Token::Name, ptr + mb)
                    }
                    _ => token(Token::Name, ptr),
                };
            }
        }
    }
    TokenResult::Tentative {
        kind: Token::Name,
        end: ptr,
    }
}

fn scan_nmtoken<E: Enc>(enc: &E, buf: &[u8], mut ptr: usize, end: usize) -> TokenResult {
    while ptr != end {
        match name_step(enc, buf, ptr, end, false) {
            Step::Advance(n) => ptr += n,
            Step::Split => return TokenResult::PartialChar,
            Step::Invalid => return TokenResult::Invalid { at: ptr },
            Step::Other(_) => return token(Token::Nmtoken, ptr),
        }
    }
    TokenResult::Tentative {
        kind: Token::Nmtoken,
        end: ptr,
    }
}

// Shared helpers used by the processor

/// Length in bytes of the name starting at `off`.
pub(crate) fn name_length<E: Enc>(enc: &E, buf: &[u8], off: usize, end: usize) -> usize {
    let mut ptr = off;
    while ptr < end {
        match name_step(enc, buf, ptr, end, false) {
            Step::Advance(n) => ptr += n,
            _ => break,
        }
    }
    ptr - off
}

pub(crate) fn skip_whitespace<E: Enc>(enc: &E, buf: &[u8], off: usize, end: usize) -> usize {
    let mut ptr = off;
    while ptr < end && enc.byte_class(buf, ptr).is_ws() {
        ptr += E::MIN_BYTES;
    }
    ptr
}

/// Raw attribute as extracted from a well-formed start tag.
#[derive(Clone, Debug)]
pub(crate) struct RawAttribute {
    pub name_start: usize,
    pub name_end: usize,
    pub value_start: usize,
    pub value_end: usize,
    /// True when the raw value needs no normalization for a CDATA
    /// attribute (no CR/LF/tab, no references).
    pub normalized: bool,
}

/// Extracts the attributes of a start tag already validated by the
/// scanner. `ptr` is the token start (at `<`).
pub(crate) fn get_attributes<E: Enc>(
    enc: &E,
    buf: &[u8],
    ptr: usize,
    end: usize,
    atts: &mut Vec<RawAttribute>,
) {
    let mb = E::MIN_BYTES;
    atts.clear();
    let mut i = ptr + mb;
    // skip the element name
    i += name_length(enc, buf, i, end);
    loop {
        // next attribute name or tag end
        loop {
            if i >= end {
                return;
            }
            match enc.byte_class(buf, i) {
                cls if cls.is_ws() => i += mb,
                ByteClass::Gt | ByteClass::Sol => return,
                _ => break,
            }
        }
        let name_start = i;
        let name_end = name_start + name_length(enc, buf, name_start, end);
        i = skip_whitespace(enc, buf, name_end, end);
        // '='
        i += mb;
        i = skip_whitespace(enc, buf, i, end);
        let open = enc.byte_class(buf, i);
        i += mb;
        let value_start = i;
        let mut normalized = true;
        while enc.byte_class(buf, i) != open {
            match enc.byte_class(buf, i) {
                ByteClass::Cr | ByteClass::Lf | ByteClass::Amp => {
                    normalized = false;
                    i += mb;
                }
                ByteClass::S => {
                    if !enc.char_matches(buf, i, b' ') {
                        normalized = false;
                    }
                    i += mb;
                }
                cls @ (ByteClass::Lead2 | ByteClass::Lead3 | ByteClass::Lead4) => {
                    i += cls.lead_len();
                }
                _ => i += mb,
            }
        }
        let value_end = i;
        i += mb;
        atts.push(RawAttribute {
            name_start,
            name_end,
            value_start,
            value_end,
            normalized,
        });
    }
}

/// Compares the span against an ASCII keyword.
pub(crate) fn name_matches_ascii<E: Enc>(
    enc: &E,
    buf: &[u8],
    start: usize,
    end: usize,
    keyword: &[u8],
) -> bool {
    if end - start != keyword.len() * E::MIN_BYTES {
        return false;
    }
    keyword
        .iter()
        .enumerate()
        .all(|(k, &c)| enc.char_matches(buf, start + k * E::MIN_BYTES, c))
}

/// Decodes `start..end` (validated by a scanner) into UTF-8.
pub(crate) fn convert<E: Enc>(
    enc: &E,
    buf: &[u8],
    start: usize,
    end: usize,
    out: &mut String,
) -> Result<(), ()> {
    let mb = E::MIN_BYTES;
    let mut i = start;
    while i < end {
        match enc.byte_class(buf, i) {
            cls @ (ByteClass::Lead2 | ByteClass::Lead3 | ByteClass::Lead4) => {
                let n = cls.lead_len();
                if end - i < n {
                    return Err(());
                }
                out.push(enc.decode_multibyte(buf, i, n).ok_or(())?);
                i += n;
            }
            ByteClass::NonAscii => {
                out.push(enc.decode_single(buf, i).ok_or(())?);
                i += mb;
            }
            ByteClass::Malform | ByteClass::Trail => return Err(()),
            _ => {
                out.push(enc.ascii_at(buf, i).ok_or(())? as char);
                i += mb;
            }
        }
    }
    Ok(())
}

/// Checks a public-id literal body; returns the offset of the first
/// offending character.
pub(crate) fn check_public_id<E: Enc>(
    enc: &E,
    buf: &[u8],
    start: usize,
    end: usize,
) -> Result<(), usize> {
    use xsp_chars::XmlAsciiChar;
    let mut i = start;
    while i < end {
        match enc.ascii_at(buf, i) {
            Some(c) if c.is_xml_pubid_char() => i += E::MIN_BYTES,
            _ => return Err(i),
        }
    }
    Ok(())
}

/// Value of a `&#...;` / `&#x...;` token span.
pub(crate) fn char_ref_value<E: Enc>(
    enc: &E,
    buf: &[u8],
    start: usize,
    end: usize,
) -> Option<char> {
    let mb = E::MIN_BYTES;
    let mut i = start + 2 * mb; // past "&#"
    let mut value: u32 = 0;
    if enc.char_matches(buf, i, b'x') {
        i += mb;
        while i < end - mb {
            let c = enc.ascii_at(buf, i)?;
            let digit = (c as char).to_digit(16)?;
            value = value.checked_mul(16)?.checked_add(digit)?;
            if value > 0x10_ffff {
                return None;
            }
            i += mb;
        }
    } else {
        while i < end - mb {
            let c = enc.ascii_at(buf, i)?;
            let digit = (c as char).to_digit(10)?;
            value = value.checked_mul(10)?.checked_add(digit)?;
            if value > 0x10_ffff {
                return None;
            }
            i += mb;
        }
    }
    xsp_chars::char_from_reference(value)
}

/// Replacement character of the five predefined entities, given the
/// name span of an entity reference.
pub(crate) fn predefined_entity<E: Enc>(
    enc: &E,
    buf: &[u8],
    start: usize,
    end: usize,
) -> Option<char> {
    const TABLE: [(&[u8], char); 5] = [
        (b"lt", '<'),
        (b"gt", '>'),
        (b"amp", '&'),
        (b"apos", '\''),
        (b"quot", '"'),
    ];
    for &(name, c) in TABLE.iter() {
        if name_matches_ascii(enc, buf, start, end, name) {
            return Some(c);
        }
    }
    None
}

pub(crate) fn update_position<E: Enc>(
    enc: &E,
    buf: &[u8],
    start: usize,
    end: usize,
    pos: &mut crate::position::Position,
) {
    let mb = E::MIN_BYTES;
    let mut ptr = start;
    if pos.ignore_initial_lf {
        if ptr == end {
            return;
        }
        if enc.char_matches(buf, ptr, b'\n') {
            ptr += mb;
        }
        pos.ignore_initial_lf = false;
    }
    while ptr < end {
        match enc.byte_class(buf, ptr) {
            cls @ (ByteClass::Lead2 | ByteClass::Lead3 | ByteClass::Lead4) => {
                let n = cls.lead_len();
                if end - ptr < n {
                    return;
                }
                ptr += n;
                pos.column += 1;
            }
            ByteClass::Lf => {
                pos.line += 1;
                pos.column = 0;
                ptr += mb;
            }
            ByteClass::Cr => {
                pos.line += 1;
                ptr += mb;
                if ptr == end {
                    pos.ignore_initial_lf = true;
                    pos.column = 0;
                    return;
                }
                pos.column = 0;
                if enc.char_matches(buf, ptr, b'\n') {
                    ptr += mb;
                }
            }
            _ => {
                ptr += mb;
                pos.column += 1;
            }
        }
    }
}

// XML declaration pseudo-attributes

#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct XmlDeclInfo {
    pub version: Option<String>,
    pub encoding: Option<String>,
    pub standalone: Option<bool>,
}

/// Parses the pseudo-attributes of an `XmlDecl` token span
/// (`<?xml ... ?>`). Text declarations allow no standalone
/// pseudo-attribute and require an encoding.
pub(crate) fn parse_xml_decl<E: Enc>(
    enc: &E,
    buf: &[u8],
    start: usize,
    end: usize,
    is_text_decl: bool,
) -> Result<XmlDeclInfo, ()> {
    let mb = E::MIN_BYTES;
    let mut decl = XmlDeclInfo::default();
    let mut i = start + 5 * mb; // past "<?xml"
    let body_end = end - 2 * mb; // before "?>"

    let mut seen_version = false;
    let mut seen_encoding = false;
    let mut seen_standalone = false;
    loop {
        let after_ws = skip_whitespace(enc, buf, i, body_end);
        if after_ws == body_end {
            break;
        }
        if after_ws == i {
            return Err(());
        }
        i = after_ws;
        let name_start = i;
        while i < body_end && matches!(enc.ascii_at(buf, i), Some(c) if c.is_ascii_alphabetic())
        {
            i += mb;
        }
        let name_end = i;
        i = skip_whitespace(enc, buf, i, body_end);
        if i >= body_end || !enc.char_matches(buf, i, b'=') {
            return Err(());
        }
        i = skip_whitespace(enc, buf, i + mb, body_end);
        if i >= body_end {
            return Err(());
        }
        let quote = match enc.ascii_at(buf, i) {
            Some(c @ (b'"' | b'\'')) => c,
            _ => return Err(()),
        };
        i += mb;
        let mut value = String::new();
        while i < body_end && !enc.char_matches(buf, i, quote) {
            match enc.ascii_at(buf, i) {
                Some(c) => value.push(c as char),
                None => return Err(()),
            }
            i += mb;
        }
        if i >= body_end {
            return Err(());
        }
        i += mb;

        if name_matches_ascii(enc, buf, name_start, name_end, b"version") {
            if seen_version || seen_encoding || seen_standalone {
                return Err(());
            }
            seen_version = true;
            if !version_num_ok(&value) {
                return Err(());
            }
            decl.version = Some(value);
        } else if name_matches_ascii(enc, buf, name_start, name_end, b"encoding") {
            if seen_encoding || seen_standalone {
                return Err(());
            }
            seen_encoding = true;
            if !encoding_name_ok(&value) {
                return Err(());
            }
            decl.encoding = Some(value);
        } else if name_matches_ascii(enc, buf, name_start, name_end, b"standalone") {
            if is_text_decl || seen_standalone {
                return Err(());
            }
            seen_standalone = true;
            decl.standalone = match value.as_str() {
                "yes" => Some(true),
                "no" => Some(false),
                _ => return Err(()),
            };
        } else {
            return Err(());
        }
    }
    if is_text_decl {
        if !seen_encoding {
            return Err(());
        }
    } else if !seen_version {
        return Err(());
    }
    Ok(decl)
}

fn version_num_ok(value: &str) -> bool {
    let mut chars = value.chars();
    chars.next() == Some('1')
        && chars.next() == Some('.')
        && {
            let rest = chars.as_str();
            !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit())
        }
}

fn encoding_name_ok(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
}
