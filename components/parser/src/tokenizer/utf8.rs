use xsp_chars::XmlChar;

use super::classes::{ByteClass, UTF8_CLASSES};
use super::scan::Enc;

/// UTF-8, also the internal encoding entity text is re-tokenized in.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Utf8;

impl Enc for Utf8 {
    const MIN_BYTES: usize = 1;

    #[inline]
    fn byte_class(&self, buf: &[u8], i: usize) -> ByteClass {
        UTF8_CLASSES[buf[i] as usize]
    }

    #[inline]
    fn char_matches(&self, buf: &[u8], i: usize, c: u8) -> bool {
        buf[i] == c
    }

    #[inline]
    fn ascii_at(&self, buf: &[u8], i: usize) -> Option<u8> {
        if buf[i] < 0x80 {
            Some(buf[i])
        } else {
            None
        }
    }

    fn decode_single(&self, _buf: &[u8], _i: usize) -> Option<char> {
        // UTF-8 has no single-unit characters outside ASCII
        None
    }

    fn decode_multibyte(&self, buf: &[u8], i: usize, n: usize) -> Option<char> {
        let b0 = buf[i];
        let cp = match n {
            2 => {
                let b1 = trail(buf[i + 1])?;
                ((b0 as u32 & 0x1f) << 6) | b1
            }
            3 => {
                let b1 = trail(buf[i + 1])?;
                let b2 = trail(buf[i + 2])?;
                let cp = ((b0 as u32 & 0x0f) << 12) | (b1 << 6) | b2;
                if cp < 0x800 {
                    return None;
                }
                cp
            }
            _ => {
                let b1 = trail(buf[i + 1])?;
                let b2 = trail(buf[i + 2])?;
                let b3 = trail(buf[i + 3])?;
                let cp = ((b0 as u32 & 0x07) << 18) | (b1 << 12) | (b2 << 6) | b3;
                if cp < 0x10000 {
                    return None;
                }
                cp
            }
        };
        let c = std::char::from_u32(cp)?;
        if c.is_xml_char() {
            Some(c)
        } else {
            None
        }
    }
}

#[inline]
fn trail(b: u8) -> Option<u32> {
    if b & 0xc0 == 0x80 {
        Some((b & 0x3f) as u32)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_two_byte() {
        let enc = Utf8;
        assert_eq!(enc.decode_multibyte("ä".as_bytes(), 0, 2), Some('ä'));
    }

    #[test]
    fn rejects_overlong() {
        let enc = Utf8;
        // overlong encoding of '/'
        assert_eq!(enc.decode_multibyte(&[0xe0, 0x80, 0xaf], 0, 3), None);
    }

    #[test]
    fn rejects_surrogate() {
        let enc = Utf8;
        assert_eq!(enc.decode_multibyte(&[0xed, 0xa0, 0x80], 0, 3), None);
    }

    #[test]
    fn rejects_noncharacter() {
        let enc = Utf8;
        // U+FFFE
        assert_eq!(enc.decode_multibyte(&[0xef, 0xbf, 0xbe], 0, 3), None);
    }

    #[test]
    fn decodes_astral() {
        let enc = Utf8;
        assert_eq!(enc.decode_multibyte("𝄞".as_bytes(), 0, 4), Some('𝄞'));
    }
}
