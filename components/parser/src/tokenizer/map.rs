use xsp_chars::XmlChar;

use super::classes::{ByteClass, ASCII_CLASSES};
use super::scan::Enc;

/// Synthetic single-byte encoding built from a 256-entry code-point
/// map. Backs the built-in Latin-1/ASCII encodings and anything the
/// `unknown_encoding` handler or `encoding_rs` supplies.
#[derive(Clone)]
pub(crate) struct MapEncoding {
    classes: [ByteClass; 256],
    chars: [char; 256],
}

impl MapEncoding {
    /// Builds an encoding from a map of byte to code point, -1 marking
    /// bytes that cannot occur. ASCII bytes must map to themselves.
    pub(crate) fn from_map(map: &[i32; 256]) -> Option<MapEncoding> {
        let mut classes = [ByteClass::Malform; 256];
        let mut chars = ['\0'; 256];
        for b in 0..256 {
            let v = map[b];
            if v < 0 {
                continue;
            }
            if b < 0x80 && v != b as i32 {
                return None;
            }
            let c = std::char::from_u32(v as u32)?;
            chars[b] = c;
            classes[b] = if c.is_ascii() {
                ASCII_CLASSES[c as usize]
            } else if c.is_xml_char() {
                ByteClass::NonAscii
            } else {
                ByteClass::NonXml
            };
        }
        Some(MapEncoding { classes, chars })
    }

    pub(crate) fn latin1() -> MapEncoding {
        let mut map = [0i32; 256];
        for (b, slot) in map.iter_mut().enumerate() {
            *slot = b as i32;
        }
        // from_map cannot fail on the identity map
        MapEncoding::from_map(&map).unwrap_or(MapEncoding {
            classes: [ByteClass::Malform; 256],
            chars: ['\0'; 256],
        })
    }

    pub(crate) fn us_ascii() -> MapEncoding {
        let mut map = [-1i32; 256];
        for (b, slot) in map.iter_mut().enumerate().take(0x80) {
            *slot = b as i32;
        }
        MapEncoding::from_map(&map).unwrap_or(MapEncoding {
            classes: [ByteClass::Malform; 256],
            chars: ['\0'; 256],
        })
    }

    /// Resolves an encoding label to a single-byte map via
    /// `encoding_rs`.
    #[cfg(feature = "encoding")]
    pub(crate) fn from_label(label: &str) -> Option<MapEncoding> {
        let encoding = encoding_rs::Encoding::for_label(label.as_bytes())?;
        if !encoding.is_single_byte() {
            return None;
        }
        let mut map = [-1i32; 256];
        for b in 0..256u32 {
            let bytes = [b as u8];
            let (text, had_errors) = encoding.decode_without_bom_handling(&bytes);
            if had_errors {
                continue;
            }
            let mut chars = text.chars();
            if let (Some(c), None) = (chars.next(), chars.next()) {
                map[b as usize] = c as i32;
            }
        }
        MapEncoding::from_map(&map)
    }
}

impl Enc for MapEncoding {
    const MIN_BYTES: usize = 1;

    #[inline]
    fn byte_class(&self, buf: &[u8], i: usize) -> ByteClass {
        self.classes[buf[i] as usize]
    }

    #[inline]
    fn char_matches(&self, buf: &[u8], i: usize, c: u8) -> bool {
        self.chars[buf[i] as usize] == c as char
    }

    #[inline]
    fn ascii_at(&self, buf: &[u8], i: usize) -> Option<u8> {
        let c = self.chars[buf[i] as usize];
        if c.is_ascii() && self.classes[buf[i] as usize] != ByteClass::Malform {
            Some(c as u8)
        } else {
            None
        }
    }

    #[inline]
    fn decode_single(&self, buf: &[u8], i: usize) -> Option<char> {
        match self.classes[buf[i] as usize] {
            ByteClass::Malform | ByteClass::NonXml => None,
            _ => Some(self.chars[buf[i] as usize]),
        }
    }

    fn decode_multibyte(&self, _buf: &[u8], _i: usize, _n: usize) -> Option<char> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latin1_classes() {
        let enc = MapEncoding::latin1();
        assert_eq!(enc.byte_class(b"<", 0), ByteClass::Lt);
        assert_eq!(enc.byte_class(&[0xe4], 0), ByteClass::NonAscii);
        assert_eq!(enc.decode_single(&[0xe4], 0), Some('ä'));
    }

    #[test]
    fn ascii_rejects_high_bytes() {
        let enc = MapEncoding::us_ascii();
        assert_eq!(enc.byte_class(&[0xe4], 0), ByteClass::Malform);
    }

    #[test]
    fn map_requires_ascii_identity() {
        let mut map = [-1i32; 256];
        for (b, slot) in map.iter_mut().enumerate() {
            *slot = b as i32;
        }
        map[b'<' as usize] = b'A' as i32;
        assert!(MapEncoding::from_map(&map).is_none());
    }

    #[cfg(feature = "encoding")]
    #[test]
    fn resolves_windows_1252() {
        let enc = MapEncoding::from_label("windows-1252").expect("known label");
        assert_eq!(enc.decode_single(&[0x80], 0), Some('€'));
    }

    #[cfg(feature = "encoding")]
    #[test]
    fn rejects_multi_byte_labels() {
        assert!(MapEncoding::from_label("shift_jis").is_none());
    }
}
