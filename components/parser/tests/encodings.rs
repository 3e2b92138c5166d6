mod common;

use common::{canonical, Ev, Recorder};
use xsp_parser::{UnknownEncoding, XmlError, XmlHandler, XmlParser};

fn utf16le(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
}

fn utf16be(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(|u| u.to_be_bytes()).collect()
}

fn events_of(input: &[u8]) -> Vec<Ev> {
    let mut parser = XmlParser::new(Recorder::default());
    parser.parse(input, true).expect("well-formed input");
    canonical(&parser.into_handler().events)
}

fn start(name: &str, atts: &[(&str, &str)]) -> Ev {
    Ev::Start(
        name.to_string(),
        atts.iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect(),
    )
}

#[test]
fn utf16_little_endian_with_bom() {
    let mut doc = vec![0xff, 0xfe];
    doc.extend(utf16le("<a x='v'>h\u{e4}i</a>"));
    assert_eq!(
        events_of(&doc),
        vec![
            start("a", &[("x", "v")]),
            Ev::Chars("h\u{e4}i".to_string()),
            Ev::End("a".to_string()),
        ]
    );
}

#[test]
fn utf16_big_endian_with_bom() {
    let mut doc = vec![0xfe, 0xff];
    doc.extend(utf16be("<a>\u{2603}</a>"));
    assert_eq!(
        events_of(&doc),
        vec![
            start("a", &[]),
            Ev::Chars("\u{2603}".to_string()),
            Ev::End("a".to_string()),
        ]
    );
}

#[test]
fn utf16_detected_without_bom() {
    assert_eq!(
        events_of(&utf16be("<a/>")),
        vec![start("a", &[]), Ev::End("a".to_string())]
    );
    assert_eq!(
        events_of(&utf16le("<a/>")),
        vec![start("a", &[]), Ev::End("a".to_string())]
    );
}

#[test]
fn utf8_byte_order_mark_is_consumed() {
    let mut doc = vec![0xef, 0xbb, 0xbf];
    doc.extend_from_slice(b"<a/>");
    assert_eq!(
        events_of(&doc),
        vec![start("a", &[]), Ev::End("a".to_string())]
    );
}

#[test]
fn surrogate_pairs_in_utf16() {
    let mut doc = vec![0xff, 0xfe];
    doc.extend(utf16le("<a>\u{1d11e}</a>"));
    assert_eq!(
        events_of(&doc),
        vec![
            start("a", &[]),
            Ev::Chars("\u{1d11e}".to_string()),
            Ev::End("a".to_string()),
        ]
    );
}

#[test]
fn protocol_encoding_override() {
    let mut parser = XmlParser::new(Recorder::default());
    parser.set_encoding(Some("UTF-16LE"));
    parser
        .parse(&utf16le("<a/>"), true)
        .expect("well-formed input");
    let events = parser.into_handler().events;
    assert!(events.contains(&start("a", &[])));
}

#[test]
fn declared_latin1() {
    let mut doc = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><a>h\xe4i</a>".to_vec();
    doc.push(b'\n');
    assert_eq!(
        events_of(&doc),
        vec![
            start("a", &[]),
            Ev::Chars("h\u{e4}i".to_string()),
            Ev::End("a".to_string()),
        ]
    );
}

#[test]
fn declared_us_ascii_rejects_high_bytes() {
    let doc = b"<?xml version=\"1.0\" encoding=\"US-ASCII\"?><a>h\xe4i</a>";
    let mut parser = XmlParser::new(Recorder::default());
    assert_eq!(parser.parse(doc, true), Err(XmlError::InvalidToken));
}

#[test]
fn encoding_class_mismatch() {
    // a UTF-16 stream declaring a single-byte encoding
    let mut doc = vec![0xff, 0xfe];
    doc.extend(utf16le("<?xml version=\"1.0\" encoding=\"UTF-8\"?><a/>"));
    let mut parser = XmlParser::new(Recorder::default());
    assert_eq!(parser.parse(&doc, true), Err(XmlError::IncorrectEncoding));
}

#[test]
fn utf16_declared_over_bom_stream_is_fine() {
    let mut doc = vec![0xff, 0xfe];
    doc.extend(utf16le("<?xml version=\"1.0\" encoding=\"UTF-16\"?><a/>"));
    let events = events_of(&doc);
    assert!(events.contains(&start("a", &[])));
}

#[cfg(feature = "encoding")]
#[test]
fn declared_windows_1252_via_label_resolution() {
    let doc = b"<?xml version=\"1.0\" encoding=\"windows-1252\"?><a>\x80</a>";
    assert_eq!(
        events_of(doc),
        vec![
            start("a", &[]),
            Ev::Chars("\u{20ac}".to_string()),
            Ev::End("a".to_string()),
        ]
    );
}

struct MapSupplier(Recorder);

impl XmlHandler for MapSupplier {
    fn character_data(&mut self, data: &str) {
        self.0.character_data(data);
    }

    fn unknown_encoding(&mut self, name: &str) -> Option<UnknownEncoding> {
        if name != "x-test-rot0" {
            return None;
        }
        let mut map = [0i32; 256];
        for (b, slot) in map.iter_mut().enumerate() {
            *slot = if b < 0x80 { b as i32 } else { 0x100 + b as i32 };
        }
        Some(UnknownEncoding::new(map))
    }
}

#[test]
fn unknown_encoding_handler_supplies_a_map() {
    let doc = b"<?xml version=\"1.0\" encoding=\"x-test-rot0\"?><a>\xa0</a>";
    let mut parser = XmlParser::new(MapSupplier(Recorder::default()));
    parser.parse(doc, true).expect("well-formed input");
    let events = canonical(&parser.into_handler().0.events);
    assert!(events.contains(&Ev::Chars("\u{1a0}".to_string())));
}

#[test]
fn unknown_encoding_without_handler() {
    let doc = b"<?xml version=\"1.0\" encoding=\"x-none-such\"?><a/>";
    let mut parser = XmlParser::new(Recorder::default());
    assert_eq!(parser.parse(doc, true), Err(XmlError::UnknownEncoding));
}

#[test]
fn utf16_attribute_values_normalize() {
    let mut doc = vec![0xff, 0xfe];
    doc.extend(utf16le("<a x='p\tq'/>"));
    assert_eq!(
        events_of(&doc),
        vec![start("a", &[("x", "p q")]), Ev::End("a".to_string())]
    );
}
