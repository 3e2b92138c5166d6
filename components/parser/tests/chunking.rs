//! Feeding a document in arbitrary chunks must produce the same
//! events as one call, and errors must land on the same position.

mod common;

use common::{canonical, Ev, Recorder};
use xsp_parser::{XmlError, XmlParser};

fn parse_chunked(input: &[u8], chunk: usize) -> Result<Vec<Ev>, (XmlError, u64, u64)> {
    let mut parser = XmlParser::new(Recorder::default());
    let mut offset = 0;
    while offset < input.len() {
        let end = (offset + chunk).min(input.len());
        let is_final = end == input.len();
        if let Err(e) = parser.parse(&input[offset..end], is_final) {
            return Err((e, parser.line_number(), parser.column_number()));
        }
        offset = end;
    }
    if input.is_empty() {
        if let Err(e) = parser.parse(b"", true) {
            return Err((e, parser.line_number(), parser.column_number()));
        }
    }
    Ok(parser.into_handler().events)
}

fn assert_chunking_invariant(input: &[u8]) {
    let whole = parse_chunked(input, input.len().max(1));
    for chunk in 1..=7 {
        let chunked = parse_chunked(input, chunk);
        match (&whole, &chunked) {
            (Ok(a), Ok(b)) => {
                assert_eq!(
                    canonical(a),
                    canonical(b),
                    "chunk size {} changed events",
                    chunk
                );
            }
            (Err(a), Err(b)) => {
                assert_eq!(a, b, "chunk size {} changed the error", chunk);
            }
            _ => panic!(
                "chunk size {} changed the outcome: {:?} vs {:?}",
                chunk, whole, chunked
            ),
        }
    }
}

#[test]
fn simple_document() {
    assert_chunking_invariant(b"<a x='1'>text<b/>more</a>");
}

#[test]
fn multibyte_characters_across_boundaries() {
    assert_chunking_invariant("<a>h\u{e4}ll\u{f6} \u{2603} \u{1d11e}</a>".as_bytes());
}

#[test]
fn declaration_and_doctype() {
    assert_chunking_invariant(
        b"<?xml version=\"1.0\"?><!DOCTYPE r [<!ENTITY e \"text\">]><r>&e;</r>",
    );
}

#[test]
fn cdata_sections() {
    assert_chunking_invariant(b"<a>pre<![CDATA[ <raw> & ]]>post</a>");
}

#[test]
fn comments_and_pis() {
    assert_chunking_invariant(b"<?p one?><!-- two --><a><?q three?></a><!-- four -->");
}

#[test]
fn carriage_returns_at_boundaries() {
    assert_chunking_invariant(b"<a>line1\r\nline2\rline3</a>");
}

#[test]
fn errors_keep_their_position() {
    assert_chunking_invariant(b"<a><b></a></b>");
    assert_chunking_invariant(b"<a x='1' x='2'/>");
    assert_chunking_invariant(b"<a>&undefined;</a>");
}

#[test]
fn utf16_documents_chunked() {
    let doc: Vec<u8> = "<?xml version=\"1.0\"?><a>h\u{e4}i</a>"
        .encode_utf16()
        .flat_map(|u| u.to_le_bytes())
        .collect();
    let mut with_bom = vec![0xff, 0xfe];
    with_bom.extend_from_slice(&doc);
    assert_chunking_invariant(&with_bom);
}

#[test]
fn trailing_cr_waits_for_the_next_chunk() {
    let mut parser = XmlParser::new(Recorder::default());
    parser.parse(b"<a>x\r", false).expect("chunk");
    // no data event for the CR yet
    assert_eq!(
        canonical(&parser.handler().events),
        vec![
            Ev::Start("a".to_string(), vec![]),
            Ev::Chars("x".to_string())
        ]
    );
    parser.parse(b"\n</a>", true).expect("rest");
    assert_eq!(
        canonical(&parser.into_handler().events),
        vec![
            Ev::Start("a".to_string(), vec![]),
            Ev::Chars("x\n".to_string()),
            Ev::End("a".to_string())
        ]
    );
}

#[test]
fn byte_at_a_time() {
    let input = b"<?xml version=\"1.0\" encoding=\"UTF-8\"?><root a='v'><x>1</x>\n<y>2</y></root>";
    let whole = parse_chunked(input, input.len()).expect("well-formed");
    let tiny = parse_chunked(input, 1).expect("well-formed");
    assert_eq!(canonical(&whole), canonical(&tiny));
}
