mod common;

use common::{canonical, parse_err, parse_ok, Ev, Recorder};
use xsp_parser::{XmlError, XmlParser};

fn start(name: &str, atts: &[(&str, &str)]) -> Ev {
    Ev::Start(
        name.to_string(),
        atts.iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect(),
    )
}

#[test]
fn empty_element() {
    assert_eq!(
        parse_ok(b"<a/>"),
        vec![start("a", &[]), Ev::End("a".to_string())]
    );
}

#[test]
fn element_with_attributes() {
    assert_eq!(
        parse_ok(b"<a x=\"1\" y='2'/>"),
        vec![
            start("a", &[("x", "1"), ("y", "2")]),
            Ev::End("a".to_string())
        ]
    );
}

#[test]
fn duplicate_attribute() {
    assert_eq!(parse_err(b"<a x=\"1\" x=\"2\"/>"), XmlError::DuplicateAttribute);
}

#[test]
fn duplicate_attribute_position() {
    let mut parser = XmlParser::new(Recorder::default());
    assert!(parser.parse(b"<a x=\"1\" x=\"2\"/>", true).is_err());
    // the second x, zero-based column
    assert_eq!(parser.line_number(), 1);
    assert_eq!(parser.column_number(), 9);
    assert_eq!(parser.byte_index(), 9);
}

#[test]
fn tag_mismatch() {
    let mut parser = XmlParser::new(Recorder::default());
    let err = parser.parse(b"<a><b></a></b>", true).expect_err("mismatch");
    assert_eq!(err, XmlError::TagMismatch);
    let events = parser.into_handler().events;
    assert_eq!(
        events,
        vec![start("a", &[]), start("b", &[])]
    );
}

#[test]
fn tag_mismatch_position_is_the_end_tag_name() {
    let mut parser = XmlParser::new(Recorder::default());
    assert!(parser.parse(b"<a><b></a></b>", true).is_err());
    // the a in </a>
    assert_eq!(parser.byte_index(), 8);
    assert_eq!(parser.column_number(), 8);
}

#[test]
fn split_entity_reference_across_chunks() {
    let mut parser = XmlParser::new(Recorder::default());
    parser.parse(b"<a>&am", false).expect("incomplete chunk");
    parser.parse(b"p;</a>", true).expect("rest");
    assert_eq!(
        parser.into_handler().events,
        vec![
            start("a", &[]),
            Ev::Chars("&".to_string()),
            Ev::End("a".to_string())
        ]
    );
}

#[test]
fn internal_entity_expansion() {
    let input = b"<?xml version=\"1.0\"?><!DOCTYPE r [<!ENTITY e \"hi\">]><r>&e;</r>";
    let events = canonical(&parse_ok(input));
    assert_eq!(
        events,
        vec![
            Ev::DoctypeStart("r".to_string()),
            Ev::DoctypeEnd,
            start("r", &[]),
            Ev::Chars("hi".to_string()),
            Ev::End("r".to_string())
        ]
    );
}

#[test]
fn cdata_section_is_literal() {
    let events = canonical(&parse_ok(b"<a><![CDATA[<b>]]></a>"));
    assert_eq!(
        events,
        vec![
            start("a", &[]),
            Ev::CdataStart,
            Ev::Chars("<b>".to_string()),
            Ev::CdataEnd,
            Ev::End("a".to_string())
        ]
    );
}

#[test]
fn empty_document() {
    assert_eq!(parse_err(b""), XmlError::NoElements);
}

#[test]
fn declaration_only_document() {
    assert_eq!(
        parse_err(b"<?xml version=\"1.0\"?>"),
        XmlError::NoElements
    );
}

#[test]
fn junk_after_document_element() {
    assert_eq!(parse_err(b"<a/><b/>"), XmlError::JunkAfterDocElement);
    assert_eq!(parse_err(b"<a/>x"), XmlError::JunkAfterDocElement);
}

#[test]
fn epilog_misc_is_fine() {
    let events = parse_ok(b"<a/> <!-- bye --> <?done now?>\n");
    assert!(events.contains(&Ev::Comment(" bye ".to_string())));
    assert!(events.contains(&Ev::Pi("done".to_string(), "now".to_string())));
}

#[test]
fn unclosed_tag() {
    assert_eq!(parse_err(b"<a>"), XmlError::NoElements);
    assert_eq!(parse_err(b"<a"), XmlError::UnclosedToken);
}

#[test]
fn invalid_token() {
    assert_eq!(parse_err(b"<a>\x01</a>"), XmlError::InvalidToken);
}

#[test]
fn misplaced_xml_declaration() {
    assert_eq!(
        parse_err(b"<a><?xml version=\"1.0\"?></a>"),
        XmlError::MisplacedXmlPi
    );
}

#[test]
fn bracket_run_guard() {
    assert_eq!(parse_err(b"<a>]]></a>"), XmlError::InvalidToken);
    assert_eq!(
        canonical(&parse_ok(b"<a>]] ></a>")),
        vec![
            start("a", &[]),
            Ev::Chars("]] >".to_string()),
            Ev::End("a".to_string())
        ]
    );
}

#[test]
fn character_references() {
    assert_eq!(
        canonical(&parse_ok(b"<a>&#65;&#x42;</a>")),
        vec![
            start("a", &[]),
            Ev::Chars("AB".to_string()),
            Ev::End("a".to_string())
        ]
    );
}

#[test]
fn bad_character_reference() {
    assert_eq!(parse_err(b"<a>&#0;</a>"), XmlError::BadCharRef);
    assert_eq!(parse_err(b"<a>&#xD800;</a>"), XmlError::BadCharRef);
    assert_eq!(parse_err(b"<a>&#xFFFE;</a>"), XmlError::BadCharRef);
}

#[test]
fn undefined_entity() {
    assert_eq!(parse_err(b"<a>&nosuch;</a>"), XmlError::UndefinedEntity);
}

#[test]
fn newline_handling() {
    assert_eq!(
        canonical(&parse_ok(b"<a>x\r\ny\rz\n</a>")),
        vec![
            start("a", &[]),
            Ev::Chars("x\ny\nz\n".to_string()),
            Ev::End("a".to_string())
        ]
    );
}

#[test]
fn attribute_value_normalization() {
    // CDATA attributes map whitespace to spaces without collapsing
    assert_eq!(
        parse_ok(b"<a x='p\tq\r\nr'/>"),
        vec![
            start("a", &[("x", "p q r")]),
            Ev::End("a".to_string())
        ]
    );
}

#[test]
fn attribute_value_references() {
    assert_eq!(
        parse_ok(b"<a x='1&amp;2&#x21;'/>"),
        vec![
            start("a", &[("x", "1&2!")]),
            Ev::End("a".to_string())
        ]
    );
}

#[test]
fn lt_is_rejected_in_attribute_values() {
    assert_eq!(parse_err(b"<a x='<'/>"), XmlError::InvalidToken);
}

#[test]
fn comments_and_pis_in_content() {
    assert_eq!(
        canonical(&parse_ok(b"<a><!--c--><?t d?></a>")),
        vec![
            start("a", &[]),
            Ev::Comment("c".to_string()),
            Ev::Pi("t".to_string(), "d".to_string()),
            Ev::End("a".to_string())
        ]
    );
}

#[test]
fn pi_data_newlines_are_normalized() {
    let events = parse_ok(b"<?p a\r\nb?><a/>");
    assert!(events.contains(&Ev::Pi("p".to_string(), "a\nb".to_string())));
}

#[test]
fn errors_are_latched() {
    let mut parser = XmlParser::new(Recorder::default());
    let err = parser.parse(b"<a></b>", true).expect_err("mismatch");
    assert_eq!(err, XmlError::TagMismatch);
    assert_eq!(parser.parse(b"<more/>", true), Err(XmlError::TagMismatch));
    assert_eq!(parser.error_code(), Some(XmlError::TagMismatch));
}

#[test]
fn parse_buffer_interface() {
    let mut parser = XmlParser::new(Recorder::default());
    let doc = b"<a>hello</a>";
    let buf = parser.get_buffer(doc.len()).expect("buffer");
    buf[..doc.len()].copy_from_slice(doc);
    parser.parse_buffer(doc.len(), true).expect("well-formed");
    assert_eq!(
        canonical(&parser.into_handler().events),
        vec![
            start("a", &[]),
            Ev::Chars("hello".to_string()),
            Ev::End("a".to_string())
        ]
    );
}

#[test]
fn specified_attribute_count() {
    let input = b"<!DOCTYPE a [<!ATTLIST a d CDATA 'v'>]><a x='1'/>";
    let mut parser = XmlParser::new(Recorder::default());
    parser.parse(input, true).expect("well-formed");
    assert_eq!(parser.specified_attribute_count(), 1);
    let events = parser.into_handler().events;
    assert!(events.contains(&start("a", &[("x", "1"), ("d", "v")])));
}

#[test]
fn whitespace_document_positions() {
    let mut parser = XmlParser::new(Recorder::default());
    let err = parser.parse(b"\n\n  <a></b>", true).expect_err("mismatch");
    assert_eq!(err, XmlError::TagMismatch);
    assert_eq!(parser.line_number(), 3);
}
