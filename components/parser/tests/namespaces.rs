mod common;

use common::{Ev, Recorder};
use xsp_parser::{XmlError, XmlParser};

fn ns_parse(input: &[u8]) -> Vec<Ev> {
    let mut parser = XmlParser::namespace_aware(Recorder::default(), '!');
    parser.parse(input, true).expect("well-formed input");
    parser.into_handler().events
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
fn prefixed_element_names_expand() {
    let events = ns_parse(b"<p:e xmlns:p='urn:x'/>");
    assert_eq!(
        events,
        vec![
            Ev::NsStart(Some("p".to_string()), Some("urn:x".to_string())),
            start("urn:x!e", &[]),
            Ev::End("urn:x!e".to_string()),
            Ev::NsEnd(Some("p".to_string())),
        ]
    );
}

#[test]
fn default_namespace_applies_to_elements_only() {
    let events = ns_parse(b"<e xmlns='urn:d' a='1'/>");
    assert_eq!(
        events,
        vec![
            Ev::NsStart(None, Some("urn:d".to_string())),
            start("urn:d!e", &[("a", "1")]),
            Ev::End("urn:d!e".to_string()),
            Ev::NsEnd(None),
        ]
    );
}

#[test]
fn prefixed_attributes_expand() {
    let events = ns_parse(b"<e xmlns:p='urn:x' p:a='1'/>");
    assert!(events.contains(&start("e", &[("urn:x!a", "1")])));
}

#[test]
fn xmlns_attributes_are_not_reported() {
    let events = ns_parse(b"<e xmlns:p='urn:x' b='2'/>");
    assert!(events.contains(&start("e", &[("b", "2")])));
}

#[test]
fn bindings_shadow_and_restore() {
    let events = ns_parse(
        b"<e xmlns:p='urn:one'><i xmlns:p='urn:two'><p:x/></i><p:y/></e>",
    );
    assert!(events.contains(&start("urn:two!x", &[])));
    assert!(events.contains(&start("urn:one!y", &[])));
}

#[test]
fn default_namespace_unbinding() {
    let events = ns_parse(b"<e xmlns='urn:d'><i xmlns=''/></e>");
    assert!(events.contains(&Ev::NsStart(None, None)));
    assert!(events.contains(&start("i", &[])));
}

#[test]
fn unbound_prefix_stays_verbatim() {
    let events = ns_parse(b"<p:e/>");
    assert!(events.contains(&start("p:e", &[])));
}

#[test]
fn xml_prefix_is_implicitly_bound() {
    let events = ns_parse(b"<e xml:lang='en'/>");
    assert!(events.contains(&start(
        "e",
        &[("http://www.w3.org/XML/1998/namespace!lang", "en")]
    )));
}

#[test]
fn namespaced_duplicate_is_raw_duplicate() {
    let mut parser = XmlParser::namespace_aware(Recorder::default(), '!');
    let err = parser
        .parse(b"<e xmlns:p='urn:x' p:a='1' p:a='2'/>", true)
        .expect_err("duplicate");
    assert_eq!(err, XmlError::DuplicateAttribute);
}

#[test]
fn zero_separator_concatenates() {
    let mut parser = XmlParser::namespace_aware(Recorder::default(), '\0');
    parser
        .parse(b"<p:e xmlns:p='urn:x'/>", true)
        .expect("well-formed");
    let events = parser.into_handler().events;
    assert!(events.contains(&start("urn:xe", &[])));
}

#[test]
fn default_xmlns_declared_via_attlist() {
    let input = b"<!DOCTYPE e [<!ATTLIST e xmlns CDATA 'urn:dflt'>]><e/>";
    let events = ns_parse(input);
    assert!(events.contains(&Ev::NsStart(None, Some("urn:dflt".to_string()))));
    assert!(events.contains(&start("urn:dflt!e", &[])));
}

/// Captures the context string handed to the external-entity hook.
struct ContextGrabber {
    context: Option<String>,
}

impl xsp_parser::XmlHandler for ContextGrabber {
    fn external_entity_ref(
        &mut self,
        context: Option<&str>,
        _base: Option<&str>,
        _system_id: Option<&str>,
        _public_id: Option<&str>,
    ) -> xsp_parser::ExternalEntityReply {
        self.context = context.map(str::to_string);
        xsp_parser::ExternalEntityReply::Skip
    }
}

#[test]
fn context_round_trip_restores_bindings() {
    let mut parser = XmlParser::namespace_aware(ContextGrabber { context: None }, '!');
    parser
        .parse(
            b"<!DOCTYPE e [<!ENTITY ext SYSTEM 'x'>]>\
              <e xmlns:p='urn:x'><i>&ext;</i></e>",
            true,
        )
        .expect("well-formed");
    let context = parser
        .handler()
        .context
        .clone()
        .expect("hook saw a context");
    assert!(context.contains("p=urn:x"));
    assert!(context.contains("ext"));

    // a fresh external entity parser re-establishes the bindings
    let mut sub = parser.external_entity_parser(Recorder::default(), &context, None);
    sub.parse(b"<p:inner/>", true).expect("well-formed entity");
    let events = sub.into_handler().events;
    assert!(events.contains(&start("urn:x!inner", &[])));
    // and the open entity stays blocked against recursion
    let mut sub = parser.external_entity_parser(Recorder::default(), &context, None);
    assert_eq!(
        sub.parse(b"&ext;", true),
        Err(xsp_parser::XmlError::RecursiveEntityRef)
    );
}

#[test]
fn nested_end_events_unwind_in_reverse() {
    let events = ns_parse(b"<e xmlns:a='urn:a' xmlns:b='urn:b'/>");
    let ends: Vec<&Ev> = events
        .iter()
        .filter(|e| matches!(e, Ev::NsEnd(_)))
        .collect();
    assert_eq!(
        ends,
        vec![
            &Ev::NsEnd(Some("b".to_string())),
            &Ev::NsEnd(Some("a".to_string()))
        ]
    );
}
