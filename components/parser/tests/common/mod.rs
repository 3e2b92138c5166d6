#![allow(dead_code)]

use xsp_parser::{Attribute, XmlHandler, XmlParser};

/// One recorded event.
#[derive(Clone, Debug, PartialEq)]
pub enum Ev {
    Start(String, Vec<(String, String)>),
    End(String),
    Chars(String),
    Pi(String, String),
    Comment(String),
    CdataStart,
    CdataEnd,
    Default(String),
    DoctypeStart(String),
    DoctypeEnd,
    NsStart(Option<String>, Option<String>),
    NsEnd(Option<String>),
    Notation(String, Option<String>, Option<String>),
    UnparsedEntity(String, String, String),
}

#[derive(Default)]
pub struct Recorder {
    pub events: Vec<Ev>,
}

impl XmlHandler for Recorder {
    fn start_element(&mut self, name: &str, attributes: &[Attribute]) {
        self.events.push(Ev::Start(
            name.to_string(),
            attributes
                .iter()
                .map(|a| (a.name().to_string(), a.value().to_string()))
                .collect(),
        ));
    }

    fn end_element(&mut self, name: &str) {
        self.events.push(Ev::End(name.to_string()));
    }

    fn character_data(&mut self, data: &str) {
        self.events.push(Ev::Chars(data.to_string()));
    }

    fn processing_instruction(&mut self, target: &str, data: &str) {
        self.events.push(Ev::Pi(target.to_string(), data.to_string()));
    }

    fn comment(&mut self, text: &str) {
        self.events.push(Ev::Comment(text.to_string()));
    }

    fn start_cdata_section(&mut self) {
        self.events.push(Ev::CdataStart);
    }

    fn end_cdata_section(&mut self) {
        self.events.push(Ev::CdataEnd);
    }

    fn default_data(&mut self, raw: &str) {
        self.events.push(Ev::Default(raw.to_string()));
    }

    fn start_doctype(&mut self, name: &str) {
        self.events.push(Ev::DoctypeStart(name.to_string()));
    }

    fn end_doctype(&mut self) {
        self.events.push(Ev::DoctypeEnd);
    }

    fn start_namespace_decl(&mut self, prefix: Option<&str>, uri: Option<&str>) {
        self.events.push(Ev::NsStart(
            prefix.map(str::to_string),
            uri.map(str::to_string),
        ));
    }

    fn end_namespace_decl(&mut self, prefix: Option<&str>) {
        self.events.push(Ev::NsEnd(prefix.map(str::to_string)));
    }

    fn notation_decl(
        &mut self,
        name: &str,
        _base: Option<&str>,
        system_id: Option<&str>,
        public_id: Option<&str>,
    ) {
        self.events.push(Ev::Notation(
            name.to_string(),
            system_id.map(str::to_string),
            public_id.map(str::to_string),
        ));
    }

    fn unparsed_entity_decl(
        &mut self,
        name: &str,
        _base: Option<&str>,
        system_id: &str,
        _public_id: Option<&str>,
        notation: &str,
    ) {
        self.events.push(Ev::UnparsedEntity(
            name.to_string(),
            system_id.to_string(),
            notation.to_string(),
        ));
    }
}

/// Adjacent character-data events merged, default-handler events
/// dropped; the shape chunking must not change.
pub fn canonical(events: &[Ev]) -> Vec<Ev> {
    let mut out: Vec<Ev> = Vec::new();
    for ev in events {
        match ev {
            Ev::Default(_) => {}
            Ev::Chars(c) => match out.last_mut() {
                Some(Ev::Chars(prev)) => prev.push_str(c),
                _ => out.push(Ev::Chars(c.clone())),
            },
            other => out.push(other.clone()),
        }
    }
    out
}

pub fn parse_ok(input: &[u8]) -> Vec<Ev> {
    let mut parser = XmlParser::new(Recorder::default());
    parser.parse(input, true).expect("well-formed input");
    parser.into_handler().events
}

pub fn parse_err(input: &[u8]) -> xsp_parser::XmlError {
    let mut parser = XmlParser::new(Recorder::default());
    parser
        .parse(input, true)
        .expect_err("input should be rejected")
}
