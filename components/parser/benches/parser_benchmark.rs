use criterion::{black_box, criterion_group, criterion_main, Criterion};

use xsp_parser::{Attribute, XmlHandler, XmlParser};

struct Counter {
    elements: usize,
    attributes: usize,
    text_bytes: usize,
}

impl XmlHandler for Counter {
    fn start_element(&mut self, _name: &str, attributes: &[Attribute]) {
        self.elements += 1;
        self.attributes += attributes.len();
    }

    fn character_data(&mut self, data: &str) {
        self.text_bytes += data.len();
    }
}

fn synthetic_document(records: usize) -> Vec<u8> {
    let mut doc = String::from("<?xml version=\"1.0\"?><feed>");
    for i in 0..records {
        doc.push_str(&format!(
            "<entry id='e{}' kind='row'><title>entry {}</title>\
             <body>some text with &amp; escapes and \u{e4}\u{f6}\u{fc}</body></entry>",
            i, i
        ));
    }
    doc.push_str("</feed>");
    doc.into_bytes()
}

fn parse_whole(input: &[u8]) -> (usize, usize, usize) {
    let mut parser = XmlParser::new(Counter {
        elements: 0,
        attributes: 0,
        text_bytes: 0,
    });
    parser.parse(input, true).expect("well-formed input");
    let c = parser.into_handler();
    (c.elements, c.attributes, c.text_bytes)
}

fn parse_chunked(input: &[u8], chunk: usize) -> (usize, usize, usize) {
    let mut parser = XmlParser::new(Counter {
        elements: 0,
        attributes: 0,
        text_bytes: 0,
    });
    let mut offset = 0;
    while offset < input.len() {
        let end = (offset + chunk).min(input.len());
        parser
            .parse(&input[offset..end], end == input.len())
            .expect("well-formed input");
        offset = end;
    }
    let c = parser.into_handler();
    (c.elements, c.attributes, c.text_bytes)
}

fn benchmark(c: &mut Criterion) {
    let doc = synthetic_document(1000);

    c.bench_function("parse whole", |b| b.iter(|| parse_whole(black_box(&doc))));

    c.bench_function("parse 4k chunks", |b| {
        b.iter(|| parse_chunked(black_box(&doc), 4096))
    });
}

criterion_group!(benches, benchmark);
criterion_main!(benches);
