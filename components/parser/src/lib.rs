//! Streaming push-style XML 1.0 parser.
//!
//! Bytes go in through [`XmlParser::parse`] in arbitrary chunks;
//! structural events come out through an [`XmlHandler`]
//! implementation. The parser is non-validating: declarations are
//! consumed for attribute defaulting and entity resolution only.
//!
//! ```
//! use xsp_parser::{XmlHandler, XmlParser};
//!
//! #[derive(Default)]
//! struct Names(Vec<String>);
//!
//! impl XmlHandler for Names {
//!     fn start_element(&mut self, name: &str, _atts: &[xsp_parser::Attribute]) {
//!         self.0.push(name.to_string());
//!     }
//! }
//!
//! let mut parser = XmlParser::new(Names::default());
//! parser.parse(b"<doc><item/></doc>", true).unwrap();
//! assert_eq!(parser.handler().0, ["doc", "item"]);
//! ```

mod dtd;
mod error;
mod handler;
mod parser;
mod pool;
mod position;
mod prolog;
mod table;
mod tokenizer;

pub use error::XmlError;
pub use handler::{Attribute, ExternalEntityReply, UnknownEncoding, XmlHandler};
pub use parser::{ParamEntityParsing, XmlParser};
