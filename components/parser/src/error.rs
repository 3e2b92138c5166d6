use std::error;
use std::fmt;

/// Well-formedness and policy errors.
///
/// Errors are final: once a parse call fails, the parser stays in the
/// error state and keeps returning the same code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum XmlError {
    /// An internal size computation overflowed.
    NoMemory,
    Syntax,
    NoElements,
    InvalidToken,
    UnclosedToken,
    PartialChar,
    TagMismatch,
    DuplicateAttribute,
    JunkAfterDocElement,
    ParamEntityRef,
    UndefinedEntity,
    RecursiveEntityRef,
    /// A tag opened or closed inside an entity did not balance within it.
    AsyncEntity,
    BadCharRef,
    BinaryEntityRef,
    AttributeExternalEntityRef,
    MisplacedXmlPi,
    UnknownEncoding,
    IncorrectEncoding,
    UnclosedCdataSection,
    ExternalEntityHandling,
    NotStandalone,
}

impl XmlError {
    pub fn as_str(&self) -> &'static str {
        match self {
            XmlError::NoMemory => "out of memory",
            XmlError::Syntax => "syntax error",
            XmlError::NoElements => "no element found",
            XmlError::InvalidToken => "not well-formed",
            XmlError::UnclosedToken => "unclosed token",
            XmlError::PartialChar => "partial character",
            XmlError::TagMismatch => "mismatched tag",
            XmlError::DuplicateAttribute => "duplicate attribute",
            XmlError::JunkAfterDocElement => "junk after document element",
            XmlError::ParamEntityRef => "illegal parameter entity reference",
            XmlError::UndefinedEntity => "undefined entity",
            XmlError::RecursiveEntityRef => "recursive entity reference",
            XmlError::AsyncEntity => "asynchronous entity",
            XmlError::BadCharRef => "reference to invalid character number",
            XmlError::BinaryEntityRef => "reference to binary entity",
            XmlError::AttributeExternalEntityRef => {
                "reference to external entity in attribute"
            }
            XmlError::MisplacedXmlPi => {
                "xml processing instruction not at start of external entity"
            }
            XmlError::UnknownEncoding => "unknown encoding",
            XmlError::IncorrectEncoding => {
                "encoding specified in XML declaration is incorrect"
            }
            XmlError::UnclosedCdataSection => "unclosed CDATA section",
            XmlError::ExternalEntityHandling => {
                "error in processing external entity reference"
            }
            XmlError::NotStandalone => "document is not standalone",
        }
    }
}

impl fmt::Display for XmlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl error::Error for XmlError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_code() {
        assert_eq!(XmlError::TagMismatch.to_string(), "mismatched tag");
        assert_eq!(XmlError::NoElements.to_string(), "no element found");
    }
}
