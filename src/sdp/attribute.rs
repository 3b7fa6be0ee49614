use std::fmt;

use crate::error::Result;
use crate::macros::parse_error;
use crate::scanner::{is_newline, Scanner};

/// The `a=` line (Attribute).
///
/// Either a property attribute (`a=recvonly`) or a value attribute
/// (`a=rtpmap:99 h263-1998/90000`).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// The attribute name.
    pub name: String,
    /// The attribute value, when present.
    pub value: Option<String>,
}

impl Attribute {
    /*
     * attribute-field =  "a=" attribute CRLF
     * attribute       =  (att-field ":" att-value) / att-field
     */
    pub(crate) fn parse(value: &[u8]) -> Result<Attribute> {
        let mut scanner = Scanner::new(value);

        let name = scanner.read_while(|b| b != b':' && !is_newline(b));
        if name.is_empty() {
            return parse_error!("Empty \"a=\" line");
        }

        let value = if scanner.consume_if(|b| b == b':').is_some() {
            let value = scanner.read_while(|b| !is_newline(b));
            Some(String::from_utf8_lossy(value).into_owned())
        } else {
            None
        };

        Ok(Attribute {
            name: String::from_utf8_lossy(name).into_owned(),
            value,
        })
    }

    /// Parses an `a=` line value from a raw byte slice.
    pub fn from_bytes(value: &[u8]) -> Result<Attribute> {
        Self::parse(value)
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}:{}", self.name, value),
            None => write!(f, "{}", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_property() {
        let a = Attribute::parse(b"recvonly\r\n").unwrap();

        assert_eq!(a.name, "recvonly");
        assert_eq!(a.value, None);
    }

    #[test]
    fn test_parse_value() {
        let a = Attribute::parse(b"rtpmap:99 h263-1998/90000\r\n").unwrap();

        assert_eq!(a.name, "rtpmap");
        assert_eq!(a.value.as_deref(), Some("99 h263-1998/90000"));
    }

    #[test]
    fn test_empty_is_an_error() {
        assert!(Attribute::parse(b"\r\n").is_err());
    }
}
