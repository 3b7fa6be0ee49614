use std::fmt;

use crate::error::Result;
use crate::macros::parse_error;
use crate::scanner::{is_newline, Scanner};

/// The `b=` line (Bandwidth).
///
/// # Examples
///
/// ```
/// # use imsua::sdp::Bandwidth;
/// let b = Bandwidth::from_bytes(b"AS:64\r\n").unwrap();
///
/// assert_eq!(b.bwtype, "AS");
/// assert_eq!(b.bandwidth, 64);
/// ```
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Bandwidth {
    /// The bandwidth modifier, e.g. `CT` or `AS`.
    pub bwtype: String,
    /// The bandwidth, in kilobits per second.
    pub bandwidth: u32,
}

impl Bandwidth {
    /*
     * bandwidth-field =  "b=" bwtype ":" bandwidth CRLF
     * bwtype          =  token
     * bandwidth       =  1*DIGIT
     */
    pub(crate) fn parse(value: &[u8]) -> Result<Bandwidth> {
        let mut scanner = Scanner::new(value);

        let bwtype = scanner.read_while(|b| b != b':' && !is_newline(b));
        if bwtype.is_empty() {
            return parse_error!("\"b=\" line without bwtype");
        }

        if scanner.must_read(b':').is_err() {
            return parse_error!("\"b=\" line without ':'");
        }

        let bandwidth = match scanner.read_u32() {
            Ok(bandwidth) => bandwidth,
            Err(_) => return parse_error!("\"b=\" bandwidth is not a number"),
        };

        Ok(Bandwidth {
            bwtype: String::from_utf8_lossy(bwtype).into_owned(),
            bandwidth,
        })
    }

    /// Parses a `b=` line value from a raw byte slice.
    pub fn from_bytes(value: &[u8]) -> Result<Bandwidth> {
        Self::parse(value)
    }
}

impl fmt::Display for Bandwidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.bwtype, self.bandwidth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let b = Bandwidth::parse(b"CT:128\r\n").unwrap();

        assert_eq!(b.bwtype, "CT");
        assert_eq!(b.bandwidth, 128);
    }

    #[test]
    fn test_extension_modifier() {
        let b = Bandwidth::parse(b"X-YZ:256").unwrap();

        assert_eq!(b.bwtype, "X-YZ");
        assert_eq!(b.bandwidth, 256);
    }

    #[test]
    fn test_malformed_is_an_error() {
        assert!(Bandwidth::parse(b"AS").is_err());
        assert!(Bandwidth::parse(b"AS:").is_err());
        assert!(Bandwidth::parse(b"AS:abc").is_err());
        assert!(Bandwidth::parse(b":64").is_err());
    }
}
