use std::fmt;

use crate::error::Result;
use crate::headers::SipHeaderParse;
use crate::parser::Parser;

/// The `Min-Expires` SIP header.
///
/// Conveys the minimum refresh interval supported for
/// soft-state elements managed by the server.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(transparent)]
pub struct MinExpires(u32);

impl MinExpires {
    /// Creates a new `MinExpires` header.
    pub fn new(expires: u32) -> Self {
        Self(expires)
    }

    /// Returns the `MinExpires` value as a `u32`.
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl SipHeaderParse for MinExpires {
    const NAME: &'static str = "Min-Expires";
    /*
     * Min-Expires  =  "Min-Expires" HCOLON delta-seconds
     */
    fn parse(parser: &mut Parser<'_>) -> Result<MinExpires> {
        let expires = parser.parse_u32()?;

        Ok(MinExpires(expires))
    }
}

impl fmt::Display for MinExpires {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", MinExpires::NAME, self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let src = b"60\r\n";
        let mut parser = Parser::new(src);
        let min = MinExpires::parse(&mut parser).unwrap();
        assert_eq!(min.as_u32(), 60);
    }
}
