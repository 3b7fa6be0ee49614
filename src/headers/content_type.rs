use core::fmt;

use crate::error::Result;
use crate::headers::SipHeaderParse;
use crate::parser::Parser;
use crate::MediaType;

/// The `Content-Type` SIP header.
///
/// Indicates the media type of the `message-body` sent to
/// the recipient.
///
/// Both the long (`Content-Type`) and short (`c`) header names are
/// supported.
///
/// # Examples
/// ```
/// # use imsua::headers::ContentType;
/// let ctype = ContentType::new_sdp();
///
/// assert_eq!(
///     "Content-Type: application/sdp",
///     ctype.to_string()
/// );
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ContentType(MediaType);

impl ContentType {
    /// Creates a new `Content-Type` with sdp as `MediaType`.
    pub fn new_sdp() -> Self {
        Self(MediaType::new("application", "sdp"))
    }

    /// Creates a new `Content-Type` from a `MediaType`.
    pub fn new(media_type: MediaType) -> Self {
        Self(media_type)
    }

    /// Returns the inner `MediaType`.
    pub fn media_type(&self) -> &MediaType {
        &self.0
    }

    /// Returns `true` if this content type is `application/sdp`.
    pub fn is_sdp(&self) -> bool {
        self.0.mtype.eq_ignore_ascii_case("application") && self.0.subtype.eq_ignore_ascii_case("sdp")
    }
}

impl SipHeaderParse for ContentType {
    const NAME: &'static str = "Content-Type";
    const SHORT_NAME: &'static str = "c";
    /*
     * Content-Type     =  ( "Content-Type" / "c" ) HCOLON media-type
     * media-type       =  m-type SLASH m-subtype *(SEMI m-parameter)
     */
    fn parse(parser: &mut Parser<'_>) -> Result<ContentType> {
        let media_type = MediaType::parse(parser)?;

        Ok(ContentType(media_type))
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", ContentType::NAME, self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let src = b"application/sdp\r\n";
        let mut parser = Parser::new(src);
        let ctype = ContentType::parse(&mut parser).unwrap();

        assert!(ctype.is_sdp());
        assert_eq!(ctype.to_string(), "Content-Type: application/sdp");
    }

    #[test]
    fn test_parse_with_param() {
        let src = b"text/html; charset=ISO-8859-4\r\n";
        let mut parser = Parser::new(src);
        let ctype = ContentType::parse(&mut parser).unwrap();

        assert_eq!(ctype.media_type().mtype.as_ref(), "text");
        assert_eq!(ctype.media_type().subtype.as_ref(), "html");
        assert!(!ctype.is_sdp());
    }
}
