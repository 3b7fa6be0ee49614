use std::fmt;

use crate::error::Result;
use crate::macros::parse_error;
use crate::scanner::{is_digit, is_newline, is_space, Scanner};

/// The `m=` line (Media Description).
///
/// # Examples
///
/// ```
/// # use imsua::sdp::MediaLine;
/// let m = MediaLine::from_bytes(b"audio 49170 RTP/AVP 0 8 97\r\n").unwrap();
///
/// assert_eq!(m.media, "audio");
/// assert_eq!(m.port, 49170);
/// assert_eq!(m.proto, "RTP/AVP");
/// assert_eq!(m.fmts, vec!["0", "8", "97"]);
/// ```
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MediaLine {
    /// The media type, e.g. `audio` or `video`.
    pub media: String,
    /// The transport port.
    pub port: u16,
    /// The number of ports, from the `<port>/<count>` form.
    pub port_count: Option<u32>,
    /// The transport protocol, e.g. `RTP/AVP`.
    pub proto: String,
    /// The media format descriptions.
    pub fmts: Vec<String>,
}

impl MediaLine {
    /*
     * media-field =  "m=" media SP port ["/" integer] SP proto
     *                1*(SP fmt) CRLF
     */
    pub(crate) fn parse(value: &[u8]) -> Result<MediaLine> {
        let mut scanner = Scanner::new(value);

        scanner.read_while(is_space);
        let media = scanner.read_while(|b| !is_space(b) && !is_newline(b));
        if media.is_empty() {
            return parse_error!("\"m=\" line without media type");
        }

        scanner.read_while(is_space);
        let port = match scanner.read_u16() {
            Ok(port) => port,
            Err(_) => return parse_error!("\"m=\" port is not a number"),
        };

        let port_count = if scanner.consume_if(|b| b == b'/').is_some() {
            let digits = scanner.read_while(is_digit);
            match std::str::from_utf8(digits).ok().and_then(|s| s.parse().ok()) {
                Some(count) => Some(count),
                None => return parse_error!("\"m=\" port count is not a number"),
            }
        } else {
            None
        };

        scanner.read_while(is_space);
        let proto = scanner.read_while(|b| !is_space(b) && !is_newline(b));
        if proto.is_empty() {
            return parse_error!("\"m=\" line without proto");
        }

        let mut fmts = Vec::new();
        loop {
            scanner.read_while(is_space);
            let fmt = scanner.read_while(|b| !is_space(b) && !is_newline(b));
            if fmt.is_empty() {
                break;
            }
            fmts.push(String::from_utf8_lossy(fmt).into_owned());
        }

        Ok(MediaLine {
            media: String::from_utf8_lossy(media).into_owned(),
            port,
            port_count,
            proto: String::from_utf8_lossy(proto).into_owned(),
            fmts,
        })
    }

    /// Parses an `m=` line value from a raw byte slice.
    pub fn from_bytes(value: &[u8]) -> Result<MediaLine> {
        Self::parse(value)
    }
}

impl fmt::Display for MediaLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.media, self.port)?;
        if let Some(count) = self.port_count {
            write!(f, "/{}", count)?;
        }
        write!(f, " {}", self.proto)?;
        for fmt in &self.fmts {
            write!(f, " {}", fmt)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let m = MediaLine::parse(b"video 49170/2 RTP/AVP 31\r\n").unwrap();

        assert_eq!(m.media, "video");
        assert_eq!(m.port, 49170);
        assert_eq!(m.port_count, Some(2));
        assert_eq!(m.proto, "RTP/AVP");
        assert_eq!(m.fmts, vec!["31"]);
    }

    #[test]
    fn test_malformed_is_an_error() {
        assert!(MediaLine::parse(b"audio\r\n").is_err());
        assert!(MediaLine::parse(b"audio abc RTP/AVP 0\r\n").is_err());
    }

    #[test]
    fn test_display_roundtrip() {
        let m = MediaLine::parse(b"audio 49170 RTP/AVP 0 8 97").unwrap();
        let reparsed = MediaLine::parse(m.to_string().as_bytes()).unwrap();

        assert_eq!(m, reparsed);
    }
}
