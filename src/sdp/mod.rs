//! SDP (RFC 4566) session descriptions.
//!
//! The parser is strictly line-oriented: each `<key>=<value>` line has
//! its own parser and the lines are assembled into a typed session
//! description in the order received. Bodies are opaque to the
//! transaction layer; only INVITE/200/ACK/UPDATE payloads are handed
//! here.

mod attribute;
mod bandwidth;
mod connection;
mod media;
mod origin;
mod time;

pub use attribute::Attribute;
pub use bandwidth::Bandwidth;
pub use connection::Connection;
pub use media::MediaLine;
pub use origin::Origin;
pub use time::SessionTime;

use std::fmt;

use crate::error::Result;
use crate::macros::parse_error;
use crate::scanner::{is_newline, Scanner};

/// One media section: the `m=` line plus the lines that belong to it.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MediaDescription {
    /// The `m=` line.
    pub media: MediaLine,
    /// `i=` line of the section.
    pub info: Option<String>,
    /// `c=` line of the section.
    pub connection: Option<Connection>,
    /// `b=` lines of the section.
    pub bandwidths: Vec<Bandwidth>,
    /// `k=` line of the section.
    pub key: Option<String>,
    /// `a=` lines of the section.
    pub attributes: Vec<Attribute>,
}

/// A parsed SDP session description.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    /// `v=` protocol version; always 0.
    pub version: u8,
    /// `o=` originator and session identifier.
    pub origin: Origin,
    /// `s=` session name.
    pub session_name: String,
    /// `i=` session information.
    pub info: Option<String>,
    /// `u=` URI of description.
    pub uri: Option<String>,
    /// `e=` email addresses.
    pub emails: Vec<String>,
    /// `p=` phone numbers.
    pub phones: Vec<String>,
    /// `c=` session-level connection data.
    pub connection: Option<Connection>,
    /// `b=` session-level bandwidths.
    pub bandwidths: Vec<Bandwidth>,
    /// `t=` timing lines.
    pub times: Vec<SessionTime>,
    /// `r=` repeat times, kept verbatim.
    pub repeats: Vec<String>,
    /// `z=` time zone adjustments, kept verbatim.
    pub time_zones: Option<String>,
    /// `k=` encryption key.
    pub key: Option<String>,
    /// `a=` session-level attributes.
    pub attributes: Vec<Attribute>,
    /// The media sections.
    pub media: Vec<MediaDescription>,
}

impl SessionDescription {
    /// Parses a complete SDP body.
    pub fn parse(buf: &[u8]) -> Result<SessionDescription> {
        let mut scanner = Scanner::new(buf);
        let mut sdp = SessionDescription::default();
        let mut current_media: Option<MediaDescription> = None;

        while !scanner.is_eof() {
            // Skip blank lines between records.
            scanner.read_while(is_newline);
            if scanner.is_eof() {
                break;
            }

            let Some(key) = scanner.next() else { break };
            let Some(b'=') = scanner.next() else {
                return parse_error!("SDP line without '='");
            };

            let value = scanner.read_while(|b| !is_newline(b));
            let value_str = std::str::from_utf8(value)
                .map_err(|_| crate::error::SipParserError::new("SDP line is not valid UTF-8"))?;

            match key {
                b'v' => {
                    sdp.version = match value_str.trim().parse() {
                        Ok(v) => v,
                        Err(_) => return parse_error!("Invalid SDP version"),
                    };
                }
                b'o' => sdp.origin = Origin::parse(value)?,
                b's' => sdp.session_name = value_str.to_string(),
                b'i' => match current_media.as_mut() {
                    Some(media) => media.info = Some(value_str.to_string()),
                    None => sdp.info = Some(value_str.to_string()),
                },
                b'u' => sdp.uri = Some(value_str.to_string()),
                b'e' => sdp.emails.push(value_str.to_string()),
                b'p' => sdp.phones.push(value_str.to_string()),
                b'c' => {
                    let connection = Connection::parse(value)?;
                    match current_media.as_mut() {
                        Some(media) => media.connection = Some(connection),
                        None => sdp.connection = Some(connection),
                    }
                }
                b'b' => {
                    let bandwidth = Bandwidth::parse(value)?;
                    match current_media.as_mut() {
                        Some(media) => media.bandwidths.push(bandwidth),
                        None => sdp.bandwidths.push(bandwidth),
                    }
                }
                b't' => sdp.times.push(SessionTime::parse(value)?),
                b'r' => sdp.repeats.push(value_str.to_string()),
                b'z' => sdp.time_zones = Some(value_str.to_string()),
                b'k' => match current_media.as_mut() {
                    Some(media) => media.key = Some(value_str.to_string()),
                    None => sdp.key = Some(value_str.to_string()),
                },
                b'a' => {
                    let attribute = Attribute::parse(value)?;
                    match current_media.as_mut() {
                        Some(media) => media.attributes.push(attribute),
                        None => sdp.attributes.push(attribute),
                    }
                }
                b'm' => {
                    if let Some(media) = current_media.take() {
                        sdp.media.push(media);
                    }
                    current_media = Some(MediaDescription {
                        media: MediaLine::parse(value)?,
                        ..Default::default()
                    });
                }
                other => {
                    return parse_error!(format!("Unknown SDP line type '{}'", other as char));
                }
            }
        }

        if let Some(media) = current_media.take() {
            sdp.media.push(media);
        }

        Ok(sdp)
    }

    /// Returns the connection data governing a media section: the
    /// section's own `c=` line or the session-level one.
    pub fn connection_for<'a>(&'a self, media: &'a MediaDescription) -> Option<&'a Connection> {
        media.connection.as_ref().or(self.connection.as_ref())
    }
}

impl fmt::Display for SessionDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v={}\r\n", self.version)?;
        write!(f, "o={}\r\n", self.origin)?;
        write!(f, "s={}\r\n", self.session_name)?;
        if let Some(info) = &self.info {
            write!(f, "i={}\r\n", info)?;
        }
        if let Some(uri) = &self.uri {
            write!(f, "u={}\r\n", uri)?;
        }
        for email in &self.emails {
            write!(f, "e={}\r\n", email)?;
        }
        for phone in &self.phones {
            write!(f, "p={}\r\n", phone)?;
        }
        if let Some(connection) = &self.connection {
            write!(f, "c={}\r\n", connection)?;
        }
        for bandwidth in &self.bandwidths {
            write!(f, "b={}\r\n", bandwidth)?;
        }
        for time in &self.times {
            write!(f, "t={}\r\n", time)?;
        }
        for repeat in &self.repeats {
            write!(f, "r={}\r\n", repeat)?;
        }
        if let Some(zones) = &self.time_zones {
            write!(f, "z={}\r\n", zones)?;
        }
        if let Some(key) = &self.key {
            write!(f, "k={}\r\n", key)?;
        }
        for attribute in &self.attributes {
            write!(f, "a={}\r\n", attribute)?;
        }
        for media in &self.media {
            write!(f, "m={}\r\n", media.media)?;
            if let Some(info) = &media.info {
                write!(f, "i={}\r\n", info)?;
            }
            if let Some(connection) = &media.connection {
                write!(f, "c={}\r\n", connection)?;
            }
            for bandwidth in &media.bandwidths {
                write!(f, "b={}\r\n", bandwidth)?;
            }
            if let Some(key) = &media.key {
                write!(f, "k={}\r\n", key)?;
            }
            for attribute in &media.attributes {
                write!(f, "a={}\r\n", attribute)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The session description from RFC 4566 section 5.
    const RFC_EXAMPLE: &[u8] = b"v=0\r\n\
        o=jdoe 2890844526 2890842807 IN IP4 10.47.16.5\r\n\
        s=SDP Seminar\r\n\
        i=A Seminar on the session description protocol\r\n\
        u=http://www.example.com/seminars/sdp.pdf\r\n\
        e=j.doe@example.com (Jane Doe)\r\n\
        c=IN IP4 224.2.17.12/127\r\n\
        t=2873397496 2873404696\r\n\
        a=recvonly\r\n\
        m=audio 49170 RTP/AVP 0\r\n\
        m=video 51372 RTP/AVP 99\r\n\
        a=rtpmap:99 h263-1998/90000\r\n";

    #[test]
    fn test_parse_rfc_example() {
        let sdp = SessionDescription::parse(RFC_EXAMPLE).unwrap();

        assert_eq!(sdp.version, 0);
        assert_eq!(sdp.origin.username, "jdoe");
        assert_eq!(sdp.session_name, "SDP Seminar");
        assert_eq!(sdp.uri.as_deref(), Some("http://www.example.com/seminars/sdp.pdf"));

        let connection = sdp.connection.as_ref().unwrap();
        assert_eq!(connection.nettype, "IN");
        assert_eq!(connection.addrtype, "IP4");
        assert_eq!(connection.addr, "224.2.17.12/127");

        assert_eq!(sdp.times.len(), 1);
        assert_eq!(sdp.times[0].start, 2873397496);

        assert_eq!(sdp.attributes.len(), 1);
        assert_eq!(sdp.attributes[0].name, "recvonly");

        assert_eq!(sdp.media.len(), 2);
        assert_eq!(sdp.media[0].media.media, "audio");
        assert_eq!(sdp.media[0].media.port, 49170);
        assert_eq!(sdp.media[1].media.media, "video");
        assert_eq!(sdp.media[1].attributes.len(), 1);
    }

    #[test]
    fn test_lines_assemble_in_received_order() {
        let sdp = SessionDescription::parse(RFC_EXAMPLE).unwrap();

        // Media-level lines land in their section, session-level lines
        // before the first m= stay at session level.
        assert!(sdp.media[0].attributes.is_empty());
        assert_eq!(sdp.media[1].attributes[0].name, "rtpmap");
    }

    #[test]
    fn test_display_roundtrip() {
        let sdp = SessionDescription::parse(RFC_EXAMPLE).unwrap();
        let printed = sdp.to_string();
        let reparsed = SessionDescription::parse(printed.as_bytes()).unwrap();

        assert_eq!(sdp, reparsed);
    }

    #[test]
    fn test_unknown_line_type_is_an_error() {
        let body = b"v=0\r\nx=unknown\r\n";

        assert!(SessionDescription::parse(body).is_err());
    }

    #[test]
    fn test_connection_for_prefers_media_level() {
        let body = b"v=0\r\n\
            o=alice 1 1 IN IP4 10.0.0.1\r\n\
            s=-\r\n\
            c=IN IP4 10.0.0.1\r\n\
            t=0 0\r\n\
            m=audio 49170 RTP/AVP 0\r\n\
            c=IN IP4 10.0.0.2\r\n";

        let sdp = SessionDescription::parse(body).unwrap();
        let connection = sdp.connection_for(&sdp.media[0]).unwrap();

        assert_eq!(connection.addr, "10.0.0.2");
    }
}
