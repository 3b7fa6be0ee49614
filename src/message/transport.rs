use std::fmt;

/// The transport protocol named in a Via header or a URI
/// `transport` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransportKind {
    #[default]
    /// User Datagram Protocol.
    Udp,
    /// Transmission Control Protocol.
    Tcp,
    /// Transport Layer Security over TCP.
    Tls,
    /// Stream Control Transmission Protocol.
    Sctp,
    /// A transport this crate does not know about.
    Unknown,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Udp => "UDP",
            TransportKind::Tcp => "TCP",
            TransportKind::Tls => "TLS",
            TransportKind::Sctp => "SCTP",
            TransportKind::Unknown => "UNKNOWN",
        }
    }
}

impl From<&[u8]> for TransportKind {
    fn from(value: &[u8]) -> Self {
        match value {
            v if v.eq_ignore_ascii_case(b"UDP") => TransportKind::Udp,
            v if v.eq_ignore_ascii_case(b"TCP") => TransportKind::Tcp,
            v if v.eq_ignore_ascii_case(b"TLS") => TransportKind::Tls,
            v if v.eq_ignore_ascii_case(b"SCTP") => TransportKind::Sctp,
            _ => TransportKind::Unknown,
        }
    }
}

impl From<&str> for TransportKind {
    fn from(value: &str) -> Self {
        value.as_bytes().into()
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bytes() {
        assert_eq!(TransportKind::from(b"udp".as_ref()), TransportKind::Udp);
        assert_eq!(TransportKind::from(b"TLS".as_ref()), TransportKind::Tls);
        assert_eq!(TransportKind::from(b"sctp".as_ref()), TransportKind::Sctp);
        assert_eq!(TransportKind::from(b"quic".as_ref()), TransportKind::Unknown);
    }
}
