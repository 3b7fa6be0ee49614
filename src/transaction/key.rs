use std::sync::Arc;

use crate::headers::Via;
use crate::message::{HostPort, Method};
use crate::transport::{IncomingRequest, OutgoingRequest};

/// The magic cookie every RFC 3261 branch parameter starts with.
pub(crate) const BRANCH_MAGIC_COOKIE: &str = "z9hG4bK";

/// Generates a fresh branch parameter: the RFC 3261 magic cookie
/// followed by a random token.
pub(crate) fn generate_branch() -> String {
    format!("{}{}", BRANCH_MAGIC_COOKIE, crate::random_str(10))
}

/// Identifies a transaction for its whole lifetime.
///
/// Client transactions are keyed by (branch, CSeq method); server
/// transactions additionally carry the Via sent-by (RFC 3261 §17.2.3).
/// ACK and CANCEL are keyed with the INVITE method so they land on the
/// INVITE transaction they target.
#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub enum TsxKey {
    Client(ClientTsxKey),
    Server(ServerTsxKey),
}

impl TsxKey {
    pub fn create_client_with(method: &Method, branch: &str) -> Self {
        TsxKey::Client(ClientTsxKey {
            branch: branch.into(),
            method: *method,
        })
    }

    pub fn create_client(request: &OutgoingRequest) -> Self {
        let via = crate::find_map_header!(request.msg.headers, Via)
            .expect("Outgoing request without Via header");
        let cseq = crate::find_map_header!(request.msg.headers, CSeq)
            .expect("Outgoing request without CSeq header");

        let branch = via.branch().expect("Outgoing request without Via branch");

        TsxKey::Client(ClientTsxKey {
            branch: branch.into(),
            method: *cseq.method(),
        })
    }

    pub fn create_server(request: &IncomingRequest) -> Self {
        let via = &request.core.via;
        let branch = via.branch().unwrap_or_default();

        // An ACK or CANCEL matches the INVITE server transaction by
        // branch; its own method never names a transaction.
        let method = match request.core.cseq.method() {
            Method::Ack | Method::Cancel => Method::Invite,
            method => *method,
        };

        TsxKey::Server(ServerTsxKey {
            branch: branch.into(),
            via_sent_by: via.sent_by().clone(),
            method,
        })
    }

    /// Returns the branch value of the key.
    pub fn branch(&self) -> &str {
        match self {
            TsxKey::Client(key) => &key.branch,
            TsxKey::Server(key) => &key.branch,
        }
    }

    /// Returns the method of the key.
    pub fn method(&self) -> &Method {
        match self {
            TsxKey::Client(key) => &key.method,
            TsxKey::Server(key) => &key.method,
        }
    }
}

#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub struct ClientTsxKey {
    branch: Arc<str>,
    method: Method,
}

#[derive(PartialEq, Eq, Hash, Clone, Debug)]
pub struct ServerTsxKey {
    branch: Arc<str>,
    via_sent_by: HostPort,
    method: Method,
}
