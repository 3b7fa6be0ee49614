//! SIP Message types
//!
//! The module provides the [`SipMsg`] enum that can be a [`SipMsg::Request`] or
//! [`SipMsg::Response`] and represents a SIP message.

use bytes::Bytes;

use crate::headers::{CSeq, CallId, From as FromHdr, Header, Headers, To};
use crate::parser::SIPV2;

pub mod auth;

mod code;
mod method;
mod param;
mod transport;
mod uri;

pub use code::*;
pub use method::*;
pub use param::*;
pub use transport::*;
pub use uri::*;

/// A SIP message, either Request or Response.
pub enum SipMsg {
    /// A SIP Request.
    Request(Request),
    /// A SIP Response.
    Response(Response),
}

impl SipMsg {
    /// Returns `true` if this message is a [`Request`] message.
    pub const fn is_request(&self) -> bool {
        matches!(self, SipMsg::Request(_))
    }

    /// Returns `true` if this message is a [`Response`] message.
    pub const fn is_response(&self) -> bool {
        matches!(self, SipMsg::Response(_))
    }

    /// Returns a reference to the [`Request`] if this is a
    /// [`SipMsg::Request`] variant.
    pub fn request(&self) -> Option<&Request> {
        if let SipMsg::Request(request) = self {
            Some(request)
        } else {
            None
        }
    }

    /// Returns a reference to the [`Response`] if this is a
    /// [`SipMsg::Response`] variant.
    pub fn response(&self) -> Option<&Response> {
        if let SipMsg::Response(response) = self {
            Some(response)
        } else {
            None
        }
    }

    /// Returns a reference to the headers of the message.
    pub fn headers(&self) -> &Headers {
        match self {
            SipMsg::Request(req) => &req.headers,
            SipMsg::Response(res) => &res.headers,
        }
    }

    /// Returns a mutable reference to the headers of the message.
    pub fn headers_mut(&mut self) -> &mut Headers {
        match self {
            SipMsg::Request(req) => &mut req.headers,
            SipMsg::Response(res) => &mut res.headers,
        }
    }

    /// Returns a reference to the message body.
    pub fn body(&self) -> Option<&[u8]> {
        match self {
            SipMsg::Request(request) => request.body.as_deref(),
            SipMsg::Response(response) => response.body.as_deref(),
        }
    }

    /// Sets the body of the message. It can be `None` to remove the body.
    pub fn set_body(&mut self, body: Option<Bytes>) {
        match self {
            SipMsg::Request(req) => {
                req.body = body;
            }
            SipMsg::Response(res) => {
                res.body = body;
            }
        }
    }
}

impl From<Request> for SipMsg {
    fn from(value: Request) -> Self {
        SipMsg::Request(value)
    }
}

impl From<Response> for SipMsg {
    fn from(value: Response) -> Self {
        SipMsg::Response(value)
    }
}

/// A SIP Request.
///
/// A SIP request represents a request from a client to a server.
#[derive(Debug)]
pub struct Request {
    /// The Request-Line of the SIP message.
    pub req_line: RequestLine,
    /// All headers present in the SIP message.
    pub headers: Headers,
    /// The body of the SIP message, if present.
    pub body: Option<Bytes>,
}

impl Request {
    /// Creates a new SIP `Request` with empty headers and no body.
    pub fn new(method: Method, uri: Uri) -> Self {
        Request {
            req_line: RequestLine { method, uri },
            headers: Default::default(),
            body: None,
        }
    }

    /// Creates a new `Request` with the given headers.
    #[inline]
    pub const fn new_with_headers(method: Method, uri: Uri, headers: Headers) -> Self {
        Self {
            req_line: RequestLine { method, uri },
            headers,
            body: None,
        }
    }

    /// Creates a request carrying the mandatory dialog headers.
    ///
    /// The From, To, Call-ID and CSeq values come from the dialog state;
    /// a fresh Via without a branch is NOT added here, the transaction
    /// layer stamps the top Via when it takes ownership of the request.
    pub fn new_dialog_request(
        method: Method,
        uri: Uri,
        from: FromHdr,
        to: To,
        call_id: CallId,
        cseq: u32,
    ) -> Self {
        let mut headers = Headers::with_capacity(5);

        headers.push(Header::From(from));
        headers.push(Header::To(to));
        headers.push(Header::CallId(call_id));
        headers.push(Header::CSeq(CSeq::new(cseq, method)));

        Self::new_with_headers(method, uri, headers)
    }

    /// Returns the SIP method of the request.
    pub fn method(&self) -> &Method {
        &self.req_line.method
    }

    /// Returns the Request-URI.
    pub fn uri(&self) -> &Uri {
        &self.req_line.uri
    }

    /// Parses the body as a session description when the Content-Type
    /// names SDP. Only INVITE, ACK and UPDATE payloads describe
    /// sessions; bodies are opaque everywhere else.
    pub fn session_description(&self) -> Option<crate::Result<crate::sdp::SessionDescription>> {
        session_description(&self.headers, self.body.as_deref())
    }
}

fn session_description(
    headers: &Headers,
    body: Option<&[u8]>,
) -> Option<crate::Result<crate::sdp::SessionDescription>> {
    let is_sdp = crate::find_map_header!(headers, ContentType).is_some_and(|ct| ct.is_sdp());
    let body = body?;

    if !is_sdp {
        return None;
    }

    Some(crate::sdp::SessionDescription::parse(body))
}

impl std::fmt::Display for RequestLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {SIPV2}\r\n", self.method, self.uri)
    }
}

/// A SIP Request-Line.
///
/// The Request-Line contains the method and the Request-URI,
/// which indicate the target of the SIP request.
#[derive(Debug)]
pub struct RequestLine {
    /// The SIP method associated with the request (e.g., INVITE, BYE).
    pub method: Method,
    /// The Request-URI indicating the target of the request.
    pub uri: Uri,
}

/// A SIP Response.
pub struct Response {
    /// The Status-Line of the SIP message.
    pub status_line: StatusLine,
    /// All headers present in the SIP message.
    pub headers: Headers,
    /// The body of the SIP message, if present.
    pub body: Option<Bytes>,
}

impl Response {
    /// Creates a new SIP `Response` from a `Status-Line`,
    /// with empty headers and no body.
    pub fn new(status_line: StatusLine) -> Self {
        Self {
            status_line,
            headers: Default::default(),
            body: None,
        }
    }

    /// Returns the message response code.
    pub fn code(&self) -> StatusCode {
        self.status_line.code
    }

    /// Returns the reason phrase.
    pub fn reason(&self) -> &str {
        &self.status_line.reason
    }

    /// Creates a new `Response` with the given `Status-Line` and headers.
    pub const fn new_with_headers(status_line: StatusLine, headers: Headers) -> Self {
        Self {
            status_line,
            headers,
            body: None,
        }
    }

    /// Set the headers of the response, replacing any existing headers.
    pub fn set_headers(&mut self, headers: Headers) {
        self.headers = headers;
    }

    /// Appends headers from another collection to the current headers.
    pub fn append_headers(&mut self, other: &mut Headers) {
        self.headers.append(other);
    }

    /// Returns the To tag of the response, if any.
    pub fn to_tag(&self) -> Option<&str> {
        crate::find_map_header!(self.headers, To).and_then(|to| to.tag())
    }

    /// Parses the body as a session description when the Content-Type
    /// names SDP. Only a 2xx to INVITE carries an answer; bodies are
    /// opaque everywhere else.
    pub fn session_description(&self) -> Option<crate::Result<crate::sdp::SessionDescription>> {
        session_description(&self.headers, self.body.as_deref())
    }

    /// Returns the CSeq header of the response, if any.
    pub fn cseq(&self) -> Option<&CSeq> {
        crate::find_map_header!(self.headers, CSeq)
    }
}

/// A SIP Status-Line.
///
/// The Status-Line appears in SIP responses and includes a
/// status code and a reason phrase explaining the result
/// of the request.
pub struct StatusLine {
    /// The SIP status code associated with the response (e.g., 200, 404).
    pub code: StatusCode,
    /// The reason phrase explaining the status code (e.g., "OK", "Not Found").
    pub reason: String,
}

impl std::fmt::Display for StatusLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{SIPV2} {} {}\r\n", self.code.into_i32(), self.reason)
    }
}

impl StatusLine {
    /// Creates a new `StatusLine` instance from the given
    /// [`StatusCode`] and reason.
    pub fn new<R: Into<String>>(code: StatusCode, reason: R) -> Self {
        StatusLine {
            code,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::SipHeaderParse;

    #[test]
    fn test_dialog_request_carries_mandatory_headers() {
        let uri: Uri = "sip:bob@biloxi.com".parse().unwrap();
        let from = FromHdr::from_bytes(b"<sip:alice@atlanta.com>;tag=1928301774").unwrap();
        let to = To::from_bytes(b"<sip:bob@biloxi.com>").unwrap();
        let call_id = CallId::new("a84b4c76e66710");

        let request = Request::new_dialog_request(Method::Invite, uri, from, to, call_id, 314159);

        assert_eq!(request.method(), &Method::Invite);
        assert_eq!(request.headers.len(), 4);

        let cseq = crate::find_map_header!(request.headers, CSeq).unwrap();
        assert_eq!(cseq.cseq(), 314159);
        assert_eq!(cseq.method(), &Method::Invite);
    }

    #[test]
    fn test_request_line_display() {
        let uri: Uri = "sip:bob@biloxi.com".parse().unwrap();
        let request = Request::new(Method::Options, uri);

        assert_eq!(request.req_line.to_string(), "OPTIONS sip:bob@biloxi.com SIP/2.0\r\n");
    }

    #[test]
    fn test_status_line_display() {
        let status_line = StatusLine::new(StatusCode::Ok, "OK");

        assert_eq!(status_line.to_string(), "SIP/2.0 200 OK\r\n");
    }
}
