//! SIP Endpoint.
//!
//! The endpoint is the stack object: it owns the transport,
//! transaction and dialog layers, carries the IMS identity profile,
//! and routes every inbound message.

pub mod builder;

pub use builder::Builder;

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use crate::dialog::DialogLayer;
use crate::error::{Error, Result};
use crate::headers::{Header, Headers, Via};
use crate::message::{
    Host, HostPort, NameAddr, Request, Response, SipAddr, StatusCode, StatusLine, TransportKind,
    Uri,
};
use crate::transaction::key::generate_branch;
use crate::transaction::{InvServerTransaction, ServerTransaction, TransactionLayer};
use crate::transport::{
    IncomingRequest, IncomingResponse, OutgoingAddr, OutgoingRequest, OutgoingResponse, Packet,
    ToBytes, Transport, TransportLayer,
};
use crate::SipService;

/// The IMS identity and network profile handed to the core by the
/// stack owner (3GPP TS 24.229).
#[derive(Debug, Clone)]
pub struct ImsProfile {
    /// The home domain URI, e.g. `sip:home.net`.
    pub realm: SipAddr,
    /// The default public identity, used as the From URI.
    pub public_identity: SipAddr,
    /// The private identity (IMPI) used for authentication.
    pub private_identity: String,
    /// The long-term secret shared with the home network.
    pub password: String,
    /// The identity to announce in P-Preferred-Identity.
    pub preferred_identity: Option<SipAddr>,
    /// The P-Access-Network-Info value.
    pub netinfo: Option<String>,
    /// Early IMS security (3GPP TS 33.978): skip Authorization on
    /// REGISTER.
    pub enable_early_ims: bool,
    /// Service-Route values saved from the last 200 to REGISTER.
    pub service_routes: Vec<NameAddr>,
    /// The discovered P-CSCF URI, first hop of preloaded routes.
    pub pcscf: Option<Uri>,
    /// Select sips URIs and secure transports.
    pub secure: bool,
    /// The local contact URI advertised in Contact headers.
    pub contact: Option<Uri>,
}

impl ImsProfile {
    /// The bare host of the home domain, used as the digest realm.
    pub fn realm_host(&self) -> String {
        self.realm.uri().host_port.host.as_str().into_owned()
    }
}

impl Default for ImsProfile {
    fn default() -> Self {
        Self {
            realm: SipAddr::Uri(Uri::new(
                Default::default(),
                None,
                HostPort::new(Host::DomainName("localhost".into()), None),
            )),
            public_identity: SipAddr::Uri(Uri::new(
                Default::default(),
                Some(crate::message::UserInfo::new("anonymous", None)),
                HostPort::new(Host::DomainName("localhost".into()), None),
            )),
            private_identity: String::new(),
            password: String::new(),
            preferred_identity: None,
            netinfo: None,
            enable_early_ims: false,
            service_routes: Vec::new(),
            pcscf: None,
            secure: false,
            contact: None,
        }
    }
}

pub(crate) struct Inner {
    /// The transport layer for the endpoint.
    pub(crate) transport: TransportLayer,
    /// The transaction layer for the endpoint.
    pub(crate) transaction: Option<TransactionLayer>,
    /// The dialog layer for the endpoint.
    pub(crate) dialog: DialogLayer,
    /// The name of the endpoint.
    pub(crate) name: String,
    /// The capability header list.
    pub(crate) capabilities: Headers,
    /// The list of services registered.
    pub(crate) services: Box<[Box<dyn SipService>]>,
    /// The IMS identity profile.
    pub(crate) profile: ImsProfile,
}

#[derive(Clone)]
/// The SIP endpoint.
///
/// An endpoint is a logical entity that can send and receive SIP
/// messages, manage transactions and dialogs, and interact with the
/// registered SIP services.
pub struct Endpoint(Arc<Inner>);

impl Endpoint {
    /// Returns a builder to create an `Endpoint`.
    pub fn builder() -> Builder {
        Builder::default()
    }

    pub(crate) fn from_inner(inner: Inner) -> Self {
        Self(Arc::new(inner))
    }

    /// Run, processing transport events until the given timeout.
    pub async fn run_with_timeout(self, timeout: Duration) -> Result<()> {
        let _ = tokio::time::timeout(timeout, self.receive_message()).await;

        Ok(())
    }

    /// Runs the endpoint by processing messages from the transport
    /// layer.
    pub async fn run(self) -> Result<()> {
        tokio::spawn(Box::pin(self.receive_message()))
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("Task join error: {}", e)))??;

        Ok(())
    }

    async fn receive_message(self) -> Result<()> {
        self.0.transport.handle_events(&self).await
    }

    /// Get the endpoint name.
    pub fn get_name(&self) -> &String {
        &self.0.name
    }

    /// Returns the IMS identity profile.
    pub fn profile(&self) -> &ImsProfile {
        &self.0.profile
    }

    /// Returns the capability headers announced by this endpoint.
    pub fn capabilities(&self) -> &Headers {
        &self.0.capabilities
    }

    /// Creates a new User Agent Server (UAS) transaction for a
    /// non-INVITE request.
    pub fn new_uas_tsx(&self, request: &IncomingRequest) -> ServerTransaction {
        ServerTransaction::new(self, request)
    }

    /// Creates a new User Agent Server (UAS) INVITE transaction.
    pub fn new_uas_inv_tsx(&self, request: &IncomingRequest) -> InvServerTransaction {
        InvServerTransaction::new(self, request)
    }

    /// Responds statelessly to a request.
    ///
    /// The response is composed from the incoming request and sent
    /// without creating a UAS transaction.
    pub async fn respond(&self, request: &IncomingRequest, status_code: i32, reason_phrase: &str) -> Result<()> {
        let msg = self.new_response(request, status_code, reason_phrase);

        self.send_response(&msg).await
    }

    /// Creates a new SIP response based on an incoming request.
    ///
    /// Copies the Via stack, Record-Route set, Call-ID, From, To and
    /// CSeq headers from the request as per RFC 3261 §8.2.6; a To tag
    /// is generated for final responses that lack one (§8.2.6.2).
    pub fn new_response(&self, req: &IncomingRequest, code: i32, reason: &str) -> OutgoingResponse {
        let mut headers = Headers::with_capacity(7);
        let msg_headers = &req.request.headers;

        // `Via` headers, topmost first.
        let topmost_via = req.core.via.clone();
        let via = msg_headers.iter().filter(|h| matches!(h, Header::Via(_))).skip(1);
        headers.push(Header::Via(topmost_via));
        headers.extend(via.cloned());

        // `Record-Route` headers.
        let rr = msg_headers.iter().filter(|h| matches!(h, Header::RecordRoute(_)));
        headers.extend(rr.cloned());

        // `Call-ID` header.
        headers.push(Header::CallId(req.core.call_id.clone()));

        // `From` header.
        headers.push(Header::From(req.core.from.clone()));

        // `To` header. The UAS MUST add a tag to the To header in the
        // response, except in a 100 where it only MAY be present.
        let mut to = req.core.to.clone();
        if to.tag().is_none() && code > 100 {
            to.set_tag(Some(crate::random_str(8)));
        }
        headers.push(Header::To(to));

        // `CSeq` header.
        headers.push(Header::CSeq(req.core.cseq));

        let addr = self.get_outbound_addr(&req.core.via, &req.transport);
        let status_line = StatusLine::new(code.into(), reason);

        OutgoingResponse {
            response: Response {
                status_line,
                headers,
                body: None,
            },
            addr,
            buf: None,
        }
    }

    /// Sends a SIP response to the address derived from its Via.
    pub async fn send_response(&self, response: &OutgoingResponse) -> Result<()> {
        log::debug!(
            "=> Response {} {}",
            response.status_code().into_i32(),
            response.reason()
        );
        let encoded_buf = response.to_bytes()?;

        match response.addr {
            OutgoingAddr::HostPort {
                host: HostPort { ref host, port },
                protocol,
            } => {
                let ip = self.resolve_host_to_ip(host).await?;
                let port = port.unwrap_or(5060);
                let addr = SocketAddr::new(ip, port);

                let transport = self.0.transport.find(addr, protocol);
                let transport = transport.ok_or(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("Transport not found for {}:{} {}", ip, port, protocol),
                ))?;
                transport.send(&encoded_buf, &addr).await?;
                Ok(())
            }
            OutgoingAddr::Addr { addr, ref transport } => {
                transport.send(&encoded_buf, &addr).await?;
                Ok(())
            }
        }
    }

    /// Answers an inbound request that failed mandatory-header checks
    /// with a stateless 400 reply built from whatever parses.
    pub(crate) async fn reject_bad_request(&self, transport: &Arc<dyn Transport>, packet: &Packet) {
        let code = StatusCode::BadRequest;
        let response = Response::new(StatusLine::new(code, code.reason()));
        let outgoing = OutgoingResponse {
            response,
            addr: OutgoingAddr::Addr {
                addr: packet.addr,
                transport: transport.clone(),
            },
            buf: None,
        };

        if let Ok(buf) = outgoing.to_bytes() {
            if let Err(err) = transport.send(&buf, &packet.addr).await {
                log::warn!("Failed to send 400 Bad Request: {}", err);
            }
        }
    }

    async fn resolve_host_to_ip(&self, host: &Host) -> Result<IpAddr> {
        match host {
            Host::DomainName(domain) => {
                let mut addrs = tokio::net::lookup_host((domain.as_str(), 0)).await?;
                addrs
                    .next()
                    .map(|addr| addr.ip())
                    .ok_or_else(|| {
                        io::Error::new(io::ErrorKind::NotFound, format!("No address for {domain}")).into()
                    })
            }
            Host::IpAddr(ip) => Ok(*ip),
        }
    }

    // https://datatracker.ietf.org/doc/html/rfc3261#section-18.2.2
    // https://datatracker.ietf.org/doc/html/rfc3581
    fn get_outbound_addr(&self, via: &Via, transport: &Arc<dyn Transport>) -> OutgoingAddr {
        if transport.reliable() {
            return OutgoingAddr::Addr {
                addr: transport.addr(),
                transport: transport.clone(),
            };
        }

        if let Some(maddr) = via.maddr() {
            let port = via.sent_by().port.unwrap_or(5060);

            OutgoingAddr::HostPort {
                host: HostPort {
                    host: maddr.clone(),
                    port: Some(port),
                },
                protocol: via.transport(),
            }
        } else if let (Some(rport), Some(ip)) = (via.rport(), via.received()) {
            let addr = SocketAddr::new(ip, rport);

            OutgoingAddr::Addr {
                addr,
                transport: transport.clone(),
            }
        } else if let Some(ip) = via.received() {
            let port = via.sent_by().port.unwrap_or(5060);
            let addr = SocketAddr::new(ip, port);

            OutgoingAddr::Addr {
                addr,
                transport: transport.clone(),
            }
        } else {
            OutgoingAddr::HostPort {
                host: via.sent_by().clone(),
                protocol: via.transport(),
            }
        }
    }

    /// Turns a composed request into an outgoing one: resolves the
    /// destination, picks a transport, and stamps the local Via on
    /// top with a fresh branch (unless one is forced).
    pub(crate) async fn prepare_outgoing(
        &self,
        mut request: Request,
        branch: Option<String>,
    ) -> Result<OutgoingRequest> {
        let uri = request.uri();
        let transport_kind = uri.transport_param.unwrap_or(TransportKind::Udp);
        let port = uri.host_port.port.unwrap_or(5060);
        let ip = self.resolve_host_to_ip(&uri.host_port.host).await?;
        let addr = SocketAddr::new(ip, port);

        let transport = self.0.transport.find(addr, transport_kind).ok_or_else(|| {
            Error::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("Transport not found for {addr} {transport_kind}"),
            ))
        })?;

        let branch = branch.unwrap_or_else(generate_branch);
        let sent_by: HostPort = transport
            .local_name()
            .parse()
            .unwrap_or_default();

        let via = Via::new(transport_kind, sent_by, Some(&branch));
        request.headers.push_front(Header::Via(via));

        Ok(OutgoingRequest {
            msg: request,
            addr,
            buf: None,
            transport,
        })
    }

    /// Sends a request without creating a transaction (the ACK to a
    /// 2xx).
    pub(crate) async fn send_outside_tsx(&self, request: OutgoingRequest) -> Result<()> {
        log::debug!("<= Request {} to /{}", request.msg.req_line.method, request.addr);
        let buf = request.to_bytes()?;
        request.transport.send(&buf, &request.addr).await?;
        Ok(())
    }

    pub(crate) async fn process_response(&self, msg: &mut Option<IncomingResponse>) -> Result<()> {
        {
            let msg = msg.as_ref().unwrap();
            log::debug!(
                "<= Response ({} {})",
                msg.response.status_line.code.into_i32(),
                msg.response.status_line.reason
            );
        }

        let routed = match self.0.transaction {
            Some(ref tsx_layer) => tsx_layer.handle_response(msg.as_ref().unwrap()).await?,
            None => None,
        };

        match routed {
            Some(true) => {
                // A retransmission, absorbed by the transaction.
                return Ok(());
            }
            Some(false) => (),
            None => {
                // No matching client transaction: dropped.
                let msg = msg.as_ref().unwrap();
                log::debug!(
                    "Response ({} {}) from /{} matches no transaction, dropping",
                    msg.response.status_line.code.into_i32(),
                    msg.response.status_line.reason,
                    msg.packet.addr
                );
                return Ok(());
            }
        }

        // The transaction consumed the state transition; the dialog
        // now applies the semantic update.
        if let Some(dialog) = self.0.dialog.match_response(msg.as_ref().unwrap()) {
            dialog.on_response(&msg.as_ref().unwrap().response);
        }

        for service in self.0.services.iter() {
            service.on_incoming_response(self, msg).await?;

            if msg.is_none() {
                break;
            }
        }

        Ok(())
    }

    pub(crate) async fn process_request(&self, msg: &mut Option<IncomingRequest>) -> Result<()> {
        {
            let msg = msg.as_ref().unwrap();
            log::debug!("<= Request {} from /{}", msg.method(), msg.addr());
        }

        let handled_by_transaction_layer = match self.0.transaction {
            Some(ref tsx_layer) => tsx_layer.handle_request(msg.as_ref().unwrap()).await?,
            None => false,
        };

        if handled_by_transaction_layer {
            return Ok(());
        }

        // In-dialog requests reach their dialog (RFC 3261 §12.2.2).
        if let Some(dialog) = self.0.dialog.match_request(msg.as_ref().unwrap()) {
            dialog.recv_request(msg.as_ref().unwrap());
        }

        for service in self.0.services.iter() {
            service.on_incoming_request(self, msg).await?;
            if msg.is_none() {
                break;
            }
        }

        if let Some(msg) = msg {
            log::debug!(
                "Request ({}, cseq={}) from /{} was unhandled by any service",
                msg.method(),
                msg.core.cseq.cseq(),
                msg.addr()
            );
        }

        Ok(())
    }

    pub(crate) fn transactions(&self) -> &TransactionLayer {
        self.0.transaction.as_ref().expect("Transaction layer not set")
    }

    /// Returns the dialog layer.
    pub fn dialogs(&self) -> &DialogLayer {
        &self.0.dialog
    }

    pub(crate) fn transport(&self) -> &TransportLayer {
        &self.0.transport
    }

    /// Hands a body to the SDP parser; only session-describing
    /// payloads (INVITE, 200, ACK, UPDATE) should land here.
    pub fn parse_session_description(body: &[u8]) -> Result<crate::sdp::SessionDescription> {
        crate::sdp::SessionDescription::parse(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::mock;

    #[tokio::test]
    async fn test_new_response_copies_mandatory_headers() {
        let endpoint = mock::default_endpoint().await;
        let request = mock::request(crate::message::Method::Register);

        let response = endpoint.new_response(&request, 200, "OK");

        let headers = &response.response.headers;
        assert!(crate::find_map_header!(headers, Via).is_some());
        assert!(crate::find_map_header!(headers, From).is_some());
        assert!(crate::find_map_header!(headers, CallId).is_some());

        let cseq = crate::find_map_header!(headers, CSeq).unwrap();
        assert_eq!(cseq.cseq(), request.core.cseq.cseq());

        // A final response grows a To tag when the request had none.
        let to = crate::find_map_header!(headers, To).unwrap();
        assert!(to.tag().is_some());
    }

    #[tokio::test]
    async fn test_provisional_keeps_to_untagged() {
        let endpoint = mock::default_endpoint().await;
        let request = mock::request(crate::message::Method::Invite);

        let response = endpoint.new_response(&request, 100, "Trying");

        let to = crate::find_map_header!(&response.response.headers, To).unwrap();
        assert!(to.tag().is_none());
    }
}
