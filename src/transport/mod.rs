//! SIP Transport Layer.
//!
//! The core never performs I/O itself; it consumes the [`Transport`]
//! trait. One UDP implementation is provided, everything else stays
//! pluggable behind the trait.

use std::borrow::Cow;
use std::collections::HashMap;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::sync::mpsc;

use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::headers::{
    CSeq, CallId, ContentLength, From as FromHdr, Header, Headers, SipHeaderParse, To, Via,
};
use crate::message::{HostPort, Request, Response, StatusCode, TransportKind};
use crate::parser;

pub mod udp;

/// An abstraction over a SIP transport implementation.
#[async_trait::async_trait]
pub trait Transport: Sync + Send + 'static {
    /// Sends a buffer to the specified remote socket address.
    ///
    /// Returns the number of bytes sent or an I/O error.
    async fn send(&self, buf: &[u8], addr: &SocketAddr) -> Result<usize>;

    /// Returns the transport kind (e.g., UDP, TCP, TLS).
    fn kind(&self) -> TransportKind;

    /// Returns the local socket address bound to this transport.
    fn addr(&self) -> SocketAddr;

    /// Checks if the provided address belongs to the same IP address
    /// family (IPv4 vs IPv6) as the local socket address.
    fn is_same_af(&self, addr: &SocketAddr) -> bool {
        let our_addr = self.addr();

        (addr.is_ipv4() && our_addr.is_ipv4()) || (addr.is_ipv6() && our_addr.is_ipv6())
    }

    /// Returns the local transport name.
    fn local_name(&self) -> Cow<'_, str>;

    /// Returns `true` if the transport is reliable (e.g., TCP or TLS).
    ///
    /// Retransmission timers are disabled on reliable transports.
    fn reliable(&self) -> bool;

    /// Returns `true` if the transport is secure (e.g., TLS).
    fn secure(&self) -> bool;

    /// Returns the key that uniquely identifies this transport connection.
    fn key(&self) -> TransportKey {
        TransportKey::new(self.addr(), self.kind())
    }
}

/// A key used to identify a transport connection.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct TransportKey {
    /// The socket address of the transport.
    addr: SocketAddr,
    /// The transport kind (e.g., UDP, TCP, TLS).
    kind: TransportKind,
}

impl TransportKey {
    /// Creates a new `TransportKey`.
    pub fn new(addr: SocketAddr, kind: TransportKind) -> Self {
        TransportKey { addr, kind }
    }
}

/// A factory for creating SIP transports.
///
/// Normally used by connection oriented transports like TCP and TLS.
#[async_trait::async_trait]
pub trait Factory: Sync + Send {
    /// Creates a new transport instance.
    async fn create(&self, addr: SocketAddr) -> Result<Arc<dyn Transport>>;

    /// Returns the transport protocol this factory creates.
    fn protocol(&self) -> TransportKind;
}

/// The raw binary content of a message or data block.
#[derive(Clone)]
pub struct Payload(Bytes);

impl Payload {
    /// Creates a new `Payload`.
    #[inline]
    pub fn new(bytes: Bytes) -> Self {
        Payload(bytes)
    }

    /// Returns the raw byte buffer of this payload.
    pub fn buf(&self) -> &[u8] {
        &self.0
    }
}

/// A SIP packet as received from the network.
#[derive(Clone)]
pub struct Packet {
    /// The packet payload.
    pub payload: Payload,
    /// The address of the sender.
    pub addr: SocketAddr,
    /// The time the packet was received.
    pub time: SystemTime,
}

/// The address of an outbound message.
pub enum OutgoingAddr {
    /// HostPort address, resolved at send time.
    HostPort {
        /// The host and port of the address.
        host: HostPort,
        /// The transport protocol used.
        protocol: TransportKind,
    },
    /// SocketAddr address.
    Addr {
        /// The socket address.
        addr: SocketAddr,
        /// The transport to use.
        transport: Arc<dyn Transport>,
    },
}

/// A trait to serialize a message into a wire buffer.
pub trait ToBytes: Sized {
    /// Converts the type into a byte buffer.
    fn to_bytes(&self) -> Result<Bytes>;
}

fn write_msg_tail(
    buf_writer: &mut bytes::buf::Writer<BytesMut>,
    headers: &Headers,
    body: Option<&[u8]>,
) -> Result<()> {
    // Headers, in insertion order.
    write!(buf_writer, "{headers}")?;

    // A Content-Length is appended unless the caller put one in the
    // header list already.
    let has_clen = headers.iter().any(|h| matches!(h, Header::ContentLength(_)));
    if !has_clen {
        let clen = body.map(|b| b.len()).unwrap_or(0);
        write!(buf_writer, "{}: {}\r\n", ContentLength::NAME, clen)?;
    }

    write!(buf_writer, "\r\n")?;

    if let Some(body) = body {
        buf_writer.write_all(body)?;
    }

    Ok(())
}

/// An outbound SIP response.
pub struct OutgoingResponse {
    /// The SIP response message.
    pub response: Response,
    /// The address to send the response to.
    pub addr: OutgoingAddr,
    /// The message raw buffer.
    pub buf: Option<Bytes>,
}

impl OutgoingResponse {
    /// Returns the message status code.
    pub fn status_code(&self) -> StatusCode {
        self.response.status_line.code
    }

    /// Append headers to the message.
    pub fn append_headers(&mut self, other: &mut Headers) {
        self.response.append_headers(other);
    }

    /// Returns the message reason text.
    pub fn reason(&self) -> &str {
        &self.response.status_line.reason
    }

    /// Returns `true` if this is a provisional response.
    pub fn is_provisional(&self) -> bool {
        self.response.status_line.code.is_provisional()
    }

    /// Set the message body.
    pub fn set_body(&mut self, body: Bytes) {
        self.response.body = Some(body);
    }

    /// Returns a mutable reference to the response headers.
    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.response.headers
    }
}

impl ToBytes for OutgoingResponse {
    fn to_bytes(&self) -> Result<Bytes> {
        let estimated_message_size = if self.response.body.is_none() { 800 } else { 1500 };
        let buf = BytesMut::with_capacity(estimated_message_size);

        let mut buf_writer = buf.writer();

        write!(buf_writer, "{}", &self.response.status_line)?;
        write_msg_tail(&mut buf_writer, &self.response.headers, self.response.body.as_deref())?;

        Ok(buf_writer.into_inner().freeze())
    }
}

/// An outbound SIP request.
pub struct OutgoingRequest {
    /// The SIP request message.
    pub msg: Request,
    /// The addr to send the request to.
    pub addr: SocketAddr,
    /// The message raw buffer.
    pub buf: Option<Bytes>,
    /// The transport to use for sending the request.
    pub transport: Arc<dyn Transport>,
}

impl ToBytes for OutgoingRequest {
    fn to_bytes(&self) -> Result<Bytes> {
        let estimated_message_size = if self.msg.body.is_none() { 800 } else { 1500 };
        let buf = BytesMut::with_capacity(estimated_message_size);

        let mut buf_writer = buf.writer();

        write!(buf_writer, "{}", &self.msg.req_line)?;
        write_msg_tail(&mut buf_writer, &self.msg.headers, self.msg.body.as_deref())?;

        Ok(buf_writer.into_inner().freeze())
    }
}

/// The mandatory headers every message must carry, extracted once on
/// receipt so upper layers never search for them again.
#[derive(Clone)]
pub struct CoreHeaders {
    /// The topmost Via header as found in the message.
    pub via: Via,
    /// The From header found in the message.
    pub from: FromHdr,
    /// The CSeq header as found in the message.
    pub cseq: CSeq,
    /// The Call-ID header found in the message.
    pub call_id: CallId,
    /// The To header found in the message.
    pub to: To,
}

impl CoreHeaders {
    /// Extracts the mandatory headers from a header list, stamping the
    /// Via `received` parameter with the packet source (RFC 3581 §4).
    pub(crate) fn extract(headers: &Headers, source: &SocketAddr) -> Result<Self> {
        let mut via: Option<Via> = None;
        let mut cseq: Option<CSeq> = None;
        let mut from: Option<FromHdr> = None;
        let mut call_id: Option<CallId> = None;
        let mut to: Option<To> = None;

        for header in headers.iter() {
            match header {
                Header::Via(v) if via.is_none() => via = Some(v.clone()),
                Header::From(f) => from = Some(f.clone()),
                Header::To(t) => to = Some(t.clone()),
                Header::CallId(c) => call_id = Some(c.clone()),
                Header::CSeq(c) => cseq = Some(*c),
                _ => (),
            }
        }

        let Some(mut via) = via else {
            return Err(Error::MissingRequiredHeader(Via::NAME));
        };
        let Some(from) = from else {
            return Err(Error::MissingRequiredHeader(FromHdr::NAME));
        };
        let Some(to) = to else {
            return Err(Error::MissingRequiredHeader(To::NAME));
        };
        let Some(call_id) = call_id else {
            return Err(Error::MissingRequiredHeader(CallId::NAME));
        };
        let Some(cseq) = cseq else {
            return Err(Error::MissingRequiredHeader(CSeq::NAME));
        };

        via.set_received(source.ip());

        Ok(CoreHeaders {
            via,
            cseq,
            call_id,
            from,
            to,
        })
    }
}

/// A received SIP request.
pub struct IncomingRequest {
    /// The SIP request message.
    pub request: Request,
    /// The transport the request arrived on.
    pub transport: Arc<dyn Transport>,
    /// The packet that contains the request.
    pub packet: Packet,
    /// The mandatory headers extracted from the request.
    pub core: CoreHeaders,
}

impl IncomingRequest {
    /// Returns the `To` header of the request.
    pub fn to(&self) -> &To {
        &self.core.to
    }

    /// Returns the `From` header of the request.
    pub fn from(&self) -> &FromHdr {
        &self.core.from
    }

    /// Returns the `Call-ID` header of the request.
    pub fn call_id(&self) -> &CallId {
        &self.core.call_id
    }

    /// Returns `true` if the message method matches the given method.
    #[inline(always)]
    pub fn is_method(&self, method: &crate::message::Method) -> bool {
        self.request.method() == method
    }

    /// Returns the message method.
    pub fn method(&self) -> &crate::message::Method {
        self.request.method()
    }

    /// Gets the source socket address of the packet.
    pub fn addr(&self) -> &SocketAddr {
        &self.packet.addr
    }
}

/// A received SIP response.
pub struct IncomingResponse {
    /// The SIP response message.
    pub response: Response,
    /// The transport the response arrived on.
    pub transport: Arc<dyn Transport>,
    /// The packet that contains the response.
    pub packet: Packet,
    /// The mandatory headers extracted from the response.
    pub core: CoreHeaders,
}

impl IncomingResponse {
    /// Returns the response status code.
    pub fn code(&self) -> StatusCode {
        self.response.code()
    }
}

pub(crate) enum TransportEvent {
    /// A packet was received from the transport layer.
    Packet {
        transport: Arc<dyn Transport>,
        packet: Packet,
    },
    /// A new transport was created.
    Created(Arc<dyn Transport>),
    /// A transport was closed.
    Closed(TransportKey),
    /// A factory was created.
    Factory(Box<dyn Factory>),
}

type TransportTx = mpsc::Sender<TransportEvent>;
type TransportRx = mpsc::Receiver<TransportEvent>;

/// Transport Layer for SIP messages.
pub struct TransportLayer {
    /// A map of transports indexed by their unique keys.
    transports: Mutex<HashMap<TransportKey, Arc<dyn Transport>>>,
    /// A list of transport factories.
    factories: Mutex<Vec<Box<dyn Factory>>>,
    /// The sender used to hand events to the transport layer.
    transport_tx: TransportTx,
    /// A receiver for transport events.
    transport_rx: Mutex<Option<TransportRx>>,
}

impl Default for TransportLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportLayer {
    pub(crate) fn new() -> Self {
        let (transport_tx, transport_rx) = mpsc::channel(1_000);
        let transport_rx = Mutex::new(Some(transport_rx));

        Self {
            transport_tx,
            transport_rx,
            transports: Default::default(),
            factories: Default::default(),
        }
    }

    pub(crate) fn transport_count(&self) -> usize {
        self.transports.lock().expect("Lock failed").len()
    }

    pub(crate) fn add_transport(&self, transport: Arc<dyn Transport>) {
        self.transports
            .lock()
            .expect("Lock failed")
            .insert(transport.key(), transport);
    }

    pub(crate) fn remove_transport(&self, key: TransportKey) -> Option<Arc<dyn Transport>> {
        self.transports.lock().expect("Lock failed").remove(&key)
    }

    pub(crate) fn add_factory(&self, factory: Box<dyn Factory>) {
        self.factories.lock().expect("Lock failed").push(factory);
    }

    pub(crate) fn sender(&self) -> &TransportTx {
        &self.transport_tx
    }

    /// Finds a suitable transport for the given destination address and
    /// transport type.
    pub fn find(&self, dst: SocketAddr, transport: TransportKind) -> Option<Arc<dyn Transport>> {
        log::debug!("Finding suitable transport={} for={}", transport, dst);

        let transports = self.transports.lock().expect("Lock failed");

        // Find by remote addr.
        let key = TransportKey::new(dst, transport);

        if let Some(transport) = transports.get(&key) {
            return Some(transport.clone());
        }

        // Find by transport protocol and address family.
        transports
            .values()
            .filter(|handle| handle.kind() == transport && handle.is_same_af(&dst))
            .min_by(|a, b| Arc::strong_count(a).cmp(&Arc::strong_count(b)))
            .cloned()
    }

    pub(crate) async fn handle_events(&self, endpoint: &Endpoint) -> Result<()> {
        let mut rx = self.transport_rx.lock().expect("Lock failed").take().unwrap();

        // Loop to receive packets from the transports.
        while let Some(evt) = rx.recv().await {
            match evt {
                TransportEvent::Packet { transport, packet } => {
                    tokio::spawn(Self::on_received_packet(transport, packet, endpoint.clone()));
                }
                TransportEvent::Created(transport) => {
                    self.add_transport(transport);
                }
                TransportEvent::Closed(key) => {
                    self.remove_transport(key);
                }
                TransportEvent::Factory(factory) => {
                    self.add_factory(factory);
                }
            }
        }

        Ok(())
    }

    async fn on_received_packet(
        transport: Arc<dyn Transport>,
        packet: Packet,
        endpoint: Endpoint,
    ) -> Result<()> {
        let payload = packet.payload.clone();
        let bytes = payload.buf();

        // Keep-Alive Request packet.
        if bytes == b"\r\n\r\n" {
            transport.send(b"\r\n", &packet.addr).await?;
            return Ok(());
        } else if bytes == b"\r\n" {
            // Keep-Alive Response packet, nothing to do.
            return Ok(());
        }

        // Parse the packet into a sip message. One malformed message is
        // discarded without aborting the receive loop.
        let msg = match parser::parse_message(bytes) {
            Ok(parsed_msg) => parsed_msg,
            Err(err) => {
                log::warn!(
                    "Ignoring {} bytes packet from {} {} : {}\n{}-- end of packet.",
                    bytes.len(),
                    transport.kind(),
                    packet.addr,
                    err,
                    String::from_utf8_lossy(bytes)
                );

                return Err(err);
            }
        };

        let core = match CoreHeaders::extract(msg.headers(), &packet.addr) {
            Ok(core) => core,
            Err(err) => {
                // A request that parses but lacks a mandatory header is
                // answered statelessly with 400.
                if let crate::message::SipMsg::Request(_) = &msg {
                    endpoint.reject_bad_request(&transport, &packet).await;
                }
                return Err(err);
            }
        };

        match msg {
            crate::message::SipMsg::Request(request) => {
                let mut request = Some(IncomingRequest {
                    request,
                    transport,
                    packet,
                    core,
                });
                endpoint.process_request(&mut request).await?;
            }
            crate::message::SipMsg::Response(response) => {
                let mut response = Some(IncomingResponse {
                    response,
                    transport,
                    packet,
                    core,
                });
                endpoint.process_response(&mut response).await?;
            }
        }

        Ok(())
    }
}

#[async_trait::async_trait]
/// A trait to start a new transport.
pub(crate) trait TransportStartup {
    async fn start(&self, tx: TransportTx) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::udp::mock::MockUdpTransport;

    #[test]
    fn test_add_transport() {
        let transports = TransportLayer::default();
        let addr = "127.0.0.1:8080".parse().unwrap();
        let kind = TransportKind::Udp;

        transports.add_transport(Arc::new(MockUdpTransport::default()));

        assert!(transports.find(addr, kind).is_some());
        assert!(transports.transport_count() == 1);
    }

    #[test]
    fn test_remove_transport() {
        let transports = TransportLayer::default();
        let udp_tp = Arc::new(MockUdpTransport::default());
        let addr = "127.0.0.1:8080".parse().unwrap();
        let kind = TransportKind::Udp;
        let key = udp_tp.key();

        transports.add_transport(udp_tp);
        assert!(transports.find(addr, kind).is_some());
        assert!(transports.transport_count() == 1);

        transports.remove_transport(key);
        assert!(transports.find(addr, kind).is_none());
        assert!(transports.transport_count() == 0);
    }
}
