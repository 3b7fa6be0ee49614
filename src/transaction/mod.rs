//! SIP Transaction Layer.
//!
//! Implements the four RFC 3261 §17 state machines: INVITE and
//! non-INVITE, client and server. Transactions are owned by the
//! [`TransactionLayer`] directory and reference their dialog by key,
//! never by handle.

use bytes::Bytes;

use crate::dialog::DialogId;
use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::message::{Method, StatusCode};
use crate::transport::{
    IncomingRequest, IncomingResponse, OutgoingRequest, OutgoingResponse, ToBytes, Transport,
};

use std::collections::HashMap;
use std::io;
use std::mem;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

pub(crate) mod client;
pub(crate) mod inv_client;
pub(crate) mod inv_server;
pub(crate) mod key;
pub(crate) mod server;

pub use client::ClientTransaction;
pub use inv_client::InvClientTransaction;
pub use inv_server::InvServerTransaction;
pub use key::TsxKey;
pub use server::ServerTransaction;

type LastMsg = tokio::sync::RwLock<Option<Bytes>>;
type LastStatusCode = RwLock<Option<StatusCode>>;

/// A semantic event a transaction reports to its owning dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TsxEvent {
    /// Timer B or F elapsed without a final response.
    Timeout,
    /// The transport failed while sending or retransmitting.
    TransportError,
    /// The transaction reached the Terminated state.
    Terminated,
}

#[async_trait::async_trait]
/// A trait for managing the behavior of a SIP transaction.
pub trait Transaction: Sync + Send + 'static {
    /// Estimated round-trip time (RTT) for message exchanges.
    ///
    /// This value is used as the baseline when computing retransmission
    /// intervals.
    const T1: Duration = Duration::from_millis(500);

    /// Maximum retransmission interval for non-INVITE requests and
    /// INVITE responses.
    ///
    /// Retransmissions back off exponentially, but will not exceed this
    /// value.
    const T2: Duration = Duration::from_secs(4);

    /// Maximum duration that a message may remain in the network before
    /// being discarded.
    const T4: Duration = Duration::from_secs(5);

    /// Terminate the SIP Transaction.
    fn terminate(&self);
}

struct Inner {
    /// The role of the transaction (UAC or UAS).
    role: Role,
    /// The endpoint associated with the transaction.
    endpoint: Endpoint,
    /// The key used to identify the transaction.
    key: TsxKey,
    /// The method that created the transaction.
    method: Method,
    /// The transport layer used for communication.
    transport: Arc<dyn Transport>,
    /// The address of the remote endpoint.
    addr: SocketAddr,
    /// The current state of the transaction.
    state: Mutex<State>,
    /// The last status code sent or received in the transaction.
    status_code: LastStatusCode,
    /// The retransmission count for the transaction.
    retransmit_count: AtomicUsize,
    /// The last message sent in the transaction.
    last_msg: LastMsg,
    /// The owning dialog, referenced by key. The dialog may be removed
    /// before the transaction terminates; dispatch checks liveness.
    dialog: RwLock<Option<DialogId>>,
}

#[derive(Clone)]
/// The state shared by every SIP transaction kind.
///
/// A SIP transaction consists of a set of messages exchanged between a
/// client (UAC) and a server (UAS) to complete a certain action, such
/// as establishing or terminating a call.
pub struct TransactionInner(Arc<Inner>);

impl TransactionInner {
    pub(crate) fn set_dialog(&self, dialog: DialogId) {
        let mut guard = self.0.dialog.write().expect("Lock failed");
        *guard = Some(dialog);
    }

    fn builder() -> Builder {
        Default::default()
    }

    pub(crate) fn new_tsx_uac(request: &OutgoingRequest, endpoint: &Endpoint, state: State) -> Self {
        let mut builder = Self::builder();

        let key = TsxKey::create_client(request);

        builder.method(*key.method());
        builder.key(key);
        builder.role(Role::Uac);
        builder.endpoint(endpoint.clone());
        builder.transport(request.transport.clone());
        builder.addr(request.addr);
        builder.state(state);

        let tsx = builder.build();

        log::trace!("Transaction Created [{:?}] ({:p})", tsx.0.role, tsx.0);

        tsx
    }

    pub(crate) fn new_tsx_uas(request: &IncomingRequest, endpoint: &Endpoint, state: State) -> Self {
        let mut builder = Self::builder();

        builder.key(TsxKey::create_server(request));
        builder.method(*request.method());
        builder.role(Role::Uas);
        builder.endpoint(endpoint.clone());
        builder.transport(request.transport.clone());
        builder.addr(request.packet.addr);
        builder.state(state);

        let tsx = builder.build();

        log::trace!("Transaction Created [{:?}] ({:p})", tsx.0.role, tsx.0);

        tsx
    }

    pub(crate) fn create_uas(request: &IncomingRequest, endpoint: &Endpoint) -> Self {
        Self::new_tsx_uas(request, endpoint, State::Trying)
    }

    pub(crate) fn create_uas_inv(request: &IncomingRequest, endpoint: &Endpoint) -> Self {
        Self::new_tsx_uas(request, endpoint, State::Proceeding)
    }

    pub(crate) fn create_uac(request: &OutgoingRequest, endpoint: &Endpoint) -> Self {
        Self::new_tsx_uac(request, endpoint, State::Trying)
    }

    pub(crate) fn create_uac_inv(request: &OutgoingRequest, endpoint: &Endpoint) -> Self {
        Self::new_tsx_uac(request, endpoint, State::Calling)
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.0.transport
    }

    pub(crate) fn addr(&self) -> SocketAddr {
        self.0.addr
    }

    pub(crate) fn key(&self) -> &TsxKey {
        &self.0.key
    }

    /// Returns the method that created this transaction.
    pub fn method(&self) -> &Method {
        &self.0.method
    }

    fn schedule_termination(&self, time: Duration) {
        let tsx = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(time).await;
            tsx.on_terminated();
        });
    }

    #[inline]
    /// Checks if the transport is reliable.
    pub fn reliable(&self) -> bool {
        self.0.transport.reliable()
    }

    #[inline]
    /// Retrieves the current state of the Transaction.
    pub fn get_state(&self) -> State {
        *self.0.state.lock().expect("Lock failed")
    }

    #[inline]
    /// Gets the count of retransmissions.
    pub fn retrans_count(&self) -> u32 {
        self.0.retransmit_count.load(Ordering::SeqCst) as u32
    }

    #[inline]
    pub(crate) fn add_retrans_count(&self) -> u32 {
        self.0.retransmit_count.fetch_add(1, Ordering::SeqCst) as u32 + 1
    }

    #[inline]
    /// Retrieves the last status code sent.
    pub fn last_status_code(&self) -> Option<StatusCode> {
        *self.0.status_code.read().expect("Lock failed")
    }

    #[inline]
    pub(crate) async fn last_msg(&self) -> Option<Bytes> {
        self.0.last_msg.read().await.clone()
    }

    pub(crate) fn on_terminated(&self) {
        if self.get_state() == State::Terminated {
            return;
        }
        self.change_state_to(State::Terminated);
        let layer = self.0.endpoint.transactions();
        let key = &self.0.key;

        match self.0.role {
            Role::Uac => {
                layer.remove_client_tsx(key);
            }
            Role::Uas => {
                layer.remove_server_tsx(key);
            }
        };

        self.dispatch_to_dialog(TsxEvent::Terminated);
    }

    /// Timer B or F elapsed.
    pub(crate) fn on_timeout(&self) {
        log::debug!("Transaction {:?} timed out", self.0.key);
        self.dispatch_to_dialog(TsxEvent::Timeout);
        self.on_terminated();
    }

    /// Reports a semantic event to the owning dialog, if it is still
    /// alive. A stale dialog key makes this a no-op.
    pub(crate) fn dispatch_to_dialog(&self, event: TsxEvent) {
        let id = self.0.dialog.read().expect("Lock failed").clone();
        let Some(id) = id else { return };

        if let Some(dialog) = self.0.endpoint.dialogs().find(&id) {
            dialog.on_transaction_event(*self.method(), event);
        }
    }

    pub(crate) fn change_state_to(&self, state: State) {
        let old = {
            let mut guard = self.0.state.lock().expect("Lock failed");
            mem::replace(&mut *guard, state)
        };
        log::trace!("State Changed [{old:?} -> {state:?}] ({:p})", self.0);
    }

    #[inline]
    fn set_last_status_code(&self, code: StatusCode) {
        let mut guard = self.0.status_code.write().expect("Lock failed");
        *guard = Some(code);
    }

    pub(crate) async fn set_last_msg(&self, msg: Bytes) {
        let mut guard = self.0.last_msg.write().await;
        *guard = Some(msg);
    }

    pub(crate) fn is_calling(&self) -> bool {
        self.get_state() == State::Calling
    }

    pub(crate) async fn retransmit(&self) -> Result<u32> {
        let retransmitted = {
            let lock = self.0.last_msg.read().await;
            if let Some(msg) = lock.as_ref() {
                if let Err(err) = self.0.transport.send(msg, &self.0.addr).await {
                    self.dispatch_to_dialog(TsxEvent::TransportError);
                    return Err(err);
                }
                true
            } else {
                false
            }
        };

        if retransmitted {
            Ok(self.add_retrans_count())
        } else {
            Err(crate::error::Error::Io(io::Error::new(
                io::ErrorKind::Other,
                "No message to retransmit",
            )))
        }
    }

    pub(crate) async fn tsx_send_request(&self, msg: &mut OutgoingRequest) -> Result<()> {
        log::debug!("<= Request {} to /{}", msg.msg.req_line.method, msg.addr);
        let buf = match msg.buf.take() {
            Some(buf) => buf,
            None => msg.to_bytes()?,
        };
        self.0.transport.send(&buf, &self.0.addr).await?;
        self.set_last_msg(buf).await;
        Ok(())
    }

    pub(crate) async fn tsx_send_response(&self, msg: &mut OutgoingResponse) -> Result<()> {
        let code = msg.status_code();
        log::debug!("=> Response {} {}", code.into_i32(), msg.reason());
        let buf = match msg.buf.take() {
            Some(buf) => buf,
            None => msg.to_bytes()?,
        };

        self.0.transport.send(&buf, &self.0.addr).await?;
        self.set_last_status_code(code);
        self.set_last_msg(buf).await;
        Ok(())
    }
}

#[derive(Default)]
/// Builder for creating the shared transaction state.
pub struct Builder {
    role: Option<Role>,
    endpoint: Option<Endpoint>,
    key: Option<TsxKey>,
    method: Option<Method>,
    transport: Option<Arc<dyn Transport>>,
    addr: Option<SocketAddr>,
    state: Option<Mutex<State>>,
    status_code: Option<LastStatusCode>,
    last_msg: Option<LastMsg>,
    retransmit_count: Option<AtomicUsize>,
    dialog: Option<RwLock<Option<DialogId>>>,
}

impl Builder {
    /// Sets the role of the transaction.
    pub fn role(&mut self, role: Role) -> &mut Self {
        self.role = Some(role);
        self
    }

    /// Sets the endpoint associated with the transaction.
    pub fn endpoint(&mut self, endpoint: Endpoint) -> &mut Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Sets the key used to identify the transaction.
    pub fn key(&mut self, key: TsxKey) -> &mut Self {
        self.key = Some(key);
        self
    }

    /// Sets the method that created the transaction.
    pub fn method(&mut self, method: Method) -> &mut Self {
        self.method = Some(method);
        self
    }

    /// Sets the transport associated with the transaction.
    pub fn transport(&mut self, transport: Arc<dyn Transport>) -> &mut Self {
        self.transport = Some(transport);
        self
    }

    /// Sets the address associated with the transaction.
    pub fn addr(&mut self, addr: SocketAddr) -> &mut Self {
        self.addr = Some(addr);
        self
    }

    /// Sets the transaction state.
    pub fn state(&mut self, state: State) -> &mut Self {
        self.state = Some(Mutex::new(state));
        self
    }

    /// Finalize the builder into the shared state.
    pub fn build(self) -> TransactionInner {
        let inner = Inner {
            role: self.role.expect("Role is required"),
            endpoint: self.endpoint.expect("Endpoint is required"),
            key: self.key.expect("Key is required"),
            method: self.method.expect("Method is required"),
            transport: self.transport.expect("Transport is required"),
            addr: self.addr.expect("Address is required"),
            state: self.state.expect("State is required"),
            status_code: self.status_code.unwrap_or_default(),
            last_msg: self.last_msg.unwrap_or_default(),
            retransmit_count: self.retransmit_count.unwrap_or_default(),
            dialog: self.dialog.unwrap_or_default(),
        };

        TransactionInner(Arc::new(inner))
    }
}

/// The possible roles of a SIP Transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// User Agent Client: the entity that initiates the request.
    Uac,
    /// User Agent Server: the entity that responds to the request.
    Uas,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// Defines the possible states of a SIP Transaction.
pub enum State {
    #[default]
    /// Initial state.
    Initial,
    /// Calling state (INVITE client).
    Calling,
    /// Trying state (non-INVITE).
    Trying,
    /// Proceeding state.
    Proceeding,
    /// Completed state.
    Completed,
    /// Confirmed state (INVITE server).
    Confirmed,
    /// Terminated state.
    Terminated,
}

#[derive(Clone)]
/// A Server Transaction, either Invite or NonInvite.
pub enum ServerTsx {
    /// A NonInvite Server Transaction.
    NonInvite(ServerTransaction),
    /// An Invite Server Transaction.
    Invite(InvServerTransaction),
}

impl ServerTsx {
    /// Attach a dialog to the transaction.
    pub fn set_dialog(&self, dialog: DialogId) {
        match self {
            ServerTsx::NonInvite(uas) => uas.set_dialog(dialog),
            ServerTsx::Invite(uas_inv) => uas_inv.set_dialog(dialog),
        }
    }

    /// Retrieves the last status code sent by the transaction.
    pub fn last_status_code(&self) -> Option<StatusCode> {
        match self {
            ServerTsx::NonInvite(uas) => uas.last_status_code(),
            ServerTsx::Invite(uas_inv) => uas_inv.last_status_code(),
        }
    }

    pub(crate) fn key(&self) -> &TsxKey {
        match self {
            ServerTsx::NonInvite(uas) => uas.key(),
            ServerTsx::Invite(uas_inv) => uas_inv.key(),
        }
    }

    pub(crate) async fn receive_request(&self, request: &IncomingRequest) -> Result<()> {
        match self {
            ServerTsx::NonInvite(uas) => {
                if matches!(uas.get_state(), State::Proceeding | State::Completed) {
                    uas.retransmit().await?;
                }
                Ok(())
            }
            ServerTsx::Invite(uas_inv) => {
                uas_inv.receive_request(request).await
            }
        }
    }
}

impl From<ServerTransaction> for ServerTsx {
    fn from(tsx: ServerTransaction) -> Self {
        ServerTsx::NonInvite(tsx)
    }
}

impl From<InvServerTransaction> for ServerTsx {
    fn from(tsx: InvServerTransaction) -> Self {
        ServerTsx::Invite(tsx)
    }
}

#[derive(Clone)]
/// A Client Transaction, either Invite or NonInvite.
pub enum ClientTsx {
    /// A NonInvite Client Transaction.
    NonInvite(ClientTransaction),
    /// An Invite Client Transaction.
    Invite(InvClientTransaction),
}

impl ClientTsx {
    /// Attach a dialog to the transaction.
    pub fn set_dialog(&self, dialog: DialogId) {
        match self {
            ClientTsx::NonInvite(uac) => uac.set_dialog(dialog),
            ClientTsx::Invite(uac_inv) => uac_inv.set_dialog(dialog),
        }
    }

    /// Retrieves the current transaction state.
    pub fn get_state(&self) -> State {
        match self {
            ClientTsx::NonInvite(uac) => uac.get_state(),
            ClientTsx::Invite(uac_inv) => uac_inv.get_state(),
        }
    }
}

#[derive(Default)]
/// The transaction layer of the SIP protocol.
///
/// This type holds all server and client transactions created by the
/// TU (Transaction User), keyed by [`TsxKey`].
pub struct TransactionLayer {
    client_transactions: Mutex<HashMap<TsxKey, ClientTsx>>,
    server_transactions: Mutex<HashMap<TsxKey, ServerTsx>>,
}

impl TransactionLayer {
    /// Remove a server transaction from the directory.
    #[inline]
    pub fn remove_server_tsx(&self, key: &TsxKey) -> Option<ServerTsx> {
        let mut map = self.server_transactions.lock().expect("Lock failed");
        map.remove(key)
    }

    /// Remove a client transaction from the directory.
    #[inline]
    pub fn remove_client_tsx(&self, key: &TsxKey) -> Option<ClientTsx> {
        let mut map = self.client_transactions.lock().expect("Lock failed");
        map.remove(key)
    }

    #[inline]
    pub(crate) fn add_server_tsx_to_map(&self, tsx: ServerTransaction) {
        let key = tsx.key().clone();
        let mut map = self.server_transactions.lock().expect("Lock failed");

        map.insert(key, ServerTsx::NonInvite(tsx));
    }

    #[inline]
    pub(crate) fn add_client_tsx_to_map(&self, tsx: ClientTransaction) {
        let key = tsx.key().clone();
        let mut map = self.client_transactions.lock().expect("Lock failed");

        map.insert(key, ClientTsx::NonInvite(tsx));
    }

    #[inline]
    pub(crate) fn add_client_inv_tsx_to_map(&self, tsx: InvClientTransaction) {
        let key = tsx.key().clone();
        let mut map = self.client_transactions.lock().expect("Lock failed");

        map.insert(key, ClientTsx::Invite(tsx));
    }

    #[inline]
    pub(crate) fn add_server_tsx_inv_to_map(&self, tsx: InvServerTransaction) {
        let key = tsx.key().clone();
        let mut map = self.server_transactions.lock().expect("Lock failed");

        map.insert(key, ServerTsx::Invite(tsx));
    }

    pub(crate) fn find_server_tsx(&self, key: &TsxKey) -> Option<ServerTsx> {
        self.server_transactions.lock().expect("Lock failed").get(key).cloned()
    }

    pub(crate) fn find_client_tsx(&self, key: &TsxKey) -> Option<ClientTsx> {
        self.client_transactions.lock().expect("Lock failed").get(key).cloned()
    }

    /// Routes an inbound response to its client transaction.
    ///
    /// Returns `None` when no transaction matches; otherwise the inner
    /// flag tells whether the response was absorbed (a retransmission
    /// that must not reach the TU).
    pub(crate) async fn handle_response(&self, response: &IncomingResponse) -> Result<Option<bool>> {
        let cseq_method = response.core.cseq.method();
        let Some(via_branch) = response.core.via.branch() else {
            return Ok(None);
        };

        let key = TsxKey::create_client_with(cseq_method, via_branch);
        let client_tsx = {
            match self.find_client_tsx(&key) {
                Some(tsx) => tsx,
                None => return Ok(None),
            }
        };
        let absorbed = match client_tsx {
            ClientTsx::NonInvite(tsx) => tsx.receive(response).await?,
            ClientTsx::Invite(tsx_inv) => tsx_inv.receive(response).await?,
        };

        Ok(Some(absorbed))
    }

    /// Routes an inbound request to its server transaction, if any.
    ///
    /// Returns `true` when an existing transaction consumed the request
    /// (a retransmission or an ACK to a non-2xx final response).
    pub(crate) async fn handle_request(&self, request: &IncomingRequest) -> Result<bool> {
        let server_tsx = {
            let key = TsxKey::create_server(request);

            match self.find_server_tsx(&key) {
                Some(tsx) => tsx,
                None => return Ok(false),
            }
        };

        server_tsx.receive_request(request).await?;
        Ok(true)
    }
}
