//! SIP Dialog Layer.
//!
//! A dialog is a long-lived peer-to-peer relationship identified by
//! (Call-ID, local tag, remote tag). It owns the route set, the CSeq
//! counters, the remote target and the stored authentication
//! challenges, and it constructs every in-dialog request per RFC 3261
//! §12.2.1.1.

mod layer;

pub use layer::DialogLayer;

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::auth::{empty_authorization, AuthChallenge};
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::headers::{
    CallId, Contact, Expires, From as FromHdr, Header, OtherHeader, PAccessNetworkInfo,
    PPreferredIdentity, Route, To,
};
use crate::message::auth::Challenge;
use crate::message::{Method, NameAddr, Param, Request, Response, Scheme, SipAddr, Uri};
use crate::transaction::{ClientTransaction, InvClientTransaction, TsxEvent, TsxKey};

/*
 * Example of SIP Dialog establishment and termination
 * (INVITE):
 *
 * UAC (Caller)                 UAS (Receiver)
 *     |--- INVITE ----------->|    // Request to establish a session
 *     |<--- 180 Ringing ------|    // Indicates ringing (early dialog)
 *     |<--- 200 OK -----------|    // Session accepted -> Dialog established
 *     |--- ACK -------------->|    // Confirms receipt of 200 OK
 *     |--- BYE -------------->|    // Terminates the session
 *     |<--- 200 OK -----------|    // Confirms termination
 */

/// Default registration/subscription lifetime, in milliseconds.
const DEFAULT_EXPIRES_MS: u64 = 3_600_000;

/// The state of a dialog. Transitions are monotonic: a 1xx arriving
/// after the 2xx must not move an Established dialog back to Early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DialogState {
    /// No request sent or received yet.
    Initial,
    /// A provisional response with a To tag arrived.
    Early,
    /// A 2xx response arrived (or was sent).
    Established,
    /// The dialog is over; no request may be sent on it.
    Terminated,
}

/// Unique identifier of a SIP dialog (Call-ID + local tag + remote
/// tag). The remote tag is `None` until the first tagged response
/// or request from the peer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DialogId {
    pub call_id: CallId,
    pub local_tag: String,
    pub remote_tag: Option<String>,
}

impl DialogId {
    /// The dialog key an incoming request maps to: the request's To
    /// tag is our local tag and its From tag is the remote tag
    /// (RFC 3261 §12.2.2).
    pub fn from_incoming_request(request: &crate::transport::IncomingRequest) -> Option<Self> {
        let local_tag = request.core.to.tag()?.to_string();
        let remote_tag = request.core.from.tag().map(|tag| tag.to_string());

        Some(Self {
            call_id: request.core.call_id.clone(),
            local_tag,
            remote_tag,
        })
    }

    /// The dialog key an incoming response maps to: the response's
    /// From tag is our local tag and its To tag is the remote tag.
    pub fn from_incoming_response(response: &crate::transport::IncomingResponse) -> Option<Self> {
        let local_tag = response.core.from.tag()?.to_string();
        let remote_tag = response.core.to.tag().map(|tag| tag.to_string());

        Some(Self {
            call_id: response.core.call_id.clone(),
            local_tag,
            remote_tag,
        })
    }
}

/// An event a dialog reports to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogEvent {
    /// The dialog state changed.
    StateChanged(DialogState),
    /// A transaction timed out (408-equivalent failure).
    Timeout,
    /// The transport failed while sending.
    TransportError,
    /// A transaction owned by this dialog terminated.
    TransactionTerminated(Method),
    /// A challenge update was rejected.
    AuthenticationFailure,
    /// The peer sent an in-dialog request.
    RemoteRequest(Method),
    /// `hangup()` was called.
    Hangup,
    /// `shutdown()` was called.
    ShuttingDown,
}

/// Per-dialog metadata supplied by the operation that created it:
/// identity overrides, extension headers and RFC 3840 capabilities
/// to attach to outbound requests.
#[derive(Debug, Default, Clone)]
pub struct OperationProfile {
    /// Overrides the stack's public identity as the From URI.
    pub from: Option<SipAddr>,
    /// The peer; becomes the remote URI and initial remote target.
    pub to: Option<SipAddr>,
    /// Requested lifetime, in seconds.
    pub expires: Option<u32>,
    /// Extension headers appended to every outbound request.
    pub headers: Vec<OtherHeader>,
    /// Contact capability parameters (RFC 3840), e.g. `+g.3gpp.smsip`.
    pub caps: Vec<Param>,
}

struct Inner {
    /// The endpoint this dialog belongs to.
    endpoint: Endpoint,
    /// The Call-ID shared by every message in the dialog.
    call_id: CallId,
    /// Our tag, generated at creation and immutable.
    local_tag: String,
    /// The peer's tag, learned from the first tagged response.
    remote_tag: Mutex<Option<String>>,
    /// The local URI (From on outbound requests).
    local_uri: SipAddr,
    /// The remote URI (To on outbound requests).
    remote_uri: SipAddr,
    /// Where in-dialog requests are sent; refreshed from Contact.
    remote_target: Mutex<Uri>,
    /// Route set, in the order Route headers are emitted.
    route_set: Mutex<Vec<Uri>>,
    /// Local CSeq; increments by one per non-ACK non-CANCEL request.
    local_cseq: AtomicU32,
    /// Highest CSeq seen from the peer.
    remote_cseq: AtomicU32,
    state: Mutex<DialogState>,
    /// Negotiated lifetime, kept internally in milliseconds.
    expires_ms: AtomicU64,
    /// Stored challenges, one per (realm, proxy-flag).
    challenges: Mutex<Vec<AuthChallenge>>,
    /// Branch of the last INVITE sent, targeted by CANCEL.
    invite_branch: Mutex<Option<String>>,
    operation: OperationProfile,
    events_tx: mpsc::UnboundedSender<DialogEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<DialogEvent>>>,
}

/// A SIP Dialog.
#[derive(Clone)]
pub struct Dialog {
    inner: Arc<Inner>,
}

impl Dialog {
    /// Creates a client dialog and registers it with the endpoint's
    /// dialog layer.
    ///
    /// Seeds a random local tag and a random initial CSeq; the Call-ID
    /// is taken from the argument or freshly generated. Local and
    /// remote URIs come from the operation profile or fall back to the
    /// stack identity and realm.
    pub fn new_uac(endpoint: &Endpoint, call_id: Option<CallId>, operation: OperationProfile) -> Dialog {
        let profile = endpoint.profile();

        let local_uri = operation
            .from
            .clone()
            .unwrap_or_else(|| profile.public_identity.clone());

        let (remote_uri, remote_target) = match &operation.to {
            Some(to) => (to.clone(), to.uri().clone()),
            None => (profile.public_identity.clone(), profile.realm.uri().clone()),
        };

        let expires_ms = operation
            .expires
            .map(|s| u64::from(s) * 1000)
            .unwrap_or(DEFAULT_EXPIRES_MS);

        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let inner = Inner {
            endpoint: endpoint.clone(),
            call_id: call_id.unwrap_or_else(CallId::random),
            local_tag: crate::random_str(8),
            remote_tag: Mutex::new(None),
            local_uri,
            remote_uri,
            remote_target: Mutex::new(remote_target),
            route_set: Mutex::new(Vec::new()),
            local_cseq: AtomicU32::new(crate::random_cseq()),
            remote_cseq: AtomicU32::new(0),
            state: Mutex::new(DialogState::Initial),
            expires_ms: AtomicU64::new(expires_ms),
            challenges: Mutex::new(Vec::new()),
            invite_branch: Mutex::new(None),
            operation,
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        };

        let dialog = Dialog {
            inner: Arc::new(inner),
        };

        endpoint.dialogs().insert(dialog.clone());

        dialog
    }

    /// Returns the current dialog identifier.
    pub fn id(&self) -> DialogId {
        DialogId {
            call_id: self.inner.call_id.clone(),
            local_tag: self.inner.local_tag.clone(),
            remote_tag: self.inner.remote_tag.lock().expect("Lock failed").clone(),
        }
    }

    /// Returns the endpoint this dialog belongs to.
    pub fn endpoint(&self) -> &Endpoint {
        &self.inner.endpoint
    }

    /// Returns the current dialog state.
    pub fn state(&self) -> DialogState {
        *self.inner.state.lock().expect("Lock failed")
    }

    /// Returns the Call-ID of the dialog.
    pub fn call_id(&self) -> &CallId {
        &self.inner.call_id
    }

    /// Returns the local tag.
    pub fn local_tag(&self) -> &str {
        &self.inner.local_tag
    }

    /// Returns the remote tag, if learned.
    pub fn remote_tag(&self) -> Option<String> {
        self.inner.remote_tag.lock().expect("Lock failed").clone()
    }

    /// Returns the current local CSeq value.
    pub fn local_cseq(&self) -> u32 {
        self.inner.local_cseq.load(Ordering::SeqCst)
    }

    /// Returns the highest CSeq seen from the peer.
    pub fn remote_cseq(&self) -> u32 {
        self.inner.remote_cseq.load(Ordering::SeqCst)
    }

    /// Returns the negotiated lifetime in milliseconds.
    pub fn expires_ms(&self) -> u64 {
        self.inner.expires_ms.load(Ordering::SeqCst)
    }

    /// Returns the current route set.
    pub fn route_set(&self) -> Vec<Uri> {
        self.inner.route_set.lock().expect("Lock failed").clone()
    }

    /// Returns the current remote target URI.
    pub fn remote_target(&self) -> Uri {
        self.inner.remote_target.lock().expect("Lock failed").clone()
    }

    /// Returns the AKA cipher and integrity keys of the first stored
    /// challenge carrying them, if any.
    pub fn cipher_keys(&self) -> Option<([u8; 16], [u8; 16])> {
        let challenges = self.inner.challenges.lock().expect("Lock failed");

        challenges
            .iter()
            .find_map(|challenge| Some((challenge.ck?, challenge.ik?)))
    }

    /// Takes the dialog event receiver. Events are buffered until the
    /// first call; subsequent calls return `None`.
    pub fn take_events(&self) -> Option<mpsc::UnboundedReceiver<DialogEvent>> {
        self.inner.events_rx.lock().expect("Lock failed").take()
    }

    fn emit(&self, event: DialogEvent) {
        let _ = self.inner.events_tx.send(event);
    }

    /// Moves the state forward. Backwards transitions are rejected:
    /// a 1xx arriving after the 2xx must not regress the dialog.
    fn try_advance_state(&self, new_state: DialogState) -> bool {
        let mut state = self.inner.state.lock().expect("Lock failed");
        if new_state <= *state {
            return false;
        }
        *state = new_state;
        drop(state);

        self.emit(DialogEvent::StateChanged(new_state));
        true
    }

    /// Composes a new in-dialog request per RFC 3261 §12.2.1.1 plus
    /// the IMS header population of 3GPP TS 24.229.
    pub fn new_request(&self, method: Method) -> Result<Request> {
        if self.state() == DialogState::Terminated {
            return Err(Error::InvalidState("dialog is terminated"));
        }

        let profile = self.inner.endpoint.profile();

        // To/From carry the dialog URIs and tags; a null tag is omitted.
        let mut to = To::new(self.inner.remote_uri.clone());
        to.set_tag(self.remote_tag());
        let mut from = FromHdr::new(self.inner.local_uri.clone());
        from.set_tag(Some(self.inner.local_tag.clone()));

        // Request-URI selection against the route set.
        let routes = self.inner.route_set.lock().expect("Lock failed").clone();
        let remote_target = self.remote_target();
        let (request_uri, copy_routes_start) = if routes.is_empty() {
            (remote_target.clone(), None)
        } else if routes[0].lr_param {
            // Loose routing: target in the Request-URI, the whole
            // route set goes into Route headers.
            (remote_target.clone(), Some(0))
        } else {
            // Strict routing: first route becomes the Request-URI,
            // stripped of params not allowed there.
            (routes[0].without_route_params(), Some(1))
        };

        // ACK and CANCEL reuse the CSeq of the request they refer to;
        // everything else increments by one.
        let cseq = if method.reuses_cseq() {
            self.inner.local_cseq.load(Ordering::SeqCst)
        } else {
            self.inner.local_cseq.fetch_add(1, Ordering::SeqCst) + 1
        };

        let request_uri_str = request_uri.to_string();
        let mut request = Request::new_dialog_request(
            method,
            request_uri,
            from,
            to,
            self.inner.call_id.clone(),
            cseq,
        );

        // Contact goes on every request except MESSAGE; PUBLISH also
        // carries the lifetime as an Expires header, in seconds.
        let expires_s = (self.expires_ms() / 1000) as u32;
        if method == Method::Publish {
            request.headers.push(Header::Expires(Expires::new(expires_s)));
        }
        if method != Method::Message {
            let mut contact = Contact::new_with_expires(
                SipAddr::Uri(self.local_contact_uri(profile)),
                expires_s,
            );
            for cap in &self.inner.operation.caps {
                contact.add_param(cap.clone());
            }
            request.headers.push(Header::Contact(contact));
        }

        // Authorization. An initial REGISTER without stored challenges
        // announces the private identity with empty credentials
        // (3GPP TS 24.229 §5.1.1.2.2) unless early IMS security is on
        // (3GPP TS 33.978 §6.2.3.1).
        let challenges = self.inner.challenges.lock().expect("Lock failed");
        if self.state() == DialogState::Initial && challenges.is_empty() {
            if method == Method::Register && !profile.enable_early_ims {
                let realm = profile.realm_host();
                request.headers.push(empty_authorization(
                    &profile.private_identity,
                    &realm,
                    &request_uri_str,
                ));
            }
        } else {
            for challenge in challenges.iter() {
                request.headers.push(challenge.authorization_header(
                    &profile.private_identity,
                    &profile.password,
                    &method,
                    &request_uri_str,
                ));
            }
        }
        drop(challenges);

        // Route generation. Registration never carries preloaded
        // routes; other requests copy the dialog route set or, absent
        // one, preload the P-CSCF followed by the saved Service-Route
        // values (3GPP TS 24.229 §5.1.2A.1).
        if method != Method::Register {
            match copy_routes_start {
                Some(start) => {
                    for uri in routes.iter().skip(start) {
                        request.headers.push(Header::Route(Route::new(NameAddr::new(uri.clone()))));
                    }
                    if start > 0 {
                        // Strict routing: the remote target closes the
                        // route list.
                        request
                            .headers
                            .push(Header::Route(Route::new(NameAddr::new(remote_target))));
                    }
                }
                None => {
                    if matches!(self.state(), DialogState::Initial | DialogState::Early) {
                        if let Some(pcscf) = &profile.pcscf {
                            request
                                .headers
                                .push(Header::Route(Route::new(NameAddr::new(pcscf.clone()))));
                        }
                        for route in &profile.service_routes {
                            request.headers.push(Header::Route(Route::new(route.clone())));
                        }
                    }
                }
            }
        }

        // Operation-supplied extension headers.
        for header in &self.inner.operation.headers {
            request.headers.push(Header::Other(header.clone()));
        }

        self.add_common_headers(&mut request, profile);

        Ok(request)
    }

    /// The Contact URI advertised in outbound requests.
    fn local_contact_uri(&self, profile: &crate::endpoint::ImsProfile) -> Uri {
        let mut uri = match &profile.contact {
            Some(contact) => contact.clone(),
            None => {
                let mut uri = Uri::default();
                uri.user = self.inner.local_uri.user().cloned();
                uri
            }
        };

        uri.scheme = if profile.secure { Scheme::Sips } else { Scheme::Sip };

        uri
    }

    /// P-Preferred-Identity and P-Access-Network-Info per the method
    /// tables of 3GPP TS 24.229.
    fn add_common_headers(&self, request: &mut Request, profile: &crate::endpoint::ImsProfile) {
        let method = *request.method();

        if let Some(preferred) = &profile.preferred_identity {
            let wants_identity = matches!(
                method,
                Method::Bye
                    | Method::Invite
                    | Method::Options
                    | Method::Subscribe
                    | Method::Notify
                    | Method::Refer
                    | Method::Message
                    | Method::Publish
                    | Method::Register
            );

            // With early IMS security the IMSI-derived identity is
            // only usable in registration requests (3GPP TS 33.978).
            if wants_identity && (!profile.enable_early_ims || method == Method::Register) {
                request
                    .headers
                    .push(Header::PPreferredIdentity(PPreferredIdentity::new(preferred.clone())));
            }
        }

        if let Some(netinfo) = &profile.netinfo {
            let wants_netinfo = matches!(
                method,
                Method::Bye
                    | Method::Invite
                    | Method::Options
                    | Method::Register
                    | Method::Subscribe
                    | Method::Notify
                    | Method::Prack
                    | Method::Info
                    | Method::Update
                    | Method::Refer
                    | Method::Message
                    | Method::Publish
            );

            if wants_netinfo {
                request
                    .headers
                    .push(Header::PAccessNetworkInfo(PAccessNetworkInfo::new(netinfo.clone())));
            }
        }
    }

    /// Composes and sends an in-dialog request, creating the client
    /// transaction.
    pub async fn send_request(&self, method: Method) -> Result<()> {
        let request = self.new_request(method)?;
        self.send(request, None).await
    }

    /// Sends a composed request. A branch may be forced so a CANCEL
    /// reuses the branch of the INVITE it targets.
    pub async fn send(&self, request: Request, branch: Option<String>) -> Result<()> {
        let endpoint = self.inner.endpoint.clone();
        let method = *request.method();

        let outgoing = endpoint.prepare_outgoing(request, branch).await?;

        match method {
            Method::Invite => {
                let via = crate::find_map_header!(outgoing.msg.headers, Via)
                    .and_then(|via| via.branch().map(|b| b.to_string()));
                *self.inner.invite_branch.lock().expect("Lock failed") = via;

                let tsx = InvClientTransaction::send(outgoing, &endpoint).await?;
                tsx.set_dialog(self.id());
            }
            Method::Ack => {
                // The ACK to a 2xx belongs to the dialog, not to any
                // transaction.
                endpoint.send_outside_tsx(outgoing).await?;
            }
            _ => {
                let tsx = ClientTransaction::send(outgoing, &endpoint).await?;
                tsx.set_dialog(self.id());
            }
        }

        Ok(())
    }

    /// Cancels an outstanding INVITE. If the INVITE transaction has
    /// already completed or terminated, the CANCEL is accepted but has
    /// no effect.
    pub async fn cancel(&self) -> Result<()> {
        let branch = self.inner.invite_branch.lock().expect("Lock failed").clone();
        let Some(branch) = branch else {
            return Err(Error::InvalidState("no INVITE to cancel"));
        };

        let key = TsxKey::create_client_with(&Method::Invite, &branch);
        let Some(invite_tsx) = self.inner.endpoint.transactions().find_client_tsx(&key) else {
            return Ok(());
        };

        use crate::transaction::State;
        if !matches!(invite_tsx.get_state(), State::Calling | State::Proceeding) {
            return Ok(());
        }

        let request = self.new_request(Method::Cancel)?;
        self.send(request, Some(branch)).await
    }

    /// Hangs up: composes a BYE on an established dialog; the dialog
    /// terminates when the BYE transaction completes.
    pub async fn hangup(&self) -> Result<()> {
        self.emit(DialogEvent::Hangup);

        match self.state() {
            DialogState::Established => self.send_request(Method::Bye).await,
            DialogState::Initial | DialogState::Early => self.cancel().await,
            DialogState::Terminated => Err(Error::InvalidState("dialog is terminated")),
        }
    }

    /// Announces stack shutdown to the dialog owner. The owner decides
    /// whether to de-register, unsubscribe or hang up.
    pub fn shutdown(&self) {
        self.emit(DialogEvent::ShuttingDown);
    }

    /// Unlinks the dialog from the dialog layer.
    pub fn remove(&self) {
        self.inner.endpoint.dialogs().remove(&self.id());
    }

    /// Updates the dialog from a response: challenges, state, remote
    /// tag, remote target and route set.
    pub fn update(&self, response: &Response) -> Result<()> {
        let code = response.code().into_i32();
        let is_register = response
            .cseq()
            .is_some_and(|cseq| cseq.method().is_register());

        match code {
            401 | 407 | 421 | 494 => {
                // Each IMS AKA authentication vector is used only
                // once; only a re-registration may accept a new one.
                let accept_new_vector = is_register && self.state() == DialogState::Established;
                self.update_challenges(response, accept_new_vector)
            }
            101..=299 => {
                let Some(tag) = response.to_tag() else {
                    return if code <= 199 {
                        Err(Error::InvalidState("provisional response without To tag"))
                    } else {
                        self.apply_peer_response(response, None, is_register, code)
                    };
                };
                if code <= 199 && tag.is_empty() {
                    return Err(Error::InvalidState("provisional response without To tag"));
                }

                self.apply_peer_response(response, Some(tag.to_string()), is_register, code)
            }
            _ => Ok(()),
        }
    }

    fn apply_peer_response(
        &self,
        response: &Response,
        tag: Option<String>,
        is_register: bool,
        code: i32,
    ) -> Result<()> {
        // Remote target from Contact on target-refresh responses.
        if !is_register {
            if let Some(contact) = crate::find_map_header!(response.headers, Contact) {
                *self.inner.remote_target.lock().expect("Lock failed") = contact.uri.uri().clone();
            }
        }

        // The route set is the reversed Record-Route list.
        let mut routes: Vec<Uri> = response
            .headers
            .iter()
            .filter_map(|header| match header {
                Header::RecordRoute(rr) => Some(rr.addr.uri.clone()),
                _ => None,
            })
            .collect();
        routes.reverse();
        *self.inner.route_set.lock().expect("Lock failed") = routes;

        let old_id = self.id();

        // Remote tag and CSeq echo.
        if let Some(tag) = tag {
            let mut remote_tag = self.inner.remote_tag.lock().expect("Lock failed");
            if remote_tag.as_deref() != Some(tag.as_str()) {
                *remote_tag = Some(tag);
            }
        }
        if let Some(cseq) = response.cseq() {
            self.inner.local_cseq.store(cseq.cseq(), Ordering::SeqCst);
        }

        let new_state = if code <= 199 {
            DialogState::Early
        } else {
            DialogState::Established
        };
        self.try_advance_state(new_state);

        // Keep the dialog directory keyed by the full tag triple.
        let new_id = self.id();
        if new_id != old_id {
            self.inner.endpoint.dialogs().rekey(&old_id, self.clone());
        }

        Ok(())
    }

    /// Updates the challenge store from the (Proxy-)Authenticate
    /// headers of a response.
    ///
    /// A same-realm challenge is replaced only when the server marked
    /// it stale or a new vector is acceptable; otherwise the store is
    /// left untouched and [`Error::BadNonce`] is returned. Unknown
    /// realms are appended as new challenges.
    pub fn update_challenges(&self, response: &Response, accept_new_vector: bool) -> Result<()> {
        let mut store = self.inner.challenges.lock().expect("Lock failed");
        let mut updated = store.clone();

        for header in response.headers.iter() {
            let (challenge, is_proxy) = match header {
                Header::WWWAuthenticate(auth) => (auth.challenge(), false),
                Header::ProxyAuthenticate(auth) => (auth.challenge(), true),
                _ => continue,
            };
            let Challenge::Digest(digest) = challenge else {
                continue;
            };
            let realm = digest.realm.as_deref().unwrap_or_default();

            match updated
                .iter_mut()
                .find(|stored| stored.is_proxy == is_proxy && stored.realm == realm)
            {
                Some(existing) => {
                    if digest.is_stale() || accept_new_vector {
                        existing.update(digest);
                    } else {
                        return Err(Error::BadNonce);
                    }
                }
                None => updated.push(AuthChallenge::from_digest(digest, is_proxy)),
            }
        }

        *store = updated;
        Ok(())
    }

    /// Computes the refresh delay from a response, in milliseconds.
    ///
    /// In priority order: a NOTIFY's Subscription-State expires, the
    /// Expires header, then the expires parameter of the Contact
    /// matching the local contact. The selected lifetime becomes a
    /// delay via the 3GPP TS 24.229 rule: re-register 600 seconds
    /// before expiry when registered for more than 1200 seconds,
    /// otherwise at half the lifetime.
    pub fn new_delay(&self, response: &Response) -> u64 {
        let mut expires_ms = self.expires_ms();

        'select: {
            if response.cseq().is_some_and(|cseq| cseq.method() == &Method::Notify) {
                if let Some(state) = crate::find_map_header!(response.headers, SubscriptionState) {
                    if let Some(expires) = state.expires.filter(|&e| e > 0) {
                        expires_ms = u64::from(expires) * 1000;
                        break 'select;
                    }
                }
            }

            if let Some(expires) = crate::find_map_header!(response.headers, Expires) {
                expires_ms = u64::from(expires.as_u32()) * 1000;
                break 'select;
            }

            let profile = self.inner.endpoint.profile();
            let local_contact = self.local_contact_uri(profile);
            for contact in crate::filter_map_header!(response.headers, Contact) {
                let uri = contact.uri.uri();
                let same_user = uri.user_name() == local_contact.user_name();
                let same_host = uri.host_port.host.matches(&local_contact.host_port.host);
                let same_port = uri.host_port.port == local_contact.host_port.port;

                if same_user && same_host && same_port {
                    if let Some(expires) = contact.expires {
                        expires_ms = u64::from(expires) * 1000;
                        break 'select;
                    }
                }
            }
        }

        let expires_s = expires_ms / 1000;
        let delay_s = if expires_s > 1200 {
            expires_s - 600
        } else {
            expires_s / 2
        };

        delay_s * 1000
    }

    /// Handles a response already matched to this dialog, turning
    /// failures into dialog events.
    pub(crate) fn on_response(&self, response: &Response) {
        match self.update(response) {
            Ok(()) => {}
            Err(Error::BadNonce) => {
                log::warn!("Challenge update rejected on dialog {:?}", self.id());
                self.emit(DialogEvent::AuthenticationFailure);
            }
            Err(err) => {
                log::warn!("Failed to update dialog {:?}: {}", self.id(), err);
            }
        }
    }

    /// Handles an in-dialog request from the peer.
    pub(crate) fn recv_request(&self, request: &crate::transport::IncomingRequest) {
        let method = *request.method();

        self.inner
            .remote_cseq
            .store(request.core.cseq.cseq(), Ordering::SeqCst);

        self.emit(DialogEvent::RemoteRequest(method));

        if method == Method::Bye {
            self.terminate();
        }
    }

    /// A semantic event from one of this dialog's transactions.
    pub(crate) fn on_transaction_event(&self, method: Method, event: TsxEvent) {
        match event {
            TsxEvent::Timeout => {
                self.emit(DialogEvent::Timeout);
                self.terminate();
            }
            TsxEvent::TransportError => {
                self.emit(DialogEvent::TransportError);
            }
            TsxEvent::Terminated => {
                self.emit(DialogEvent::TransactionTerminated(method));
                if method == Method::Bye {
                    self.terminate();
                }
            }
        }
    }

    fn terminate(&self) {
        self.try_advance_state(DialogState::Terminated);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{Builder, ImsProfile};
    use crate::headers::SipHeaderParse;
    use crate::message::StatusLine;
    use crate::transaction::TransactionLayer;

    pub(crate) fn ims_profile() -> ImsProfile {
        ImsProfile {
            realm: "sip:home.net".parse().unwrap(),
            public_identity: "sip:alice@home.net".parse().unwrap(),
            private_identity: "alice@home.net".into(),
            password: "secret".into(),
            preferred_identity: None,
            netinfo: None,
            enable_early_ims: false,
            service_routes: Vec::new(),
            pcscf: None,
            secure: false,
            contact: Some("sip:alice@10.0.0.1:5060".parse().unwrap()),
        }
    }

    pub(crate) async fn ims_endpoint() -> Endpoint {
        Builder::new()
            .with_transaction_layer(TransactionLayer::default())
            .with_profile(ims_profile())
            .build()
            .await
    }

    fn response_with(code: i32, headers: Vec<Header>) -> Response {
        let code = crate::message::StatusCode::from(code);
        let mut response = Response::new(StatusLine::new(code, code.reason()));
        response.headers = headers.into();
        response
    }

    #[tokio::test]
    async fn test_initial_register_carries_empty_authorization() {
        let endpoint = ims_endpoint().await;
        let dialog = Dialog::new_uac(&endpoint, None, OperationProfile::default());

        let cseq_before = dialog.local_cseq();
        let request = dialog.new_request(Method::Register).unwrap();

        let auth = crate::find_map_header!(request.headers, Authorization).unwrap();
        let auth = auth.to_string();

        assert!(auth.contains("username=\"alice@home.net\""));
        assert!(auth.contains("realm=\"home.net\""));
        assert!(auth.contains("nonce=\"\""));
        assert!(auth.contains("response=\"\""));

        let cseq = crate::find_map_header!(request.headers, CSeq).unwrap();
        assert_eq!(cseq.cseq(), cseq_before + 1);
    }

    #[tokio::test]
    async fn test_early_ims_register_has_no_authorization() {
        let endpoint = Builder::new()
            .with_transaction_layer(TransactionLayer::default())
            .with_profile(ImsProfile {
                enable_early_ims: true,
                ..ims_profile()
            })
            .build()
            .await;
        let dialog = Dialog::new_uac(&endpoint, None, OperationProfile::default());

        let request = dialog.new_request(Method::Register).unwrap();

        assert!(crate::find_map_header!(request.headers, Authorization).is_none());
    }

    #[tokio::test]
    async fn test_challenge_replay() {
        let endpoint = ims_endpoint().await;
        let dialog = Dialog::new_uac(&endpoint, None, OperationProfile::default());

        let www = crate::headers::WWWAuthenticate::from_bytes(
            b"Digest realm=\"home.net\", nonce=\"abc\", algorithm=MD5, qop=\"auth\"",
        )
        .unwrap();
        let response = response_with(
            401,
            vec![
                Header::CSeq(crate::headers::CSeq::new(1, Method::Register)),
                Header::WWWAuthenticate(www),
            ],
        );

        dialog.update(&response).unwrap();

        let request = dialog.new_request(Method::Register).unwrap();
        let auth = crate::find_map_header!(request.headers, Authorization).unwrap();
        let auth = auth.to_string();

        assert!(auth.contains("nonce=\"abc\""));
        assert!(auth.contains("qop=auth"));
        // A computed response, not the empty initial one.
        assert!(!auth.contains("response=\"\""));
    }

    #[tokio::test]
    async fn test_challenge_with_same_nonce_is_rejected() {
        let endpoint = ims_endpoint().await;
        let dialog = Dialog::new_uac(&endpoint, None, OperationProfile::default());

        let challenge = b"Digest realm=\"home.net\", nonce=\"abc\", algorithm=MD5";
        let www = crate::headers::WWWAuthenticate::from_bytes(challenge).unwrap();
        let response = response_with(
            401,
            vec![
                Header::CSeq(crate::headers::CSeq::new(1, Method::Register)),
                Header::WWWAuthenticate(www),
            ],
        );

        // First 401 stores the challenge.
        dialog.update(&response).unwrap();

        // A second, non-stale 401 for the same realm while Initial is
        // a BadNonce; acceptNewVector only holds once Established.
        let www2 = crate::headers::WWWAuthenticate::from_bytes(
            b"Digest realm=\"home.net\", nonce=\"xyz\", algorithm=MD5",
        )
        .unwrap();
        let again = response_with(
            401,
            vec![
                Header::CSeq(crate::headers::CSeq::new(2, Method::Register)),
                Header::WWWAuthenticate(www2),
            ],
        );

        assert_matches!(dialog.update(&again), Err(Error::BadNonce));

        // The rejected update left the challenge store untouched.
        let request = dialog.new_request(Method::Register).unwrap();
        let auth = crate::find_map_header!(request.headers, Authorization).unwrap();
        assert!(auth.to_string().contains("nonce=\"abc\""));
    }

    #[tokio::test]
    async fn test_reregistration_accepts_new_vector() {
        let endpoint = ims_endpoint().await;
        let dialog = Dialog::new_uac(&endpoint, None, OperationProfile::default());

        let www = crate::headers::WWWAuthenticate::from_bytes(
            b"Digest realm=\"home.net\", nonce=\"abc\", algorithm=MD5",
        )
        .unwrap();
        let challenge = response_with(
            401,
            vec![
                Header::CSeq(crate::headers::CSeq::new(1, Method::Register)),
                Header::WWWAuthenticate(www),
            ],
        );
        dialog.update(&challenge).unwrap();

        // Registration succeeds; the dialog is now Established.
        let mut to = To::from_bytes(b"<sip:alice@home.net>").unwrap();
        to.set_tag(Some("reg1".into()));
        let ok = response_with(
            200,
            vec![
                Header::To(to),
                Header::CSeq(crate::headers::CSeq::new(2, Method::Register)),
            ],
        );
        dialog.update(&ok).unwrap();
        assert_eq!(dialog.state(), DialogState::Established);

        // A re-registration challenge with a fresh vector is accepted.
        let www2 = crate::headers::WWWAuthenticate::from_bytes(
            b"Digest realm=\"home.net\", nonce=\"xyz\", algorithm=MD5",
        )
        .unwrap();
        let rechallenge = response_with(
            401,
            vec![
                Header::CSeq(crate::headers::CSeq::new(3, Method::Register)),
                Header::WWWAuthenticate(www2),
            ],
        );
        dialog.update(&rechallenge).unwrap();

        let request = dialog.new_request(Method::Register).unwrap();
        let auth = crate::find_map_header!(request.headers, Authorization).unwrap();
        assert!(auth.to_string().contains("nonce=\"xyz\""));
    }

    #[tokio::test]
    async fn test_route_set_is_reversed_record_route() {
        let endpoint = ims_endpoint().await;
        let dialog = Dialog::new_uac(
            &endpoint,
            None,
            OperationProfile {
                to: Some("sip:bob@biloxi.com".parse().unwrap()),
                ..Default::default()
            },
        );

        let rr1 = crate::headers::RecordRoute::from_bytes(b"<sip:p1;lr>").unwrap();
        let rr2 = crate::headers::RecordRoute::from_bytes(b"<sip:p2;lr>").unwrap();
        let contact = Contact::from_bytes(b"<sip:bob@192.0.2.4>").unwrap();
        let mut to = To::from_bytes(b"<sip:bob@biloxi.com>").unwrap();
        to.set_tag(Some("peer1".into()));

        let response = response_with(
            200,
            vec![
                Header::RecordRoute(rr1),
                Header::RecordRoute(rr2),
                Header::To(to),
                Header::Contact(contact),
                Header::CSeq(crate::headers::CSeq::new(1, Method::Invite)),
            ],
        );

        dialog.update(&response).unwrap();

        assert_eq!(dialog.state(), DialogState::Established);

        // Response order p1, p2 becomes dialog order p2, p1.
        let routes = dialog.route_set();
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].host_port.host.as_str(), "p2");
        assert_eq!(routes[1].host_port.host.as_str(), "p1");

        // The remote target follows the Contact.
        assert_eq!(dialog.remote_target().host_port.host.as_str(), "192.0.2.4");

        // A BYE goes to the remote target with the reversed routes.
        let bye = dialog.new_request(Method::Bye).unwrap();
        assert_eq!(bye.uri().host_port.host.as_str(), "192.0.2.4");

        let route_headers: Vec<_> = crate::filter_map_header!(bye.headers, Route).collect();
        assert_eq!(route_headers.len(), 2);
        assert_eq!(route_headers[0].addr.uri.host_port.host.as_str(), "p2");
        assert_eq!(route_headers[1].addr.uri.host_port.host.as_str(), "p1");
    }

    #[tokio::test]
    async fn test_1xx_after_2xx_does_not_regress_state() {
        let endpoint = ims_endpoint().await;
        let dialog = Dialog::new_uac(
            &endpoint,
            None,
            OperationProfile {
                to: Some("sip:bob@biloxi.com".parse().unwrap()),
                ..Default::default()
            },
        );

        let mut to = To::from_bytes(b"<sip:bob@biloxi.com>").unwrap();
        to.set_tag(Some("peer1".into()));

        let ok = response_with(
            200,
            vec![
                Header::To(to.clone()),
                Header::CSeq(crate::headers::CSeq::new(1, Method::Invite)),
            ],
        );
        dialog.update(&ok).unwrap();
        assert_eq!(dialog.state(), DialogState::Established);

        let ringing = response_with(
            180,
            vec![
                Header::To(to),
                Header::CSeq(crate::headers::CSeq::new(1, Method::Invite)),
            ],
        );
        dialog.update(&ringing).unwrap();

        assert_eq!(dialog.state(), DialogState::Established);
    }

    #[tokio::test]
    async fn test_refresh_delay_from_expires() {
        let endpoint = ims_endpoint().await;
        let dialog = Dialog::new_uac(&endpoint, None, OperationProfile::default());

        let response = response_with(
            200,
            vec![
                Header::CSeq(crate::headers::CSeq::new(1, Method::Register)),
                Header::Expires(Expires::new(3600)),
            ],
        );

        // 3600 s > 1200 s, so refresh 600 s before expiry.
        assert_eq!(dialog.new_delay(&response), 3_000_000);
    }

    #[tokio::test]
    async fn test_refresh_delay_prefers_subscription_state() {
        let endpoint = ims_endpoint().await;
        let dialog = Dialog::new_uac(&endpoint, None, OperationProfile::default());

        let state = crate::headers::SubscriptionState::active(600);
        let response = response_with(
            200,
            vec![
                Header::CSeq(crate::headers::CSeq::new(1, Method::Notify)),
                Header::SubscriptionState(state),
                Header::Expires(Expires::new(3600)),
            ],
        );

        // 600 s <= 1200 s, so refresh at half the lifetime.
        assert_eq!(dialog.new_delay(&response), 300_000);
    }

    #[tokio::test]
    async fn test_refresh_delay_from_matching_contact() {
        let endpoint = ims_endpoint().await;
        let dialog = Dialog::new_uac(&endpoint, None, OperationProfile::default());

        let other = Contact::from_bytes(b"<sip:carol@10.9.9.9:5060>;expires=100").unwrap();
        let ours = Contact::from_bytes(b"<sip:alice@10.0.0.1:5060>;expires=1800").unwrap();
        let response = response_with(
            200,
            vec![
                Header::CSeq(crate::headers::CSeq::new(1, Method::Register)),
                Header::Contact(other),
                Header::Contact(ours),
            ],
        );

        // 1800 s > 1200 s: 1800 - 600 = 1200 s.
        assert_eq!(dialog.new_delay(&response), 1_200_000);
    }

    #[tokio::test]
    async fn test_cseq_reuse_for_cancel() {
        let endpoint = ims_endpoint().await;
        let dialog = Dialog::new_uac(
            &endpoint,
            None,
            OperationProfile {
                to: Some("sip:bob@biloxi.com".parse().unwrap()),
                ..Default::default()
            },
        );

        let invite = dialog.new_request(Method::Invite).unwrap();
        let invite_cseq = crate::find_map_header!(invite.headers, CSeq).unwrap().cseq();

        let cancel = dialog.new_request(Method::Cancel).unwrap();
        let cancel_cseq = crate::find_map_header!(cancel.headers, CSeq).unwrap();

        assert_eq!(cancel_cseq.cseq(), invite_cseq);
        assert_eq!(cancel_cseq.method(), &Method::Cancel);

        // A later BYE increments past the INVITE.
        let bye = dialog.new_request(Method::Bye).unwrap();
        let bye_cseq = crate::find_map_header!(bye.headers, CSeq).unwrap();

        assert_eq!(bye_cseq.cseq(), invite_cseq + 1);
        assert_eq!(bye_cseq.method(), &Method::Bye);
    }

    #[tokio::test]
    async fn test_message_has_no_contact() {
        let endpoint = ims_endpoint().await;
        let dialog = Dialog::new_uac(&endpoint, None, OperationProfile::default());

        let message = dialog.new_request(Method::Message).unwrap();
        assert!(crate::find_map_header!(message.headers, Contact).is_none());

        let publish = dialog.new_request(Method::Publish).unwrap();
        assert!(crate::find_map_header!(publish.headers, Contact).is_some());
        assert!(crate::find_map_header!(publish.headers, Expires).is_some());
    }

    #[tokio::test]
    async fn test_route_preloading_for_initial_invite() {
        let endpoint = Builder::new()
            .with_transaction_layer(TransactionLayer::default())
            .with_profile(ImsProfile {
                pcscf: Some("sip:pcscf.visited.net;lr".parse().unwrap()),
                service_routes: vec!["<sip:orig@scscf1.home.net;lr>".parse().unwrap()],
                ..ims_profile()
            })
            .build()
            .await;
        let dialog = Dialog::new_uac(
            &endpoint,
            None,
            OperationProfile {
                to: Some("sip:bob@biloxi.com".parse().unwrap()),
                ..Default::default()
            },
        );

        let invite = dialog.new_request(Method::Invite).unwrap();
        let routes: Vec<_> = crate::filter_map_header!(invite.headers, Route).collect();

        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].addr.uri.host_port.host.as_str(), "pcscf.visited.net");
        assert_eq!(routes[1].addr.uri.host_port.host.as_str(), "scscf1.home.net");

        // REGISTER never carries preloaded routes.
        let register = dialog.new_request(Method::Register).unwrap();
        assert!(crate::find_map_header!(register.headers, Route).is_none());
    }

    #[tokio::test]
    async fn test_operation_metadata_is_merged() {
        let endpoint = ims_endpoint().await;
        let dialog = Dialog::new_uac(
            &endpoint,
            None,
            OperationProfile {
                headers: vec![OtherHeader::new("Event", "reg")],
                caps: vec![Param::new("+g.oma.sip-im", None)],
                ..Default::default()
            },
        );

        let subscribe = dialog.new_request(Method::Subscribe).unwrap();

        let event = subscribe
            .headers
            .iter()
            .find_map(|h| match h {
                Header::Other(other) if other.name == "Event" => Some(other.value.as_str()),
                _ => None,
            });
        assert_eq!(event, Some("reg"));

        let contact = crate::find_map_header!(subscribe.headers, Contact).unwrap();
        assert!(contact.to_string().contains("+g.oma.sip-im"));
    }

    #[tokio::test]
    async fn test_terminated_dialog_rejects_requests() {
        let endpoint = ims_endpoint().await;
        let dialog = Dialog::new_uac(&endpoint, None, OperationProfile::default());

        dialog.terminate();

        assert_matches!(
            dialog.new_request(Method::Register),
            Err(Error::InvalidState(_))
        );
    }
}
