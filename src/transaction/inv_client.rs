use std::cmp;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{self, Either};
use tokio::pin;
use tokio::time;

use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::headers::{self, CSeq, Header, Headers};
use crate::message::{Method, Request, RequestLine, Uri};
use crate::transaction::{State, Transaction, TransactionInner};
use crate::transport::{IncomingResponse, OutgoingRequest};

/// The slice of the original INVITE kept around for composing the ACK
/// to a non-2xx final response (RFC 3261 §17.1.1.3).
struct OriginalRequest {
    uri: Uri,
    via: headers::Via,
    from: headers::From,
    cseq: CSeq,
    call_id: headers::CallId,
}

/// A Client INVITE transaction.
///
/// Calling -> Proceeding -> Completed -> Terminated.
#[derive(Clone)]
pub struct InvClientTransaction {
    transaction: TransactionInner,
    request: Arc<OriginalRequest>,
}

const TIMER_D: Duration = Duration::from_secs(32);

impl InvClientTransaction {
    pub async fn send(mut request: OutgoingRequest, endpoint: &Endpoint) -> Result<InvClientTransaction> {
        let tsx_layer = endpoint.transactions();
        let method = request.msg.method();

        assert!(
            matches!(method, Method::Invite),
            "Invalid method for client INVITE transaction: expected INVITE, got: {}",
            method
        );

        let transaction = TransactionInner::create_uac_inv(&request, endpoint);
        transaction.tsx_send_request(&mut request).await?;

        let mut via = None;
        let mut cseq = None;
        let mut call_id = None;
        let mut from = None;

        for header in request.msg.headers.iter() {
            match header {
                Header::From(f) => from = Some(f.clone()),
                Header::Via(v) => via = Some(v.clone()),
                Header::CallId(c) => call_id = Some(c.clone()),
                Header::CSeq(c) => cseq = Some(*c),
                _ => continue,
            }
        }

        let original = OriginalRequest {
            uri: request.msg.req_line.uri.clone(),
            via: via.expect("INVITE without Via header"),
            cseq: cseq.expect("INVITE without CSeq header"),
            call_id: call_id.expect("INVITE without Call-ID header"),
            from: from.expect("INVITE without From header"),
        };

        let uac_inv = InvClientTransaction {
            transaction,
            request: Arc::new(original),
        };

        tsx_layer.add_client_inv_tsx_to_map(uac_inv.clone());

        tokio::spawn(uac_inv.clone().tsx_retrans_task());

        Ok(uac_inv)
    }

    /// Timer A drives request retransmission while Calling; Timer B
    /// bounds the wait for any response.
    async fn tsx_retrans_task(self) -> Result<()> {
        pin! {
            let timer_b = time::sleep(64 * Self::T1);
            let timer_a = if !self.reliable() {
                Either::Left(time::sleep(Self::T1))
            } else {
                Either::Right(future::pending::<()>())
            };
        }

        'retrans: loop {
            tokio::select! {
                _ = &mut timer_a, if self.is_calling() => {
                    match self.retransmit().await {
                        Ok(retrans) => {
                            let retrans = Self::T1 * (1 << retrans);
                            let interval = cmp::min(retrans, Self::T2);
                            let sleep = time::sleep(interval);
                            timer_a.set(Either::Left(sleep));
                        },
                        Err(err) => {
                            log::info!("Failed to retransmit: {}", err);
                        },
                    }
                }
                _ = &mut timer_b, if self.is_calling() => {
                    // Timer B expired.
                    self.on_timeout();
                    break 'retrans Ok(());
                }
            }
        }
    }

    pub(crate) async fn receive(&self, response: &IncomingResponse) -> Result<bool> {
        let code = response.response.code();
        self.set_last_status_code(code);

        match self.get_state() {
            State::Calling if code.is_provisional() => {
                self.change_state_to(State::Proceeding);
            }
            State::Calling | State::Proceeding if matches!(code.into_i32(), 300..=699) => {
                self.change_state_to(State::Completed);
                let mut ack = self.create_ack(response);

                self.tsx_send_request(&mut ack).await?;
                self.terminate();
            }
            State::Calling | State::Proceeding if code.is_final() => {
                // 2xx: the transaction ends at once, the ACK is the
                // dialog's responsibility.
                self.on_terminated();
            }
            State::Completed => {
                // 17.1.1.2: retransmissions of the final response while
                // in "Completed" cause the ACK to be re-sent, but the
                // response MUST NOT be passed up to the TU.
                self.retransmit().await?;

                return Ok(true);
            }
            _ => (),
        }
        Ok(false)
    }

    fn create_ack(&self, response: &IncomingResponse) -> OutgoingRequest {
        let to = response.core.to.clone();
        let cseq = CSeq::new(self.request.cseq.cseq(), Method::Ack);

        let headers = &self.request;
        let mut ack_hdrs = Headers::with_capacity(5);

        ack_hdrs.push(Header::Via(headers.via.clone()));
        ack_hdrs.push(Header::From(headers.from.clone()));
        ack_hdrs.push(Header::To(to));
        ack_hdrs.push(Header::CallId(headers.call_id.clone()));
        ack_hdrs.push(Header::CSeq(cseq));

        OutgoingRequest {
            msg: Request {
                req_line: RequestLine {
                    method: Method::Ack,
                    uri: self.request.uri.clone(),
                },
                headers: ack_hdrs,
                body: None,
            },
            addr: self.addr(),
            buf: None,
            transport: self.transport().clone(),
        }
    }
}

#[async_trait::async_trait]
impl Transaction for InvClientTransaction {
    fn terminate(&self) {
        if self.reliable() {
            self.on_terminated();
        } else {
            // Start timer D.
            self.schedule_termination(TIMER_D);
        }
    }
}

impl DerefMut for InvClientTransaction {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.transaction
    }
}

impl Deref for InvClientTransaction {
    type Target = TransactionInner;

    fn deref(&self) -> &Self::Target {
        &self.transaction
    }
}
