use std::cmp;
use std::ops::Deref;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::future::{self, Either};
use tokio::pin;
use tokio::sync::oneshot;
use tokio::time;

use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::message::Method;
use crate::transaction::{State, Transaction, TransactionInner};
use crate::transport::{IncomingRequest, OutgoingResponse};

type TxConfirmed = Arc<Mutex<Option<oneshot::Sender<()>>>>;
type RxConfirmed = oneshot::Receiver<()>;

/// A Server INVITE transaction.
///
/// Proceeding -> Completed -> Confirmed -> Terminated.
#[derive(Clone)]
pub struct InvServerTransaction {
    transaction: TransactionInner,
    tx_confirmed: TxConfirmed,
}

impl InvServerTransaction {
    pub(crate) fn new(endpoint: &Endpoint, request: &IncomingRequest) -> Self {
        let tsx_layer = endpoint.transactions();
        let method = request.method();

        assert!(
            matches!(method, Method::Invite),
            "Expected Method::Invite for server INVITE transaction, but got: {}",
            method
        );

        let transaction = TransactionInner::create_uas_inv(request, endpoint);
        let tx_confirmed = Default::default();

        let uas_inv = InvServerTransaction {
            transaction,
            tx_confirmed,
        };

        tsx_layer.add_server_tsx_inv_to_map(uas_inv.clone());

        uas_inv
    }

    pub async fn respond(&self, response: &mut OutgoingResponse) -> Result<()> {
        self.tsx_send_response(response).await?;

        let code = response.status_code().into_i32();

        match code {
            100..=199 => {
                self.change_state_to(State::Proceeding);
            }
            200..=299 => {
                // The 2xx and its retransmissions belong to the TU.
                self.on_terminated();
            }
            300..=699 => {
                self.change_state_to(State::Completed);

                let (tx, rx) = oneshot::channel();

                self.tx_confirmed.lock().expect("Lock failed").replace(tx);
                self.initiate_retransmission(rx);
            }
            _ => (),
        };

        Ok(())
    }

    pub(crate) async fn receive_request(&self, request: &IncomingRequest) -> Result<()> {
        match self.get_state() {
            State::Completed if request.is_method(&Method::Ack) => {
                self.change_state_to(State::Confirmed);
                let sender = self.tx_confirmed.lock().expect("Lock failed").take();
                if let Some(sender) = sender {
                    let _ = sender.send(());
                }
                // Timer I.
                self.terminate();
            }
            State::Proceeding => {
                // A retransmitted INVITE triggers a retransmission of
                // the last provisional response.
                self.retransmit().await?;
            }
            _ => (),
        }
        Ok(())
    }

    /// Timer G drives response retransmission while Completed; Timer H
    /// bounds the wait for the ACK.
    fn initiate_retransmission(&self, mut rx_confirmed: RxConfirmed) {
        let unreliable = !self.reliable();
        let uas = self.clone();

        tokio::spawn(async move {
            let timer_h = time::sleep(64 * InvServerTransaction::T1);
            let timer_g = if unreliable {
                Either::Left(time::sleep(InvServerTransaction::T1))
            } else {
                Either::Right(future::pending::<()>())
            };

            pin!(timer_h);
            pin!(timer_g);

            'retrans: loop {
                tokio::select! {
                    _ = &mut timer_g => {
                        match uas.retransmit().await {
                            Ok(retrans) => {
                                let retrans = InvServerTransaction::T1 * (1 << retrans);
                                let interval = cmp::min(retrans, InvServerTransaction::T2);
                                let sleep = time::sleep(interval);
                                timer_g.set(Either::Left(sleep));
                            },
                            Err(err) => {
                                log::info!("Failed to retransmit: {}", err);
                            },
                        }
                    },
                    _ = &mut timer_h => {
                        // Timer H expired: the ACK never arrived.
                        uas.on_timeout();
                        break 'retrans;
                    }
                    _ = &mut rx_confirmed => {
                        // Got confirmed state.
                        break 'retrans;
                    }
                }
            }
        });
    }
}

// The TU passes any number of provisional responses to the
// server transaction.
#[async_trait]
impl Transaction for InvServerTransaction {
    fn terminate(&self) {
        if self.reliable() {
            self.on_terminated();
        } else {
            // Start timer I.
            self.schedule_termination(Self::T4);
        }
    }
}

impl Deref for InvServerTransaction {
    type Target = TransactionInner;

    fn deref(&self) -> &Self::Target {
        &self.transaction
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::StatusCode;
    use crate::transaction::mock;
    use tokio::time::Duration;

    async fn tsx_uas_params() -> (Endpoint, IncomingRequest) {
        let endpoint = mock::default_endpoint().await;
        let request = mock::request(Method::Invite);

        (endpoint, request)
    }

    #[tokio::test]
    async fn test_receives_100_trying() {
        let (endpoint, request) = tsx_uas_params().await;
        let tsx = InvServerTransaction::new(&endpoint, &request);
        let response = &mut mock::response(StatusCode::Trying);

        tsx.respond(response).await.unwrap();

        assert!(tsx.last_status_code().unwrap().into_i32() == 100);
        assert!(tsx.get_state() == State::Proceeding);
    }

    #[tokio::test]
    async fn test_receives_180_ringing() {
        let (endpoint, request) = tsx_uas_params().await;
        let tsx = InvServerTransaction::new(&endpoint, &request);
        let response = &mut mock::response(StatusCode::Trying);

        tsx.respond(response).await.unwrap();

        assert!(tsx.last_status_code().unwrap().into_i32() == 100);

        let response = &mut mock::response(StatusCode::Ringing);
        tsx.respond(response).await.unwrap();

        assert!(tsx.last_status_code().unwrap().into_i32() == 180);
        assert!(tsx.get_state() == State::Proceeding);
    }

    #[tokio::test]
    async fn test_2xx_terminates_immediately() {
        let (endpoint, request) = tsx_uas_params().await;
        let tsx = InvServerTransaction::new(&endpoint, &request);
        let response = &mut mock::response(StatusCode::Ok);

        tsx.respond(response).await.unwrap();

        assert!(tsx.get_state() == State::Terminated);
    }

    #[tokio::test]
    async fn test_ack_confirms_non_2xx_final() {
        let (endpoint, request) = tsx_uas_params().await;
        let tsx = InvServerTransaction::new(&endpoint, &request);
        let response = &mut mock::response(StatusCode::BusyHere);

        tsx.respond(response).await.unwrap();
        assert!(tsx.get_state() == State::Completed);

        let ack = mock::request(Method::Ack);
        tsx.receive_request(&ack).await.unwrap();

        assert!(tsx.get_state() == State::Confirmed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invite_timer_g_retransmission() {
        let (endpoint, request) = tsx_uas_params().await;
        let tsx = InvServerTransaction::new(&endpoint, &request);

        let response = &mut mock::response(StatusCode::BusyHere);
        tsx.respond(response).await.unwrap();

        time::sleep(InvServerTransaction::T1 + Duration::from_millis(1)).await;
        assert!(tsx.retrans_count() == 1);

        time::sleep(InvServerTransaction::T1 * 2 + Duration::from_millis(1)).await;
        assert!(tsx.retrans_count() == 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_h_expiration() {
        let (endpoint, request) = tsx_uas_params().await;
        let tsx = InvServerTransaction::new(&endpoint, &request);

        let response = &mut mock::response(StatusCode::BusyHere);

        tsx.respond(response).await.unwrap();

        time::sleep(InvServerTransaction::T1 * 64 + Duration::from_millis(1)).await;
        assert!(tsx.get_state() == State::Terminated);
    }
}
