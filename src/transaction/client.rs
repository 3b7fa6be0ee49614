use std::cmp;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

use futures_util::future::{self, Either};
use tokio::pin;
use tokio::sync::oneshot;
use tokio::time;

use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::message::Method;
use crate::transaction::{State, Transaction, TransactionInner};
use crate::transport::{IncomingResponse, OutgoingRequest};

type TxCompleted = Arc<Mutex<Option<oneshot::Sender<()>>>>;
type RxCompleted = oneshot::Receiver<()>;

/// A Client Non-INVITE transaction.
///
/// Trying -> Proceeding -> Completed -> Terminated.
#[derive(Clone)]
pub struct ClientTransaction {
    transaction: TransactionInner,
    tx_completed: TxCompleted,
}

impl ClientTransaction {
    pub(crate) async fn send(mut request: OutgoingRequest, endpoint: &Endpoint) -> Result<ClientTransaction> {
        let tsx_layer = endpoint.transactions();
        let method = request.msg.method();

        assert!(
            !matches!(method, Method::Invite | Method::Ack),
            "Invalid method for non-INVITE client transaction: expected non-INVITE/non-ACK, got: {}",
            method
        );

        let transaction = TransactionInner::create_uac(&request, endpoint);
        let (tx, rx) = oneshot::channel();

        let tx_completed = Arc::new(Mutex::new(Some(tx)));

        let uac = Self {
            transaction,
            tx_completed,
        };

        uac.tsx_send_request(&mut request).await?;

        uac.retrans_loop(rx);

        tsx_layer.add_client_tsx_to_map(uac.clone());

        Ok(uac)
    }

    /// Timer E drives request retransmission; Timer F bounds the wait
    /// for a final response.
    fn retrans_loop(&self, mut rx_completed: RxCompleted) {
        let unreliable = !self.reliable();
        let uac = self.clone();

        tokio::spawn(async move {
            pin! {
                let timer_f = time::sleep(64 * ClientTransaction::T1);
                let timer_e = if unreliable {
                    Either::Left(time::sleep(ClientTransaction::T1))
                } else {
                    Either::Right(future::pending::<()>())
                };
            }

            'retrans: loop {
                tokio::select! {
                    _ = &mut timer_e => {
                        let state = uac.get_state();
                        match uac.retransmit().await {
                            Ok(retrans) => {
                                let interval = if state == State::Trying {
                                    let retrans = ClientTransaction::T1 * (1 << retrans);
                                    cmp::min(retrans, ClientTransaction::T2)
                                } else {
                                    ClientTransaction::T2
                                };
                                let sleep = time::sleep(interval);
                                timer_e.set(Either::Left(sleep));
                            },
                            Err(err) => {
                                log::info!("Failed to retransmit: {}", err);
                            },
                        }
                    }
                    _ = &mut timer_f => {
                        // Timer F expired.
                        uac.on_timeout();
                        break 'retrans;
                    }

                    _ = &mut rx_completed => {
                        // Got completed state.
                        break 'retrans;
                    }
                }
            }
        });
    }

    pub(crate) async fn receive(&self, response: &IncomingResponse) -> Result<bool> {
        let code = response.response.code();
        self.set_last_status_code(code);

        match self.get_state() {
            State::Trying if code.is_provisional() => {
                self.change_state_to(State::Proceeding);
            }
            State::Trying | State::Proceeding if code.is_final() => {
                self.change_state_to(State::Completed);

                let tx = self.tx_completed.lock().expect("Lock failed").take();
                if let Some(tx) = tx {
                    let _ = tx.send(());
                }
                self.terminate();
            }
            State::Completed => {
                self.retransmit().await?;

                return Ok(true);
            }
            _ => (),
        }

        Ok(false)
    }
}

#[async_trait::async_trait]
impl Transaction for ClientTransaction {
    fn terminate(&self) {
        if self.reliable() {
            self.on_terminated();
        } else {
            // Start timer K.
            self.schedule_termination(Self::T4);
        }
    }
}

impl DerefMut for ClientTransaction {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.transaction
    }
}

impl Deref for ClientTransaction {
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
    use tokio::time::{self, Duration};

    #[tokio::test]
    async fn test_entered_trying() {
        let endpoint = mock::default_endpoint().await;
        let request = mock::outgoing_request(Method::Options);

        let uac = ClientTransaction::send(request, &endpoint).await.unwrap();

        assert_eq!(uac.get_state(), State::Trying);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fire_timer_f() {
        let endpoint = mock::default_endpoint().await;
        let request = mock::outgoing_request(Method::Options);

        let uac = ClientTransaction::send(request, &endpoint).await.unwrap();

        assert_eq!(uac.get_state(), State::Trying);

        // Wait for the timer to fire.
        time::sleep(ClientTransaction::T1 * 64 + Duration::from_millis(1)).await;

        assert_eq!(uac.get_state(), State::Terminated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fire_timer_k() {
        let endpoint = mock::default_endpoint().await;
        let request = mock::outgoing_request(Method::Options);
        let response = mock::incoming_response(StatusCode::Ok);

        let uac = ClientTransaction::send(request, &endpoint).await.unwrap();

        assert_eq!(uac.get_state(), State::Trying);

        uac.receive(&response).await.unwrap();
        // Wait for the timer to fire.
        time::sleep(ClientTransaction::T4 + Duration::from_millis(1)).await;

        assert_eq!(uac.get_state(), State::Terminated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_e_retransmission() {
        let endpoint = mock::default_endpoint().await;
        let request = mock::outgoing_request(Method::Options);

        let uac = ClientTransaction::send(request, &endpoint).await.unwrap();

        assert!(uac.retrans_count() == 0);

        // For the default values of T1 and T2, this results in
        // intervals of 500 ms, 1 s, 2 s, 4 s, 4 s, 4 s, etc.
        assert_eq!(uac.get_state(), State::Trying);
        // 500 ms
        time::sleep(Duration::from_millis(500 + 1)).await;
        assert!(uac.retrans_count() == 1);
        // 1 s
        time::sleep(Duration::from_secs(1) + Duration::from_millis(1)).await;
        assert!(uac.retrans_count() == 2);
        // 2 s
        time::sleep(Duration::from_secs(2) + Duration::from_millis(1)).await;
        assert!(uac.retrans_count() == 3);
        // 4 s
        time::sleep(Duration::from_secs(4) + Duration::from_millis(1)).await;
        assert!(uac.retrans_count() == 4);
        // 4 s
        time::sleep(Duration::from_secs(4) + Duration::from_millis(1)).await;
        assert!(uac.retrans_count() == 5);
        // 4 s
        time::sleep(Duration::from_secs(4) + Duration::from_millis(1)).await;
        assert!(uac.retrans_count() == 6);

        assert_eq!(uac.get_state(), State::Trying);
    }

    #[tokio::test]
    async fn test_receives_100_trying() {
        let endpoint = mock::default_endpoint().await;
        let request = mock::outgoing_request(Method::Options);

        let uac = ClientTransaction::send(request, &endpoint).await.unwrap();

        assert_eq!(uac.get_state(), State::Trying);

        let response = mock::incoming_response(StatusCode::Trying);
        uac.receive(&response).await.unwrap();

        assert_eq!(uac.get_state(), State::Proceeding);
    }

    #[tokio::test]
    async fn test_receives_200_ok() {
        let endpoint = mock::default_endpoint().await;
        let request = mock::outgoing_request(Method::Options);
        let response = mock::incoming_response(StatusCode::Ok);

        let uac = ClientTransaction::send(request, &endpoint).await.unwrap();

        assert_eq!(uac.get_state(), State::Trying);

        uac.receive(&response).await.unwrap();

        assert_eq!(uac.last_status_code(), Some(StatusCode::Ok));
        assert_eq!(uac.get_state(), State::Completed);
    }

    #[tokio::test]
    async fn test_absorbs_response_retransmission() {
        let endpoint = mock::default_endpoint().await;
        let request = mock::outgoing_request(Method::Options);
        let response = mock::incoming_response(StatusCode::Ok);

        let uac = ClientTransaction::send(request, &endpoint).await.unwrap();

        assert!(!uac.receive(&response).await.unwrap());
        assert_eq!(uac.get_state(), State::Completed);

        // The retransmitted final response is absorbed.
        assert!(uac.receive(&response).await.unwrap());
    }
}
