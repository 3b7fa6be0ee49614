use std::ops::{Deref, DerefMut};

use async_trait::async_trait;

use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::message::Method;
use crate::transaction::{State, Transaction, TransactionInner};
use crate::transport::{IncomingRequest, OutgoingResponse};

/// A Server Non-INVITE transaction.
///
/// Trying -> Proceeding -> Completed -> Terminated.
#[derive(Clone)]
pub struct ServerTransaction {
    transaction: TransactionInner,
}

impl ServerTransaction {
    pub(crate) fn new(endpoint: &Endpoint, request: &IncomingRequest) -> Self {
        assert!(
            !matches!(request.method(), Method::Ack | Method::Cancel | Method::Invite),
            "Request method cannot be Ack, Cancel or Invite",
        );
        let tsx_layer = endpoint.transactions();
        let transaction = TransactionInner::create_uas(request, endpoint);
        let server_tsx = ServerTransaction { transaction };

        tsx_layer.add_server_tsx_to_map(server_tsx.clone());

        server_tsx
    }

    pub async fn respond(&self, msg: &mut OutgoingResponse) -> Result<()> {
        self.tsx_send_response(msg).await?;

        match self.get_state() {
            State::Trying if msg.is_provisional() => {
                self.change_state_to(State::Proceeding);
            }
            State::Trying | State::Proceeding => {
                self.change_state_to(State::Completed);
                self.terminate();
            }
            _ => (),
        }

        Ok(())
    }
}

#[async_trait]
impl Transaction for ServerTransaction {
    fn terminate(&self) {
        if self.reliable() {
            self.on_terminated();
        } else {
            // Start timer J.
            self.schedule_termination(Self::T1 * 64);
        }
    }
}

impl DerefMut for ServerTransaction {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.transaction
    }
}

impl Deref for ServerTransaction {
    type Target = TransactionInner;

    fn deref(&self) -> &Self::Target {
        &self.transaction
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::{self, Duration};

    use super::*;
    use crate::message::StatusCode;
    use crate::transaction::mock;

    #[tokio::test]
    async fn test_receives_100_trying() {
        let request = mock::request(Method::Options);
        let endpoint = mock::default_endpoint().await;
        let tsx = ServerTransaction::new(&endpoint, &request);
        let response = &mut mock::response(StatusCode::Trying);

        tsx.respond(response).await.unwrap();

        assert!(tsx.last_status_code().unwrap().into_i32() == 100);
        assert!(tsx.get_state() == State::Proceeding);
    }

    #[tokio::test]
    async fn test_receives_200_ok() {
        let request = mock::request(Method::Options);
        let endpoint = mock::default_endpoint().await;
        let tsx = ServerTransaction::new(&endpoint, &request);
        let response = &mut mock::response(StatusCode::Ok);

        tsx.respond(response).await.unwrap();

        assert!(tsx.last_status_code().unwrap().into_i32() == 200);
        assert!(tsx.get_state() == State::Completed);
    }

    #[tokio::test]
    async fn test_retransmit_proceeding() {
        let request = mock::request(Method::Options);
        let endpoint = mock::default_endpoint().await;
        let tsx = ServerTransaction::new(&endpoint, &request);
        let response = &mut mock::response(StatusCode::Trying);

        tsx.respond(response).await.unwrap();

        // A retransmitted request triggers a retransmission of the
        // last response.
        let retransmitted = mock::request(Method::Options);
        let server_tsx = crate::transaction::ServerTsx::NonInvite(tsx.clone());
        server_tsx.receive_request(&retransmitted).await.unwrap();

        assert!(tsx.retrans_count() == 1);
        assert!(tsx.last_status_code().unwrap().into_i32() == 100);
        assert!(tsx.get_state() == State::Proceeding);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminated_timer_j() {
        let request = mock::request(Method::Options);
        let endpoint = mock::default_endpoint().await;
        let tsx = ServerTransaction::new(&endpoint, &request);
        let response = &mut mock::response(StatusCode::Ok);

        tsx.respond(response).await.unwrap();

        time::sleep(ServerTransaction::T1 * 64 + Duration::from_millis(1)).await;

        assert!(tsx.last_status_code().unwrap().into_i32() == 200);
        assert!(tsx.get_state() == State::Terminated);
    }
}
