use async_trait::async_trait;
use futures::{lock::Mutex, Sink, Stream};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    error::{MpcError, Result},
    share::AdditiveShare,
    transport::MultipartyTransport,
    MpcContext, MpcDealer, MpcEngine, MpcRound, MpcRoundOutput,
};

/// Message sent to a single peer in one round.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundMessage<R> {
    /// Shares of values input by the sender, in request order.
    pub inputs: Vec<R>,
    /// Sender's shares of values opened to the receiver, in request order.
    pub openings: Vec<R>,
}

/// N-party engine over additive secret sharing.
/// Every round is a single exchange of messages with each peer.
pub struct AdditiveEngine<D: MpcDealer, Channel> {
    dealer: D,
    transport: Mutex<MultipartyTransport<RoundMessage<D::Ring>, Channel>>,
    num_parties: usize,
    party_id: usize,
}

impl<D: MpcDealer, Channel> AdditiveEngine<D, Channel> {
    /// Create new engine. Dealer and transport must agree on party ID and count.
    pub fn new(dealer: D, transport: MultipartyTransport<RoundMessage<D::Ring>, Channel>) -> Self {
        assert_eq!(dealer.party_id(), transport.party_id(), "Party ID mismatch");
        assert_eq!(
            dealer.num_parties(),
            transport.num_parties(),
            "Party count mismatch"
        );
        Self {
            num_parties: transport.num_parties(),
            party_id: transport.party_id(),
            transport: Mutex::new(transport),
            dealer,
        }
    }
}

impl<D: MpcDealer, Channel> MpcContext for AdditiveEngine<D, Channel> {
    type Ring = D::Ring;

    fn num_parties(&self) -> usize {
        self.num_parties
    }

    fn party_id(&self) -> usize {
        self.party_id
    }
}

#[async_trait(?Send)]
impl<D, E, Channel> MpcEngine for AdditiveEngine<D, Channel>
where
    D: MpcDealer,
    Channel: Stream<Item = Result<RoundMessage<D::Ring>, E>> + Sink<RoundMessage<D::Ring>> + Unpin,
{
    type Dealer = D;

    fn dealer(&self) -> &Self::Dealer {
        &self.dealer
    }

    async fn process_round(&self, round: MpcRound<D::Ring>) -> Result<MpcRoundOutput<D::Ring>> {
        let num_parties = self.num_parties;
        let party_id = self.party_id;
        let mut outgoing = vec![RoundMessage::default(); num_parties];

        // 1. Split own inputs into fresh shares, one per party.
        let mut inputs = Vec::with_capacity(round.inputs.len());
        {
            let mut rng = rand::thread_rng();
            for request in &round.inputs {
                if request.owner >= num_parties {
                    return Err(MpcError::InvalidConfig(format!(
                        "input owner {} out of range",
                        request.owner
                    )));
                }
                if request.owner != party_id {
                    inputs.push(None);
                    continue;
                }
                let values = request.values.as_ref().ok_or_else(|| {
                    MpcError::InvalidConfig("input owner must provide values".to_string())
                })?;
                let mut own = Vec::with_capacity(values.len());
                for &value in values {
                    let shares = AdditiveShare::share(value, num_parties, &mut rng);
                    for (peer, share) in shares.into_iter().enumerate() {
                        if peer == party_id {
                            own.push(share.raw());
                        } else {
                            outgoing[peer].inputs.push(share.raw());
                        }
                    }
                }
                inputs.push(Some(own));
            }
        }

        // 2. Send shares of opened values to their recipients.
        for request in &round.openings {
            for (peer, message) in outgoing.iter_mut().enumerate() {
                if peer != party_id && request.to.includes(peer) {
                    message.openings.extend_from_slice(&request.shares);
                }
            }
        }

        debug!(
            party_id,
            inputs = round.inputs.len(),
            openings = round.openings.len(),
            "Exchanging round messages"
        );
        let received = self
            .transport
            .lock()
            .await
            .exchange_with_each(outgoing)
            .await?;

        // 3. Collect input shares sent by their owners.
        for (peer, message) in &received {
            let mut cursor = ShareCursor::new(*peer, &message.inputs);
            for (request, slot) in round.inputs.iter().zip(inputs.iter_mut()) {
                if request.owner == *peer {
                    *slot = Some(cursor.take(request.len)?.to_vec());
                }
            }
            cursor.finish()?;
        }

        // 4. Sum all shares of values opened to current party.
        let mut openings: Vec<_> = round
            .openings
            .iter()
            .map(|request| request.to.includes(party_id).then(|| request.shares.clone()))
            .collect();
        for (peer, message) in &received {
            let mut cursor = ShareCursor::new(*peer, &message.openings);
            for (request, slot) in round.openings.iter().zip(openings.iter_mut()) {
                if let Some(sum) = slot {
                    let shares = cursor.take(request.shares.len())?;
                    for (acc, &share) in sum.iter_mut().zip(shares) {
                        *acc += share;
                    }
                }
            }
            cursor.finish()?;
        }

        Ok(MpcRoundOutput {
            inputs: inputs.into_iter().map(Option::unwrap_or_default).collect(),
            openings,
        })
    }
}

/// Reader of consecutive share slices from a peer message.
struct ShareCursor<'a, R> {
    peer: usize,
    shares: &'a [R],
    position: usize,
}

impl<'a, R> ShareCursor<'a, R> {
    fn new(peer: usize, shares: &'a [R]) -> Self {
        Self {
            peer,
            shares,
            position: 0,
        }
    }

    fn take(&mut self, len: usize) -> Result<&'a [R]> {
        let end = self.position + len;
        if end > self.shares.len() {
            return Err(self.incomplete(end));
        }
        let slice = &self.shares[self.position..end];
        self.position = end;
        Ok(slice)
    }

    /// Check that the message had no trailing shares.
    fn finish(self) -> Result<()> {
        if self.position != self.shares.len() {
            return Err(self.incomplete(self.position));
        }
        Ok(())
    }

    fn incomplete(&self, expected: usize) -> MpcError {
        warn!(
            peer = self.peer,
            expected,
            actual = self.shares.len(),
            "Malformed round message"
        );
        MpcError::IncompleteShareSet {
            expected,
            actual: self.shares.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dealer::FakeDealer, rings::Z64, transport::mock_multiparty_channels, InputRequest,
        OpenRequest, Recipient,
    };

    #[tokio::test]
    async fn test_input_and_open() {
        let transports = mock_multiparty_channels::<RoundMessage<Z64>>(3, 1 << 16);
        let engines: Vec<_> = transports
            .into_iter()
            .enumerate()
            .map(|(id, t)| AdditiveEngine::new(FakeDealer::<Z64>::new(3, id, 0), t))
            .collect();

        let outputs = futures::future::join_all(engines.iter().map(|engine| async move {
            let id = engine.party_id();
            let input = engine
                .process_round(MpcRound {
                    inputs: vec![InputRequest {
                        owner: 1,
                        values: (id == 1).then(|| vec![Z64(10), Z64(20)]),
                        len: 2,
                    }],
                    openings: vec![],
                })
                .await
                .unwrap();
            let shares = input.inputs[0].clone();
            engine
                .process_round(MpcRound {
                    inputs: vec![],
                    openings: vec![
                        OpenRequest {
                            to: Recipient::All,
                            shares: shares.clone(),
                        },
                        OpenRequest {
                            to: Recipient::Party(2),
                            shares,
                        },
                    ],
                })
                .await
                .unwrap()
        }))
        .await;

        for (id, output) in outputs.into_iter().enumerate() {
            assert_eq!(output.openings[0], Some(vec![Z64(10), Z64(20)]));
            let private = (id == 2).then(|| vec![Z64(10), Z64(20)]);
            assert_eq!(output.openings[1], private);
        }
    }

    #[test]
    fn test_share_cursor() {
        let shares = [Z64(1), Z64(2), Z64(3)];
        let mut cursor = ShareCursor::new(1, &shares);
        assert_eq!(cursor.take(2).unwrap(), &[Z64(1), Z64(2)]);
        assert!(matches!(
            cursor.take(2),
            Err(MpcError::IncompleteShareSet {
                expected: 4,
                actual: 3
            })
        ));

        let mut cursor = ShareCursor::new(1, &shares);
        cursor.take(1).unwrap();
        assert!(cursor.finish().is_err());
    }
}
