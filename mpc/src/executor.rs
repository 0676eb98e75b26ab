use std::{
    cell::{Cell, RefCell},
    future::Future,
    task::Poll,
};

use ndarray::{ArrayD, ArrayViewD, IxDyn};
use tracing::{debug, info};

use crate::{
    error::{MpcError, Result},
    tensor::SecureTensor,
    InputRequest, MpcContext, MpcEngine, MpcRound, OpenRequest, Recipient,
};

/// Communication statistics of a circuit run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MpcExecutionStats {
    /// Number of communication rounds.
    pub rounds: usize,
    /// Number of opened elements.
    pub openings: usize,
    /// Number of input elements.
    pub inputs: usize,
}

/// MPC circuit executor.
/// Requests issued by concurrently polled branches of a circuit are batched into one round.
pub struct MpcExecutor<'a, Engine: MpcEngine> {
    engine: &'a Engine,
    inputs: RoundQueue<InputRequest<Engine::Ring>, Vec<Engine::Ring>>,
    openings: RoundQueue<OpenRequest<Engine::Ring>, Option<Vec<Engine::Ring>>>,
    stats: Cell<MpcExecutionStats>,
}

impl<'a, Engine: MpcEngine> MpcExecutor<'a, Engine> {
    /// Create new MPC circuit executor.
    pub fn new(engine: &'a Engine) -> Self {
        MpcExecutor {
            engine,
            inputs: RoundQueue::new(),
            openings: RoundQueue::new(),
            stats: Cell::new(MpcExecutionStats::default()),
        }
    }

    pub fn engine(&self) -> &'a Engine {
        self.engine
    }

    /// Dealer of the underlying engine.
    pub fn dealer(&self) -> &'a Engine::Dealer {
        self.engine.dealer()
    }

    /// Statistics of all rounds processed so far.
    pub fn stats(&self) -> MpcExecutionStats {
        self.stats.get()
    }

    /// Sharing of a public tensor.
    pub fn public(&self, values: ArrayViewD<Engine::Ring>) -> SecureTensor<Engine::Ring> {
        SecureTensor::public(self.party_id(), values)
    }

    /// Get private shares of a tensor provided by party `owner`.
    /// If `party_id() != owner`, then `values` must be None.
    /// If `party_id() == owner`, then `values` must have given shape.
    pub async fn input(
        &self,
        owner: usize,
        values: Option<ArrayViewD<'_, Engine::Ring>>,
        shape: &[usize],
    ) -> Result<SecureTensor<Engine::Ring>> {
        let values = match values {
            Some(values) if self.party_id() == owner => {
                if values.shape() != shape {
                    return Err(MpcError::shape_mismatch("input", values.shape(), shape));
                }
                Some(values.iter().copied().collect())
            }
            _ => None,
        };
        let len = shape.iter().product();
        let shares = self
            .inputs
            .request(InputRequest { owner, values, len })
            .await;
        SecureTensor::from_flat(shape, shares)
    }

    /// Open masked tensor to all parties. Requires communication.
    /// Callers must make sure the opened value leaks nothing.
    pub async fn open(&self, x: &SecureTensor<Engine::Ring>) -> Result<ArrayD<Engine::Ring>> {
        let opened = self.open_to(Recipient::All, x).await?;
        opened.ok_or_else(|| MpcError::InvalidConfig("opening to all returned nothing".to_string()))
    }

    /// Reveal result to all parties. Requires communication.
    pub async fn reveal(&self, x: &SecureTensor<Engine::Ring>) -> Result<ArrayD<Engine::Ring>> {
        info!(elements = x.len(), "Revealing result to all parties");
        self.open(x).await
    }

    /// Reveal result to a single party. Others get None.
    pub async fn reveal_to(
        &self,
        party_id: usize,
        x: &SecureTensor<Engine::Ring>,
    ) -> Result<Option<ArrayD<Engine::Ring>>> {
        info!(elements = x.len(), party_id, "Revealing result to a single party");
        self.open_to(Recipient::Party(party_id), x).await
    }

    async fn open_to(
        &self,
        to: Recipient,
        x: &SecureTensor<Engine::Ring>,
    ) -> Result<Option<ArrayD<Engine::Ring>>> {
        let opened = self
            .openings
            .request(OpenRequest {
                to,
                shares: x.to_flat(),
            })
            .await;
        opened
            .map(|values| {
                let len = values.len();
                ArrayD::from_shape_vec(IxDyn(x.shape()), values)
                    .map_err(|_| MpcError::shape_mismatch("open", x.shape(), &[len]))
            })
            .transpose()
    }

    /// Execute given async circuit on specified MPC engine.
    /// Circuit may only wait on requests issued to this executor.
    /// First error aborts the whole circuit.
    pub async fn run_circuit<T, Err, S, F>(&self, circuit: F) -> Result<T, Err>
    where
        Err: From<MpcError>,
        S: Future<Output = Result<T, Err>>,
        F: FnOnce() -> S,
    {
        let mut future = Box::pin(circuit());

        loop {
            if let Poll::Ready(output) = futures::poll!(future.as_mut()) {
                return output;
            }

            let round = MpcRound {
                inputs: self.inputs.drain(),
                openings: self.openings.drain(),
            };
            if round.is_empty() {
                return Err(MpcError::Stalled.into());
            }

            let mut stats = self.stats.get();
            stats.rounds += 1;
            stats.inputs += round.inputs.iter().map(|r| r.len).sum::<usize>();
            stats.openings += round.openings.iter().map(|r| r.shares.len()).sum::<usize>();
            self.stats.set(stats);
            debug!(
                round = stats.rounds,
                inputs = round.inputs.len(),
                openings = round.openings.len(),
                "Processing round"
            );

            let responses = self.engine.process_round(round).await?;
            self.inputs.complete(responses.inputs);
            self.openings.complete(responses.openings);
        }
    }
}

impl<'a, Engine: MpcEngine> MpcContext for MpcExecutor<'a, Engine> {
    type Ring = Engine::Ring;

    fn num_parties(&self) -> usize {
        self.engine.num_parties()
    }

    fn party_id(&self) -> usize {
        self.engine.party_id()
    }
}

/// Requests of one kind issued during the current round,
/// and responses of the last processed round.
struct RoundQueue<T, S> {
    pending: RefCell<Vec<T>>,
    responses: RefCell<Vec<Option<S>>>,
    completed_rounds: Cell<usize>,
}

/// Position of a request: round it is processed in and index within that round.
#[derive(Clone, Copy)]
struct Ticket {
    round: usize,
    index: usize,
}

impl<T, S> RoundQueue<T, S> {
    fn new() -> Self {
        Self {
            pending: RefCell::default(),
            responses: RefCell::default(),
            completed_rounds: Cell::new(0),
        }
    }

    /// Issue request and wait until the round it belongs to is processed.
    /// Responses are matched by ticket, regardless of the order in which waiting branches are polled.
    async fn request(&self, request: T) -> S {
        let ticket = {
            let mut pending = self.pending.borrow_mut();
            pending.push(request);
            Ticket {
                round: self.completed_rounds.get() + 1,
                index: pending.len() - 1,
            }
        };

        futures::future::poll_fn(|_| {
            if self.completed_rounds.get() != ticket.round {
                return Poll::Pending;
            }
            let response = self
                .responses
                .borrow_mut()
                .get_mut(ticket.index)
                .and_then(Option::take);
            Poll::Ready(response.expect("Response claimed once"))
        })
        .await
    }

    /// Requests issued since the last processed round.
    fn drain(&self) -> Vec<T> {
        self.pending.take()
    }

    /// Publish responses to the drained requests, in request order.
    fn complete(&self, responses: impl IntoIterator<Item = S>) {
        // Responses of branches dropped after an error are discarded.
        self.responses
            .replace(responses.into_iter().map(Some).collect());
        self.completed_rounds.set(self.completed_rounds.get() + 1);
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{arr1, ArrayD};

    use super::*;
    use crate::{dealer::FakeDealer, local::LocalEngine, rings::Z64};

    #[tokio::test]
    async fn test_concurrent_requests_share_a_round() {
        let engine = LocalEngine::new(FakeDealer::<Z64>::new(1, 0, 0));
        let executor = MpcExecutor::new(&engine);
        let values = arr1(&[Z64(3), Z64(4)]).into_dyn();

        let (x, y) = executor
            .run_circuit(|| async {
                let (x, y) = futures::try_join!(
                    executor.input(0, Some(values.view()), &[2]),
                    executor.input(0, Some(values.view()), &[2])
                )?;
                let sum = x.add(&y)?;
                futures::try_join!(executor.open(&sum), executor.reveal_to(0, &x))
            })
            .await
            .unwrap();

        assert_eq!(x, arr1(&[Z64(6), Z64(8)]).into_dyn());
        assert_eq!(y, Some(values.clone()));
        assert_eq!(
            executor.stats(),
            MpcExecutionStats {
                rounds: 2,
                openings: 4,
                inputs: 4
            }
        );
        assert_eq!(engine.num_rounds(), 2);
    }

    #[tokio::test]
    async fn test_input_shape_is_checked() {
        let engine = LocalEngine::new(FakeDealer::<Z64>::new(1, 0, 0));
        let executor = MpcExecutor::new(&engine);
        let values = ArrayD::from_elem(IxDyn(&[3]), Z64(1));
        let result = executor
            .run_circuit(|| async { executor.input(0, Some(values.view()), &[2, 2]).await })
            .await;
        assert!(matches!(result, Err(MpcError::ShapeMismatch { .. })));
    }

    #[tokio::test]
    async fn test_stalled_circuit() {
        let engine = LocalEngine::new(FakeDealer::<Z64>::new(1, 0, 0));
        let executor = MpcExecutor::new(&engine);
        let result: Result<()> = executor
            .run_circuit(|| futures::future::pending())
            .await;
        assert!(matches!(result, Err(MpcError::Stalled)));
    }
}
