use std::cell::Cell;

use async_trait::async_trait;

use crate::{
    error::{MpcError, Result},
    MpcContext, MpcDealer, MpcEngine, MpcRound, MpcRoundOutput,
};

/// Engine that computes the result in plain on a single node.
/// Shares are the values themselves, which makes it suitable for circuit unit tests.
pub struct LocalEngine<D> {
    dealer: D,
    num_openings: Cell<usize>,
    num_rounds: Cell<usize>,
}

impl<D: MpcDealer> LocalEngine<D> {
    /// Create a new instance. Dealer must serve a single party.
    pub fn new(dealer: D) -> Self {
        assert_eq!(dealer.num_parties(), 1, "Local engine runs a single party");
        Self {
            dealer,
            num_openings: Cell::new(0),
            num_rounds: Cell::new(0),
        }
    }

    /// Get total count of opened elements.
    pub fn num_openings(&self) -> usize {
        self.num_openings.get()
    }

    /// Get total number of rounds.
    pub fn num_rounds(&self) -> usize {
        self.num_rounds.get()
    }
}

impl<D: MpcDealer> MpcContext for LocalEngine<D> {
    type Ring = D::Ring;

    fn num_parties(&self) -> usize {
        1
    }

    fn party_id(&self) -> usize {
        0
    }
}

#[async_trait(?Send)]
impl<D: MpcDealer> MpcEngine for LocalEngine<D> {
    type Dealer = D;

    fn dealer(&self) -> &Self::Dealer {
        &self.dealer
    }

    async fn process_round(&self, round: MpcRound<D::Ring>) -> Result<MpcRoundOutput<D::Ring>> {
        self.num_rounds.set(self.num_rounds.get() + 1);
        let opened: usize = round.openings.iter().map(|r| r.shares.len()).sum();
        self.num_openings.set(self.num_openings.get() + opened);

        let inputs = round
            .inputs
            .into_iter()
            .map(|request| match request.values {
                Some(values) if request.owner == 0 => Ok(values),
                _ => Err(MpcError::InvalidConfig(format!(
                    "no values for input owned by party {}",
                    request.owner
                ))),
            })
            .collect::<Result<_>>()?;
        let openings = round
            .openings
            .into_iter()
            .map(|request| request.to.includes(0).then(|| request.shares))
            .collect();
        Ok(MpcRoundOutput { inputs, openings })
    }
}
