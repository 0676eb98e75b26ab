use async_trait::async_trait;

pub mod circuits;
pub mod config;
pub mod dealer;
pub mod engine;
pub mod error;
pub mod executor;
pub mod fixed_point;
pub mod local;
pub mod rings;
pub mod share;
pub mod tensor;
pub mod transport;

pub use error::{MpcError, Result};
pub use rings::{Ring, Z128, Z64};

use dealer::{BeaverTriple, ComparisonMask, MatrixTriple, TruncationPair};

/// Sharing-based MPC computation context.
pub trait MpcContext {
    /// Ring used by this MPC protocol.
    type Ring: Ring;

    /// Number of parties participating in MPC computation.
    fn num_parties(&self) -> usize;

    /// ID of current party.
    fn party_id(&self) -> usize;
}

/// Dealer of precomputed correlated randomness. Every returned unit is single-use.
pub trait MpcDealer: MpcContext {
    /// Random sharings of triples (a, b, c) that satisfy ab = c.
    fn next_beaver_triples(&self, count: usize) -> Result<Vec<BeaverTriple<Self::Ring>>>;

    /// Random sharing of matrices (A, B, C) with C = A·B, A is m×k and B is k×n.
    fn next_matrix_triple(&self, dims: [usize; 3]) -> Result<MatrixTriple<Self::Ring>>;

    /// Random masks for truncation by `precision` bits.
    fn next_truncation_pairs(
        &self,
        count: usize,
        precision: u32,
    ) -> Result<Vec<TruncationPair<Self::Ring>>>;

    /// Random bit-decomposed masks for sign extraction.
    fn next_comparison_masks(&self, count: usize) -> Result<Vec<ComparisonMask<Self::Ring>>>;
}

/// Request to secret-share values held by `owner`.
/// Only the owner provides `values`; everyone agrees on `len`.
#[derive(Clone, Debug)]
pub struct InputRequest<R> {
    pub owner: usize,
    pub values: Option<Vec<R>>,
    pub len: usize,
}

/// Parties that learn an opened value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Recipient {
    All,
    Party(usize),
}

impl Recipient {
    pub fn includes(self, party_id: usize) -> bool {
        match self {
            Recipient::All => true,
            Recipient::Party(id) => id == party_id,
        }
    }
}

/// Request to reconstruct shared values at given recipients.
#[derive(Clone, Debug)]
pub struct OpenRequest<R> {
    pub to: Recipient,
    pub shares: Vec<R>,
}

/// All communication issued by a circuit during one round.
#[derive(Clone, Debug)]
pub struct MpcRound<R> {
    pub inputs: Vec<InputRequest<R>>,
    pub openings: Vec<OpenRequest<R>>,
}

impl<R> MpcRound<R> {
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty() && self.openings.is_empty()
    }
}

/// Responses to one round, in request order.
/// Openings addressed to other parties resolve to None.
#[derive(Clone, Debug)]
pub struct MpcRoundOutput<R> {
    pub inputs: Vec<Vec<R>>,
    pub openings: Vec<Option<Vec<R>>>,
}

/// Low-level interface of sharing-based MPC protocol.
#[async_trait(?Send)]
pub trait MpcEngine: MpcContext {
    type Dealer: MpcDealer<Ring = Self::Ring>;

    /// Get dealer associated with this computation.
    fn dealer(&self) -> &Self::Dealer;

    /// Process all requests of a round with a single exchange of messages.
    async fn process_round(&self, round: MpcRound<Self::Ring>) -> Result<MpcRoundOutput<Self::Ring>>;
}
