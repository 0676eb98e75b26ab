mod activation;
pub use activation::*;

mod arithmetic;
pub use arithmetic::*;

mod bitwise;
pub use bitwise::*;

mod compare;
pub use compare::*;

mod sequences;
pub use sequences::*;

use std::{future::Future, task::Poll};

use futures::future::maybe_done;

pub use futures; // Reexport futures crate for join_circuits! macro.

/// Wait on multiple concurrent branches, returning when **all** branches complete.
/// This macro guarantees deterministic polling order of provided futures,
/// which makes it safe to use with our async circuits.
#[macro_export]
macro_rules! join_circuits {
    ($($tokens:tt)*) => {{
        $crate::circuits::futures::join!($( $tokens )*)
    }}
}

/// Like `join_circuits!`, but returns early with the first error.
#[macro_export]
macro_rules! try_join_circuits {
    ($($tokens:tt)*) => {{
        $crate::circuits::futures::try_join!($( $tokens )*)
    }}
}

/// Wait on a sequence of concurrent branches.
/// Every pending branch is polled in order on every poll, so requests issued by
/// the branches land in the same round and in the same order on every party.
pub async fn join_circuits_all<I>(iter: I) -> Vec<<I::Item as Future>::Output>
where
    I: IntoIterator,
    I::Item: Future,
{
    let mut branches: Vec<_> = iter.into_iter().map(|f| Box::pin(maybe_done(f))).collect();

    futures::future::poll_fn(move |cx| {
        let mut all_done = true;
        for branch in branches.iter_mut() {
            if branch.as_mut().poll(cx).is_pending() {
                all_done = false;
            }
        }
        if all_done {
            Poll::Ready(
                branches
                    .iter_mut()
                    .map(|branch| branch.as_mut().take_output().expect("Branch completed"))
                    .collect(),
            )
        } else {
            Poll::Pending
        }
    })
    .await
}

/// Like `join_circuits_all`, but returns early with the first error.
pub async fn try_join_circuits_all<I, T, E>(iter: I) -> Result<Vec<T>, E>
where
    I: IntoIterator,
    I::Item: Future<Output = Result<T, E>>,
{
    let mut branches: Vec<_> = iter.into_iter().map(|f| Box::pin(maybe_done(f))).collect();

    futures::future::poll_fn(move |cx| {
        let mut all_done = true;
        for branch in branches.iter_mut() {
            if branch.as_mut().poll(cx).is_pending() {
                all_done = false;
            } else if let Some(Err(_)) = branch.as_mut().output_mut() {
                if let Some(Err(err)) = branch.as_mut().take_output() {
                    return Poll::Ready(Err(err));
                }
            }
        }
        if all_done {
            Poll::Ready(
                branches
                    .iter_mut()
                    .filter_map(|branch| branch.as_mut().take_output())
                    .collect(),
            )
        } else {
            Poll::Pending
        }
    })
    .await
}

#[cfg(test)]
pub mod testing {
    use std::{future::Future, pin::Pin};

    use crate::{
        dealer::FakeDealer,
        engine::{AdditiveEngine, RoundMessage},
        error::Result,
        executor::{MpcExecutionStats, MpcExecutor},
        local::LocalEngine,
        rings::{Ring, Z64},
        transport::{mock_multiparty_channels, BincodeDuplex},
    };

    pub type TestEngine = LocalEngine<FakeDealer<Z64>>;

    pub type PartyEngine<R> = AdditiveEngine<FakeDealer<R>, BincodeDuplex<RoundMessage<R>>>;

    /// Run circuit on a single-party engine and report its communication.
    pub async fn test_circuit<F>(circuit: F) -> MpcExecutionStats
    where
        F: for<'a> FnOnce(
            &'a MpcExecutor<'a, TestEngine>,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + 'a>>,
    {
        let engine = LocalEngine::new(FakeDealer::new(1, 0, 7));
        let executor = MpcExecutor::new(&engine);
        executor
            .run_circuit(|| circuit(&executor))
            .await
            .expect("Circuit failed");
        executor.stats()
    }

    /// Engines of `num_parties` parties connected with in-process channels.
    pub fn party_engines<R: Ring>(num_parties: usize) -> Vec<PartyEngine<R>> {
        mock_multiparty_channels(num_parties, 1 << 20)
            .into_iter()
            .enumerate()
            .map(|(id, transport)| {
                AdditiveEngine::new(FakeDealer::new(num_parties, id, 1234), transport)
            })
            .collect()
    }

    /// Run the same circuit on every party concurrently. Outputs are ordered by party ID.
    pub async fn run_parties<R, T, F>(num_parties: usize, circuit: F) -> Vec<Result<T>>
    where
        R: Ring,
        T: 'static,
        F: for<'a> Fn(
            &'a MpcExecutor<'a, PartyEngine<R>>,
        ) -> Pin<Box<dyn Future<Output = Result<T>> + 'a>>,
    {
        let engines = party_engines::<R>(num_parties);
        let circuit = &circuit;
        futures::future::join_all(engines.iter().map(|engine| async move {
            let executor = MpcExecutor::new(engine);
            executor.run_circuit(|| circuit(&executor)).await
        }))
        .await
    }
}
