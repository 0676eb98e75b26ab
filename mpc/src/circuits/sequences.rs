use std::future::Future;

use itertools::Itertools;

use super::try_join_circuits_all;

/// Reduce elements by combining adjacent pairs, level by level, in ceil(log_2(n)) levels.
/// Combines of one level run concurrently; an odd element moves up unchanged.
/// `combine_fn` gets the earlier element first. Empty input yields `default`.
pub async fn try_fold_tree<T, E, F, Fut>(
    iter: impl IntoIterator<Item = T>,
    default: T,
    combine_fn: F,
) -> Result<T, E>
where
    F: Copy + Fn(T, T) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut level: Vec<T> = iter.into_iter().collect();
    while level.len() > 1 {
        let odd = if level.len() % 2 == 1 { level.pop() } else { None };
        let mut next = try_join_circuits_all(
            level
                .into_iter()
                .tuples()
                .map(|(first, second)| combine_fn(first, second)),
        )
        .await?;
        next.extend(odd);
        level = next;
    }
    Ok(level.pop().unwrap_or(default))
}
