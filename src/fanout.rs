//! Bounded concurrent fan-out that reports results in input order.

use std::future::Future;

use futures::stream::{self, StreamExt};

/// Drives `futures` with at most `limit` in flight and returns their outputs
/// in input order.
///
/// A finished future frees its slot straight away, so one slow future never
/// holds back the start of later ones.
pub(crate) async fn in_input_order<I, F>(futures: I, limit: usize) -> Vec<F::Output>
where
    I: IntoIterator<Item = F>,
    F: Future,
{
    let mut indexed: Vec<(usize, F::Output)> = stream::iter(
        futures
            .into_iter()
            .enumerate()
            .map(|(index, future)| async move { (index, future.await) }),
    )
    .buffer_unordered(limit.max(1))
    .collect()
    .await;
    indexed.sort_unstable_by_key(|(index, _)| *index);
    indexed.into_iter().map(|(_, output)| output).collect()
}
