//! Result collection

use futures::Stream;

use crate::job::JobResult;
use crate::queue::QueueReceiver;

/// Consumer side of the result queue, in completion order.
///
/// Obtained once per engine from [`Engine::collect`](super::Engine::collect).
/// The stream ends after shutdown closes the result queue and everything
/// already emitted has been consumed; until then [`next`](Self::next)
/// waits for the next completion.
pub struct ResultStream<R> {
    results: QueueReceiver<JobResult<R>>,
}

impl<R> ResultStream<R> {
    pub(crate) fn new(results: QueueReceiver<JobResult<R>>) -> Self {
        Self { results }
    }

    /// Returns the next result, or `None` once the engine has shut down
    /// and every buffered result was consumed.
    pub async fn next(&mut self) -> Option<JobResult<R>> {
        self.results.pop().await
    }

    /// Returns a result without waiting, if one is already buffered.
    pub fn try_next(&mut self) -> Option<JobResult<R>> {
        self.results.try_pop()
    }

    /// Number of results buffered and not yet consumed
    pub fn buffered(&self) -> usize {
        self.results.len()
    }

    /// Drains the stream to its end and returns everything in
    /// completion order.
    pub async fn collect_all(mut self) -> Vec<JobResult<R>> {
        let mut results = Vec::new();
        while let Some(result) = self.next().await {
            results.push(result);
        }
        results
    }

    /// Adapts the stream into a [`futures::Stream`] for use with
    /// combinator pipelines.
    pub fn into_stream(self) -> impl Stream<Item = JobResult<R>> {
        futures::stream::unfold(self.results, |results| async move {
            results.pop().await.map(|result| (result, results))
        })
    }
}

impl<R> std::fmt::Debug for ResultStream<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultStream")
            .field("buffered", &self.results.len())
            .finish()
    }
}
