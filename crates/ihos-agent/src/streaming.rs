//! Incremental delivery of a model answer.
//!
//! Models stream cumulative content: each emission repeats everything
//! sent so far. [`StreamReconciler`] turns that into true deltas, and
//! [`split_units`] cuts a delta into single characters for rendering.

use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::llm::EmissionStream;

/// Converts cumulative emissions into deltas.
#[derive(Debug, Default, Clone)]
pub struct StreamReconciler {
    last_full: String,
}

impl StreamReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything emitted so far.
    pub fn full(&self) -> &str {
        &self.last_full
    }

    /// Delta introduced by `full`.
    ///
    /// When `full` does not extend the previous emission the whole of it is
    /// returned. A model that mixes cumulative and fragment emissions can
    /// therefore produce repeated text.
    pub fn push(&mut self, full: &str) -> String {
        let delta = match full.strip_prefix(self.last_full.as_str()) {
            Some(rest) => rest.to_string(),
            None => {
                debug!(
                    previous = self.last_full.len(),
                    current = full.len(),
                    "emission is not cumulative; passing it through whole"
                );
                full.to_string()
            }
        };
        self.last_full = full.to_string();
        delta
    }
}

/// Split text into the units sent to clients (one per character).
pub fn split_units(text: &str) -> impl Iterator<Item = String> + '_ {
    text.chars().map(String::from)
}

/// Forward every unit of `text` to `tx`. Returns false once the receiver
/// has gone away.
pub async fn send_units(tx: &mpsc::Sender<String>, text: &str) -> bool {
    for unit in split_units(text) {
        if tx.send(unit).await.is_err() {
            return false;
        }
    }
    true
}

/// How a reconciled stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    /// All emissions were delivered.
    Completed(String),
    /// The stream failed before emitting anything.
    FailedEarly(String),
    /// The stream failed after some text was sent.
    Interrupted(String),
    /// The receiver was dropped.
    Cancelled,
}

/// Reconcile `emissions` and forward the deltas unit by unit.
///
/// Stops as soon as the receiver is dropped; nothing is rolled back since
/// no delta is sent twice.
pub async fn forward_emissions(mut emissions: EmissionStream, tx: &mpsc::Sender<String>) -> StreamEnd {
    let mut reconciler = StreamReconciler::new();
    let mut emitted = false;

    while let Some(item) = emissions.next().await {
        let full = match item {
            Ok(full) => full,
            Err(e) if !emitted => return StreamEnd::FailedEarly(e.to_string()),
            Err(e) => {
                warn!(error = %e, "stream interrupted");
                return StreamEnd::Interrupted(reconciler.full().to_string());
            }
        };
        emitted = true;
        let delta = reconciler.push(&full);
        if !send_units(tx, &delta).await {
            debug!("stream receiver dropped");
            return StreamEnd::Cancelled;
        }
    }

    if emitted {
        StreamEnd::Completed(reconciler.full().to_string())
    } else {
        StreamEnd::FailedEarly("stream ended without content".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use futures::stream;

    fn emissions(items: Vec<Result<&str, &str>>) -> EmissionStream {
        let items: Vec<Result<String, LlmError>> = items
            .into_iter()
            .map(|r| {
                r.map(str::to_string)
                    .map_err(|e| LlmError::Stream(e.to_string()))
            })
            .collect();
        stream::iter(items).boxed()
    }

    fn collect(rx: &mut mpsc::Receiver<String>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(unit) = rx.try_recv() {
            out.push(unit);
        }
        out
    }

    #[test]
    fn test_cumulative_deltas_reconstruct_exactly() {
        let mut r = StreamReconciler::new();
        let deltas: Vec<String> = ["Xin", "Xin chào", "Xin chào bạn"]
            .iter()
            .map(|f| r.push(f))
            .collect();
        assert_eq!(deltas, vec!["Xin", " chào", " bạn"]);
        assert_eq!(deltas.concat(), "Xin chào bạn");
    }

    #[test]
    fn test_repeated_emission_yields_empty_delta() {
        let mut r = StreamReconciler::new();
        r.push("abc");
        assert_eq!(r.push("abc"), "");
    }

    #[test]
    fn test_non_cumulative_emission_passes_through() {
        let mut r = StreamReconciler::new();
        assert_eq!(r.push("hello"), "hello");
        assert_eq!(r.push("world"), "world");
        assert_eq!(r.full(), "world");
        assert_eq!(r.push("world!"), "!");
    }

    #[test]
    fn test_units_are_characters() {
        let units: Vec<String> = split_units("đặt").collect();
        assert_eq!(units, vec!["đ", "ặ", "t"]);
    }

    #[tokio::test]
    async fn test_forward_completed() {
        let (tx, mut rx) = mpsc::channel(64);
        let end = forward_emissions(emissions(vec![Ok("ab"), Ok("abc")]), &tx).await;
        assert_eq!(end, StreamEnd::Completed("abc".into()));
        assert_eq!(collect(&mut rx), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_forward_failed_early() {
        let (tx, mut rx) = mpsc::channel(8);
        let end = forward_emissions(emissions(vec![Err("boom")]), &tx).await;
        assert!(matches!(end, StreamEnd::FailedEarly(_)));
        assert!(collect(&mut rx).is_empty());

        let end = forward_emissions(emissions(vec![]), &tx).await;
        assert!(matches!(end, StreamEnd::FailedEarly(_)));
    }

    #[tokio::test]
    async fn test_forward_interrupted_keeps_sent_text() {
        let (tx, mut rx) = mpsc::channel(8);
        let end = forward_emissions(emissions(vec![Ok("ab"), Err("reset")]), &tx).await;
        assert_eq!(end, StreamEnd::Interrupted("ab".into()));
        assert_eq!(collect(&mut rx), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_forward_stops_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let end = forward_emissions(emissions(vec![Ok("abc")]), &tx).await;
        assert_eq!(end, StreamEnd::Cancelled);
    }
}
