//! Typed progress events for the streamed stages.
//!
//! A stage receives an [`EventSink`] and emits non-terminal events as its
//! work completes. It never emits its own terminal event: [`settle`] and
//! [`spawn_stage`] turn the stage's `Result` into exactly one `complete`
//! or `error` event.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::entities::{CandidateDrug, DockingResult, DockingTarget};
use crate::error::Result;

// ── Sink ────────────────────────────────────────────────────────────────────

/// Where a stage sends its events. Cheap to clone.
pub struct EventSink<E> {
    emit: Arc<dyn Fn(E) + Send + Sync>,
}

impl<E> Clone for EventSink<E> {
    fn clone(&self) -> Self {
        Self { emit: Arc::clone(&self.emit) }
    }
}

impl<E: Send + 'static> EventSink<E> {
    pub fn new(f: impl Fn(E) + Send + Sync + 'static) -> Self {
        Self { emit: Arc::new(f) }
    }

    /// Sink backed by an unbounded channel, plus its receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<E>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::from_sender(tx), rx)
    }

    /// A closed receiver is ignored: a consumer that stops listening simply
    /// stops seeing events while the stage runs to completion.
    pub fn from_sender(tx: mpsc::UnboundedSender<E>) -> Self {
        Self::new(move |event| {
            let _ = tx.send(event);
        })
    }

    pub fn discard() -> Self {
        Self::new(|_| {})
    }

    pub fn emit(&self, event: E) {
        (self.emit)(event)
    }

    /// Wrap this sink so it accepts events of another type.
    pub fn map<F: Send + 'static>(&self, f: impl Fn(F) -> E + Send + Sync + 'static) -> EventSink<F> {
        let inner = self.clone();
        EventSink::new(move |event| inner.emit(f(event)))
    }
}

// ── Terminal handling ───────────────────────────────────────────────────────

pub trait StageEvent: Send + 'static {
    type Output: Clone + Send + 'static;

    fn complete(output: Self::Output) -> Self;
    fn error(message: String) -> Self;
    fn is_terminal(&self) -> bool;
}

/// Await a stage and emit its terminal event.
pub async fn settle<E, Fut>(sink: &EventSink<E>, stage: Fut) -> Result<E::Output>
where
    E: StageEvent,
    Fut: Future<Output = Result<E::Output>>,
{
    match stage.await {
        Ok(output) => {
            sink.emit(E::complete(output.clone()));
            Ok(output)
        }
        Err(e) => {
            sink.emit(E::error(e.to_string()));
            Err(e)
        }
    }
}

/// Run a stage on its own task and return the receiving end of its events.
///
/// The receiver always yields exactly one terminal event, even if the stage
/// task panics.
pub fn spawn_stage<E, F, Fut>(stage: F) -> mpsc::UnboundedReceiver<E>
where
    E: StageEvent,
    F: FnOnce(EventSink<E>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<E::Output>> + Send + 'static,
{
    let (sink, rx) = EventSink::channel();
    tokio::spawn(async move {
        let inner = sink.clone();
        let handle = tokio::spawn(async move {
            let fut = stage(inner.clone());
            let _ = settle(&inner, fut).await;
        });
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Stage task aborted");
            sink.emit(E::error(format!("stage aborted: {e}")));
        }
    });
    rx
}

// ── Discovery ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryOutput {
    pub protein_targets: Vec<String>,
    pub review_document: String,
    pub candidate_drugs: Vec<CandidateDrug>,
    pub paper_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum DiscoveryEvent {
    Progress { message: String },
    Proteins { proteins: Vec<String> },
    Review { review: String, paper_count: usize },
    Drugs { drugs: Vec<CandidateDrug> },
    Complete(DiscoveryOutput),
    Error { message: String },
}

impl StageEvent for DiscoveryEvent {
    type Output = DiscoveryOutput;

    fn complete(output: DiscoveryOutput) -> Self {
        Self::Complete(output)
    }

    fn error(message: String) -> Self {
        Self::Error { message }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete(_) | Self::Error { .. })
    }
}

// ── Structure acquisition ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructureOutput {
    pub docking_targets: Vec<DockingTarget>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum StructureEvent {
    Progress { message: String },
    /// One protein finished resolving. `completed` counts finished proteins.
    Target { target: DockingTarget, completed: usize, total: usize },
    Complete(StructureOutput),
    Error { message: String },
}

impl StageEvent for StructureEvent {
    type Output = StructureOutput;

    fn complete(output: StructureOutput) -> Self {
        Self::Complete(output)
    }

    fn error(message: String) -> Self {
        Self::Error { message }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete(_) | Self::Error { .. })
    }
}

// ── Docking ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DockingOutput {
    pub all_results: Vec<DockingResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum DockEvent {
    Progress {
        protein: String,
        drug_index: usize,
        drug_total: usize,
        message: String,
    },
    /// A target was not submitted at all.
    Skipped { protein: String, reason: String },
    /// One batch failed; siblings carry on.
    BatchError { protein: String, ligands: Vec<String>, message: String },
    TargetComplete { protein: String, results: Vec<DockingResult> },
    Complete(DockingOutput),
    Error { message: String },
}

impl StageEvent for DockEvent {
    type Output = DockingOutput;

    fn complete(output: DockingOutput) -> Self {
        Self::Complete(output)
    }

    fn error(message: String) -> Self {
        Self::Error { message }
    }

    fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete(_) | Self::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RepurposeError;

    async fn drain<E: StageEvent>(mut rx: mpsc::UnboundedReceiver<E>) -> Vec<E> {
        let mut out = Vec::new();
        while let Some(e) = rx.recv().await {
            out.push(e);
        }
        out
    }

    #[tokio::test]
    async fn test_spawn_stage_ends_with_complete() {
        let rx = spawn_stage(|sink: EventSink<DockEvent>| async move {
            sink.emit(DockEvent::Skipped { protein: "TP53".into(), reason: "no structure".into() });
            Ok(DockingOutput::default())
        });
        let events = drain(rx).await;
        assert_eq!(events.len(), 2);
        assert!(!events[0].is_terminal());
        assert!(matches!(events[1], DockEvent::Complete(_)));
    }

    #[tokio::test]
    async fn test_spawn_stage_error_has_no_complete() {
        let rx = spawn_stage(|_sink: EventSink<DockEvent>| async move {
            Err(RepurposeError::Stage("no docking targets provided".into()))
        });
        let events = drain(rx).await;
        assert_eq!(events.len(), 1);
        match &events[0] {
            DockEvent::Error { message } => assert!(message.contains("no docking targets")),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_spawn_stage_panic_still_terminates() {
        let rx = spawn_stage(|_sink: EventSink<StructureEvent>| async move {
            if true {
                panic!("boom");
            }
            Ok(StructureOutput::default())
        });
        let events = drain(rx).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], StructureEvent::Error { .. }));
    }

    #[test]
    fn test_event_wire_shape() {
        let event = DockEvent::Progress {
            protein: "EGFR".into(),
            drug_index: 2,
            drug_total: 5,
            message: "Docking erlotinib".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["drugIndex"], 2);

        let json = serde_json::to_value(DiscoveryEvent::complete(DiscoveryOutput {
            paper_count: 3,
            ..Default::default()
        }))
        .unwrap();
        assert_eq!(json["type"], "complete");
        assert_eq!(json["paperCount"], 3);
    }

    #[test]
    fn test_settle_emits_terminal_and_passes_result_through() {
        let (sink, mut rx) = EventSink::<DockEvent>::channel();
        let out = tokio_test::block_on(settle(&sink, async { Ok(DockingOutput::default()) }));
        assert!(out.is_ok());
        assert!(matches!(rx.try_recv().unwrap(), DockEvent::Complete(_)));

        let out = tokio_test::block_on(settle(&sink, async {
            Err::<DockingOutput, _>(RepurposeError::Stage("empty".into()))
        }));
        assert!(out.is_err());
        assert!(rx.try_recv().unwrap().is_terminal());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_map_sink() {
        let (sink, mut rx) = EventSink::<String>::channel();
        let mapped = sink.map(|n: usize| format!("#{n}"));
        mapped.emit(7);
        assert_eq!(rx.try_recv().unwrap(), "#7");
    }
}
