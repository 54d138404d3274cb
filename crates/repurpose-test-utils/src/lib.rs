//! Scripted in-memory oracles for integration tests.
//!
//! Every mock records what it was asked so tests can assert on call
//! counts and arguments as well as on stage output.

pub mod llm;
pub mod literature;
pub mod molecules;

pub use llm::{RecordedCall, ScriptedLlm};
pub use literature::{paper, MockLiterature};
pub use molecules::{compound, MockCompounds, MockDocking, MockStructures};

pub use pretty_assertions::assert_eq;

use repurpose_common::{DockingResult, EventSink, StageEvent};
use tokio::sync::mpsc::UnboundedReceiver;

/// Collect every event a sink received so far.
pub fn drain<E>(rx: &mut UnboundedReceiver<E>) -> Vec<E> {
    let mut events = Vec::new();
    while let Ok(e) = rx.try_recv() {
        events.push(e);
    }
    events
}

/// A recording sink and its receiver.
pub fn recording_sink<E: StageEvent>() -> (EventSink<E>, UnboundedReceiver<E>) {
    EventSink::channel()
}

/// True if `results` are sorted best first.
pub fn is_ranked(results: &[DockingResult]) -> bool {
    results
        .windows(2)
        .all(|w| w[0].confidence_score >= w[1].confidence_score)
}
