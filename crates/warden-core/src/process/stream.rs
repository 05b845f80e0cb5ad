//! Live output subscription

use futures::Stream;
use std::collections::VecDeque;
use std::sync::Arc;

use super::entry::ProcessEntry;
use super::registry::{EntryMap, reap};
use super::types::{OutputEvent, RunId};

/// A finite, append-only view of one run's output
///
/// Yields chunks in offset order, a `Gap` wherever eviction overtook the
/// subscriber, and a final `Exited`, after which it ends. It cannot be
/// restarted; reaching `Exited` counts as the run's drain flush.
pub struct OutputStream {
    entry: Arc<ProcessEntry>,
    entries: EntryMap,
    cursor: u64,
    pending: VecDeque<OutputEvent>,
    finished: bool,
}

impl OutputStream {
    pub(crate) fn new(entry: Arc<ProcessEntry>, entries: EntryMap) -> Self {
        Self {
            entry,
            entries,
            cursor: 0,
            pending: VecDeque::new(),
            finished: false,
        }
    }

    pub fn run_id(&self) -> RunId {
        self.entry.run_id
    }

    /// The next event, or `None` once `Exited` has been delivered
    pub async fn next(&mut self) -> Option<OutputEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            if self.finished {
                return None;
            }

            let notified = self.entry.notify.notified();
            {
                let mut state = self.entry.state.lock();
                let read = state.output.read_from(self.cursor);
                self.cursor = read.next_cursor;
                self.pending.extend(read.into_events());

                if self.pending.is_empty() && state.status.is_exited() {
                    state.drained = true;
                    self.pending
                        .push_back(OutputEvent::Exited(state.status.clone()));
                    self.finished = true;
                }
            }

            if self.finished {
                reap(&self.entries, &self.entry);
            } else if self.pending.is_empty() {
                notified.await;
            }
        }
    }

    /// Collect every remaining event
    pub async fn collect(mut self) -> Vec<OutputEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next().await {
            events.push(event);
        }
        events
    }

    /// Adapt into a `futures::Stream`
    pub fn into_stream(self) -> impl Stream<Item = OutputEvent> + Send {
        futures::stream::unfold(self, |mut stream| async move {
            stream.next().await.map(|event| (event, stream))
        })
    }
}
