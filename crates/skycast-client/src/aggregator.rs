//! Accumulates streamed fragments into one growing document.
//!
//! The aggregator is owned by the UI loop. Each session's read loop runs as a
//! spawned task and posts updates back over a channel; the UI loop applies them
//! through [`DocumentAggregator::next_update`], so `document` and `busy` are
//! only ever mutated from one place.

use std::sync::Arc;

use futures::StreamExt as _;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::source::FragmentSource;

pub const COMPLETED_MARKER: &str = "\n";
pub const STOPPED_MARKER: &str = "\n[stopped]\n";

/// What the UI renders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentState {
    pub document: String,
    pub busy: bool,
}

#[derive(Debug)]
enum Update {
    Fragment(String),
    Completed,
    Failed(String),
}

struct ActiveSession {
    id: u64,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct DocumentAggregator {
    source: Arc<dyn FragmentSource>,
    state: watch::Sender<DocumentState>,
    updates_tx: mpsc::UnboundedSender<(u64, Update)>,
    updates_rx: mpsc::UnboundedReceiver<(u64, Update)>,
    active: Option<ActiveSession>,
    next_id: u64,
}

impl DocumentAggregator {
    pub fn new(source: Arc<dyn FragmentSource>) -> Self {
        let (state, _) = watch::channel(DocumentState::default());
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        Self {
            source,
            state,
            updates_tx,
            updates_rx,
            active: None,
            next_id: 0,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<DocumentState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> DocumentState {
        self.state.borrow().clone()
    }

    pub fn document(&self) -> String {
        self.state.borrow().document.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.state.borrow().busy
    }

    /// Starts a session for `query` unless it is blank or one is in flight.
    ///
    /// Returns whether a session was started.
    pub async fn submit(&mut self, query: &str) -> bool {
        if query.trim().is_empty() || self.is_busy() {
            return false;
        }
        self.teardown().await;
        self.start(query);
        true
    }

    /// Like [`submit`](Self::submit), but stops an in-flight session first.
    ///
    /// The old session is cancelled and its read loop awaited before the new
    /// turn marker is written, so the two never interleave.
    pub async fn interrupt(&mut self, query: &str) -> bool {
        if query.trim().is_empty() {
            return false;
        }
        self.teardown().await;
        self.start(query);
        true
    }

    /// Stops the in-flight session, if any. Returns whether one was stopped.
    pub async fn cancel(&mut self) -> bool {
        self.teardown().await
    }

    /// Waits for the next update of the active session and applies it.
    ///
    /// Returns `false` right away when nothing is in flight. Safe to use as a
    /// `select!` branch.
    pub async fn next_update(&mut self) -> bool {
        loop {
            let Some(active_id) = self.active.as_ref().map(|a| a.id) else {
                return false;
            };
            if !self.is_busy() {
                return false;
            }
            let Some((id, update)) = self.updates_rx.recv().await else {
                return false;
            };
            if id != active_id {
                debug!(session = id, "dropping update from a stale session");
                continue;
            }
            self.apply(update);
            return true;
        }
    }

    /// Applies updates until the active session ends.
    pub async fn run_to_idle(&mut self) {
        while self.next_update().await {}
    }

    fn start(&mut self, query: &str) {
        self.next_id += 1;
        let id = self.next_id;
        let cancel = CancellationToken::new();
        self.state.send_modify(|state| {
            if !state.document.is_empty() {
                if !state.document.ends_with('\n') {
                    state.document.push('\n');
                }
                state.document.push('\n');
            }
            state.document.push_str(&turn_marker(query));
            state.busy = true;
        });
        let task = tokio::spawn(read_session(
            Arc::clone(&self.source),
            query.to_string(),
            id,
            cancel.clone(),
            self.updates_tx.clone(),
        ));
        debug!(session = id, "session started");
        self.active = Some(ActiveSession { id, cancel, task });
    }

    /// Cancels and awaits the active read loop, then applies whatever it had
    /// already posted. Returns whether the session was still running.
    async fn teardown(&mut self) -> bool {
        let Some(active) = self.active.take() else {
            return false;
        };
        active.cancel.cancel();
        if let Err(e) = active.task.await {
            warn!(session = active.id, error = %e, "read loop ended abnormally");
        }
        while let Ok((id, update)) = self.updates_rx.try_recv() {
            if id == active.id {
                self.apply(update);
            }
        }
        if !self.is_busy() {
            return false;
        }
        debug!(session = active.id, "session stopped");
        self.state.send_modify(|state| {
            state.document.push_str(STOPPED_MARKER);
            state.busy = false;
        });
        true
    }

    fn apply(&mut self, update: Update) {
        self.state.send_modify(|state| match update {
            Update::Fragment(text) => state.document.push_str(&text),
            Update::Completed => {
                state.document.push_str(COMPLETED_MARKER);
                state.busy = false;
            }
            Update::Failed(message) => {
                state.document.push_str(&error_marker(&message));
                state.busy = false;
            }
        });
    }
}

impl Drop for DocumentAggregator {
    fn drop(&mut self) {
        if let Some(active) = &self.active {
            active.cancel.cancel();
        }
    }
}

pub fn turn_marker(query: &str) -> String {
    format!("> {query}\n\n")
}

pub fn error_marker(message: &str) -> String {
    format!("\n[error: {message}]\n")
}

async fn read_session(
    source: Arc<dyn FragmentSource>,
    query: String,
    id: u64,
    cancel: CancellationToken,
    updates: mpsc::UnboundedSender<(u64, Update)>,
) {
    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        opened = source.open(&query) => opened,
    };
    let mut fragments = match opened {
        Ok(fragments) => fragments,
        Err(e) => {
            warn!(session = id, error = %e, "stream request failed");
            let _ = updates.send((id, Update::Failed(e.to_string())));
            return;
        }
    };
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            next = fragments.next() => next,
        };
        let update = match next {
            Some(Ok(text)) => Update::Fragment(text),
            Some(Err(e)) => {
                warn!(session = id, error = %e, "stream broke off");
                let _ = updates.send((id, Update::Failed(e.to_string())));
                return;
            }
            None => {
                let _ = updates.send((id, Update::Completed));
                return;
            }
        };
        if updates.send((id, update)).is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{DecodeError, FragmentStream, ProblemBody};
    use futures::{StreamExt as _, stream};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone)]
    enum Step {
        Text(&'static str),
        Fail(&'static str),
        Reject(u16),
        Hang,
    }

    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct ScriptedSource {
        scripts: HashMap<&'static str, Vec<Step>>,
        dropped: Arc<AtomicUsize>,
    }

    impl ScriptedSource {
        fn script(mut self, query: &'static str, steps: Vec<Step>) -> Self {
            self.scripts.insert(query, steps);
            self
        }
    }

    #[async_trait::async_trait]
    impl FragmentSource for ScriptedSource {
        async fn open(&self, query: &str) -> Result<FragmentStream, DecodeError> {
            let steps = self.scripts.get(query).cloned().unwrap_or_default();
            let mut items = Vec::new();
            let mut hang = false;
            for step in steps {
                match step {
                    Step::Text(text) => items.push(Ok(text.to_string())),
                    Step::Fail(message) => items.push(Err(DecodeError::Transport(message.into()))),
                    Step::Reject(status) => {
                        return Err(DecodeError::Status {
                            status,
                            problem: Some(ProblemBody {
                                title: "Bad Request".into(),
                                detail: "query is too long".into(),
                                status,
                            }),
                        });
                    }
                    Step::Hang => hang = true,
                }
            }
            let tail = if hang {
                stream::pending().boxed()
            } else {
                stream::empty().boxed()
            };
            let guard = DropCounter(Arc::clone(&self.dropped));
            Ok(Box::pin(stream::iter(items).chain(tail).map(move |item| {
                let _open = &guard;
                item
            })))
        }
    }

    fn aggregator(source: ScriptedSource) -> DocumentAggregator {
        DocumentAggregator::new(Arc::new(source))
    }

    #[tokio::test]
    async fn blank_query_is_ignored() {
        let mut agg = aggregator(ScriptedSource::default());
        assert!(!agg.submit("   ").await);
        assert!(!agg.interrupt("").await);
        assert_eq!(agg.snapshot(), DocumentState::default());
    }

    #[tokio::test]
    async fn fragments_accumulate_between_markers() {
        let source = ScriptedSource::default().script(
            "Weather in Paris?",
            vec![Step::Text("It is "), Step::Text("12°C "), Step::Text("and rainy 🌧.")],
        );
        let mut agg = aggregator(source);
        assert!(agg.submit("Weather in Paris?").await);
        assert!(agg.is_busy());
        assert_eq!(agg.document(), "> Weather in Paris?\n\n");

        agg.run_to_idle().await;
        let state = agg.snapshot();
        assert!(!state.busy);
        assert_eq!(
            state.document,
            "> Weather in Paris?\n\nIt is 12°C and rainy 🌧.\n"
        );
    }

    #[tokio::test]
    async fn later_turns_are_separated_by_a_blank_line() {
        let source = ScriptedSource::default()
            .script("one", vec![Step::Text("first")])
            .script("two", vec![Step::Text("second")]);
        let mut agg = aggregator(source);
        agg.submit("one").await;
        agg.run_to_idle().await;
        agg.submit("two").await;
        agg.run_to_idle().await;
        assert_eq!(agg.document(), "> one\n\nfirst\n\n> two\n\nsecond\n");
    }

    #[tokio::test]
    async fn submit_while_busy_is_a_no_op() {
        let source = ScriptedSource::default()
            .script("slow", vec![Step::Text("thinking"), Step::Hang])
            .script("other", vec![Step::Text("never")]);
        let mut agg = aggregator(source);
        agg.submit("slow").await;
        assert!(agg.next_update().await);

        assert!(!agg.submit("other").await);
        assert_eq!(agg.document(), "> slow\n\nthinking");
        assert!(agg.is_busy());
    }

    #[tokio::test]
    async fn interrupt_stops_the_first_session_before_the_second_begins() {
        let source = ScriptedSource::default()
            .script("first", vec![Step::Text("a"), Step::Text("b"), Step::Hang])
            .script("second", vec![Step::Text("done")]);
        let dropped = Arc::clone(&source.dropped);
        let mut agg = aggregator(source);

        agg.interrupt("first").await;
        assert!(agg.next_update().await);
        assert!(agg.next_update().await);
        assert_eq!(agg.document(), "> first\n\nab");

        assert!(agg.interrupt("second").await);
        assert_eq!(dropped.load(Ordering::SeqCst), 1);
        assert_eq!(agg.document(), "> first\n\nab\n[stopped]\n\n> second\n\n");

        agg.run_to_idle().await;
        assert_eq!(
            agg.document(),
            "> first\n\nab\n[stopped]\n\n> second\n\ndone\n"
        );
    }

    #[tokio::test]
    async fn transport_failure_appends_an_error_note() {
        let source = ScriptedSource::default().script(
            "q",
            vec![Step::Text("par"), Step::Fail("connection reset")],
        );
        let mut agg = aggregator(source);
        agg.submit("q").await;
        agg.run_to_idle().await;
        assert_eq!(
            agg.snapshot(),
            DocumentState {
                document: "> q\n\npar\n[error: connection failed: connection reset]\n".into(),
                busy: false,
            }
        );
    }

    #[tokio::test]
    async fn rejected_request_appends_the_problem_detail() {
        let source = ScriptedSource::default().script("too long", vec![Step::Reject(400)]);
        let mut agg = aggregator(source);
        agg.submit("too long").await;
        agg.run_to_idle().await;
        assert_eq!(
            agg.document(),
            "> too long\n\n\n[error: Bad Request (400): query is too long]\n"
        );
        assert!(!agg.is_busy());
    }

    #[tokio::test]
    async fn cancel_marks_the_turn_stopped() {
        let source = ScriptedSource::default().script("q", vec![Step::Text("x"), Step::Hang]);
        let mut agg = aggregator(source);
        assert!(!agg.cancel().await);

        agg.submit("q").await;
        agg.next_update().await;
        assert!(agg.cancel().await);
        assert_eq!(agg.document(), "> q\n\nx\n[stopped]\n");
        assert!(!agg.is_busy());
        assert!(!agg.next_update().await);
    }

    #[tokio::test]
    async fn cancel_after_completion_leaves_the_document_alone() {
        let source = ScriptedSource::default().script("q", vec![Step::Text("ok")]);
        let mut agg = aggregator(source);
        agg.submit("q").await;
        agg.run_to_idle().await;
        assert!(!agg.cancel().await);
        assert_eq!(agg.document(), "> q\n\nok\n");
    }

    #[tokio::test]
    async fn subscribers_see_busy_transitions() {
        let source = ScriptedSource::default().script("q", vec![Step::Text("hi")]);
        let mut agg = aggregator(source);
        let mut rx = agg.subscribe();
        assert!(!rx.borrow_and_update().busy);

        agg.submit("q").await;
        assert!(rx.has_changed().expect("sender alive"));
        assert!(rx.borrow_and_update().busy);

        agg.run_to_idle().await;
        let state = rx.borrow_and_update().clone();
        assert!(!state.busy);
        assert_eq!(state.document, "> q\n\nhi\n");
    }
}
