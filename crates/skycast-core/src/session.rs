use tokio_util::sync::CancellationToken;

use crate::content::Query;

/// How a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerminalState {
    /// The backend finished and every unit was emitted.
    Completed,
    /// Generation failed before the first unit; the apology was emitted instead.
    Apologized,
    /// The backend failed after units were emitted; the stream ended early.
    Truncated,
    /// The caller cancelled.
    Cancelled,
}

/// Per-query bookkeeping, owned by the character stream for its lifetime.
#[derive(Debug)]
pub struct StreamSession {
    id: uuid::Uuid,
    query: Query,
    cancel: CancellationToken,
    emitted: u64,
    terminal: Option<TerminalState>,
}

impl StreamSession {
    pub(crate) fn new(query: Query, cancel: CancellationToken) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            query,
            cancel,
            emitted: 0,
            terminal: None,
        }
    }

    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Number of units handed to the caller so far.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    pub fn terminal(&self) -> Option<TerminalState> {
        self.terminal
    }

    pub(crate) fn record_emitted(&mut self) {
        self.emitted = self.emitted.saturating_add(1);
    }

    /// Records the terminal state; the first one wins.
    pub(crate) fn finish(&mut self, state: TerminalState) -> bool {
        if self.terminal.is_some() {
            return false;
        }
        self.terminal = Some(state);
        true
    }
}
