//! Per-turn state and cancellation.

use tokio::sync::watch;

/// The states one turn moves through.
///
/// Drafting → Dispatching → Awaiting → Drafting … → Final | Aborted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    /// The model is generating
    Drafting,
    /// Tool calls extracted, dispatch starting
    Dispatching,
    /// Tool results / approval decisions outstanding
    Awaiting,
    /// The model produced a plain answer (or the round budget forced one)
    Final,
    /// Model failure or external cancellation
    Aborted,
}

impl TurnState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnState::Drafting => "drafting",
            TurnState::Dispatching => "dispatching",
            TurnState::Awaiting => "awaiting",
            TurnState::Final => "final",
            TurnState::Aborted => "aborted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TurnState::Final | TurnState::Aborted)
    }
}

/// What a completed turn reports back to its originator.
#[derive(Debug, Clone)]
pub struct TurnReport {
    /// The final assistant text (a diagnostic message for aborted turns —
    /// an abort is never a silent drop)
    pub text: String,

    pub state: TurnState,

    /// Drafting rounds consumed
    pub rounds: u32,

    /// Tool calls dispatched across the whole turn
    pub tool_calls: usize,
}

/// Create a linked cancellation pair. The source side cancels; the token
/// side is carried into the turn.
pub fn cancel_pair() -> (CancelSource, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelSource { tx }, CancelToken { rx })
}

pub struct CancelSource {
    tx: watch::Sender<bool>,
}

impl CancelSource {
    /// Cancel the associated turn. In-flight tool results are discarded
    /// and pending approvals are released as cancelled.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation is requested.
    pub async fn cancelled(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                // Source dropped without cancelling; never resolves.
                std::future::pending::<()>().await;
            }
        }
    }
}
