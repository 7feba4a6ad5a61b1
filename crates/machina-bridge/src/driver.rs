//! [`ActionExecutedNode`] – state cache and refresh driver.
//!
//! The host re-invokes the node whenever its input changes or a scheduled
//! refresh fires.  Every invocation with input first writes the cached
//! snapshot to all outputs, so the graph never sees empty slots.  What
//! happens next depends on the driver state:
//!
//! | State | On invocation |
//! |---|---|
//! | [`DriverState::PrimedForOutput`] | Emit only, then move to `SteadyState`. |
//! | [`DriverState::SteadyState`] | Emit, then classify the input.  A new event replaces the cache, arms one refresh and moves back to `PrimedForOutput`. |
//!
//! The refresh carries the same raw message as the call that armed it.
//! Routing it through `PrimedForOutput` is what stops it from being
//! classified a second time.
//!
//! # Example
//!
//! ```
//! use machina_bridge::driver::{ActionExecutedNode, SolveOutcome};
//! use machina_bridge::host::{OutputSlots, RecordingScheduler};
//!
//! let mut node = ActionExecutedNode::default();
//! let mut slots = OutputSlots::new();
//! let scheduler = RecordingScheduler::new();
//! let msg = r#"{"event":"action-executed","id":1,"last":"Speed(100);"}"#;
//!
//! // A fresh node only emits on its first pass.
//! assert_eq!(node.solve(Some(msg), &mut slots, &scheduler).unwrap(), SolveOutcome::Primed);
//! assert_eq!(node.solve(Some(msg), &mut slots, &scheduler).unwrap(), SolveOutcome::NewEvent { id: 1 });
//! assert_eq!(scheduler.len(), 1);
//!
//! // The scheduled refresh publishes the new snapshot.
//! assert_eq!(node.solve(Some(msg), &mut slots, &scheduler).unwrap(), SolveOutcome::Primed);
//! assert_eq!(slots.latest().unwrap().last_instruction, "Speed(100);");
//! ```

use std::time::Duration;

use machina_types::{ACTION_EXECUTED, BridgeError, ExecutionEvent, NodeOutputs};
use tracing::{info, warn};

use crate::classifier::{Classification, EventClassifier};
use crate::host::{NodeId, OutputSink, RefreshScheduler, RefreshToken};

/// Delay before the follow-up refresh, unless configured otherwise.
pub const DEFAULT_REFRESH_DELAY: Duration = Duration::from_millis(5);

// ────────────────────────────────────────────────────────────────────────────
// Public types
// ────────────────────────────────────────────────────────────────────────────

/// Tunables for a single node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    /// How long the host should wait before the follow-up refresh.
    pub refresh_delay: Duration,
    /// Event tag this node reacts to.
    pub event_tag: String,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            refresh_delay: DEFAULT_REFRESH_DELAY,
            event_tag: ACTION_EXECUTED.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// Next invocation only emits the cached snapshot.
    PrimedForOutput,
    /// Next invocation emits and then looks for a new event.
    SteadyState,
}

/// What a single [`ActionExecutedNode::solve`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveOutcome {
    /// No input was provided; outputs were left untouched.
    NoInput,
    /// Emit-only pass out of [`DriverState::PrimedForOutput`].
    Primed,
    /// The message repeated the last seen id.
    Unchanged,
    /// The message belongs to another event channel.
    Ignored,
    /// A new event was cached and a refresh armed.
    NewEvent { id: i64 },
}

// ────────────────────────────────────────────────────────────────────────────
// ActionExecutedNode
// ────────────────────────────────────────────────────────────────────────────

/// Host-invoked node that tracks the robot's last executed action.
#[derive(Debug)]
pub struct ActionExecutedNode {
    id: NodeId,
    state: DriverState,
    /// Doubles as the last-seen id via `snapshot.event_id`.
    snapshot: ExecutionEvent,
    classifier: EventClassifier,
    refresh_delay: Duration,
    refresh_seq: u64,
    pending_refresh: Option<RefreshToken>,
}

impl Default for ActionExecutedNode {
    fn default() -> Self {
        Self::new(DriverConfig::default())
    }
}

impl ActionExecutedNode {
    /// Create a node in [`DriverState::PrimedForOutput`] holding the empty
    /// snapshot.
    pub fn new(config: DriverConfig) -> Self {
        Self::with_classifier(EventClassifier::new(config.event_tag), config.refresh_delay)
    }

    pub fn with_classifier(classifier: EventClassifier, refresh_delay: Duration) -> Self {
        Self {
            id: NodeId::new(),
            state: DriverState::PrimedForOutput,
            snapshot: ExecutionEvent::default(),
            classifier,
            refresh_delay,
            refresh_seq: 0,
            pending_refresh: None,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// The cached snapshot currently served on the outputs.
    pub fn snapshot(&self) -> &ExecutionEvent {
        &self.snapshot
    }

    pub fn last_seen_id(&self) -> i64 {
        self.snapshot.event_id
    }

    pub fn refresh_delay(&self) -> Duration {
        self.refresh_delay
    }

    /// The refresh armed by the last new event, until its emit-only pass runs.
    pub fn pending_refresh(&self) -> Option<RefreshToken> {
        self.pending_refresh
    }

    /// Whether the host should expire this node's outputs before the next
    /// invocation.  Only true while a freshly cached snapshot is waiting to
    /// be published.
    pub fn expires_downstream(&self) -> bool {
        self.state == DriverState::PrimedForOutput
    }

    /// Run one invocation.
    ///
    /// With `input == None` nothing happens and no output is touched.
    /// Otherwise the cached snapshot is written to `sink` first, so a decode
    /// error still leaves the previous values visible.
    ///
    /// # Errors
    ///
    /// Decode failures from the classifier.  The cache, the last-seen id and
    /// the driver state are left unchanged and no refresh is scheduled.
    pub fn solve(
        &mut self,
        input: Option<&str>,
        sink: &mut dyn OutputSink,
        scheduler: &dyn RefreshScheduler,
    ) -> Result<SolveOutcome, BridgeError> {
        let Some(raw) = input else {
            return Ok(SolveOutcome::NoInput);
        };

        sink.write(&NodeOutputs::from(&self.snapshot));

        if self.state == DriverState::PrimedForOutput {
            self.state = DriverState::SteadyState;
            self.pending_refresh = None;
            return Ok(SolveOutcome::Primed);
        }

        let classification = self
            .classifier
            .classify(raw, self.last_seen_id())
            .inspect_err(|e| warn!(node = %self.id, error = %e, "rejected bridge message"))?;

        match classification {
            Classification::Duplicate { .. } => Ok(SolveOutcome::Unchanged),
            Classification::Ignored { .. } => Ok(SolveOutcome::Ignored),
            Classification::New(event) => {
                let id = event.event_id;
                self.snapshot = event;
                self.refresh_seq += 1;
                let token = RefreshToken {
                    node: self.id,
                    seq: self.refresh_seq,
                };
                self.pending_refresh = Some(token);
                scheduler.schedule(self.refresh_delay, token);
                self.state = DriverState::PrimedForOutput;
                info!(
                    node = %self.id,
                    event_id = id,
                    pending_total = self.snapshot.pending_total,
                    delay_ms = self.refresh_delay.as_millis() as u64,
                    "new action-executed event, refresh armed"
                );
                Ok(SolveOutcome::NewEvent { id })
            }
        }
    }
}
