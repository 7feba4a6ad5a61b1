//! Host capabilities an [`ActionExecutedNode`][crate::driver::ActionExecutedNode]
//! depends on.
//!
//! The node never owns an event loop.  Everything it needs from the graph it
//! lives in is expressed as two small traits so the node can be driven by the
//! real host, by [`GraphHost`][crate::graph::GraphHost], or by a test:
//!
//! * [`RefreshScheduler`] – "invoke me again after a short delay".
//! * [`OutputSink`] – receives the six output values and the "outputs are
//!   stale" notification.

use std::cell::RefCell;
use std::fmt;
use std::time::Duration;

use machina_types::NodeOutputs;
use uuid::Uuid;

/// Identity of one node instance inside the host graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle for one armed refresh.
///
/// `seq` increases every time the node arms a refresh, so a host can tell a
/// refresh that fires after its emit-only pass already ran from the latest
/// one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RefreshToken {
    pub node: NodeId,
    pub seq: u64,
}

/// Deferred re-invocation primitive provided by the host.
///
/// Implementations must not invoke the node synchronously from inside
/// `schedule`; the follow-up call has to arrive as an ordinary, later
/// invocation.
pub trait RefreshScheduler {
    fn schedule(&self, delay: Duration, token: RefreshToken);
}

/// Per-node output slots owned by the host.
pub trait OutputSink {
    /// Write all six outputs.  Called on every invocation that has input.
    fn write(&mut self, outputs: &NodeOutputs);

    /// Mark the outputs stale so downstream consumers re-read them.
    fn expire(&mut self);
}

// ────────────────────────────────────────────────────────────────────────────
// In-memory implementations
// ────────────────────────────────────────────────────────────────────────────

/// Scheduler that only records what it was asked to do.
#[derive(Debug, Default)]
pub struct RecordingScheduler {
    calls: RefCell<Vec<(Duration, RefreshToken)>>,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(delay, token)` pair scheduled so far, oldest first.
    pub fn calls(&self) -> Vec<(Duration, RefreshToken)> {
        self.calls.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.calls.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.borrow().is_empty()
    }

    /// Remove and return the oldest pending call.
    pub fn pop(&self) -> Option<(Duration, RefreshToken)> {
        let mut calls = self.calls.borrow_mut();
        if calls.is_empty() {
            None
        } else {
            Some(calls.remove(0))
        }
    }
}

impl RefreshScheduler for RecordingScheduler {
    fn schedule(&self, delay: Duration, token: RefreshToken) {
        self.calls.borrow_mut().push((delay, token));
    }
}

/// Latest values on a node's output slots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputSlots {
    latest: Option<NodeOutputs>,
    stale: bool,
    writes: u64,
    expirations: u64,
}

impl OutputSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` until the node has been invoked with input at least once.
    pub fn latest(&self) -> Option<&NodeOutputs> {
        self.latest.as_ref()
    }

    /// `true` between an [`expire`][OutputSink::expire] and the next write.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn writes(&self) -> u64 {
        self.writes
    }

    pub fn expirations(&self) -> u64 {
        self.expirations
    }
}

impl OutputSink for OutputSlots {
    fn write(&mut self, outputs: &NodeOutputs) {
        self.latest = Some(outputs.clone());
        self.stale = false;
        self.writes += 1;
    }

    fn expire(&mut self) {
        self.stale = true;
        self.expirations += 1;
    }
}
