//! [`GraphHost`] – a minimal Tokio host for [`ActionExecutedNode`]s.
//!
//! Stands in for the visual dataflow engine: it owns the nodes, remembers
//! each node's last input, keeps its output slots, and turns scheduled
//! refreshes back into ordinary invocations.
//!
//! All invocations happen on the task that drives the host, one at a time.
//! The only concurrency is in [`TokioScheduler`], which sleeps on a spawned
//! task and then enqueues the [`RefreshToken`] for the host to pick up.
//!
//! Every fired refresh token becomes one ordinary invocation of its node,
//! even when later input already ran the emit-only pass; that invocation then
//! classifies whatever input the node holds by now.  Tokens for removed nodes
//! are dropped with a warning.
//!
//! Every invocation is broadcast as an [`OutputUpdate`] so observers (the
//! CLI, tests) can follow outputs and errors without touching the host.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use machina_types::{BridgeError, NodeOutputs};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::driver::{ActionExecutedNode, SolveOutcome};
use crate::host::{NodeId, OutputSink, OutputSlots, RefreshScheduler, RefreshToken};

/// Default capacity of the [`OutputUpdate`] broadcast channel.
const DEFAULT_UPDATE_CAPACITY: usize = 64;

// ────────────────────────────────────────────────────────────────────────────
// Public types
// ────────────────────────────────────────────────────────────────────────────

/// Requests accepted by [`GraphHost::run`].
#[derive(Debug)]
pub enum HostCommand {
    /// New input arrived on `node`'s input slot.
    Input { node: NodeId, message: String },
    /// Remove `node` from the graph; any pending refresh becomes a no-op.
    Remove { node: NodeId },
    /// Reply with the latest outputs of `node`.
    Query {
        node: NodeId,
        reply: oneshot::Sender<Option<NodeOutputs>>,
    },
    /// Stop the run loop.
    Shutdown,
}

/// Why a node was invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Input,
    Refresh,
}

/// Record of one node invocation.
#[derive(Debug, Clone)]
pub struct OutputUpdate {
    pub node: NodeId,
    pub trigger: Trigger,
    pub timestamp: DateTime<Utc>,
    pub result: Result<SolveOutcome, BridgeError>,
    /// Outputs after the invocation (`None` if the node never had input).
    pub outputs: Option<NodeOutputs>,
}

/// [`RefreshScheduler`] backed by Tokio timers.
///
/// Must be used from inside a Tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    tx: mpsc::UnboundedSender<RefreshToken>,
}

impl RefreshScheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, token: RefreshToken) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // The host may already be gone; nothing left to refresh then.
            let _ = tx.send(token);
        });
    }
}

struct HostedNode {
    node: ActionExecutedNode,
    last_input: Option<String>,
    slots: OutputSlots,
}

// ────────────────────────────────────────────────────────────────────────────
// GraphHost
// ────────────────────────────────────────────────────────────────────────────

pub struct GraphHost {
    nodes: HashMap<NodeId, HostedNode>,
    scheduler: TokioScheduler,
    refresh_rx: mpsc::UnboundedReceiver<RefreshToken>,
    updates: broadcast::Sender<OutputUpdate>,
}

impl Default for GraphHost {
    fn default() -> Self {
        Self::new(DEFAULT_UPDATE_CAPACITY)
    }
}

impl GraphHost {
    /// Create an empty host whose update channel buffers `update_capacity`
    /// records for slow observers.
    pub fn new(update_capacity: usize) -> Self {
        let (tx, refresh_rx) = mpsc::unbounded_channel();
        let (updates, _) = broadcast::channel(update_capacity.max(1));
        Self {
            nodes: HashMap::new(),
            scheduler: TokioScheduler { tx },
            refresh_rx,
            updates,
        }
    }

    /// Place `node` in the graph and return its id.
    pub fn add_node(&mut self, node: ActionExecutedNode) -> NodeId {
        let id = node.id();
        self.nodes.insert(
            id,
            HostedNode {
                node,
                last_input: None,
                slots: OutputSlots::new(),
            },
        );
        id
    }

    /// Drop `node`.  Returns `false` if it was not in the graph.
    pub fn remove_node(&mut self, node: NodeId) -> bool {
        let removed = self.nodes.remove(&node).is_some();
        if removed {
            debug!(%node, "node removed");
        }
        removed
    }

    pub fn node(&self, node: NodeId) -> Option<&ActionExecutedNode> {
        self.nodes.get(&node).map(|h| &h.node)
    }

    pub fn outputs(&self, node: NodeId) -> Option<&OutputSlots> {
        self.nodes.get(&node).map(|h| &h.slots)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OutputUpdate> {
        self.updates.subscribe()
    }

    /// Deliver `message` to `node`'s input and invoke it.
    ///
    /// Must be called from inside a Tokio runtime, since a new event arms a
    /// timer.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Host`] for an unknown node, otherwise whatever the
    /// node's invocation returned.
    pub fn submit(&mut self, node: NodeId, message: String) -> Result<SolveOutcome, BridgeError> {
        let hosted = self
            .nodes
            .get_mut(&node)
            .ok_or_else(|| BridgeError::Host(format!("unknown node {node}")))?;
        hosted.last_input = Some(message);
        self.invoke(node, Trigger::Input)
            .unwrap_or_else(|| Err(BridgeError::Host(format!("unknown node {node}"))))
    }

    /// Turn a fired refresh into an invocation.
    ///
    /// Returns `None` when the token's node has been removed.
    pub fn handle_refresh(&mut self, token: RefreshToken) -> Option<Result<SolveOutcome, BridgeError>> {
        let Some(hosted) = self.nodes.get(&token.node) else {
            warn!(node = %token.node, seq = token.seq, "refresh for removed node ignored");
            return None;
        };
        if hosted.node.pending_refresh() != Some(token) {
            debug!(node = %token.node, seq = token.seq, "refresh fired after its emit-only pass");
        }
        self.invoke(token.node, Trigger::Refresh)
    }

    /// Wait for the next fired refresh token.
    pub async fn next_refresh(&mut self) -> Option<RefreshToken> {
        self.refresh_rx.recv().await
    }

    /// Drive the host until [`HostCommand::Shutdown`] or until every command
    /// sender is dropped.
    pub async fn run(mut self, mut commands: mpsc::Receiver<HostCommand>) {
        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(HostCommand::Input { node, message }) => {
                        if let Err(e) = self.submit(node, message) {
                            debug!(%node, error = %e, "input invocation failed");
                        }
                    }
                    Some(HostCommand::Remove { node }) => {
                        self.remove_node(node);
                    }
                    Some(HostCommand::Query { node, reply }) => {
                        let latest = self.outputs(node).and_then(|s| s.latest().cloned());
                        let _ = reply.send(latest);
                    }
                    Some(HostCommand::Shutdown) | None => break,
                },
                Some(token) = self.refresh_rx.recv() => {
                    self.handle_refresh(token);
                }
            }
        }
        debug!(nodes = self.nodes.len(), "graph host stopped");
    }

    fn invoke(&mut self, node: NodeId, trigger: Trigger) -> Option<Result<SolveOutcome, BridgeError>> {
        let hosted = self.nodes.get_mut(&node)?;

        if hosted.node.expires_downstream() {
            hosted.slots.expire();
        }
        let result = hosted
            .node
            .solve(hosted.last_input.as_deref(), &mut hosted.slots, &self.scheduler);

        match &result {
            Ok(outcome) => debug!(%node, ?trigger, ?outcome, "node solved"),
            Err(e) => error!(%node, ?trigger, error = %e, "node invocation failed"),
        }

        let _ = self.updates.send(OutputUpdate {
            node,
            trigger,
            timestamp: Utc::now(),
            result: result.clone(),
            outputs: hosted.slots.latest().cloned(),
        });
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DriverConfig;

    fn executed(id: i64) -> String {
        format!(r#"{{"event":"action-executed","id":{id},"last":"Action {id}","pendTot":{id}}}"#)
    }

    fn fast_node() -> ActionExecutedNode {
        ActionExecutedNode::new(DriverConfig {
            refresh_delay: Duration::from_millis(1),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn submit_to_unknown_node_is_host_error() {
        let mut host = GraphHost::default();
        let err = host.submit(NodeId::new(), executed(1)).unwrap_err();
        assert!(matches!(err, BridgeError::Host(_)));
    }

    #[tokio::test]
    async fn refresh_publishes_new_event() {
        let mut host = GraphHost::default();
        let id = host.add_node(fast_node());

        assert_eq!(host.submit(id, executed(1)).unwrap(), SolveOutcome::Primed);
        assert_eq!(host.submit(id, executed(2)).unwrap(), SolveOutcome::NewEvent { id: 2 });
        assert!(host.outputs(id).unwrap().latest().unwrap().last_instruction.is_empty());

        let token = host.next_refresh().await.unwrap();
        assert_eq!(token.node, id);
        let outcome = host.handle_refresh(token).unwrap().unwrap();
        assert_eq!(outcome, SolveOutcome::Primed);

        let slots = host.outputs(id).unwrap();
        assert_eq!(slots.latest().unwrap().last_instruction, "Action 2");
        assert!(!slots.is_stale());
    }

    #[tokio::test]
    async fn outputs_expire_only_when_primed() {
        let mut host = GraphHost::default();
        let id = host.add_node(fast_node());

        host.submit(id, executed(1)).unwrap();
        assert_eq!(host.outputs(id).unwrap().expirations(), 1);

        // Steady state: a duplicate does not expire anything.
        host.submit(id, executed(0)).unwrap();
        assert_eq!(host.outputs(id).unwrap().expirations(), 1);

        host.submit(id, executed(5)).unwrap();
        let token = host.next_refresh().await.unwrap();
        host.handle_refresh(token);
        assert_eq!(host.outputs(id).unwrap().expirations(), 2);
    }

    #[tokio::test]
    async fn late_refresh_still_invokes_live_node() {
        let mut host = GraphHost::default();
        let id = host.add_node(fast_node());
        host.submit(id, executed(1)).unwrap();
        host.submit(id, executed(2)).unwrap();

        let token = host.next_refresh().await.unwrap();
        assert_eq!(host.handle_refresh(token), Some(Ok(SolveOutcome::Primed)));
        // Delivered again after its pass already ran: an ordinary invocation.
        assert_eq!(host.handle_refresh(token), Some(Ok(SolveOutcome::Unchanged)));
        assert_eq!(host.node(id).unwrap().last_seen_id(), 2);
    }

    #[tokio::test]
    async fn input_between_new_event_and_refresh_is_classified() {
        let mut host = GraphHost::default();
        let id = host.add_node(fast_node());

        assert_eq!(host.submit(id, executed(1)).unwrap(), SolveOutcome::Primed);
        assert_eq!(host.submit(id, executed(7)).unwrap(), SolveOutcome::NewEvent { id: 7 });
        // Arrives before the armed timer fires and only publishes event 7.
        assert_eq!(host.submit(id, executed(8)).unwrap(), SolveOutcome::Primed);
        assert_eq!(host.outputs(id).unwrap().latest().unwrap().last_instruction, "Action 7");

        let token = host.next_refresh().await.unwrap();
        assert_eq!(host.handle_refresh(token), Some(Ok(SolveOutcome::NewEvent { id: 8 })));
        assert_eq!(host.node(id).unwrap().last_seen_id(), 8);

        let token = host.next_refresh().await.unwrap();
        assert_eq!(host.handle_refresh(token), Some(Ok(SolveOutcome::Primed)));
        assert_eq!(host.outputs(id).unwrap().latest().unwrap().last_instruction, "Action 8");
    }

    #[tokio::test]
    async fn removed_node_refresh_is_noop() {
        let mut host = GraphHost::default();
        let id = host.add_node(fast_node());
        host.submit(id, executed(1)).unwrap();
        host.submit(id, executed(2)).unwrap();

        assert!(host.remove_node(id));
        assert!(!host.remove_node(id));
        let token = host.next_refresh().await.unwrap();
        assert!(host.handle_refresh(token).is_none());
        assert!(host.node(id).is_none());
    }

    #[tokio::test]
    async fn updates_are_broadcast() {
        let mut host = GraphHost::default();
        let mut rx = host.subscribe();
        let id = host.add_node(fast_node());

        host.submit(id, executed(1)).unwrap();
        let _ = host.submit(id, "garbage".to_string());

        let first = rx.recv().await.unwrap();
        assert_eq!(first.node, id);
        assert_eq!(first.trigger, Trigger::Input);
        assert_eq!(first.result, Ok(SolveOutcome::Primed));

        let second = rx.recv().await.unwrap();
        assert!(matches!(second.result, Err(BridgeError::MalformedPayload(_))));
        assert!(second.outputs.is_some());
    }
}
