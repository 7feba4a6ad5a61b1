//! Replay – feed a recorded bridge stream through one node.
//!
//! The file holds one raw bridge message per line; blank lines and lines
//! starting with `#` are skipped.  After every new event the replay waits for
//! the armed refresh and runs it before feeding the next line, which is how a
//! live host would interleave the two.

use std::path::Path;

use machina_bridge::{ActionExecutedNode, DriverConfig, GraphHost, SolveOutcome};
use machina_types::NodeOutputs;
use tracing::{debug, warn};

use crate::render;

/// Counts of what the replayed stream did to the node.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReplaySummary {
    pub messages: usize,
    pub new_events: usize,
    pub duplicates: usize,
    pub ignored: usize,
    pub errors: usize,
    pub final_outputs: Option<NodeOutputs>,
}

/// Replay the file at `path`.
pub async fn run_file(path: &Path, driver: DriverConfig, capacity: usize) -> Result<ReplaySummary, String> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    Ok(replay_lines(raw.lines(), driver, capacity, true).await)
}

/// Feed `lines` through a fresh node hosted by a [`GraphHost`].
///
/// A freshly placed node only publishes on its first invocation, so the
/// first message is delivered twice: once to wake the node and once to be
/// classified.
pub async fn replay_lines<'a, I>(lines: I, driver: DriverConfig, capacity: usize, echo: bool) -> ReplaySummary
where
    I: IntoIterator<Item = &'a str>,
{
    let mut host = GraphHost::new(capacity);
    let node = host.add_node(ActionExecutedNode::new(driver));
    let mut summary = ReplaySummary::default();
    let mut woken = false;

    for (lineno, line) in lines.into_iter().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        summary.messages += 1;

        if !woken {
            match host.submit(node, line.to_string()) {
                Ok(outcome) => debug!(%node, ?outcome, "replay woke node"),
                Err(e) => debug!(%node, error = %e, "wake-up pass failed"),
            }
            woken = true;
        }

        match host.submit(node, line.to_string()) {
            Ok(SolveOutcome::NewEvent { id }) => {
                summary.new_events += 1;
                if echo {
                    println!("  line {:>4}: {}", lineno + 1, render::describe(SolveOutcome::NewEvent { id }));
                }
                // Settle the armed refresh so the next line sees SteadyState.
                while let Some(token) = host.next_refresh().await {
                    if host.handle_refresh(token).is_some() {
                        break;
                    }
                }
                if echo && let Some(outputs) = host.outputs(node).and_then(|s| s.latest()) {
                    render::print_outputs(outputs);
                }
            }
            Ok(SolveOutcome::Unchanged) => summary.duplicates += 1,
            Ok(SolveOutcome::Ignored) => summary.ignored += 1,
            Ok(_) => {}
            Err(e) => {
                summary.errors += 1;
                warn!(line = lineno + 1, error = %e, "replayed message rejected");
                if echo {
                    println!("  line {:>4}: {}", lineno + 1, e);
                }
            }
        }
    }

    summary.final_outputs = host.outputs(node).and_then(|s| s.latest().cloned());
    summary
}
