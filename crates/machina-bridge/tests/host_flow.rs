//! End-to-end flow through the Tokio graph host: input commands in,
//! broadcast output updates out.

use std::time::Duration;

use machina_bridge::{
    ActionExecutedNode, DriverConfig, GraphHost, HostCommand, OutputUpdate, SolveOutcome, Trigger,
};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::timeout;

fn executed(id: i64) -> String {
    format!(
        r#"{{"event":"action-executed","id":{id},"last":"Move({id},0,0);","pos":[{id},0,0],"ori":[1,0,0,0,1,0],"axes":[0,null,90],"pendDev":1,"pendTot":3}}"#
    )
}

fn node(delay_ms: u64) -> ActionExecutedNode {
    ActionExecutedNode::new(DriverConfig {
        refresh_delay: Duration::from_millis(delay_ms),
        ..Default::default()
    })
}

async fn next(rx: &mut broadcast::Receiver<OutputUpdate>) -> OutputUpdate {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("update within timeout")
        .expect("channel open")
}

#[tokio::test]
async fn new_event_is_rendered_after_one_refresh() {
    let mut host = GraphHost::new(32);
    let id = host.add_node(node(1));
    let mut updates = host.subscribe();
    let (tx, rx) = mpsc::channel(16);
    let handle = tokio::spawn(host.run(rx));

    // Fresh node: emit-only pass with empty outputs.
    tx.send(HostCommand::Input { node: id, message: executed(4) }).await.unwrap();
    let u = next(&mut updates).await;
    assert_eq!(u.result, Ok(SolveOutcome::Primed));
    assert!(u.outputs.unwrap().last_instruction.is_empty());

    // Same message again is detected as new now that the node is steady.
    tx.send(HostCommand::Input { node: id, message: executed(4) }).await.unwrap();
    let u = next(&mut updates).await;
    assert_eq!(u.result, Ok(SolveOutcome::NewEvent { id: 4 }));

    // The scheduled refresh publishes the decoded event.
    let u = next(&mut updates).await;
    assert_eq!(u.trigger, Trigger::Refresh);
    assert_eq!(u.result, Ok(SolveOutcome::Primed));
    let outputs = u.outputs.unwrap();
    assert_eq!(outputs.last_instruction, "Move(4,0,0);");
    assert_eq!(outputs.axes, vec![Some(0.0), None, Some(90.0)]);
    assert_eq!(outputs.pending_total, 3);
    assert_eq!(outputs.tcp_pose.unwrap().origin.x, 4.0);

    // A duplicate afterwards does nothing beyond re-emitting.
    tx.send(HostCommand::Input { node: id, message: executed(4) }).await.unwrap();
    let u = next(&mut updates).await;
    assert_eq!(u.result, Ok(SolveOutcome::Unchanged));

    let (reply_tx, reply_rx) = oneshot::channel();
    tx.send(HostCommand::Query { node: id, reply: reply_tx }).await.unwrap();
    let latest = reply_rx.await.unwrap().unwrap();
    assert_eq!(latest.pending_on_device, 1);

    tx.send(HostCommand::Shutdown).await.unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn input_arriving_before_refresh_is_still_classified() {
    let mut host = GraphHost::new(32);
    let id = host.add_node(node(50));
    let mut updates = host.subscribe();
    let (tx, rx) = mpsc::channel(16);
    let handle = tokio::spawn(host.run(rx));

    for msg in [executed(1), executed(7), executed(8)] {
        tx.send(HostCommand::Input { node: id, message: msg }).await.unwrap();
    }
    assert_eq!(next(&mut updates).await.result, Ok(SolveOutcome::Primed));
    assert_eq!(next(&mut updates).await.result, Ok(SolveOutcome::NewEvent { id: 7 }));

    // Lands inside the 50 ms window: publishes event 7 without classifying.
    let u = next(&mut updates).await;
    assert_eq!(u.trigger, Trigger::Input);
    assert_eq!(u.result, Ok(SolveOutcome::Primed));
    assert_eq!(u.outputs.unwrap().last_instruction, "Move(7,0,0);");

    // The refresh armed by event 7 picks up message 8.
    let u = next(&mut updates).await;
    assert_eq!(u.trigger, Trigger::Refresh);
    assert_eq!(u.result, Ok(SolveOutcome::NewEvent { id: 8 }));

    let u = next(&mut updates).await;
    assert_eq!(u.trigger, Trigger::Refresh);
    assert_eq!(u.result, Ok(SolveOutcome::Primed));
    assert_eq!(u.outputs.unwrap().last_instruction, "Move(8,0,0);");

    tx.send(HostCommand::Shutdown).await.unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn removing_node_cancels_pending_refresh() {
    let mut host = GraphHost::new(32);
    let id = host.add_node(node(50));
    let mut updates = host.subscribe();
    let (tx, rx) = mpsc::channel(16);
    let handle = tokio::spawn(host.run(rx));

    tx.send(HostCommand::Input { node: id, message: executed(1) }).await.unwrap();
    tx.send(HostCommand::Input { node: id, message: executed(2) }).await.unwrap();
    assert_eq!(next(&mut updates).await.result, Ok(SolveOutcome::Primed));
    assert_eq!(next(&mut updates).await.result, Ok(SolveOutcome::NewEvent { id: 2 }));

    tx.send(HostCommand::Remove { node: id }).await.unwrap();

    // Give the armed timer time to fire; no refresh update may follow.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(matches!(
        updates.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    ));

    let (reply_tx, reply_rx) = oneshot::channel();
    tx.send(HostCommand::Query { node: id, reply: reply_tx }).await.unwrap();
    assert!(reply_rx.await.unwrap().is_none());

    drop(tx);
    handle.await.unwrap();
}

#[tokio::test]
async fn malformed_input_is_reported_and_cache_survives() {
    let mut host = GraphHost::new(32);
    let id = host.add_node(node(1));
    let mut updates = host.subscribe();
    let (tx, rx) = mpsc::channel(16);
    let handle = tokio::spawn(host.run(rx));

    for msg in [executed(7), executed(7)] {
        tx.send(HostCommand::Input { node: id, message: msg }).await.unwrap();
    }
    next(&mut updates).await;
    next(&mut updates).await;
    let refreshed = next(&mut updates).await;
    assert_eq!(refreshed.trigger, Trigger::Refresh);

    tx.send(HostCommand::Input { node: id, message: "{\"id\":8}".to_string() }).await.unwrap();
    let u = next(&mut updates).await;
    assert!(u.result.is_err());
    assert_eq!(u.outputs.unwrap().last_instruction, "Move(7,0,0);");

    tx.send(HostCommand::Shutdown).await.unwrap();
    handle.await.unwrap();
}
