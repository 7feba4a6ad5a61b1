//! `machina-bridge` – ActionExecuted node core
//!
//! Reacts to the status stream of a Machina Bridge: recognises genuinely new
//! `action-executed` events, caches their decoded state, and asks the host
//! graph for exactly one follow-up refresh so the new values propagate
//! downstream.
//!
//! # Modules
//!
//! - [`message`] – [`BridgeMessage`][message::BridgeMessage]: one-pass typed
//!   decode of a raw bridge string, with lenient per-element numeric lists.
//! - [`classifier`] – [`EventClassifier`][classifier::EventClassifier]:
//!   stateless new-vs-seen decision over `(raw message, last seen id)`.
//! - [`driver`] – [`ActionExecutedNode`][driver::ActionExecutedNode]: the
//!   state cache and two-state refresh driver invoked by the host.
//! - [`host`] – capability traits the node needs from its host
//!   ([`RefreshScheduler`][host::RefreshScheduler],
//!   [`OutputSink`][host::OutputSink]) plus in-memory implementations.
//! - [`graph`] – [`GraphHost`][graph::GraphHost]: a small Tokio-driven host
//!   that serialises node invocations and fires scheduled refreshes.

pub mod classifier;
pub mod driver;
pub mod graph;
pub mod host;
pub mod message;

pub use classifier::{Classification, EventClassifier};
pub use driver::{ActionExecutedNode, DriverConfig, DriverState, SolveOutcome};
pub use graph::{GraphHost, HostCommand, OutputUpdate, TokioScheduler, Trigger};
pub use host::{NodeId, OutputSink, OutputSlots, RecordingScheduler, RefreshScheduler, RefreshToken};
pub use message::BridgeMessage;
