//! [`EventClassifier`] – decides whether a raw bridge message is a new event.
//!
//! The classifier holds no per-invocation state: the caller passes in the id
//! it last accepted and gets back either a freshly decoded
//! [`ExecutionEvent`] or a reason the message was not new.
//!
//! ```
//! use machina_bridge::classifier::{Classification, EventClassifier};
//!
//! let classifier = EventClassifier::default();
//! let raw = r#"{"event":"action-executed","id":7,"last":"Wait(500);"}"#;
//!
//! let first = classifier.classify(raw, 0).unwrap();
//! assert!(first.is_new());
//!
//! // Same id again: nothing to do.
//! let again = classifier.classify(raw, 7).unwrap();
//! assert!(matches!(again, Classification::Duplicate { id: 7 }));
//! ```

use machina_types::{ACTION_EXECUTED, BridgeError, ExecutionEvent};
use tracing::debug;

use crate::message::BridgeMessage;

/// Result of classifying one raw message.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// A previously unseen id on this classifier's channel.
    New(ExecutionEvent),
    /// Same id as the last accepted event.
    Duplicate { id: i64 },
    /// The message belongs to another event channel.
    Ignored { tag: String },
}

impl Classification {
    pub fn is_new(&self) -> bool {
        matches!(self, Classification::New(_))
    }

    /// The id carried by the message, when this channel owns it.
    pub fn event_id(&self) -> Option<i64> {
        match self {
            Classification::New(event) => Some(event.event_id),
            Classification::Duplicate { id } => Some(*id),
            Classification::Ignored { .. } => None,
        }
    }
}

/// Stateless new-event detector for a single event tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventClassifier {
    tag: String,
}

impl Default for EventClassifier {
    fn default() -> Self {
        Self::new(ACTION_EXECUTED)
    }
}

impl EventClassifier {
    /// Create a classifier that only reacts to messages tagged `tag`.
    pub fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into() }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Classify `raw` against `last_seen_id`.
    ///
    /// Messages on other channels are [`Classification::Ignored`] without
    /// looking at their id.  On this channel, an id equal to `last_seen_id`
    /// is a [`Classification::Duplicate`]; any other id is decoded into a new
    /// [`ExecutionEvent`].
    ///
    /// # Errors
    ///
    /// Propagates [`BridgeError::MalformedPayload`] and
    /// [`BridgeError::MissingField`] from decoding.  These are never folded
    /// into "not new".
    pub fn classify(&self, raw: &str, last_seen_id: i64) -> Result<Classification, BridgeError> {
        let msg = BridgeMessage::parse(raw)?;

        if msg.tag() != self.tag {
            debug!(tag = msg.tag(), expected = %self.tag, "message on another event channel");
            return Ok(Classification::Ignored {
                tag: msg.tag().to_string(),
            });
        }

        let id = msg.event_id()?;
        if id == last_seen_id {
            debug!(id, "duplicate event id");
            return Ok(Classification::Duplicate { id });
        }

        Ok(Classification::New(msg.into_execution_event(id)))
    }
}
