//! Typed decode of raw Machina Bridge status strings.
//!
//! The bridge speaks loosely-typed JSON.  [`BridgeMessage`] pulls every field
//! this node cares about out of it in one pass:
//!
//! | Key | Decoded as | When missing / wrong type |
//! |---|---|---|
//! | `event` | `String` | [`BridgeError::MissingField`] |
//! | `id` | `i64` (checked lazily, see [`BridgeMessage::event_id`]) | [`BridgeError::MissingField`] / [`BridgeError::MalformedPayload`] |
//! | `last` | `String` | empty string |
//! | `pos`, `ori`, `axes`, `extax` | list of optional `f64` | no list |
//! | `pendDev`, `pendTot` | `i64` | `0` |
//!
//! Individual list elements that are `null` or non-numeric become `None`
//! in place, so list length and positions survive.  Unknown keys are ignored.

use machina_types::{BridgeError, ExecutionEvent, Plane, Vec3};
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// One status message from the bridge, decoded with per-field leniency.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, JsonSchema)]
pub struct BridgeMessage {
    /// Event tag, e.g. `"action-executed"`.
    #[serde(default)]
    pub event: Option<String>,

    /// Bridge-assigned event id.  Kept loose so that messages on other event
    /// channels never fail on an id shape this node does not care about.
    #[serde(default)]
    #[schemars(with = "Option<i64>")]
    pub id: Option<Value>,

    /// Human-readable description of the action just completed.
    #[serde(default, deserialize_with = "lenient_string")]
    #[schemars(with = "String")]
    pub last: String,

    /// TCP position `[x, y, z]`.
    #[serde(default, deserialize_with = "lenient_numbers")]
    #[schemars(with = "Option<Vec<Option<f64>>>")]
    pub pos: Option<Vec<Option<f64>>>,

    /// TCP orientation as two direction vectors `[xx, xy, xz, yx, yy, yz]`.
    #[serde(default, deserialize_with = "lenient_numbers")]
    #[schemars(with = "Option<Vec<Option<f64>>>")]
    pub ori: Option<Vec<Option<f64>>>,

    #[serde(default, deserialize_with = "lenient_numbers")]
    #[schemars(with = "Option<Vec<Option<f64>>>")]
    pub axes: Option<Vec<Option<f64>>>,

    #[serde(default, deserialize_with = "lenient_numbers")]
    #[schemars(with = "Option<Vec<Option<f64>>>")]
    pub extax: Option<Vec<Option<f64>>>,

    #[serde(default, rename = "pendDev", deserialize_with = "lenient_count")]
    #[schemars(with = "i64")]
    pub pend_dev: i64,

    #[serde(default, rename = "pendTot", deserialize_with = "lenient_count")]
    #[schemars(with = "i64")]
    pub pend_tot: i64,
}

impl BridgeMessage {
    /// Decode `raw` as a JSON object.
    ///
    /// # Errors
    ///
    /// [`BridgeError::MalformedPayload`] if `raw` is not valid JSON or its top
    /// level is not an object; [`BridgeError::MissingField`] if it has no
    /// `event` tag.
    pub fn parse(raw: &str) -> Result<Self, BridgeError> {
        let msg: Self = serde_json::from_str(raw)
            .map_err(|e| BridgeError::MalformedPayload(e.to_string()))?;
        if msg.event.is_none() {
            return Err(BridgeError::MissingField("event".to_string()));
        }
        Ok(msg)
    }

    /// The event tag.  Always present on a value returned by [`parse`][Self::parse].
    pub fn tag(&self) -> &str {
        self.event.as_deref().unwrap_or_default()
    }

    /// The integer event id.
    ///
    /// Accepts JSON integers and floats with no fractional part.
    pub fn event_id(&self) -> Result<i64, BridgeError> {
        let value = self
            .id
            .as_ref()
            .ok_or_else(|| BridgeError::MissingField("id".to_string()))?;
        value
            .as_i64()
            .or_else(|| {
                value
                    .as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| f as i64)
            })
            .ok_or_else(|| BridgeError::MalformedPayload(format!("`id` is not an integer: {value}")))
    }

    /// Tool-center-point frame, or `None` unless all 3 position and all 6
    /// orientation components are present and describe a valid frame.
    ///
    /// Complete data is not always enough: zero-length or parallel
    /// orientation directions also leave the pose unset, since
    /// [`Plane::from_axes`] has no frame to build from them.
    pub fn tcp_pose(&self) -> Option<Plane> {
        let pos = complete::<3>(self.pos.as_deref())?;
        let ori = complete::<6>(self.ori.as_deref())?;
        Plane::from_axes(
            Vec3::new(pos[0], pos[1], pos[2]),
            Vec3::new(ori[0], ori[1], ori[2]),
            Vec3::new(ori[3], ori[4], ori[5]),
        )
    }

    /// Build the immutable snapshot for event `event_id`.
    pub fn into_execution_event(self, event_id: i64) -> ExecutionEvent {
        let tcp_pose = self.tcp_pose();
        ExecutionEvent {
            event_id,
            last_instruction: self.last,
            tcp_pose,
            axes: self.axes.unwrap_or_default(),
            external_axes: self.extax.unwrap_or_default(),
            pending_on_device: self.pend_dev,
            pending_total: self.pend_tot,
        }
    }
}

/// First `N` entries of `values`, only if every one of them is present.
fn complete<const N: usize>(values: Option<&[Option<f64>]>) -> Option<[f64; N]> {
    let values = values?;
    if values.len() < N {
        return None;
    }
    let mut out = [0.0; N];
    for (slot, v) in out.iter_mut().zip(values) {
        *slot = (*v)?;
    }
    Some(out)
}

// ────────────────────────────────────────────────────────────────────────────
// Lenient field decoders
// ────────────────────────────────────────────────────────────────────────────

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn lenient_numbers<'de, D>(deserializer: D) -> Result<Option<Vec<Option<f64>>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => Some(items.iter().map(number).collect()),
        _ => None,
    })
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        _ => String::new(),
    })
}

fn lenient_count<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
        .unwrap_or(0))
}
