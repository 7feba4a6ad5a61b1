use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Event tag published by the Machina Bridge each time the robot finishes an
/// action.
pub const ACTION_EXECUTED: &str = "action-executed";

// ────────────────────────────────────────────────────────────────────────────
// Geometry
// ────────────────────────────────────────────────────────────────────────────

/// A 3-D vector (or point) in millimetres, as reported by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, rhs: Self) -> f64 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    pub fn cross(self, rhs: Self) -> Self {
        Self::new(
            self.y * rhs.z - self.z * rhs.y,
            self.z * rhs.x - self.x * rhs.z,
            self.x * rhs.y - self.y * rhs.x,
        )
    }

    pub fn length(self) -> f64 {
        self.dot(self).sqrt()
    }

    /// Unit-length copy of this vector, or `None` for a (near) zero vector.
    pub fn normalized(self) -> Option<Self> {
        let len = self.length();
        if !len.is_finite() || len <= f64::EPSILON {
            return None;
        }
        Some(Self::new(self.x / len, self.y / len, self.z / len))
    }
}

/// An oriented reference frame: origin plus an orthonormal basis.
///
/// This is the shape of the robot's tool-center-point pose on the node's
/// `tcp` output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Plane {
    pub origin: Vec3,
    pub x_axis: Vec3,
    pub y_axis: Vec3,
    pub z_axis: Vec3,
}

impl Plane {
    /// Build a frame from an origin and two direction vectors.
    ///
    /// `x_dir` fixes the X axis; `y_dir` only needs to lie in the XY plane and
    /// is re-orthogonalised against X.  Returns `None` when either direction
    /// is zero-length or the two are parallel, since no frame is defined.
    ///
    /// ```
    /// use machina_types::{Plane, Vec3};
    ///
    /// let p = Plane::from_axes(
    ///     Vec3::new(1.0, 2.0, 3.0),
    ///     Vec3::new(2.0, 0.0, 0.0),
    ///     Vec3::new(1.0, 1.0, 0.0),
    /// )
    /// .unwrap();
    /// assert_eq!(p.y_axis, Vec3::new(0.0, 1.0, 0.0));
    /// assert_eq!(p.z_axis, Vec3::new(0.0, 0.0, 1.0));
    /// ```
    pub fn from_axes(origin: Vec3, x_dir: Vec3, y_dir: Vec3) -> Option<Self> {
        let x_axis = x_dir.normalized()?;
        y_dir.normalized()?;
        let z_axis = x_dir.cross(y_dir).normalized()?;
        let y_axis = z_axis.cross(x_axis);
        Some(Self {
            origin,
            x_axis,
            y_axis,
            z_axis,
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Execution state
// ────────────────────────────────────────────────────────────────────────────

/// Decoded state after the most recent `action-executed` event.
///
/// Produced once per distinct event id and never mutated afterwards; the
/// driver replaces its cached instance wholesale.  The `Default` value is the
/// empty snapshot a node shows before any event has been seen: id `0`, no
/// instruction, unset pose, zero pending counts.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct ExecutionEvent {
    /// Bridge-assigned id; only compared for inequality.
    pub event_id: i64,
    pub last_instruction: String,
    /// `None` when position or orientation could not be fully decoded.
    pub tcp_pose: Option<Plane>,
    /// Joint values; absent entries keep their position in the list.
    pub axes: Vec<Option<f64>>,
    pub external_axes: Vec<Option<f64>>,
    /// Released to the device but not yet finished.
    pub pending_on_device: i64,
    /// Everything still queued, released or not.
    pub pending_total: i64,
}

/// The six values a node writes to its output slots, in slot order.
///
/// Labels and help text for each slot live in [`ACTION_EXECUTED_NODE`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeOutputs {
    pub last_instruction: String,
    pub tcp_pose: Option<Plane>,
    pub axes: Vec<Option<f64>>,
    pub external_axes: Vec<Option<f64>>,
    pub pending_total: i64,
    pub pending_on_device: i64,
}

impl From<&ExecutionEvent> for NodeOutputs {
    fn from(event: &ExecutionEvent) -> Self {
        Self {
            last_instruction: event.last_instruction.clone(),
            tcp_pose: event.tcp_pose,
            axes: event.axes.clone(),
            external_axes: event.external_axes.clone(),
            pending_total: event.pending_total,
            pending_on_device: event.pending_on_device,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Node descriptor
// ────────────────────────────────────────────────────────────────────────────

/// Whether a parameter carries a single value or a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamAccess {
    Item,
    List,
}

/// Name, short label and help text of one node parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamDescriptor {
    pub name: &'static str,
    pub nickname: &'static str,
    pub description: &'static str,
    pub access: ParamAccess,
    /// Matching [`NodeOutputs`] field, empty for the input.
    pub field: &'static str,
}

/// What the host shows for a node in its palette: identity, category, the
/// input slot and the output slots in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub category: &'static str,
    pub subcategory: &'static str,
    pub input: ParamDescriptor,
    pub outputs: [ParamDescriptor; 6],
}

impl NodeDescriptor {
    /// Output parameter bound to the `NodeOutputs` field `field`.
    pub fn output(&self, field: &str) -> Option<&ParamDescriptor> {
        self.outputs.iter().find(|p| p.field == field)
    }
}

pub const ACTION_EXECUTED_NODE: NodeDescriptor = NodeDescriptor {
    name: "ActionExecuted",
    description: "Will update every time an Action has been successfully executed by the robot.",
    category: "Machina",
    subcategory: "Bridge",
    input: ParamDescriptor {
        name: "BridgeMessage",
        nickname: "BM",
        description: "The last message received from the Machina Bridge.",
        access: ParamAccess::Item,
        field: "",
    },
    outputs: [
        ParamDescriptor {
            name: "LastAction",
            nickname: "last",
            description: "Last Action that was successfully executed by the robot.",
            access: ParamAccess::Item,
            field: "last_instruction",
        },
        ParamDescriptor {
            name: "ActionTCP",
            nickname: "tcp",
            description: "Last known TCP position for this Action.",
            access: ParamAccess::Item,
            field: "tcp_pose",
        },
        ParamDescriptor {
            name: "ActionAxes",
            nickname: "axes",
            description: "Last known axes for this Action.",
            access: ParamAccess::List,
            field: "axes",
        },
        ParamDescriptor {
            name: "ActionExternalAxes",
            nickname: "extax",
            description: "Last known external axes for this Action.",
            access: ParamAccess::List,
            field: "external_axes",
        },
        ParamDescriptor {
            name: "PendingActions",
            nickname: "pendTot",
            description: "How many Actions are left in the queue to be executed?",
            access: ParamAccess::Item,
            field: "pending_total",
        },
        ParamDescriptor {
            name: "PendingActionsOnDevice",
            nickname: "pendDev",
            description: "How many Actions are left on the device to be executed? \
                This only accounts for the ones that have already been released to it.",
            access: ParamAccess::Item,
            field: "pending_on_device",
        },
    ],
};

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Failures surfaced to the host's error channel.
///
/// Problems with individual optional fields never show up here; they decode
/// to absent values instead.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BridgeError {
    #[error("Malformed bridge payload: {0}")]
    MalformedPayload(String),

    #[error("Bridge payload is missing required field `{0}`")]
    MissingField(String),

    #[error("Host error: {0}")]
    Host(String),
}
