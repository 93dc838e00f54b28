use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod packet;

pub use packet::{
    Decoded, DeviceMetrics, EnvironmentMetrics, MeshPacket, NodeInfo, Payload, PortNum, Telemetry,
    User,
};

/// Highest battery percentage ever reported downstream.  Mesh radios report
/// `101` while running on external power.
pub const BATTERY_CEILING: u32 = 100;

/// Clamp a raw battery level to [`BATTERY_CEILING`].
pub fn clamp_battery(level: u32) -> u32 {
    level.min(BATTERY_CEILING)
}

/// Mesh node number of a reporting peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Display name used when the node database has no long name for this node.
    pub fn fallback_name(&self) -> String {
        format!("Node-{}", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for NodeId {
    fn from(num: u32) -> Self {
        Self(num)
    }
}

/// Packet category that last contributed to a node's accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Device,
    Environment,
    Text,
}

/// Optional-valued telemetry record.  `None` means "unknown this cycle".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialFields {
    pub name: Option<String>,
    pub kind: Option<FieldKind>,
    pub battery: Option<u32>,
    pub voltage: Option<f64>,
    pub uptime: Option<u64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub message: Option<String>,
}

impl PartialFields {
    /// `true` when no slot carries a value.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Pure last-write-wins merge: every slot present in `newer` replaces the
    /// corresponding slot of `self`, every absent slot keeps its prior value.
    ///
    /// ```
    /// use meshrelay_types::PartialFields;
    ///
    /// let old = PartialFields { battery: Some(80), voltage: Some(3.9), ..Default::default() };
    /// let new = PartialFields { battery: Some(140), ..Default::default() };
    /// let merged = old.merge(new);
    /// assert_eq!(merged.battery, Some(100));
    /// assert_eq!(merged.voltage, Some(3.9));
    /// ```
    pub fn merge(mut self, newer: PartialFields) -> PartialFields {
        self.apply(newer);
        self
    }

    /// In-place form of [`PartialFields::merge`].  Battery is clamped to
    /// [`BATTERY_CEILING`] on the way in.
    pub fn apply(&mut self, newer: PartialFields) {
        fn overwrite<T>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }

        overwrite(&mut self.name, newer.name);
        overwrite(&mut self.kind, newer.kind);
        overwrite(&mut self.battery, newer.battery.map(clamp_battery));
        overwrite(&mut self.voltage, newer.voltage);
        overwrite(&mut self.uptime, newer.uptime);
        overwrite(&mut self.temperature, newer.temperature);
        overwrite(&mut self.humidity, newer.humidity);
        overwrite(&mut self.pressure, newer.pressure);
        overwrite(&mut self.message, newer.message);
    }
}

/// Structured reading embedded by the sensor firmware in a text payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub device_id: String,
    pub co2: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub latitude: f64,
    pub longitude: f64,
    /// `1` for a live GPS fix, `0` when the coordinates are the seeded home position.
    pub gps_fix: u8,
    pub timestamp: u64,
}

/// What crosses the handoff from the producer thread into the relay.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    /// Partial telemetry to be merged and debounced.
    Update { node: NodeId, fields: PartialFields },
    /// A complete firmware reading, relayed without debouncing.
    Sensor {
        node: NodeId,
        from: String,
        reading: SensorReading,
    },
}

impl NodeEvent {
    pub fn node(&self) -> NodeId {
        match self {
            NodeEvent::Update { node, .. } | NodeEvent::Sensor { node, .. } => *node,
        }
    }
}

/// Flushed snapshot of one node's debounce window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedEvent {
    pub from: String,
    pub node_num: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<FieldKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voltage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl MergedEvent {
    pub fn new(node: NodeId, fields: PartialFields) -> Self {
        Self {
            from: fields.name.unwrap_or_else(|| node.fallback_name()),
            node_num: node,
            subtype: fields.kind,
            battery: fields.battery.map(clamp_battery),
            voltage: fields.voltage,
            uptime: fields.uptime,
            temperature: fields.temperature,
            humidity: fields.humidity,
            pressure: fields.pressure,
            message: fields.message,
        }
    }
}

/// Sensor reading as delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorFrame {
    pub from: String,
    pub node_num: NodeId,
    pub device_id: String,
    pub co2: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub gps_fix: u8,
    pub timestamp: u64,
}

impl SensorFrame {
    pub fn new(node: NodeId, from: String, reading: SensorReading) -> Self {
        Self {
            from,
            node_num: node,
            device_id: reading.device_id,
            co2: reading.co2,
            temperature: reading.temperature,
            humidity: reading.humidity,
            latitude: reading.latitude,
            longitude: reading.longitude,
            gps_fix: reading.gps_fix,
            timestamp: reading.timestamp,
        }
    }
}

/// Every JSON object the push channel sends, discriminated by `"type"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    Ping,
    MergedEvent(MergedEvent),
    SensorData(SensorFrame),
}

impl OutboundFrame {
    /// Encode as the JSON text frame sent over the push channel.
    pub fn to_json(&self) -> Result<String, RelayError> {
        serde_json::to_string(self).map_err(|e| RelayError::Serialization(e.to_string()))
    }
}

/// Workspace-wide error type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("Mesh Interface Error: {0}")]
    Interface(String),

    #[error("Channel Error: {0}")]
    Channel(String),

    #[error("Relay consumer is not running")]
    ConsumerUnavailable,

    #[error("Subscriber Closed: {0}")]
    SubscriberClosed(String),

    #[error("Serialization Error: {0}")]
    Serialization(String),

    #[error("Bind Error: {0}")]
    Bind(String),

    #[error("Configuration Error: {0}")]
    Config(String),
}
