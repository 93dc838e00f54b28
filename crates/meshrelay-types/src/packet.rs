//! Decoded mesh-radio packets, in the JSON shape the radio host software
//! emits for every received frame.
//!
//! Only the parts the relay consumes are modelled; unknown keys are ignored.

use serde::Deserialize;

use crate::NodeId;

/// One received packet.  `decoded` is absent for frames the radio could not
/// decrypt.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MeshPacket {
    #[serde(default)]
    pub from: Option<NodeId>,
    #[serde(default)]
    pub to: Option<NodeId>,
    #[serde(default)]
    pub decoded: Option<Decoded>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Decoded {
    pub portnum: PortNum,
    #[serde(default)]
    pub payload: Option<Payload>,
    #[serde(default)]
    pub telemetry: Option<Telemetry>,
    #[serde(default)]
    pub user: Option<User>,
}

/// Application-port tag discriminating the payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum PortNum {
    Telemetry,
    TextMessage,
    NodeInfo,
    Other(String),
}

impl From<String> for PortNum {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "TELEMETRY_APP" => PortNum::Telemetry,
            "TEXT_MESSAGE_APP" => PortNum::TextMessage,
            "NODEINFO_APP" => PortNum::NodeInfo,
            _ => PortNum::Other(tag),
        }
    }
}

/// Raw payload; either already text or a byte array.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Text(String),
    Bytes(Vec<u8>),
}

impl Payload {
    /// Decode as UTF-8, substituting U+FFFD for invalid sequences.
    pub fn to_text_lossy(&self) -> String {
        match self {
            Payload::Text(text) => text.clone(),
            Payload::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Telemetry {
    #[serde(default)]
    pub device_metrics: Option<DeviceMetrics>,
    #[serde(default)]
    pub environment_metrics: Option<EnvironmentMetrics>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceMetrics {
    #[serde(default)]
    pub battery_level: Option<u32>,
    #[serde(default)]
    pub voltage: Option<f64>,
    #[serde(default)]
    pub uptime_seconds: Option<u64>,
    #[serde(default)]
    pub channel_utilization: Option<f64>,
    #[serde(default)]
    pub air_util_tx: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentMetrics {
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub relative_humidity: Option<f64>,
    #[serde(default)]
    pub barometric_pressure: Option<f64>,
}

/// Owner identity broadcast in node-info packets.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default)]
    pub long_name: Option<String>,
    #[serde(default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub hw_model: Option<String>,
}

/// Last known metadata for one node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeInfo {
    pub num: NodeId,
    pub user: Option<User>,
    pub device_metrics: Option<DeviceMetrics>,
}

impl NodeInfo {
    pub fn new(num: NodeId) -> Self {
        Self {
            num,
            user: None,
            device_metrics: None,
        }
    }

    pub fn long_name(&self) -> Option<&str> {
        self.user.as_ref()?.long_name.as_deref()
    }
}
