//! Packet interpretation: decoded [`MeshPacket`] → [`NodeEvent`].
//!
//! | Port | Outcome |
//! |---|---|
//! | `TELEMETRY_APP` + device metrics | `Update` with battery (clamped) / voltage / uptime |
//! | `TELEMETRY_APP` + environment metrics | `Update` with temperature / humidity / pressure |
//! | `TEXT_MESSAGE_APP` carrying a firmware reading | `Sensor` |
//! | `TEXT_MESSAGE_APP` otherwise | `Update` with `message` plus the node's metrics snapshot |
//! | anything else | dropped |
//!
//! Packets without a `decoded` section or an originating node id are dropped.

use meshrelay_types::{
    FieldKind, MeshPacket, NodeEvent, NodeId, PartialFields, Payload, PortNum, SensorReading,
    Telemetry, clamp_battery,
};
use serde_json::{Map, Value};
use tracing::trace;

use crate::node_db::NodeDb;

/// Keys a firmware reading must carry.  `fix` and `ts` are optional.
const READING_KEYS: [&str; 6] = ["id", "co2", "t", "h", "lat", "lon"];

/// Interpret one packet against the current node database.
///
/// Returns `None` for anything that is not telemetry.
pub fn interpret(packet: &MeshPacket, nodes: &NodeDb) -> Option<NodeEvent> {
    let decoded = packet.decoded.as_ref()?;
    let Some(node) = packet.from else {
        trace!("dropping packet without originating node id");
        return None;
    };
    let name = nodes.display_name(node);

    match &decoded.portnum {
        PortNum::Telemetry => interpret_telemetry(node, name, decoded.telemetry.as_ref()?),
        PortNum::TextMessage => interpret_text(node, name, decoded.payload.as_ref()?, nodes),
        other => {
            trace!(node = %node, portnum = ?other, "ignoring non-telemetry packet");
            None
        }
    }
}

fn interpret_telemetry(node: NodeId, name: String, telemetry: &Telemetry) -> Option<NodeEvent> {
    let fields = if let Some(device) = &telemetry.device_metrics {
        PartialFields {
            name: Some(name),
            kind: Some(FieldKind::Device),
            battery: device.battery_level.map(clamp_battery),
            voltage: device.voltage,
            uptime: device.uptime_seconds,
            ..Default::default()
        }
    } else if let Some(env) = &telemetry.environment_metrics {
        PartialFields {
            name: Some(name),
            kind: Some(FieldKind::Environment),
            temperature: env.temperature,
            humidity: env.relative_humidity,
            pressure: env.barometric_pressure,
            ..Default::default()
        }
    } else {
        trace!(node = %node, "telemetry packet without device or environment metrics");
        return None;
    };

    Some(NodeEvent::Update { node, fields })
}

fn interpret_text(node: NodeId, name: String, payload: &Payload, nodes: &NodeDb) -> Option<NodeEvent> {
    let text = payload.to_text_lossy();

    if let Some(reading) = parse_sensor_reading(&text) {
        return Some(NodeEvent::Sensor {
            node,
            from: name,
            reading,
        });
    }

    // The snapshot may predate the other fields of this window.
    let snapshot = nodes.get(node).and_then(|info| info.device_metrics.as_ref());
    let fields = PartialFields {
        name: Some(name),
        kind: Some(FieldKind::Text),
        battery: snapshot.and_then(|m| m.battery_level).map(clamp_battery),
        voltage: snapshot.and_then(|m| m.voltage),
        uptime: snapshot.and_then(|m| m.uptime_seconds),
        message: Some(text),
        ..Default::default()
    };

    Some(NodeEvent::Update { node, fields })
}

/// Parse a firmware reading embedded in a text message.
///
/// Returns `None` unless `text` is a JSON object carrying every one of `id`,
/// `co2`, `t`, `h`, `lat` and `lon`.  Values are read leniently: a non-string
/// `id` keeps its JSON text, a measurement that is not a number becomes NaN
/// (emitted as `null`), and `fix` / `ts` fall back to 0.
pub fn parse_sensor_reading(text: &str) -> Option<SensorReading> {
    let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(text) else {
        return None;
    };
    if !READING_KEYS.iter().all(|key| obj.contains_key(*key)) {
        return None;
    }

    Some(SensorReading {
        device_id: match &obj["id"] {
            Value::String(id) => id.clone(),
            other => other.to_string(),
        },
        co2: measurement(&obj, "co2"),
        temperature: measurement(&obj, "t"),
        humidity: measurement(&obj, "h"),
        latitude: measurement(&obj, "lat"),
        longitude: measurement(&obj, "lon"),
        gps_fix: whole(&obj, "fix").min(u64::from(u8::MAX)) as u8,
        timestamp: whole(&obj, "ts"),
    })
}

fn measurement(obj: &Map<String, Value>, key: &str) -> f64 {
    match obj.get(key) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

// Float values truncate toward zero; negatives and non-numbers read as 0.
fn whole(obj: &Map<String, Value>, key: &str) -> u64 {
    obj.get(key)
        .and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f as u64)))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshrelay_types::{DeviceMetrics, NodeInfo};

    fn packet(json: &str) -> MeshPacket {
        serde_json::from_str(json).unwrap()
    }

    fn update_fields(event: Option<NodeEvent>) -> (NodeId, PartialFields) {
        match event {
            Some(NodeEvent::Update { node, fields }) => (node, fields),
            other => panic!("expected Update, got {other:?}"),
        }
    }

    #[test]
    fn device_metrics_are_extracted_and_clamped() {
        let nodes = NodeDb::new();
        let event = interpret(
            &packet(
                r#"{"from":42,"decoded":{"portnum":"TELEMETRY_APP","telemetry":{"deviceMetrics":{"batteryLevel":105,"voltage":4.15,"uptimeSeconds":12}}}}"#,
            ),
            &nodes,
        );
        let (node, fields) = update_fields(event);
        assert_eq!(node, NodeId(42));
        assert_eq!(fields.name.as_deref(), Some("Node-42"));
        assert_eq!(fields.kind, Some(FieldKind::Device));
        assert_eq!(fields.battery, Some(100));
        assert_eq!(fields.voltage, Some(4.15));
        assert_eq!(fields.uptime, Some(12));
        assert_eq!(fields.temperature, None);
    }

    #[test]
    fn environment_metrics_are_extracted() {
        let nodes = NodeDb::new();
        let event = interpret(
            &packet(
                r#"{"from":3,"decoded":{"portnum":"TELEMETRY_APP","telemetry":{"environmentMetrics":{"temperature":22.5,"relativeHumidity":40.1,"barometricPressure":1009.2}}}}"#,
            ),
            &nodes,
        );
        let (_, fields) = update_fields(event);
        assert_eq!(fields.kind, Some(FieldKind::Environment));
        assert_eq!(fields.temperature, Some(22.5));
        assert_eq!(fields.humidity, Some(40.1));
        assert_eq!(fields.pressure, Some(1009.2));
        assert_eq!(fields.battery, None);
    }

    #[test]
    fn missing_sender_is_dropped() {
        let nodes = NodeDb::new();
        let event = interpret(
            &packet(
                r#"{"decoded":{"portnum":"TELEMETRY_APP","telemetry":{"deviceMetrics":{"batteryLevel":50}}}}"#,
            ),
            &nodes,
        );
        assert!(event.is_none());
    }

    #[test]
    fn undecoded_and_foreign_ports_are_ignored() {
        let nodes = NodeDb::new();
        assert!(interpret(&packet(r#"{"from":1}"#), &nodes).is_none());
        assert!(
            interpret(
                &packet(r#"{"from":1,"decoded":{"portnum":"POSITION_APP"}}"#),
                &nodes
            )
            .is_none()
        );
        assert!(
            interpret(
                &packet(r#"{"from":1,"decoded":{"portnum":"TELEMETRY_APP","telemetry":{}}}"#),
                &nodes
            )
            .is_none()
        );
    }

    #[test]
    fn plain_text_becomes_message_with_metrics_snapshot() {
        let mut nodes = NodeDb::new();
        let mut info = NodeInfo::new(NodeId(7));
        info.device_metrics = Some(DeviceMetrics {
            battery_level: Some(101),
            voltage: Some(4.0),
            uptime_seconds: Some(99),
            ..Default::default()
        });
        nodes.insert(info);

        let event = interpret(
            &packet(r#"{"from":7,"decoded":{"portnum":"TEXT_MESSAGE_APP","payload":"hello"}}"#),
            &nodes,
        );
        let (node, fields) = update_fields(event);
        assert_eq!(node, NodeId(7));
        assert_eq!(fields.kind, Some(FieldKind::Text));
        assert_eq!(fields.message.as_deref(), Some("hello"));
        assert_eq!(fields.battery, Some(100));
        assert_eq!(fields.voltage, Some(4.0));
        assert_eq!(fields.uptime, Some(99));
    }

    #[test]
    fn plain_text_without_metadata_has_no_metrics() {
        let nodes = NodeDb::new();
        let event = interpret(
            &packet(r#"{"from":7,"decoded":{"portnum":"TEXT_MESSAGE_APP","payload":"hello"}}"#),
            &nodes,
        );
        let (_, fields) = update_fields(event);
        assert_eq!(fields.message.as_deref(), Some("hello"));
        assert_eq!(fields.battery, None);
        assert_eq!(fields.voltage, None);
        assert_eq!(fields.uptime, None);
    }

    #[test]
    fn invalid_utf8_payload_is_decoded_permissively() {
        let nodes = NodeDb::new();
        let event = interpret(
            &packet(
                r#"{"from":2,"decoded":{"portnum":"TEXT_MESSAGE_APP","payload":[111,107,255]}}"#,
            ),
            &nodes,
        );
        let (_, fields) = update_fields(event);
        assert_eq!(fields.message.as_deref(), Some("ok\u{FFFD}"));
    }

    #[test]
    fn firmware_json_becomes_sensor_reading() {
        let nodes = NodeDb::new();
        let text = r#"{\"id\":\"PicoB-001\",\"ts\":1700000000,\"lat\":34.07,\"lon\":72.64,\"fix\":1,\"co2\":640,\"t\":23.4,\"h\":45.2}"#;
        let line = format!(
            r#"{{"from":9,"decoded":{{"portnum":"TEXT_MESSAGE_APP","payload":"{text}"}}}}"#
        );
        match interpret(&packet(&line), &nodes) {
            Some(NodeEvent::Sensor {
                node,
                from,
                reading,
            }) => {
                assert_eq!(node, NodeId(9));
                assert_eq!(from, "Node-9");
                assert_eq!(reading.device_id, "PicoB-001");
                assert_eq!(reading.co2, 640.0);
                assert_eq!(reading.temperature, 23.4);
                assert_eq!(reading.gps_fix, 1);
                assert_eq!(reading.timestamp, 1_700_000_000);
            }
            other => panic!("expected Sensor, got {other:?}"),
        }
    }

    #[test]
    fn sensor_reading_requires_full_field_set() {
        assert!(parse_sensor_reading(r#"{"id":"x","co2":1,"t":2,"h":3,"lat":4}"#).is_none());
        assert!(parse_sensor_reading("not json").is_none());
        assert!(parse_sensor_reading("[1,2,3]").is_none());

        let reading = parse_sensor_reading(r#"{"id":"x","co2":1,"t":2,"h":3,"lat":4,"lon":5}"#)
            .expect("full field set");
        assert_eq!(reading.gps_fix, 0);
        assert_eq!(reading.timestamp, 0);
    }

    #[test]
    fn partial_firmware_json_is_a_chat_message() {
        let nodes = NodeDb::new();
        let line = r#"{"from":4,"decoded":{"portnum":"TEXT_MESSAGE_APP","payload":"{\"co2\":500}"}}"#;
        let (_, fields) = update_fields(interpret(&packet(line), &nodes));
        assert_eq!(fields.message.as_deref(), Some(r#"{"co2":500}"#));
    }

    #[test]
    fn numeric_device_id_keeps_its_json_text() {
        let reading =
            parse_sensor_reading(r#"{"id":7,"co2":400,"t":20.5,"h":40,"lat":34.07,"lon":72.64}"#)
                .expect("all keys present");
        assert_eq!(reading.device_id, "7");
        assert_eq!(reading.co2, 400.0);
        assert_eq!(reading.longitude, 72.64);
    }

    #[test]
    fn fractional_timestamp_is_truncated() {
        let reading = parse_sensor_reading(
            r#"{"id":"PicoB-001","co2":400,"t":20.5,"h":40,"lat":34.07,"lon":72.64,"ts":1700000000.5,"fix":1.0}"#,
        )
        .expect("all keys present");
        assert_eq!(reading.timestamp, 1_700_000_000);
        assert_eq!(reading.gps_fix, 1);
    }

    #[test]
    fn non_numeric_measurement_still_classifies_as_reading() {
        let reading =
            parse_sensor_reading(r#"{"id":"x","co2":null,"t":"21.5","h":40,"lat":0,"lon":0,"fix":"yes"}"#)
                .expect("all keys present");
        assert!(reading.co2.is_nan());
        assert_eq!(reading.temperature, 21.5);
        assert_eq!(reading.gps_fix, 0);
    }
}
