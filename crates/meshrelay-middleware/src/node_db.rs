//! [`NodeDb`] – last known metadata for every node heard on the mesh.

use std::collections::HashMap;

use meshrelay_types::{MeshPacket, NodeId, NodeInfo, PortNum};

/// Node metadata keyed by node number.
///
/// Updated by the interface from node-info packets (owner names) and from
/// device-metrics telemetry (battery / voltage / uptime snapshot).
#[derive(Debug, Clone, Default)]
pub struct NodeDb {
    nodes: HashMap<NodeId, NodeInfo>,
}

impl NodeDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, node: NodeId) -> Option<&NodeInfo> {
        self.nodes.get(&node)
    }

    /// Insert or replace the metadata for `info.num`.
    pub fn insert(&mut self, info: NodeInfo) {
        self.nodes.insert(info.num, info);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Long name of `node`, or `Node-<id>` when none is known.
    pub fn display_name(&self, node: NodeId) -> String {
        self.get(node)
            .and_then(NodeInfo::long_name)
            .map(str::to_owned)
            .unwrap_or_else(|| node.fallback_name())
    }

    /// Fold whatever metadata `packet` carries into the database.
    pub fn observe(&mut self, packet: &MeshPacket) {
        let (Some(node), Some(decoded)) = (packet.from, packet.decoded.as_ref()) else {
            return;
        };

        match decoded.portnum {
            PortNum::NodeInfo => {
                if let Some(user) = &decoded.user {
                    self.entry(node).user = Some(user.clone());
                }
            }
            PortNum::Telemetry => {
                if let Some(metrics) = decoded
                    .telemetry
                    .as_ref()
                    .and_then(|t| t.device_metrics.as_ref())
                {
                    self.entry(node).device_metrics = Some(metrics.clone());
                }
            }
            _ => {}
        }
    }

    fn entry(&mut self, node: NodeId) -> &mut NodeInfo {
        self.nodes.entry(node).or_insert_with(|| NodeInfo::new(node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(json: &str) -> MeshPacket {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn unknown_node_gets_fallback_name() {
        let db = NodeDb::new();
        assert_eq!(db.display_name(NodeId(12)), "Node-12");
    }

    #[test]
    fn node_info_packet_records_long_name() {
        let mut db = NodeDb::new();
        db.observe(&packet(
            r#"{"from":12,"decoded":{"portnum":"NODEINFO_APP","user":{"longName":"Hilltop","shortName":"HT"}}}"#,
        ));
        assert_eq!(db.display_name(NodeId(12)), "Hilltop");
        assert_eq!(db.len(), 1);
    }

    #[test]
    fn device_metrics_update_snapshot_but_keep_name() {
        let mut db = NodeDb::new();
        db.observe(&packet(
            r#"{"from":5,"decoded":{"portnum":"NODEINFO_APP","user":{"longName":"Valley"}}}"#,
        ));
        db.observe(&packet(
            r#"{"from":5,"decoded":{"portnum":"TELEMETRY_APP","telemetry":{"deviceMetrics":{"batteryLevel":77,"voltage":3.8}}}}"#,
        ));

        let info = db.get(NodeId(5)).unwrap();
        assert_eq!(info.long_name(), Some("Valley"));
        assert_eq!(info.device_metrics.as_ref().unwrap().battery_level, Some(77));
    }

    #[test]
    fn environment_telemetry_and_text_do_not_create_entries() {
        let mut db = NodeDb::new();
        db.observe(&packet(
            r#"{"from":8,"decoded":{"portnum":"TELEMETRY_APP","telemetry":{"environmentMetrics":{"temperature":20.0}}}}"#,
        ));
        db.observe(&packet(
            r#"{"from":8,"decoded":{"portnum":"TEXT_MESSAGE_APP","payload":"hi"}}"#,
        ));
        assert!(db.is_empty());
    }

    #[test]
    fn packet_without_sender_is_ignored() {
        let mut db = NodeDb::new();
        db.observe(&packet(
            r#"{"decoded":{"portnum":"NODEINFO_APP","user":{"longName":"Ghost"}}}"#,
        ));
        assert!(db.is_empty());
    }
}
