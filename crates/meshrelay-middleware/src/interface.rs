//! The mesh interface seam.
//!
//! The relay never speaks the radio protocol itself.  A [`MeshInterface`]
//! delivers decoded packets one at a time and keeps the node database up to
//! date; the [`Producer`][crate::producer::Producer] drains it on its own
//! thread.
//!
//! [`JsonLinesInterface`] reads one decoded packet per line, the format
//! radio host tools emit when piping received packets (`--listen` /
//! `--export`).  It does not decode the radio's serial framing: pointing it
//! at a raw serial port yields a parse warning per line and no packets.
//! Pipe a host tool into stdin (`-`) or a FIFO instead.

use std::fs::File;
use std::io::{self, BufRead, BufReader};

use meshrelay_types::{MeshPacket, RelayError};
use tracing::warn;

use crate::node_db::NodeDb;

/// A blocking source of decoded mesh packets.
///
/// # Contract
///
/// * `recv` – blocks until the next packet is available.  `Ok(None)` marks
///   the end of the stream.  Implementations fold node metadata carried by
///   each packet into their [`NodeDb`] before returning it.
/// * `nodes` – metadata lookup used to resolve display names and metric
///   snapshots.
pub trait MeshInterface: Send {
    fn recv(&mut self) -> Result<Option<MeshPacket>, RelayError>;

    fn nodes(&self) -> &NodeDb;
}

/// Newline-delimited JSON packet source.
pub struct JsonLinesInterface<R> {
    reader: R,
    source: String,
    nodes: NodeDb,
    line: Vec<u8>,
}

impl JsonLinesInterface<Box<dyn BufRead + Send>> {
    /// Open the JSON-lines source at `path`; `-` reads stdin.
    ///
    /// `path` may be a file or FIFO.  Its content must already be decoded
    /// packets, one JSON object per line.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Interface`] when the path cannot be opened.
    pub fn open(path: &str) -> Result<Self, RelayError> {
        if path == "-" {
            let reader: Box<dyn BufRead + Send> = Box::new(BufReader::new(io::stdin()));
            return Ok(Self::from_reader(reader, "stdin"));
        }

        let file = File::open(path)
            .map_err(|e| RelayError::Interface(format!("failed to open {path}: {e}")))?;
        let reader: Box<dyn BufRead + Send> = Box::new(BufReader::new(file));
        Ok(Self::from_reader(reader, path))
    }
}

impl<R: BufRead + Send> JsonLinesInterface<R> {
    pub fn from_reader(reader: R, source: impl Into<String>) -> Self {
        Self {
            reader,
            source: source.into(),
            nodes: NodeDb::new(),
            line: Vec::new(),
        }
    }

    /// Seed the node database (builder-style).
    pub fn with_nodes(mut self, nodes: NodeDb) -> Self {
        self.nodes = nodes;
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl<R: BufRead + Send> MeshInterface for JsonLinesInterface<R> {
    fn recv(&mut self) -> Result<Option<MeshPacket>, RelayError> {
        loop {
            self.line.clear();
            let n = self
                .reader
                .read_until(b'\n', &mut self.line)
                .map_err(|e| RelayError::Interface(format!("read error on {}: {e}", self.source)))?;
            if n == 0 {
                return Ok(None);
            }

            let line = self.line.trim_ascii();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_slice::<MeshPacket>(line) {
                Ok(packet) => {
                    self.nodes.observe(&packet);
                    return Ok(Some(packet));
                }
                Err(e) => {
                    warn!(source = %self.source, error = %e, "skipping malformed packet line");
                }
            }
        }
    }

    fn nodes(&self) -> &NodeDb {
        &self.nodes
    }
}
