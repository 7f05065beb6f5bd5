//! Protocol clients for the sensing nodes
//!
//! The controller holds one long-lived socket per node. [`NodeClient`] is
//! the request/response plumbing for a single node; [`SensorNet`] fans the
//! clients into one [`SensorArray`] the calibration sweep and the sense
//! loop consume, scaling each node's raw counts by its configured
//! calibration constant and tagging the signal field per node kind.
//!
//! A node that misbehaves - dead socket, timeout, malformed reply -
//! surfaces as `ControlError::NodeFault { index }` so the sense loop can
//! tear that node down and delete its gain row without losing the rest of
//! the room.

use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use thiserror::Error;

use lumigrid_core::errors::{ControlError, ControlResult};
use lumigrid_core::protocol::{Request, Response};
use lumigrid_core::traits::{NodeSignal, SensorArray, SensorSnapshot};

use crate::config::{NodeConfig, NodeKind};

/// Errors while bringing the sensing net up
#[derive(Error, Debug)]
pub enum NetError {
    /// A node could not be reached or failed the handshake
    #[error("Node {addr} unreachable: {source}")]
    Connect {
        /// Configured address of the failing node
        addr: String,
        /// Underlying socket or protocol failure
        source: io::Error,
    },
}

/// One long-lived connection to a sensing node
pub struct NodeClient {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    hostname: String,
}

impl NodeClient {
    /// Connects and performs the `Check connection` handshake
    pub fn connect(
        addr: &str,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> io::Result<Self> {
        let sockaddr = addr.to_socket_addrs()?.next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "address did not resolve")
        })?;
        let stream = TcpStream::connect_timeout(&sockaddr, connect_timeout)?;
        stream.set_read_timeout(Some(read_timeout))?;
        stream.set_write_timeout(Some(read_timeout))?;
        stream.set_nodelay(true)?;

        let writer = stream.try_clone()?;
        let mut client = Self {
            reader: BufReader::new(stream),
            writer,
            hostname: String::new(),
        };

        match client.request(Request::CheckConnection)? {
            Response::Initialized(hostname) => client.hostname = hostname.as_str().to_owned(),
            other => return Err(violation(&other)),
        }
        Ok(client)
    }

    /// Hostname the node announced at handshake
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Requests one raw (light counts, signal) pair
    pub fn read_raw(&mut self) -> io::Result<(f32, i32)> {
        match self.request(Request::Read)? {
            Response::Reading { light, signal } => Ok((light, signal)),
            other => Err(violation(&other)),
        }
    }

    /// Best-effort orderly teardown
    pub fn disconnect(mut self) {
        let _ = self.request(Request::Disconnect);
    }

    fn request(&mut self, request: Request) -> io::Result<Response> {
        self.writer.write_all(request.as_line().as_bytes())?;
        self.writer.write_all(b"\n")?;

        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "node closed the connection",
            ));
        }
        Response::parse(&line).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

fn violation(response: &Response) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("unexpected reply: {response:?}"),
    )
}

/// Per-node scaling and interpretation retained alongside each client
struct Endpoint {
    kind: NodeKind,
    light_calibration: f32,
}

/// All sensing nodes behind one [`SensorArray`]
pub struct SensorNet {
    clients: Vec<NodeClient>,
    endpoints: Vec<Endpoint>,
}

impl SensorNet {
    /// Connects to every configured node
    ///
    /// On any failure the nodes already connected are torn down before the
    /// error is returned, so a half-built net never lingers.
    pub fn connect(
        nodes: &[NodeConfig],
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self, NetError> {
        let mut net = Self {
            clients: Vec::with_capacity(nodes.len()),
            endpoints: Vec::with_capacity(nodes.len()),
        };

        for node in nodes {
            match NodeClient::connect(&node.addr, connect_timeout, read_timeout) {
                Ok(client) => {
                    log::info!("connected to {} at {}", client.hostname(), node.addr);
                    net.clients.push(client);
                    net.endpoints.push(Endpoint {
                        kind: node.kind,
                        light_calibration: node.light_calibration,
                    });
                }
                Err(source) => {
                    net.shutdown();
                    return Err(NetError::Connect {
                        addr: node.addr.clone(),
                        source,
                    });
                }
            }
        }
        Ok(net)
    }

    /// Net over already-connected clients (tests, custom bring-up)
    pub fn from_clients(clients: Vec<NodeClient>, configs: &[NodeConfig]) -> Self {
        let endpoints = configs
            .iter()
            .map(|node| Endpoint {
                kind: node.kind,
                light_calibration: node.light_calibration,
            })
            .collect();
        Self { clients, endpoints }
    }

    /// Hostnames in node order
    pub fn hostnames(&self) -> impl Iterator<Item = &str> {
        self.clients.iter().map(NodeClient::hostname)
    }

    /// Tears down one node; later nodes shift down one index
    pub fn drop_node(&mut self, index: usize) {
        if index >= self.clients.len() {
            return;
        }
        let client = self.clients.remove(index);
        self.endpoints.remove(index);
        log::warn!("dropping node {} ({})", index, client.hostname());
        client.disconnect();
    }

    /// Disconnects every node
    pub fn shutdown(&mut self) {
        for client in self.clients.drain(..) {
            client.disconnect();
        }
        self.endpoints.clear();
    }
}

impl SensorArray for SensorNet {
    fn sensor_count(&self) -> usize {
        self.clients.len()
    }

    fn read(&mut self) -> ControlResult<SensorSnapshot> {
        let mut illuminance = Vec::with_capacity(self.clients.len());
        let mut signals = Vec::with_capacity(self.clients.len());

        for (index, (client, endpoint)) in
            self.clients.iter_mut().zip(self.endpoints.iter()).enumerate()
        {
            let (light, signal) = client.read_raw().map_err(|e| {
                log::warn!("node {} ({}) read failed: {e}", index, client.hostname());
                ControlError::NodeFault { index }
            })?;

            illuminance.push(light * endpoint.light_calibration);
            signals.push(match endpoint.kind {
                NodeKind::Stationary => NodeSignal::Occupancy(signal != 0),
                NodeKind::Portable => NodeSignal::TargetLux(signal as f32),
            });
        }

        Ok(SensorSnapshot {
            illuminance,
            signals,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    /// Minimal scripted node: handshake, then canned readings
    fn spawn_node(hostname: &'static str, light: i32, signal: i32) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut writer = stream.try_clone().unwrap();
            let mut reader = BufReader::new(stream);
            let mut line = String::new();
            loop {
                line.clear();
                if reader.read_line(&mut line).unwrap_or(0) == 0 {
                    return;
                }
                let reply = match line.trim() {
                    "Check connection" => format!("{hostname} is Initialized\n"),
                    "Read" => format!("{light} {signal}\n"),
                    _ => {
                        writer.write_all(b"Goodbye\n").unwrap();
                        return;
                    }
                };
                writer.write_all(reply.as_bytes()).unwrap();
            }
        });
        addr
    }

    fn node_config(addr: std::net::SocketAddr, kind: NodeKind, scale: f32) -> NodeConfig {
        NodeConfig {
            addr: addr.to_string(),
            kind,
            light_calibration: scale,
        }
    }

    #[test]
    fn handshake_and_scaled_read() {
        let stationary = spawn_node("omega-a", 200, 1);
        let portable = spawn_node("omega-b", 100, 175);
        let configs = vec![
            node_config(stationary, NodeKind::Stationary, 0.5),
            node_config(portable, NodeKind::Portable, 0.25),
        ];

        let mut net = SensorNet::connect(
            &configs,
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .unwrap();

        assert_eq!(
            net.hostnames().collect::<Vec<_>>(),
            vec!["omega-a", "omega-b"]
        );

        let snapshot = net.read().unwrap();
        assert_eq!(snapshot.illuminance, vec![100.0, 25.0]);
        assert_eq!(
            snapshot.signals,
            vec![NodeSignal::Occupancy(true), NodeSignal::TargetLux(175.0)]
        );
        net.shutdown();
    }

    #[test]
    fn unreachable_node_fails_bring_up() {
        let configs = vec![node_config(
            "127.0.0.1:1".parse().unwrap(),
            NodeKind::Stationary,
            0.5,
        )];
        let err = SensorNet::connect(
            &configs,
            Duration::from_millis(200),
            Duration::from_millis(200),
        );
        assert!(matches!(err, Err(NetError::Connect { .. })));
    }

    #[test]
    fn dead_node_reports_its_index() {
        let alive = spawn_node("omega-a", 10, 0);
        let dying = spawn_node("omega-b", 10, 0);
        let configs = vec![
            node_config(alive, NodeKind::Stationary, 1.0),
            node_config(dying, NodeKind::Stationary, 1.0),
        ];

        let mut net = SensorNet::connect(
            &configs,
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .unwrap();

        // violation makes the scripted node answer Goodbye and hang up
        net.clients[1].writer.write_all(b"Reboot\n").unwrap();
        let mut goodbye = String::new();
        net.clients[1].reader.read_line(&mut goodbye).unwrap();

        let err = net.read();
        assert_eq!(err, Err(ControlError::NodeFault { index: 1 }));

        net.drop_node(1);
        assert_eq!(net.sensor_count(), 1);
        assert!(net.read().is_ok());
        net.shutdown();
    }
}
