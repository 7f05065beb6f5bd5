//! TCP responder serving the controller's line protocol
//!
//! One controller connection at a time: the responder accepts, answers
//! requests line-by-line, and returns to `accept` after a disconnect. A
//! line that does not parse is a protocol violation and is treated exactly
//! like a disconnect - say `Goodbye`, drop the socket, re-listen.
//!
//! The `<signal>` field of a `Read` reply comes from a [`SignalSource`]:
//! stationary nodes report the occupancy decision, portable nodes the
//! user's preference lux. The controller's configuration decides how the
//! integer is interpreted.

use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;

use lumigrid_core::occupancy::OccupancyTracker;
use lumigrid_core::protocol::{Hostname, Request, Response};

use crate::drivers::{LastKnownLight, LightSensor};

/// Responder failures
#[derive(Error, Debug)]
pub enum NodeError {
    /// Socket setup or accept failed
    #[error("Responder I/O failed: {0}")]
    Io(#[from] io::Error),

    /// Configured hostname exceeds the protocol's line capacity
    #[error("Hostname too long for the wire protocol")]
    HostnameTooLong,
}

/// Responder settings
#[derive(Debug, Clone)]
pub struct ResponderConfig {
    /// Address to listen on
    pub bind: String,
    /// Hostname announced in the connection check
    pub hostname: String,
    /// Read timeout on an accepted connection; a silent controller is
    /// treated as disconnected
    pub read_timeout: Duration,
}

impl ResponderConfig {
    /// Config with the default 30s read timeout
    pub fn new(bind: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            bind: bind.into(),
            hostname: hostname.into(),
            read_timeout: Duration::from_secs(30),
        }
    }
}

/// Source of the second field in a `Read` reply
pub trait SignalSource {
    /// Current signal value, encoded as the protocol's integer field
    fn signal(&mut self) -> i32;
}

/// Stationary-node signal: the shared tracker's occupancy decision
pub struct OccupancySignal<const N: usize> {
    tracker: Arc<Mutex<OccupancyTracker<N>>>,
}

impl<const N: usize> OccupancySignal<N> {
    /// Signal over the tracker the motion poller writes
    pub fn new(tracker: Arc<Mutex<OccupancyTracker<N>>>) -> Self {
        Self { tracker }
    }
}

impl<const N: usize> SignalSource for OccupancySignal<N> {
    fn signal(&mut self) -> i32 {
        let occupied = self
            .tracker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_occupied();
        i32::from(occupied)
    }
}

/// Portable-node signal: the user's preference lux (0 = no requirement)
pub struct TargetLuxSignal {
    preference: Arc<Mutex<f32>>,
}

impl TargetLuxSignal {
    /// Signal over a shared preference cell the node's UI writes
    pub fn new(preference: Arc<Mutex<f32>>) -> Self {
        Self { preference }
    }
}

impl SignalSource for TargetLuxSignal {
    fn signal(&mut self) -> i32 {
        let lux = *self.preference.lock().unwrap_or_else(PoisonError::into_inner);
        lux.max(0.0).round() as i32
    }
}

/// Serves the wire protocol to one controller at a time
pub struct Responder {
    config: ResponderConfig,
    hostname: Hostname,
}

impl Responder {
    /// Builds a responder, validating the announced hostname up front
    pub fn new(config: ResponderConfig) -> Result<Self, NodeError> {
        let mut hostname = Hostname::new();
        hostname
            .push_str(&config.hostname)
            .map_err(|_| NodeError::HostnameTooLong)?;
        Ok(Self { config, hostname })
    }

    /// Binds the configured address and serves until `stop` is set
    ///
    /// `stop` is checked between connections; an in-flight connection runs
    /// until the controller disconnects or times out.
    pub fn serve<L, S>(
        &self,
        light: &mut LastKnownLight<L>,
        signal: &mut S,
        stop: &AtomicBool,
    ) -> Result<(), NodeError>
    where
        L: LightSensor,
        S: SignalSource,
    {
        let listener = TcpListener::bind(self.config.bind.as_str())?;
        self.serve_on(listener, light, signal, stop)
    }

    /// Serves on a pre-bound listener; see [`Responder::serve`]
    pub fn serve_on<L, S>(
        &self,
        listener: TcpListener,
        light: &mut LastKnownLight<L>,
        signal: &mut S,
        stop: &AtomicBool,
    ) -> Result<(), NodeError>
    where
        L: LightSensor,
        S: SignalSource,
    {
        log::info!(
            "{} listening on {}",
            self.hostname.as_str(),
            listener.local_addr()?
        );

        while !stop.load(Ordering::Acquire) {
            let (stream, peer) = listener.accept()?;
            log::info!("controller connected from {peer}");

            match self.serve_client(stream, light, signal) {
                Ok(()) => log::info!("controller disconnected; re-listening"),
                Err(e) => log::warn!("connection dropped ({e}); re-listening"),
            }
        }
        Ok(())
    }

    /// Answers one connection until disconnect, violation, or socket error
    fn serve_client<L, S>(
        &self,
        stream: TcpStream,
        light: &mut LastKnownLight<L>,
        signal: &mut S,
    ) -> io::Result<()>
    where
        L: LightSensor,
        S: SignalSource,
    {
        stream.set_read_timeout(Some(self.config.read_timeout))?;
        stream.set_write_timeout(Some(self.config.read_timeout))?;
        let mut writer = stream.try_clone()?;
        let mut reader = BufReader::new(stream);
        let mut line = String::new();

        loop {
            line.clear();
            let request = if reader.read_line(&mut line)? == 0 {
                // controller closed the socket without a farewell
                Some(Request::Disconnect)
            } else {
                Request::parse(&line)
            };

            match request {
                Some(Request::CheckConnection) => {
                    send(&mut writer, &Response::Initialized(self.hostname.clone()))?;
                }
                Some(Request::Read) => {
                    send(
                        &mut writer,
                        &Response::Reading {
                            light: light.read(),
                            signal: signal.signal(),
                        },
                    )?;
                }
                Some(Request::Disconnect) => {
                    send(&mut writer, &Response::Goodbye)?;
                    return Ok(());
                }
                None => {
                    log::warn!("protocol violation: {:?}", line.trim());
                    send(&mut writer, &Response::Goodbye)?;
                    return Ok(());
                }
            }
        }
    }
}

fn send(writer: &mut TcpStream, response: &Response) -> io::Result<()> {
    let line = response
        .encode()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::DriverError;
    use std::io::BufRead;
    use std::thread;

    struct FixedLight(f32);

    impl LightSensor for FixedLight {
        fn read_illuminance(&mut self) -> Result<f32, DriverError> {
            Ok(self.0)
        }
    }

    struct FixedSignal(i32);

    impl SignalSource for FixedSignal {
        fn signal(&mut self) -> i32 {
            self.0
        }
    }

    fn exchange(writer: &mut TcpStream, reader: &mut impl BufRead, request: &str) -> String {
        writer.write_all(request.as_bytes()).unwrap();
        writer.write_all(b"\n").unwrap();
        let mut reply = String::new();
        reader.read_line(&mut reply).unwrap();
        reply.trim_end().to_owned()
    }

    /// Full session over loopback: handshake, read, disconnect
    #[test]
    fn serves_protocol_session() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let stop = Arc::new(AtomicBool::new(false));

        let server = {
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let responder =
                    Responder::new(ResponderConfig::new("unused", "omega-test")).unwrap();
                let mut light = LastKnownLight::new(FixedLight(87.0));
                let mut signal = FixedSignal(1);
                responder
                    .serve_on(listener, &mut light, &mut signal, &stop)
                    .unwrap();
            })
        };

        let stream = TcpStream::connect(addr).unwrap();
        let mut writer = stream.try_clone().unwrap();
        let mut reader = BufReader::new(stream);

        assert_eq!(
            exchange(&mut writer, &mut reader, "Check connection"),
            "omega-test is Initialized"
        );
        assert_eq!(exchange(&mut writer, &mut reader, "Read"), "87 1");

        // stop before the farewell so the accept loop exits cleanly
        stop.store(true, Ordering::Release);
        assert_eq!(exchange(&mut writer, &mut reader, "disconnect"), "Goodbye");

        server.join().unwrap();
    }

    #[test]
    fn violation_is_answered_with_goodbye() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let stop = Arc::new(AtomicBool::new(false));

        let server = {
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let responder =
                    Responder::new(ResponderConfig::new("unused", "omega-test")).unwrap();
                let mut light = LastKnownLight::new(FixedLight(0.0));
                let mut signal = FixedSignal(0);
                let _ = responder.serve_on(listener, &mut light, &mut signal, &stop);
            })
        };

        let stream = TcpStream::connect(addr).unwrap();
        let mut writer = stream.try_clone().unwrap();
        let mut reader = BufReader::new(stream);

        // one round trip so the server is inside the session before stop is
        // set; otherwise the accept loop can exit without serving us at all
        let _ = exchange(&mut writer, &mut reader, "Check connection");

        stop.store(true, Ordering::Release);
        assert_eq!(exchange(&mut writer, &mut reader, "Reboot"), "Goodbye");

        server.join().unwrap();
    }

    #[test]
    fn occupancy_signal_reports_tracker_decision() {
        let tracker = Arc::new(Mutex::new(OccupancyTracker::<3>::new()));
        let mut signal = OccupancySignal::new(Arc::clone(&tracker));
        assert_eq!(signal.signal(), 0);

        tracker.lock().unwrap().record(true);
        assert_eq!(signal.signal(), 1);
    }

    #[test]
    fn target_lux_signal_rounds_and_floors_at_zero() {
        let preference = Arc::new(Mutex::new(175.6));
        let mut signal = TargetLuxSignal::new(Arc::clone(&preference));
        assert_eq!(signal.signal(), 176);

        *preference.lock().unwrap() = -10.0;
        assert_eq!(signal.signal(), 0);
    }

    #[test]
    fn oversized_hostname_is_rejected_up_front() {
        let config = ResponderConfig::new(
            "unused",
            "a-hostname-well-beyond-the-thirty-two-byte-protocol-cap",
        );
        assert!(matches!(
            Responder::new(config),
            Err(NodeError::HostnameTooLong)
        ));
    }
}
