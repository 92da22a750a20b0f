//! Serial-backed device bridge.
//!
//! [`DeviceBridge::connect`] opens the serial line and spawns the read loop.
//! The loop splits the byte stream into newline-terminated frames, records
//! every decodable `arduino_state` frame in the cache, and broadcasts every
//! frame (decodable or not) unchanged. Read failures are retried with an
//! exponential [`Backoff`]; [`DeviceBridge::disconnect`] cancels the loop.

use std::io::{self, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use nodelight_core::{
    Broadcaster, Device, DeviceKind, Frame, LightCommand, LightMode, MessageHandler, NodeState,
    NodeStateSource,
};
use parking_lot::Mutex;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::cache::SharedStateCache;
use crate::errors::DeviceError;
use crate::framing::LineSplitter;

/// Read half of a device link.
pub type DeviceReader = Box<dyn Read + Send>;
/// Write half of a device link.
pub type DeviceWriter = Box<dyn Write + Send>;

/// Quiet reads that come back sooner than this are padded out to it.
const MIN_IDLE_POLL: Duration = Duration::from_millis(10);

/// Serial line and read-loop parameters.
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    /// Serial baud rate.
    pub baud_rate: u32,
    /// Per-read timeout.
    pub read_timeout: Duration,
    /// Bytes requested per read.
    pub read_chunk_bytes: usize,
    /// Longest unterminated line kept before flushing.
    pub max_line_bytes: usize,
    /// First delay after a read failure.
    pub backoff_initial: Duration,
    /// Delay ceiling.
    pub backoff_max: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            read_timeout: Duration::from_secs(1),
            read_chunk_bytes: 128,
            max_line_bytes: 4096,
            backoff_initial: Duration::from_millis(100),
            backoff_max: Duration::from_secs(5),
        }
    }
}

/// An open link: the write half plus the handle on the read loop.
struct Connection {
    writer: Arc<Mutex<DeviceWriter>>,
    cancel: CancellationToken,
    read_task: JoinHandle<()>,
}

/// Bridge between the serial device and the broadcast hub.
pub struct DeviceBridge {
    config: BridgeConfig,
    broadcaster: Arc<dyn Broadcaster>,
    states: SharedStateCache,
    active: Arc<AtomicBool>,
    connection: Mutex<Option<Connection>>,
}

impl DeviceBridge {
    /// Create an inactive bridge publishing through `broadcaster`.
    pub fn new(broadcaster: Arc<dyn Broadcaster>, config: BridgeConfig) -> Self {
        Self {
            config,
            broadcaster,
            states: SharedStateCache::new(),
            active: Arc::new(AtomicBool::new(false)),
            connection: Mutex::new(None),
        }
    }

    /// Open the serial device at `address` and start the read loop.
    ///
    /// On failure the bridge stays inactive and every command is a no-op.
    /// Must be called from within a Tokio runtime.
    pub fn connect(&self, address: &str) -> Result<(), DeviceError> {
        let connection_error = |source| DeviceError::Connection {
            address: address.to_string(),
            source,
        };
        let port = serialport::new(address, self.config.baud_rate)
            .timeout(self.config.read_timeout)
            .open()
            .map_err(connection_error)?;
        let reader = port.try_clone().map_err(connection_error)?;

        self.attach(Box::new(reader), Box::new(port));
        info!(address, baud_rate = self.config.baud_rate, "device connected");
        Ok(())
    }

    /// Start bridging over an already-open link, replacing any previous one.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn attach(&self, reader: DeviceReader, writer: DeviceWriter) {
        let mut slot = self.connection.lock();
        if let Some(previous) = slot.take() {
            previous.cancel.cancel();
        }

        let cancel = CancellationToken::new();
        self.active.store(true, Ordering::Release);

        let read_loop = ReadLoop {
            broadcaster: Arc::clone(&self.broadcaster),
            states: self.states.clone(),
            active: Arc::clone(&self.active),
            cancel: cancel.clone(),
            splitter: LineSplitter::new(self.config.max_line_bytes),
            backoff: Backoff::new(self.config.backoff_initial, self.config.backoff_max),
            chunk: self.config.read_chunk_bytes.max(1),
        };
        let read_task = tokio::spawn(read_loop.run(reader));

        *slot = Some(Connection {
            writer: Arc::new(Mutex::new(writer)),
            cancel,
            read_task,
        });
    }

    /// Mark the bridge inactive and close the link.
    ///
    /// The read loop observes the cancellation and exits without waiting for
    /// its in-flight read.
    pub fn disconnect(&self) {
        let _ = self.take_connection();
    }

    /// [`disconnect`](Self::disconnect), then wait for the read loop to exit.
    pub async fn disconnect_and_wait(&self) {
        if let Some(read_task) = self.take_connection() {
            if let Err(e) = read_task.await {
                warn!(error = %e, "device read loop ended abnormally");
            }
        }
    }

    fn take_connection(&self) -> Option<JoinHandle<()>> {
        self.active.store(false, Ordering::Release);
        let connection = self.connection.lock().take()?;
        connection.cancel.cancel();
        info!("device disconnected");
        Some(connection.read_task)
    }

    /// Whether a link is open.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Write a raw newline-terminated command. No-op without a link.
    pub fn send_command(&self, raw: &str) -> Result<(), DeviceError> {
        let mut line = Vec::with_capacity(raw.len() + 1);
        line.extend_from_slice(raw.as_bytes());
        line.push(b'\n');
        self.write_line(&line)
    }

    /// Encode a `light_control` frame and write it to the device.
    ///
    /// No-op while the bridge is inactive.
    pub fn control_light(
        &self,
        node_id: &str,
        command: LightMode,
        color: Option<&str>,
    ) -> Result<(), DeviceError> {
        if !self.is_active() {
            return Ok(());
        }
        let frame = Frame::LightControl(LightCommand::new(
            node_id,
            command,
            color.map(str::to_string),
        ));
        let mut line = serde_json::to_vec(&frame)?;
        line.push(b'\n');
        self.write_line(&line)
    }

    /// Decode a viewer's `light_control` frame and apply it.
    fn forward(&self, frame: &[u8]) -> Result<(), DeviceError> {
        let command = LightCommand::decode(frame)?;
        self.control_light(&command.node_id, command.command, command.color.as_deref())
    }

    fn write_line(&self, line: &[u8]) -> Result<(), DeviceError> {
        let writer = match self.connection.lock().as_ref() {
            Some(connection) => Arc::clone(&connection.writer),
            None => return Ok(()),
        };
        run_blocking(|| {
            let mut writer = writer.lock();
            writer.write_all(line)?;
            writer.flush()
        })?;
        Ok(())
    }
}

/// Run a blocking device call. On a multi-threaded runtime the worker's
/// other tasks are handed off first so a stalled port cannot starve them.
fn run_blocking<T>(f: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

impl MessageHandler for DeviceBridge {
    fn handle_message(&self, frame: &[u8]) {
        match self.forward(frame) {
            Ok(()) => {}
            Err(e @ DeviceError::Decode(_)) => {
                warn!(error = %e, "dropping invalid light control frame");
            }
            Err(e) => warn!(error = %e, "failed to control light"),
        }
    }
}

impl NodeStateSource for DeviceBridge {
    fn node_state(&self, node_id: &str) -> Option<NodeState> {
        self.states.get(node_id)
    }

    fn all_node_states(&self) -> Vec<NodeState> {
        self.states.snapshot()
    }
}

impl Device for DeviceBridge {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Serial
    }
}

/// State owned by the read-loop task.
struct ReadLoop {
    broadcaster: Arc<dyn Broadcaster>,
    states: SharedStateCache,
    active: Arc<AtomicBool>,
    cancel: CancellationToken,
    splitter: LineSplitter,
    backoff: Backoff,
    chunk: usize,
}

impl ReadLoop {
    async fn run(mut self, mut reader: DeviceReader) {
        let mut buf = vec![0u8; self.chunk];

        while self.active.load(Ordering::Acquire) {
            let started = Instant::now();
            let read = tokio::task::spawn_blocking(move || {
                let result = reader.read(&mut buf);
                (reader, buf, result)
            });
            let joined = tokio::select! {
                () = self.cancel.cancelled() => break,
                joined = read => joined,
            };
            let (returned_reader, returned_buf, result) = match joined {
                Ok(parts) => parts,
                Err(e) => {
                    warn!(error = %e, "device read task failed");
                    break;
                }
            };
            reader = returned_reader;
            buf = returned_buf;

            match result {
                Ok(0) => {
                    let eof = io::Error::from(io::ErrorKind::UnexpectedEof);
                    if !self.wait_before_retry(&eof).await {
                        break;
                    }
                }
                Ok(n) => {
                    self.backoff.reset();
                    for line in self.splitter.push(&buf[..n]) {
                        self.dispatch(line);
                    }
                }
                // Serial reads time out when the device is quiet.
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut
                            | io::ErrorKind::WouldBlock
                            | io::ErrorKind::Interrupted
                    ) =>
                {
                    if !self.pause_until(started + MIN_IDLE_POLL).await {
                        break;
                    }
                }
                Err(e) => {
                    if !self.wait_before_retry(&e).await {
                        break;
                    }
                }
            }
        }

        debug!("device read loop stopped");
    }

    /// Sleep for the next backoff delay. Returns `false` if cancelled.
    async fn wait_before_retry(&mut self, error: &io::Error) -> bool {
        let delay = self.backoff.next_delay();
        warn!(
            error = %error,
            retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "device read failed"
        );
        self.pause_until(Instant::now() + delay).await
    }

    /// Sleep until `deadline` unless cancelled first. Returns `false` if cancelled.
    async fn pause_until(&self, deadline: Instant) -> bool {
        tokio::select! {
            () = self.cancel.cancelled() => false,
            () = tokio::time::sleep_until(deadline) => true,
        }
    }

    fn dispatch(&self, line: Bytes) {
        match NodeState::decode(&line) {
            Ok(state) => {
                debug!(node_id = %state.node_id, state = %state.state, "device state update");
                self.states.update(state);
            }
            Err(e) => debug!(error = %e, "device frame is not a state update, relaying as-is"),
        }
        self.broadcaster.broadcast(line);
    }
}
