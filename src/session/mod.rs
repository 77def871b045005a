//! # Session Module
//!
//! Owns the connection lifecycle and the diagnostic log, bridging one
//! background reader task and any number of command/poll callers.
//!
//! The reader task runs the capture chain sequentially per connection
//! (framer -> schema tracker -> quality evaluator -> CSV sink), preserving
//! line order. Foreground callers only send commands and poll the log; they
//! never touch the framer or the sink.

pub mod log;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::capture::{quality, CsvSink, LineFramer, SchemaTracker};
use crate::config::Config;
use crate::error::{CaptureError, Result};
use crate::serial;
use crate::serial::port_trait::{DeviceWriter, SerialWriter};

pub use log::DiagnosticLog;

/// A line is persisted only when it carries more than this many delimiters;
/// shorter lines are firmware chatter (prompts, acknowledgements)
const MIN_RECORD_DELIMITERS: usize = 5;

/// State shared between the session and its reader task
pub struct SharedState {
    connected: AtomicBool,
    /// Snapshot of the sink's sticky destination, for status display
    active_path: Mutex<Option<PathBuf>>,
}

impl SharedState {
    fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            active_path: Mutex::new(None),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn active_path(&self) -> Option<PathBuf> {
        self.active_path
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set_active_path(&self, path: Option<PathBuf>) {
        *self.active_path.lock().unwrap_or_else(|e| e.into_inner()) = path;
    }
}

struct Connection {
    writer: Box<dyn DeviceWriter>,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
    port_name: String,
}

/// Connection lifecycle plus the diagnostic log
///
/// All methods are safe to call concurrently; `poll_log` never blocks on the
/// reader task.
pub struct Session {
    config: Config,
    log: Arc<DiagnosticLog>,
    shared: Arc<SharedState>,
    conn: tokio::sync::Mutex<Option<Connection>>,
}

impl Session {
    pub fn new(config: Config) -> Self {
        let log = Arc::new(DiagnosticLog::new(
            config.log.capacity,
            config.log.trim_to,
            Some(PathBuf::from(&config.log.file)),
        ));
        Self {
            config,
            log,
            shared: Arc::new(SharedState::new()),
            conn: tokio::sync::Mutex::new(None),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.shared.is_connected()
    }

    /// Destination file of the most recent successful write, if any
    pub fn active_output(&self) -> Option<PathBuf> {
        self.shared.active_path()
    }

    /// Poll the diagnostic log; see [`DiagnosticLog::since`]
    pub fn poll_log(&self, since: u64) -> (Vec<String>, u64) {
        self.log.since(since)
    }

    /// Open the device and start the reader task
    ///
    /// Waits the configured settle delay after opening the port, during
    /// which the board resets. A reconnect always starts with fresh in-memory
    /// buffers: partial line and schema do not survive a disconnect.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyConnected` if a connection is active, or a serial
    /// error if the port cannot be opened
    pub async fn connect(&self, port: &str) -> Result<()> {
        let mut conn = self.conn.lock().await;
        if conn.is_some() && self.shared.is_connected() {
            return Err(CaptureError::AlreadyConnected);
        }
        // Reap a connection whose reader died from a transport error
        if let Some(old) = conn.take() {
            let _ = old.stop.send(true);
            let _ = old.task.await;
        }

        let stream = serial::open_port(port, self.config.serial.baud_rate)?;
        tokio::time::sleep(Duration::from_millis(self.config.serial.settle_delay_ms)).await;

        let (read_half, write_half) = tokio::io::split(stream);
        let (stop_tx, stop_rx) = watch::channel(false);

        let sink = CsvSink::new(
            self.config.default_output_path(),
            self.config.fallback_output_path(),
            self.config.output.max_alt_files,
        );
        self.shared.set_active_path(None);
        self.shared.connected.store(true, Ordering::SeqCst);

        let task = tokio::spawn(reader_task(
            read_half,
            stop_rx,
            Arc::clone(&self.log),
            Arc::clone(&self.shared),
            sink,
            self.config.serial.read_buf_size,
        ));

        *conn = Some(Connection {
            writer: Box::new(SerialWriter::new(write_half)),
            stop: stop_tx,
            task,
            port_name: port.to_string(),
        });
        info!("Connected to {}", port);
        Ok(())
    }

    /// Stop the reader task and close the device; idempotent
    ///
    /// Does not return until the reader task has finished, so the device
    /// handle is guaranteed to be released when this call completes.
    pub async fn disconnect(&self) {
        let mut conn = self.conn.lock().await;
        if let Some(active) = conn.take() {
            let _ = active.stop.send(true);
            if let Err(e) = active.task.await {
                warn!("Reader task ended abnormally: {}", e);
            }
            info!("Disconnected from {}", active.port_name);
        }
        self.shared.connected.store(false, Ordering::SeqCst);
    }

    /// Send a newline-terminated command to the device
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` when no connection is active, or a serial
    /// error if the write fails
    pub async fn send(&self, command: &str) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let active = match conn.as_mut() {
            Some(active) if self.shared.is_connected() => active,
            _ => return Err(CaptureError::NotConnected),
        };

        let payload = format!("{}\n", command);
        active
            .writer
            .write_all(payload.as_bytes())
            .await
            .map_err(|e| CaptureError::Serial(format!("Failed to send command: {}", e)))?;
        active
            .writer
            .flush()
            .await
            .map_err(|e| CaptureError::Serial(format!("Failed to flush command: {}", e)))?;
        Ok(())
    }
}

/// Background reader: frames bytes into lines and runs the capture chain
///
/// Terminates on the stop signal or on a fatal transport error; the latter
/// forces the shared connection state to disconnected and leaves one
/// diagnostic in the log.
async fn reader_task<R>(
    mut port: R,
    mut stop: watch::Receiver<bool>,
    log: Arc<DiagnosticLog>,
    shared: Arc<SharedState>,
    mut sink: CsvSink,
    read_buf_size: usize,
) where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    let mut framer = LineFramer::new();
    let mut tracker = SchemaTracker::new();
    let mut buf = vec![0u8; read_buf_size];

    loop {
        tokio::select! {
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
            read = port.read(&mut buf) => match read {
                Ok(0) => {
                    log.append("Serial error: device stream ended");
                    shared.connected.store(false, Ordering::SeqCst);
                    break;
                }
                Ok(n) => {
                    for line in framer.push(&buf[..n]) {
                        handle_line(&line, &mut tracker, &mut sink, &log, &shared);
                    }
                }
                Err(e) => {
                    log.append(&format!("Serial error: {}", e));
                    shared.connected.store(false, Ordering::SeqCst);
                    break;
                }
            }
        }
    }
}

/// Run one decoded line through tracker, evaluator and sink
fn handle_line(
    line: &str,
    tracker: &mut SchemaTracker,
    sink: &mut CsvSink,
    log: &DiagnosticLog,
    shared: &SharedState,
) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    log.append(&format!("[device] {}", line));
    tracker.observe(line);

    for warning in quality::evaluate(line, tracker.schema()) {
        warn!("{}", warning);
        log.append(&warning);
    }

    if line.matches(crate::capture::schema::FIELD_DELIMITER).count() > MIN_RECORD_DELIMITERS {
        for diag in sink.persist(line) {
            log.append(&diag);
        }
        shared.set_active_path(sink.active_path().map(|p| p.to_path_buf()));
    }
}

#[cfg(test)]
impl Session {
    /// Install a connection backed by a mock writer, bypassing the serial
    /// port; the reader side is a finished no-op task
    async fn attach_writer_for_test(&self, writer: Box<dyn DeviceWriter>) {
        let (stop, _stop_rx) = watch::channel(false);
        let task = tokio::spawn(async {});
        *self.conn.lock().await = Some(Connection {
            writer,
            stop,
            task,
            port_name: "mock".to_string(),
        });
        self.shared.connected.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::port_trait::mocks::MockDeviceWriter;
    use tokio::io::AsyncWriteExt;

    const HEADER: &str = "massa_g;LBC;LBT;mpu_ok;mpu_ok_slip;sonar_ok;sonar_stale_ms;s_ok";

    fn test_sink(dir: &std::path::Path) -> CsvSink {
        CsvSink::new(
            dir.join("resultados.csv"),
            dir.join("fallback_resultados.csv"),
            2,
        )
    }

    fn warnings_only(lines: &[String]) -> Vec<&String> {
        lines.iter().filter(|l| !l.contains("[device]")).collect()
    }

    fn spawn_test_reader(
        dir: &std::path::Path,
    ) -> (
        tokio::io::WriteHalf<tokio::io::DuplexStream>,
        watch::Sender<bool>,
        JoinHandle<()>,
        Arc<DiagnosticLog>,
        Arc<SharedState>,
    ) {
        let log = Arc::new(DiagnosticLog::new(1000, 800, None));
        let shared = Arc::new(SharedState::new());
        shared.connected.store(true, Ordering::SeqCst);

        let (device, host) = tokio::io::duplex(1024);
        let (read_half, _host_write) = tokio::io::split(host);
        let (_device_read, device_write) = tokio::io::split(device);
        let (stop_tx, stop_rx) = watch::channel(false);

        let task = tokio::spawn(reader_task(
            read_half,
            stop_rx,
            Arc::clone(&log),
            Arc::clone(&shared),
            test_sink(dir),
            256,
        ));
        (device_write, stop_tx, task, log, shared)
    }

    #[tokio::test]
    async fn test_end_to_end_header_then_data_row() {
        let dir = tempfile::tempdir().unwrap();
        let (mut device, stop, task, log, _shared) = spawn_test_reader(dir.path());

        device.write_all(HEADER.as_bytes()).await.unwrap();
        device.write_all(b"\n").await.unwrap();
        device.write_all(b"50;1;2;1;0;1;0;1\n").await.unwrap();
        device.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        stop.send(true).unwrap();
        task.await.unwrap();

        let contents = std::fs::read_to_string(dir.path().join("resultados.csv")).unwrap();
        let rows: Vec<&str> = contents.trim_start_matches('\u{feff}').lines().collect();
        assert_eq!(rows.len(), 2, "one header row and one data row: {:?}", rows);
        assert!(rows[0].ends_with("Timestamp_PC"));
        assert_eq!(rows[1].split(';').count(), 9);

        let (lines, _) = log.since(0);
        let warnings = warnings_only(&lines);
        assert_eq!(warnings.len(), 1, "exactly one warning: {:?}", warnings);
        assert!(warnings[0].contains("mpu_ok_slip=0"));
    }

    #[tokio::test]
    async fn test_chatter_lines_are_logged_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let (mut device, stop, task, log, _shared) = spawn_test_reader(dir.path());

        device.write_all(b"Pronto. Aguardando comando.\n").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        stop.send(true).unwrap();
        task.await.unwrap();

        assert!(!dir.path().join("resultados.csv").exists());
        let (lines, _) = log.since(0);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("[device] Pronto"));
    }

    #[tokio::test]
    async fn test_device_eof_marks_disconnected() {
        let dir = tempfile::tempdir().unwrap();
        let (device, _stop, task, log, shared) = spawn_test_reader(dir.path());

        // Dropping the device end closes the stream: the reader must see EOF
        drop(device);
        task.await.unwrap();

        assert!(!shared.is_connected());
        let (lines, _) = log.since(0);
        assert!(lines.iter().any(|l| l.contains("Serial error")));
    }

    #[tokio::test]
    async fn test_stop_signal_joins_promptly() {
        let dir = tempfile::tempdir().unwrap();
        let (_device, stop, task, _log, _shared) = spawn_test_reader(dir.path());

        stop.send(true).unwrap();
        tokio::time::timeout(Duration::from_millis(50), task)
            .await
            .expect("reader must observe the stop signal within one interval")
            .unwrap();
    }

    #[tokio::test]
    async fn test_reconnect_uses_fresh_schema() {
        let dir = tempfile::tempdir().unwrap();

        // First connection observes a header
        let (mut device, stop, task, _log, _shared) = spawn_test_reader(dir.path());
        device.write_all(HEADER.as_bytes()).await.unwrap();
        device.write_all(b"\n").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        stop.send(true).unwrap();
        task.await.unwrap();

        // Second connection: no schema, so a bare data line yields no
        // field-addressed warnings even with a zeroed flag column
        let (mut device, stop, task, log, _shared) = spawn_test_reader(dir.path());
        device.write_all(b"50;1;2;1;0;1;0;1\n").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        stop.send(true).unwrap();
        task.await.unwrap();

        let (lines, _) = log.since(0);
        assert!(warnings_only(&lines).is_empty());
    }

    #[tokio::test]
    async fn test_send_requires_connection() {
        let session = Session::new(Config::default());
        let result = session.send("s").await;
        assert!(matches!(result, Err(CaptureError::NotConnected)));
    }

    #[tokio::test]
    async fn test_send_appends_line_terminator() {
        let session = Session::new(Config::default());
        let mock = MockDeviceWriter::new();
        session.attach_writer_for_test(Box::new(mock.clone())).await;

        session.send("m 250").await.unwrap();

        let written = mock.get_written_data();
        assert_eq!(written, vec![b"m 250\n".to_vec()]);
    }

    #[tokio::test]
    async fn test_send_write_error_surfaces_as_serial() {
        let session = Session::new(Config::default());
        let mock = MockDeviceWriter::new();
        mock.set_write_error(std::io::ErrorKind::BrokenPipe);
        session.attach_writer_for_test(Box::new(mock)).await;

        let result = session.send("s").await;
        assert!(matches!(result, Err(CaptureError::Serial(_))));
    }

    #[tokio::test]
    async fn test_connect_while_connected_is_rejected() {
        let session = Session::new(Config::default());
        session
            .attach_writer_for_test(Box::new(MockDeviceWriter::new()))
            .await;

        let result = session.connect("/dev/ttyACM0").await;
        assert!(matches!(result, Err(CaptureError::AlreadyConnected)));
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let session = Session::new(Config::default());
        session.disconnect().await;
        session.disconnect().await;
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_connect_invalid_port_fails() {
        let mut config = Config::default();
        config.serial.settle_delay_ms = 0;
        let session = Session::new(config);
        let result = session.connect("/dev/nonexistent_serial_device_12345").await;
        assert!(result.is_err());
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_poll_log_on_fresh_session() {
        let session = Session::new(Config::default());
        let (lines, next) = session.poll_log(0);
        assert!(lines.is_empty());
        assert_eq!(next, 0);
    }
}
