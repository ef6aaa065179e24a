use std::io::Error as IoError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Local};
use log::{debug, info, warn};

use common::constants::SERIAL_BUFFER_SIZE;
use serial_interface::Interface;
use telemetry_codec::TelemetryParser;
use telemetry_db::{CommunicationDatabase, Value};

/// Shared stop flag. Checked at the top of each loop iteration, so shutdown
/// latency is bounded by the interface read timeout.
#[derive(Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken::default()
    }

    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// One decoded message, stamped and attributed to the format that parsed it
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    pub parser: String,
    pub type_name: String,
    pub timestamp: DateTime<Local>,
    pub values: Vec<(String, Value)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    Record(TelemetryRecord),
    /// Human-readable line for the console view
    Text(String),
    /// A decode error; the stream keeps going
    Error(String),
}

/// Polls a byte source and feeds every tracked format's parser. Decoded
/// records and decode errors go to the sink; an I/O error on the source ends
/// the loop and is surfaced via [`MonitorHandle::is_running`] and
/// [`MonitorHandle::take_error`], never a panic.
pub struct SerialMonitor {
    interface: Box<dyn Interface + Send>,
    parsers: Vec<(String, TelemetryParser)>,
    sink: Sender<MonitorEvent>,
    token: CancellationToken,
}

impl SerialMonitor {
    pub fn new(interface: Box<dyn Interface + Send>, sink: Sender<MonitorEvent>) -> Self {
        SerialMonitor {
            interface,
            parsers: Vec::new(),
            sink,
            token: CancellationToken::new(),
        }
    }

    /// Track a telemetry format: bytes read from the source are offered to
    /// its parser alongside every other tracked format
    pub fn add_format(&mut self, name: &str, db: CommunicationDatabase) {
        self.parsers.push((name.to_string(), TelemetryParser::new(db)));
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// One loop iteration: read available bytes, feed the parsers, emit
    /// events. Returns the number of bytes read.
    pub fn poll_once(&mut self) -> Result<usize, IoError> {
        let mut buffer = [0u8; SERIAL_BUFFER_SIZE];
        let count = self.interface.read(&mut buffer)?;
        if count == 0 {
            return Ok(0);
        }
        debug!("Read {} bytes from the byte source", count);

        for (name, parser) in &mut self.parsers {
            parser.push_bytes(&buffer[..count]);
            while let Some(result) = parser.next_record() {
                match result {
                    Ok(decoded) => {
                        let record = TelemetryRecord {
                            parser: name.clone(),
                            type_name: decoded.type_name,
                            timestamp: Local::now(),
                            values: decoded.values,
                        };
                        let _ = self.sink.send(MonitorEvent::Text(format_text_line(&record)));
                        let _ = self.sink.send(MonitorEvent::Record(record));
                    }
                    Err(error) => {
                        warn!("Decode error on format '{}': {}", name, error);
                        let _ = self
                            .sink
                            .send(MonitorEvent::Error(format!("{}: {}", name, error)));
                    }
                }
            }
        }
        Ok(count)
    }

    /// Run until interrupted or the byte source fails. Bytes mid-message at
    /// stop time are discarded.
    pub fn run(&mut self) -> Result<(), IoError> {
        info!("Serial monitor started with {} tracked format(s)", self.parsers.len());
        while !self.token.is_interrupted() {
            self.poll_once()?;
        }
        for (_, parser) in &mut self.parsers {
            parser.clear();
        }
        info!("Serial monitor stopped");
        Ok(())
    }

    /// Move the monitor onto its own thread
    pub fn start(mut self) -> MonitorHandle {
        let token = self.token.clone();
        let running = Arc::new(AtomicBool::new(true));
        let error = Arc::new(Mutex::new(None));
        let thread_running = Arc::clone(&running);
        let thread_error = Arc::clone(&error);
        let thread = thread::spawn(move || {
            if let Err(e) = self.run() {
                warn!("Serial monitor lost its byte source: {}", e);
                if let Ok(mut slot) = thread_error.lock() {
                    *slot = Some(e);
                }
            }
            thread_running.store(false, Ordering::SeqCst);
        });
        MonitorHandle {
            token,
            running,
            error,
            thread: Some(thread),
        }
    }
}

fn format_text_line(record: &TelemetryRecord) -> String {
    let fields: Vec<String> = record
        .values
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect();
    format!(
        "[{}] {}/{}: {}",
        record.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
        record.parser,
        record.type_name,
        fields.join(" ")
    )
}

/// Owner's view of a running monitor thread
pub struct MonitorHandle {
    token: CancellationToken,
    running: Arc<AtomicBool>,
    error: Arc<Mutex<Option<IoError>>>,
    thread: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    /// False once the loop has exited, whether by interrupt or source loss
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn interrupt(&self) {
        self.token.interrupt();
    }

    /// The I/O error that ended the loop, if any
    pub fn take_error(&self) -> Option<IoError> {
        self.error.lock().ok().and_then(|mut slot| slot.take())
    }

    /// Interrupt and wait for the loop to exit
    pub fn stop(mut self) {
        self.token.interrupt();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulator::SerialEmulator;
    use std::io::ErrorKind;
    use std::sync::mpsc;
    use std::time::Duration;
    use telemetry_db::DataPoint;

    fn env_db() -> CommunicationDatabase {
        let mut db = CommunicationDatabase::new();
        db.add_telemetry("env", "Environment frame").unwrap();
        let temp = db.type_info("int16", "", None).unwrap();
        db.add_telemetry_data_point("env", DataPoint { name: "temp".to_string(), type_info: temp })
            .unwrap();
        let humidity = db.type_info("uint8", "", None).unwrap();
        db.add_telemetry_data_point(
            "env",
            DataPoint { name: "humidity".to_string(), type_info: humidity },
        )
        .unwrap();
        db
    }

    /// Interface whose read always fails, for the source-loss path
    struct DeadInterface;

    impl Interface for DeadInterface {
        fn send(&mut self, _data: &[u8]) -> Result<usize, IoError> {
            Err(IoError::new(ErrorKind::BrokenPipe, "port closed"))
        }
        fn read(&mut self, _buffer: &mut [u8]) -> Result<usize, IoError> {
            Err(IoError::new(ErrorKind::BrokenPipe, "port closed"))
        }
    }

    #[test]
    fn test_monitor_decodes_emulated_records() {
        let db = env_db();
        let emulator = SerialEmulator::with_seed(db.clone(), 7)
            .with_message_interval(Duration::ZERO);
        let (sink, events) = mpsc::channel();
        let mut monitor = SerialMonitor::new(Box::new(emulator), sink);
        monitor.add_format("balloon", db);

        let mut records = 0;
        while records < 5 {
            monitor.poll_once().unwrap();
            while let Ok(event) = events.try_recv() {
                if let MonitorEvent::Record(record) = event {
                    assert_eq!(record.parser, "balloon");
                    assert_eq!(record.type_name, "env");
                    assert_eq!(record.values.len(), 2);
                    records += 1;
                }
            }
        }
    }

    #[test]
    fn test_interrupt_stops_thread() {
        let db = env_db();
        let emulator = SerialEmulator::with_seed(db.clone(), 1)
            .with_message_interval(Duration::from_millis(5));
        let (sink, _events) = mpsc::channel();
        let mut monitor = SerialMonitor::new(Box::new(emulator), sink);
        monitor.add_format("balloon", db);

        let handle = monitor.start();
        assert!(handle.is_running());
        handle.interrupt();
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while handle.is_running() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!handle.is_running());
        assert!(handle.take_error().is_none());
    }

    #[test]
    fn test_source_loss_observed_not_panicked() {
        let (sink, _events) = mpsc::channel();
        let mut monitor = SerialMonitor::new(Box::new(DeadInterface), sink);
        monitor.add_format("balloon", env_db());

        let handle = monitor.start();
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while handle.is_running() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!handle.is_running());
        let error = handle.take_error().unwrap();
        assert_eq!(error.kind(), ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_text_line_accompanies_each_record() {
        let db = env_db();
        let emulator = SerialEmulator::with_seed(db.clone(), 3)
            .with_message_interval(Duration::ZERO);
        let (sink, events) = mpsc::channel();
        let mut monitor = SerialMonitor::new(Box::new(emulator), sink);
        monitor.add_format("balloon", db);
        monitor.poll_once().unwrap();

        let mut texts = 0;
        let mut records = 0;
        while let Ok(event) = events.try_recv() {
            match event {
                MonitorEvent::Text(line) => {
                    assert!(line.contains("balloon/env"));
                    texts += 1;
                }
                MonitorEvent::Record(_) => records += 1,
                MonitorEvent::Error(e) => panic!("unexpected decode error: {}", e),
            }
        }
        assert_eq!(texts, records);
        assert!(records > 0);
    }
}
