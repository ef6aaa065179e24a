/*
CLI version of the balloon ground station.

Operators point it at one or more telemetry format directories and either a
real serial port or the emulator, and decoded records stream to stdout as
single-line JSON. Type `quit` to stop.
*/

use std::io::prelude::*;
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;

use clap::Parser;
use log::{error, info, warn};
use serde_json::json;

use common::Settings;
use serial_interface::{Interface, SerialPortInterface};
use serial_monitor::{MonitorEvent, SerialEmulator, SerialMonitor};
use telemetry_db::Value;

#[derive(Parser)]
#[command(about = "Stream decoded balloon telemetry to stdout")]
struct Args {
    /// Telemetry format directories, one database each
    #[arg(required = true)]
    formats: Vec<PathBuf>,

    /// Serial port to read from
    #[arg(long)]
    port: Option<String>,

    /// Baud rate for the serial port
    #[arg(long)]
    baud: Option<u32>,

    /// Generate random telemetry instead of opening a port
    #[arg(long)]
    emulate: bool,

    /// Settings file carrying port/baud defaults
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Directory for log files
    #[arg(long, default_value = "logs")]
    log_path: String,
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Bool(v) => json!(v),
        Value::I64(v) => json!(v),
        Value::U64(v) => json!(v),
        Value::F64(v) => json!(v),
        Value::Char(v) => json!(v.to_string()),
        Value::Bytes(v) => json!(String::from_utf8_lossy(v)),
        Value::EnumMember(v) => json!(v),
        Value::Struct(fields) => {
            let mut object = serde_json::Map::new();
            for (name, field) in fields {
                object.insert(name.clone(), value_to_json(field));
            }
            serde_json::Value::Object(object)
        }
        Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(value_to_json).collect())
        }
    }
}

fn open_port(args: &Args, settings: &Settings) -> Result<Box<dyn Interface + Send>, std::io::Error> {
    let port = args
        .port
        .clone()
        .or_else(|| {
            if settings.selected_port.is_empty() {
                None
            } else {
                Some(settings.selected_port.clone())
            }
        })
        .ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "no serial port given; pass --port or --emulate",
            )
        })?;
    let baud = args.baud.unwrap_or(settings.selected_baud);
    info!("Opening serial port {} at {} baud", port, baud);
    Ok(Box::new(SerialPortInterface::new(&port, baud)?))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    common::logging::init_logger(&args.log_path)?;

    let settings = match &args.settings {
        Some(path) => Settings::load_or_default(path)?,
        None => Settings::default(),
    };

    let mut databases = Vec::with_capacity(args.formats.len());
    for dir in &args.formats {
        let name = dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("format")
            .to_string();
        let db = telemetry_db::load(dir)?;
        info!(
            "Loaded format '{}': {} telemetry type(s), {} telecommand type(s)",
            name,
            db.telemetry().len(),
            db.telecommands().len()
        );
        databases.push((name, db));
    }

    let emulate = args.emulate || (args.port.is_none() && settings.emulator_mode);
    let interface: Box<dyn Interface + Send> = if emulate {
        info!("Emulator mode: generating random telemetry");
        // The emulator generates messages against the first format
        Box::new(SerialEmulator::new(databases[0].1.clone()))
    } else {
        open_port(&args, &settings)?
    };

    let (sink, events) = mpsc::channel();
    let mut monitor = SerialMonitor::new(interface, sink);
    for (name, db) in &databases {
        monitor.add_format(name, db.clone());
    }
    let handle = monitor.start();

    // Operator input on its own thread; the event loop below owns stdout
    let token = handle.token();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line.trim().to_lowercase(),
                Err(_) => break,
            };
            if line == "quit" || line == "exit" {
                break;
            }
        }
        token.interrupt();
    });

    while handle.is_running() {
        match events.recv_timeout(std::time::Duration::from_millis(100)) {
            Ok(MonitorEvent::Record(record)) => {
                let mut data = serde_json::Map::new();
                for (name, value) in &record.values {
                    data.insert(name.clone(), value_to_json(value));
                }
                let line = json!({
                    "time": record.timestamp.to_rfc3339(),
                    "parser": record.parser,
                    "type": record.type_name,
                    "data": data,
                });
                println!("{}", line);
            }
            Ok(MonitorEvent::Text(_)) => {}
            Ok(MonitorEvent::Error(message)) => warn!("{}", message),
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    if let Some(error) = handle.take_error() {
        error!("Monitor stopped: {}", error);
    }
    handle.stop();
    Ok(())
}
