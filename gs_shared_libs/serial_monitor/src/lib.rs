/*
Polling loop over a byte source (real serial port or emulator), feeding one
parser per tracked telemetry format and emitting decoded records to a sink.
*/

pub mod content;
pub mod emulator;
pub mod monitor;

pub use content::ContentStore;
pub use emulator::SerialEmulator;
pub use monitor::{CancellationToken, MonitorEvent, MonitorHandle, SerialMonitor, TelemetryRecord};
