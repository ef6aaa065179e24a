/*
Schema-driven wire codec for telemetry and telecommand messages.

Message layout: two sync bytes, a 16-bit big-endian checksum, a one-byte
type discriminator, then the data points in declaration order. The checksum
covers the discriminator and the payload but not the sync bytes or itself.
*/

pub mod checksum;
pub mod errors;
pub mod parser;
pub mod serializer;

pub use errors::CodecError;
pub use parser::{DecodedRecord, TelemetryParser, DEFAULT_MAX_MESSAGE_SIZE};
pub use serializer::{required_data_points, serialize, HEADER_LENGTH};
