use telemetry_db::DatabaseError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("No value supplied for required data point '{0}'")]
    MissingValue(String),
    #[error("Value {value} does not fit data point '{name}'")]
    ValueOutOfRange { name: String, value: String },
    #[error("Unknown telemetry or telecommand type '{0}'")]
    UnknownType(String),
    #[error("Checksum mismatch: message carries {expected:#06x}, computed {actual:#06x}")]
    ChecksumMismatch { expected: u16, actual: u16 },
    #[error("Message exceeds the maximum message size without completing")]
    TruncatedMessage,
    #[error("No telemetry or telecommand type with discriminator {0:#04x}")]
    UnknownDiscriminator(u8),
    #[error("Type id {id} of '{type_name}' does not fit the discriminator byte")]
    IdOutOfRange { type_name: String, id: u32 },
    #[error(transparent)]
    Schema(#[from] DatabaseError),
}
