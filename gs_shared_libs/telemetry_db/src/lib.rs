/*
Communication database for the balloon ground station.

Holds the schema a tracked telemetry format is parsed against: units,
constants, shared enum/struct data types, device configurations, telemetry
and telecommand message types. The schema is loaded from a directory of CSV
files plus one JSON file, mutated in place by editor actions, and written
back atomically on save.
*/

pub mod database;
pub mod errors;
pub mod persistence;
pub mod types;

pub use database::{ChangeEvent, CommunicationDatabase, FieldTree};
pub use errors::{DatabaseError, DynamicSizeError};
pub use persistence::{load, save};
pub use types::{
    ArraySize, Configuration, Constant, DataPoint, DefaultValue, EnumDef, EnumMemberDef,
    StructDef, TelecommandResponse, TelecommandType, TelemetryType, TypeInfo, TypeKind, Unit,
    Value,
};
