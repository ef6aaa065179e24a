pub mod logging;
pub mod settings;

pub use settings::Settings;

/// Constants shared across the ground station software
pub mod constants {
    /// Default values of the reserved sync byte constants. Every schema gets
    /// these regenerated on load; they are never written to the editable CSVs.
    pub const DEFAULT_SYNC_BYTE_1: u8 = 0xAA;
    pub const DEFAULT_SYNC_BYTE_2: u8 = 0x55;

    /// Upper bound on the element count the emulator picks for an array whose
    /// size is not statically known. Emulator-only knob, not a protocol value.
    pub const DEFAULT_MAX_DYNAMIC_MEMBER_SIZE: usize = 127;

    /// Read buffer size for byte sources feeding the monitor loop
    pub const SERIAL_BUFFER_SIZE: usize = 1024;
}
