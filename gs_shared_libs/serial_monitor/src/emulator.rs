use std::io::{Error as IoError, ErrorKind};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use common::constants::DEFAULT_MAX_DYNAMIC_MEMBER_SIZE;
use serial_interface::Interface;
use telemetry_codec::serialize;
use telemetry_db::{
    ArraySize, CommunicationDatabase, DatabaseError, StructDef, TypeInfo, TypeKind, Value,
};

/// Hard cap on emulated dynamic array sizes, matching the discriminator's
/// one-byte budget
const DYNAMIC_SIZE_CAP: usize = 127;

/// A byte source that produces whole, schema-conformant random messages, for
/// exercising the ground station without hardware. Reads behave like a
/// serial port with a timeout: nothing arrives until the message interval
/// has elapsed.
pub struct SerialEmulator {
    db: CommunicationDatabase,
    rng: StdRng,
    pending: Vec<u8>,
    max_dynamic_size: usize,
    message_interval: Duration,
    last_message: Instant,
}

impl SerialEmulator {
    pub fn new(db: CommunicationDatabase) -> Self {
        Self::with_seed(db, rand::random())
    }

    /// Deterministic variant for tests
    pub fn with_seed(db: CommunicationDatabase, seed: u64) -> Self {
        SerialEmulator {
            db,
            rng: StdRng::seed_from_u64(seed),
            pending: Vec::new(),
            max_dynamic_size: DEFAULT_MAX_DYNAMIC_MEMBER_SIZE.min(DYNAMIC_SIZE_CAP),
            message_interval: Duration::from_millis(100),
            last_message: Instant::now() - Duration::from_secs(1),
        }
    }

    pub fn with_message_interval(mut self, interval: Duration) -> Self {
        self.message_interval = interval;
        self
    }

    pub fn with_max_dynamic_size(mut self, max: usize) -> Self {
        self.max_dynamic_size = max.min(DYNAMIC_SIZE_CAP);
        self
    }

    /// Generate one random message for a uniformly picked telemetry type
    fn generate_message(&mut self) -> Result<Vec<u8>, IoError> {
        if self.db.telemetry().is_empty() {
            return Err(IoError::new(
                ErrorKind::InvalidInput,
                "emulated schema defines no telemetry types",
            ));
        }
        let index = self.rng.gen_range(0..self.db.telemetry().len());
        let telemetry_name = self.db.telemetry()[index].name.clone();
        let fields: Vec<(String, TypeInfo)> = self.db.telemetry()[index]
            .data
            .iter()
            .map(|dp| (dp.name.clone(), dp.type_info.clone()))
            .collect();

        let values = self
            .random_fields(&fields)
            .map_err(|e| IoError::new(ErrorKind::InvalidData, e.to_string()))?;
        serialize(&self.db, &telemetry_name, &values)
            .map_err(|e| IoError::new(ErrorKind::InvalidData, e.to_string()))
    }

    /// Generate a field sequence in declaration order. A field that feeds a
    /// later array's dynamic size is sampled within the dynamic cap so the
    /// size and the array stay consistent on the wire.
    fn random_fields(
        &mut self,
        fields: &[(String, TypeInfo)],
    ) -> Result<Vec<(String, Value)>, DatabaseError> {
        let mut sources: Vec<&str> = Vec::new();
        for (_, info) in fields {
            dynamic_size_sources(&info.kind, &mut sources);
        }
        let mut values: Vec<(String, Value)> = Vec::with_capacity(fields.len());
        for (name, info) in fields {
            let value = if sources.contains(&name.as_str()) {
                let cap = match info.kind {
                    TypeKind::Int { signed, width } => {
                        let (_, max) = TypeKind::int_bounds(signed, width);
                        (max as u64 as usize).min(self.max_dynamic_size)
                    }
                    _ => self.max_dynamic_size,
                };
                Value::U64(self.rng.gen_range(0..=cap) as u64)
            } else {
                self.random_value(&info.kind, &values)?
            };
            values.push((name.clone(), value));
        }
        Ok(values)
    }

    /// Schema-conformant random value. Struct fields thread already
    /// generated siblings so dynamic array sizes resolve.
    fn random_value(
        &mut self,
        kind: &TypeKind,
        siblings: &[(String, Value)],
    ) -> Result<Value, DatabaseError> {
        match kind {
            TypeKind::Bool => Ok(Value::Bool(self.rng.gen_bool(0.5))),
            TypeKind::Int { signed, width } => {
                let (min, max) = TypeKind::int_bounds(*signed, *width);
                let sample = self.rng.gen_range(min..=max);
                if *signed {
                    Ok(Value::I64(sample as i64))
                } else {
                    Ok(Value::U64(sample as u64))
                }
            }
            // Full-range uniform floats are useless for plotting; sample a
            // plausible sensor band instead
            TypeKind::F32 | TypeKind::F64 => {
                Ok(Value::F64(self.rng.gen_range(-1_000_000.0..1_000_000.0)))
            }
            TypeKind::Char => Ok(Value::Char(self.rng.gen_range(b' '..=b'~') as char)),
            TypeKind::Bytes => Ok(Value::U64(u64::from(
                self.rng.gen_range(b' '..=b'~'),
            ))),
            TypeKind::Enum(name) => {
                let def = self
                    .db
                    .enum_def(name)
                    .ok_or_else(|| DatabaseError::UnknownType(name.clone()))?
                    .clone();
                let index = self.rng.gen_range(0..def.members.len());
                Ok(Value::EnumMember(def.members[index].name.clone()))
            }
            TypeKind::Struct(name) => {
                let def: StructDef = self
                    .db
                    .struct_def(name)
                    .ok_or_else(|| DatabaseError::UnknownType(name.clone()))?
                    .clone();
                Ok(Value::Struct(self.random_fields(&def.fields)?))
            }
            TypeKind::Array { element, size } => {
                let count = self.element_count(size, siblings)?;
                if matches!(**element, TypeKind::Bytes) {
                    let bytes: Vec<u8> =
                        (0..count).map(|_| self.rng.gen_range(b' '..=b'~')).collect();
                    return Ok(Value::Bytes(bytes));
                }
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(self.random_value(element, siblings)?);
                }
                Ok(Value::Array(items))
            }
        }
    }

    fn element_count(
        &mut self,
        size: &ArraySize,
        siblings: &[(String, Value)],
    ) -> Result<usize, DatabaseError> {
        match self.db.array_size_elements(size) {
            Ok(count) => Ok(count),
            Err(DatabaseError::DynamicSize(_)) => {
                if let ArraySize::Dynamic(source) = size {
                    if let Some(count) = siblings
                        .iter()
                        .find(|(name, _)| name == source)
                        .and_then(|(_, value)| value.as_usize())
                    {
                        return Ok(count.min(self.max_dynamic_size));
                    }
                }
                // No generated sibling carries the size; pick one
                Ok(self.rng.gen_range(0..=self.max_dynamic_size))
            }
            Err(error) => Err(error),
        }
    }
}

/// Collect the sibling fields a kind reads dynamic array sizes from,
/// including sizes buried in nested array elements.
fn dynamic_size_sources<'a>(kind: &'a TypeKind, out: &mut Vec<&'a str>) {
    if let TypeKind::Array { element, size } = kind {
        if let ArraySize::Dynamic(source) = size {
            out.push(source.as_str());
        }
        dynamic_size_sources(element, out);
    }
}

impl Interface for SerialEmulator {
    fn send(&mut self, data: &[u8]) -> Result<usize, IoError> {
        // Commands go nowhere; pretend the radio accepted them
        Ok(data.len())
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, IoError> {
        if self.pending.is_empty() {
            let elapsed = self.last_message.elapsed();
            if elapsed < self.message_interval {
                std::thread::sleep(self.message_interval - elapsed);
            }
            self.pending = self.generate_message()?;
            self.last_message = Instant::now();
        }
        let count = self.pending.len().min(buffer.len());
        buffer[..count].copy_from_slice(&self.pending[..count]);
        self.pending.drain(..count);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telemetry_codec::TelemetryParser;
    use telemetry_db::{DataPoint, EnumDef, EnumMemberDef};

    fn emulated(db: &CommunicationDatabase, seed: u64, messages: usize) -> Vec<Vec<(String, Value)>> {
        let mut emulator =
            SerialEmulator::with_seed(db.clone(), seed).with_message_interval(Duration::ZERO);
        let mut parser = TelemetryParser::new(db.clone());
        let mut buffer = [0u8; 1024];
        let mut decoded = Vec::new();
        while decoded.len() < messages {
            let count = emulator.read(&mut buffer).unwrap();
            parser.push_bytes(&buffer[..count]);
            while let Some(result) = parser.next_record() {
                decoded.push(result.unwrap().values);
            }
        }
        decoded
    }

    #[test]
    fn test_uint8_values_in_range() {
        let mut db = CommunicationDatabase::new();
        db.add_telemetry("counters", "").unwrap();
        let info = db.type_info("uint8", "", None).unwrap();
        db.add_telemetry_data_point(
            "counters",
            DataPoint { name: "count".to_string(), type_info: info },
        )
        .unwrap();

        for values in emulated(&db, 42, 50) {
            match &values[0].1 {
                Value::U64(v) => assert!(*v <= 255),
                other => panic!("expected unsigned value, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_enum_values_are_declared_members() {
        let mut db = CommunicationDatabase::new();
        db.add_shared_enum(EnumDef {
            name: "Mode".to_string(),
            doc: None,
            underlying: "uint8".to_string(),
            members: vec![
                EnumMemberDef { name: "IDLE".to_string(), doc: None },
                EnumMemberDef { name: "ACTIVE".to_string(), doc: None },
            ],
            default: None,
        })
        .unwrap();
        db.add_telemetry("status", "").unwrap();
        let info = db.type_info("Mode", "", None).unwrap();
        db.add_telemetry_data_point(
            "status",
            DataPoint { name: "mode".to_string(), type_info: info },
        )
        .unwrap();

        for values in emulated(&db, 9, 50) {
            match &values[0].1 {
                Value::EnumMember(member) => {
                    assert!(member == "IDLE" || member == "ACTIVE")
                }
                other => panic!("expected enum member, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_dynamic_array_respects_cap() {
        let mut db = CommunicationDatabase::new();
        db.add_telemetry("log", "").unwrap();
        let len = db.type_info("uint8", "", None).unwrap();
        db.add_telemetry_data_point("log", DataPoint { name: "len".to_string(), type_info: len })
            .unwrap();
        let text = db.type_info("bytes[<len>]", "", None).unwrap();
        db.add_telemetry_data_point("log", DataPoint { name: "text".to_string(), type_info: text })
            .unwrap();

        for values in emulated(&db, 11, 30) {
            let Value::Bytes(bytes) = &values[1].1 else {
                panic!("expected byte string");
            };
            assert!(bytes.len() <= DYNAMIC_SIZE_CAP);
            assert!(bytes.iter().all(|b| (b' '..=b'~').contains(b)));
            assert_eq!(values[0].1, Value::U64(bytes.len() as u64));
        }
    }

    #[test]
    fn test_nested_dynamic_array_stays_consistent() {
        let mut db = CommunicationDatabase::new();
        db.add_telemetry("samples", "").unwrap();
        let count = db.type_info("uint16", "", None).unwrap();
        db.add_telemetry_data_point(
            "samples",
            DataPoint { name: "count".to_string(), type_info: count },
        )
        .unwrap();
        let grid = db.type_info("float[<count>][2]", "", None).unwrap();
        db.add_telemetry_data_point(
            "samples",
            DataPoint { name: "grid".to_string(), type_info: grid },
        )
        .unwrap();

        for values in emulated(&db, 23, 30) {
            let Value::U64(count) = values[0].1 else {
                panic!("expected unsigned size source");
            };
            assert!(count as usize <= DYNAMIC_SIZE_CAP);
            let Value::Array(rows) = &values[1].1 else {
                panic!("expected outer array");
            };
            assert_eq!(rows.len(), 2);
            for row in rows {
                let Value::Array(items) = row else {
                    panic!("expected inner array");
                };
                assert_eq!(items.len(), count as usize);
            }
        }
    }

    #[test]
    fn test_empty_schema_read_fails() {
        let db = CommunicationDatabase::new();
        let mut emulator =
            SerialEmulator::with_seed(db, 0).with_message_interval(Duration::ZERO);
        let mut buffer = [0u8; 64];
        assert!(emulator.read(&mut buffer).is_err());
    }
}
