use telemetry_db::{
    ArraySize, CommunicationDatabase, DataPoint, DatabaseError, TypeKind, Value,
};

use crate::checksum::crc16_ccitt;
use crate::errors::CodecError;
use crate::serializer::HEADER_LENGTH;

/// A message that has not completed by this many buffered bytes is dropped
/// as truncated rather than waited on forever
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 4096;

/// One decoded telemetry or telecommand message
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRecord {
    pub type_name: String,
    pub values: Vec<(String, Value)>,
}

/// Outcome of a single decode attempt against the buffered bytes
enum Attempt {
    /// A full message was consumed
    Complete(DecodedRecord, usize),
    /// Not enough bytes yet; keep buffering
    Incomplete,
    /// The candidate message is bad; resynchronize past its sync pair
    Failed(CodecError),
}

/// Accumulating stream parser for one schema. Feed raw bytes with
/// [`push_bytes`](Self::push_bytes) and drain decoded messages with
/// [`next_record`](Self::next_record). Garbage between messages is skipped
/// by scanning for the next sync pair; a bad message yields an error and
/// parsing resumes at the next candidate position.
pub struct TelemetryParser {
    db: CommunicationDatabase,
    buffer: Vec<u8>,
    max_message_size: usize,
}

impl TelemetryParser {
    pub fn new(db: CommunicationDatabase) -> Self {
        TelemetryParser {
            db,
            buffer: Vec::new(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    pub fn database(&self) -> &CommunicationDatabase {
        &self.db
    }

    /// Number of bytes currently buffered and not yet consumed
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Discard any partially received message
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Try to decode the next message from the buffer. `None` means more
    /// bytes are needed; an `Err` reports one bad message and leaves the
    /// parser synchronized for the next call.
    pub fn next_record(&mut self) -> Option<Result<DecodedRecord, CodecError>> {
        let Some(start) = self.find_sync() else {
            // Keep a trailing lone sync byte in case its partner is next
            let keep = usize::from(self.buffer.last() == Some(&self.db.sync_bytes().0));
            self.buffer.drain(..self.buffer.len() - keep);
            return None;
        };
        self.buffer.drain(..start);

        match self.try_decode() {
            Attempt::Complete(record, consumed) => {
                self.buffer.drain(..consumed);
                Some(Ok(record))
            }
            Attempt::Incomplete => {
                if self.buffer.len() > self.max_message_size {
                    self.buffer.drain(..2);
                    return Some(Err(CodecError::TruncatedMessage));
                }
                None
            }
            Attempt::Failed(error) => {
                self.buffer.drain(..2);
                Some(Err(error))
            }
        }
    }

    fn find_sync(&self) -> Option<usize> {
        let (sync1, sync2) = self.db.sync_bytes();
        self.buffer
            .windows(2)
            .position(|pair| pair == [sync1, sync2])
    }

    /// Decode the message starting at the sync pair at the head of the buffer
    fn try_decode(&self) -> Attempt {
        if self.buffer.len() < HEADER_LENGTH {
            return Attempt::Incomplete;
        }
        let expected = u16::from_be_bytes([self.buffer[2], self.buffer[3]]);
        let discriminator = self.buffer[4];
        let Some((type_name, data)) = self.message_by_id(discriminator) else {
            return Attempt::Failed(CodecError::UnknownDiscriminator(discriminator));
        };

        let mut cursor = HEADER_LENGTH;
        let mut values = Vec::with_capacity(data.len());
        for dp in data {
            match self.decode_value(&dp.type_info.kind, &values, &mut cursor) {
                Ok(value) => values.push((dp.name.clone(), value)),
                Err(attempt) => return attempt,
            }
        }

        let actual = crc16_ccitt(&self.buffer[4..cursor]);
        if actual != expected {
            return Attempt::Failed(CodecError::ChecksumMismatch { expected, actual });
        }
        Attempt::Complete(
            DecodedRecord { type_name: type_name.to_string(), values },
            cursor,
        )
    }

    fn message_by_id(&self, id: u8) -> Option<(&str, &[DataPoint])> {
        if let Some(telemetry) = self.db.telemetry_by_id(u32::from(id)) {
            return Some((&telemetry.name, &telemetry.data));
        }
        self.db
            .telecommand_by_id(u32::from(id))
            .map(|tc| (tc.name.as_str(), tc.data.as_slice()))
    }

    fn take(&self, cursor: &mut usize, count: usize) -> Result<&[u8], Attempt> {
        if self.buffer.len() < *cursor + count {
            return Err(Attempt::Incomplete);
        }
        let slice = &self.buffer[*cursor..*cursor + count];
        *cursor += count;
        Ok(slice)
    }

    fn decode_value(
        &self,
        kind: &TypeKind,
        siblings: &[(String, Value)],
        cursor: &mut usize,
    ) -> Result<Value, Attempt> {
        match kind {
            TypeKind::Bool => Ok(Value::Bool(self.take(cursor, 1)?[0] != 0)),
            TypeKind::Int { signed, width } => {
                let bytes = self.take(cursor, usize::from(*width))?;
                let mut raw: u64 = 0;
                for &byte in bytes {
                    raw = raw << 8 | u64::from(byte);
                }
                if *signed {
                    let shift = 64 - 8 * u32::from(*width);
                    Ok(Value::I64(((raw << shift) as i64) >> shift))
                } else {
                    Ok(Value::U64(raw))
                }
            }
            TypeKind::F32 => {
                let bytes = self.take(cursor, 4)?;
                let bits = [bytes[0], bytes[1], bytes[2], bytes[3]];
                Ok(Value::F64(f64::from(f32::from_be_bytes(bits))))
            }
            TypeKind::F64 => {
                let bytes = self.take(cursor, 8)?;
                let mut bits = [0u8; 8];
                bits.copy_from_slice(bytes);
                Ok(Value::F64(f64::from_be_bytes(bits)))
            }
            TypeKind::Char => Ok(Value::Char(self.take(cursor, 1)?[0] as char)),
            TypeKind::Bytes => Ok(Value::U64(u64::from(self.take(cursor, 1)?[0]))),
            TypeKind::Enum(name) => {
                let def = match self.db.enum_def(name) {
                    Some(def) => def,
                    None => {
                        return Err(Attempt::Failed(CodecError::UnknownType(name.clone())))
                    }
                };
                let bytes = self.take(cursor, def.width())?;
                let mut index: usize = 0;
                for &byte in bytes {
                    index = index << 8 | usize::from(byte);
                }
                match def.members.get(index) {
                    Some(member) => Ok(Value::EnumMember(member.name.clone())),
                    None => Err(Attempt::Failed(CodecError::ValueOutOfRange {
                        name: name.clone(),
                        value: index.to_string(),
                    })),
                }
            }
            TypeKind::Struct(name) => {
                let def = match self.db.struct_def(name) {
                    Some(def) => def,
                    None => {
                        return Err(Attempt::Failed(CodecError::UnknownType(name.clone())))
                    }
                };
                // Struct fields resolve dynamic sizes against each other,
                // not against the outer scope
                let mut fields: Vec<(String, Value)> = Vec::with_capacity(def.fields.len());
                for (field_name, info) in &def.fields {
                    let value = self.decode_value(&info.kind, &fields, cursor)?;
                    fields.push((field_name.clone(), value));
                }
                Ok(Value::Struct(fields))
            }
            TypeKind::Array { element, size } => {
                let count = self.element_count(size, siblings)?;
                if matches!(**element, TypeKind::Bytes) {
                    let bytes = self.take(cursor, count)?;
                    return Ok(Value::Bytes(bytes.to_vec()));
                }
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(self.decode_value(element, siblings, cursor)?);
                }
                Ok(Value::Array(items))
            }
        }
    }

    fn element_count(
        &self,
        size: &ArraySize,
        siblings: &[(String, Value)],
    ) -> Result<usize, Attempt> {
        match self.db.array_size_elements(size) {
            Ok(count) => Ok(count),
            Err(DatabaseError::DynamicSize(_)) => {
                let ArraySize::Dynamic(source) = size else {
                    unreachable!("only dynamic sizes signal DynamicSizeError")
                };
                siblings
                    .iter()
                    .find(|(name, _)| name == source)
                    .and_then(|(_, value)| value.as_usize())
                    .ok_or_else(|| {
                        Attempt::Failed(CodecError::MissingValue(source.clone()))
                    })
            }
            Err(error) => Err(Attempt::Failed(error.into())),
        }
    }
}
