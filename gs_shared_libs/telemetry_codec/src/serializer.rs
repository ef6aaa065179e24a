use telemetry_db::{
    ArraySize, CommunicationDatabase, DataPoint, DatabaseError, TypeKind, Value,
};

use crate::checksum::crc16_ccitt;
use crate::errors::CodecError;

/// Sync pair, checksum and discriminator
pub const HEADER_LENGTH: usize = 5;

fn message_data<'a>(
    db: &'a CommunicationDatabase,
    type_name: &str,
) -> Result<(u32, &'a [DataPoint]), CodecError> {
    if let Some(telemetry) = db.telemetry_type(type_name) {
        return Ok((telemetry.id, &telemetry.data));
    }
    if let Some(telecommand) = db.telecommand_type(type_name) {
        return Ok((telecommand.id, &telecommand.data));
    }
    Err(CodecError::UnknownType(type_name.to_string()))
}

/// Ordered list of data points a caller must supply values for. A data point
/// with a default is filled in at encode time, and one that only feeds
/// another array's dynamic size is filled from that array's actual length,
/// so neither is required.
pub fn required_data_points(
    db: &CommunicationDatabase,
    type_name: &str,
) -> Result<Vec<String>, CodecError> {
    let (_, data) = message_data(db, type_name)?;
    let mut required: Vec<&str> = data
        .iter()
        .filter(|dp| dp.type_info.default.is_none())
        .map(|dp| dp.name.as_str())
        .collect();
    for dp in data {
        if let TypeKind::Array { size: ArraySize::Dynamic(source), .. } = &dp.type_info.kind {
            if matches!(
                db.type_byte_length(&dp.type_info.kind),
                Err(DatabaseError::DynamicSize(_))
            ) {
                required.retain(|name| name != source);
            }
        }
    }
    Ok(required.into_iter().map(str::to_string).collect())
}

/// Encode a complete message for the named telemetry or telecommand type.
/// Omitted data points fall back to their declared defaults; dynamic array
/// size sources are derived from the actual array lengths.
pub fn serialize(
    db: &CommunicationDatabase,
    type_name: &str,
    values: &[(String, Value)],
) -> Result<Vec<u8>, CodecError> {
    let (id, data) = message_data(db, type_name)?;
    for name in required_data_points(db, type_name)? {
        if !values.iter().any(|(n, _)| *n == name) {
            return Err(CodecError::MissingValue(name));
        }
    }

    let discriminator = u8::try_from(id).map_err(|_| CodecError::IdOutOfRange {
        type_name: type_name.to_string(),
        id,
    })?;
    let mut body = vec![discriminator];
    for dp in data {
        let value = resolve_value(db, data, dp, values)?;
        if !db.value_conforms(&value, &dp.type_info.kind) {
            return Err(CodecError::ValueOutOfRange {
                name: dp.name.clone(),
                value: value.to_string(),
            });
        }
        encode_value(db, &dp.type_info.kind, &value, &mut body)?;
    }

    let (sync1, sync2) = db.sync_bytes();
    let crc = crc16_ccitt(&body);
    let mut message = Vec::with_capacity(HEADER_LENGTH + body.len() - 1);
    message.push(sync1);
    message.push(sync2);
    message.extend_from_slice(&crc.to_be_bytes());
    message.extend_from_slice(&body);
    Ok(message)
}

fn resolve_value(
    db: &CommunicationDatabase,
    data: &[DataPoint],
    dp: &DataPoint,
    values: &[(String, Value)],
) -> Result<Value, CodecError> {
    if let Some((_, value)) = values.iter().find(|(n, _)| *n == dp.name) {
        return Ok(value.clone());
    }
    // A dynamic-size source takes its value from the referencing array's
    // actual length, overriding any default it may carry
    for sibling in data {
        if let TypeKind::Array { size: ArraySize::Dynamic(source), .. } = &sibling.type_info.kind
        {
            if *source == dp.name {
                let (_, array_value) = values
                    .iter()
                    .find(|(n, _)| *n == sibling.name)
                    .ok_or_else(|| CodecError::MissingValue(sibling.name.clone()))?;
                let length = match array_value {
                    Value::Bytes(bytes) => bytes.len(),
                    Value::Array(items) => items.len(),
                    other => {
                        return Err(CodecError::ValueOutOfRange {
                            name: sibling.name.clone(),
                            value: other.to_string(),
                        })
                    }
                };
                return Ok(Value::U64(length as u64));
            }
        }
    }
    if let Some(default) = &dp.type_info.default {
        return Ok(db.resolve_default(default)?);
    }
    Err(CodecError::MissingValue(dp.name.clone()))
}

fn encode_value(
    db: &CommunicationDatabase,
    kind: &TypeKind,
    value: &Value,
    out: &mut Vec<u8>,
) -> Result<(), CodecError> {
    let mismatch = || CodecError::ValueOutOfRange {
        name: String::new(),
        value: value.to_string(),
    };
    match (kind, value) {
        (TypeKind::Bool, Value::Bool(v)) => out.push(u8::from(*v)),
        (TypeKind::Int { width, .. }, Value::I64(v)) => {
            encode_int(*v as u64, *width, out);
        }
        (TypeKind::Int { width, .. }, Value::U64(v)) => {
            encode_int(*v, *width, out);
        }
        (TypeKind::F32, Value::F64(v)) => out.extend_from_slice(&(*v as f32).to_be_bytes()),
        (TypeKind::F64, Value::F64(v)) => out.extend_from_slice(&v.to_be_bytes()),
        (TypeKind::Char, Value::Char(c)) => out.push(*c as u8),
        (TypeKind::Bytes, Value::U64(v)) => out.push(*v as u8),
        (TypeKind::Enum(name), Value::EnumMember(member)) => {
            let def = db
                .enum_def(name)
                .ok_or_else(|| CodecError::UnknownType(name.clone()))?;
            let index = def.member_index(member).ok_or_else(mismatch)?;
            encode_int(index as u64, def.width() as u8, out);
        }
        (TypeKind::Struct(name), Value::Struct(fields)) => {
            let def = db
                .struct_def(name)
                .ok_or_else(|| CodecError::UnknownType(name.clone()))?;
            for ((_, info), (_, field_value)) in def.fields.iter().zip(fields.iter()) {
                encode_value(db, &info.kind, field_value, out)?;
            }
        }
        (TypeKind::Array { element, .. }, Value::Bytes(bytes))
            if matches!(**element, TypeKind::Bytes) =>
        {
            out.extend_from_slice(bytes);
        }
        (TypeKind::Array { element, .. }, Value::Array(items)) => {
            for item in items {
                encode_value(db, element, item, out)?;
            }
        }
        _ => return Err(mismatch()),
    }
    Ok(())
}

fn encode_int(value: u64, width: u8, out: &mut Vec<u8>) {
    for shift in (0..width).rev() {
        out.push((value >> (8 * shift)) as u8);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telemetry_db::{Constant, DefaultValue};

    fn test_db() -> CommunicationDatabase {
        let mut db = CommunicationDatabase::new();
        db.add_telemetry("power", "Battery status").unwrap();
        let voltage = db.type_info("uint16", "Millivolts", None).unwrap();
        db.add_telemetry_data_point(
            "power",
            DataPoint { name: "voltage".to_string(), type_info: voltage },
        )
        .unwrap();
        let charging = db
            .type_info(
                "bool",
                "",
                Some(DefaultValue::Literal(Value::Bool(false))),
            )
            .unwrap();
        db.add_telemetry_data_point(
            "power",
            DataPoint { name: "charging".to_string(), type_info: charging },
        )
        .unwrap();
        db
    }

    fn dynamic_db() -> CommunicationDatabase {
        let mut db = CommunicationDatabase::new();
        db.add_telemetry("log", "Free-form log line").unwrap();
        let len = db.type_info("uint8", "", None).unwrap();
        db.add_telemetry_data_point("log", DataPoint { name: "len".to_string(), type_info: len })
            .unwrap();
        let text = db.type_info("bytes[<len>]", "", None).unwrap();
        db.add_telemetry_data_point("log", DataPoint { name: "text".to_string(), type_info: text })
            .unwrap();
        db
    }

    #[test]
    fn test_message_layout() {
        let db = test_db();
        let message = serialize(
            &db,
            "power",
            &[("voltage".to_string(), Value::U64(0x1234))],
        )
        .unwrap();
        assert_eq!(message[0], 0xAA);
        assert_eq!(message[1], 0x55);
        let crc = crc16_ccitt(&message[4..]);
        assert_eq!(u16::from_be_bytes([message[2], message[3]]), crc);
        assert_eq!(message[4], 0); // first telemetry id
        assert_eq!(&message[5..], &[0x12, 0x34, 0x00]);
    }

    #[test]
    fn test_default_fills_omitted_value() {
        let db = test_db();
        let message = serialize(
            &db,
            "power",
            &[("voltage".to_string(), Value::U64(1))],
        )
        .unwrap();
        assert_eq!(*message.last().unwrap(), 0x00);
    }

    #[test]
    fn test_missing_required_value_rejected() {
        let db = test_db();
        let result = serialize(&db, "power", &[]);
        assert!(matches!(result, Err(CodecError::MissingValue(name)) if name == "voltage"));
    }

    #[test]
    fn test_out_of_range_value_rejected() {
        let db = test_db();
        let result = serialize(
            &db,
            "power",
            &[("voltage".to_string(), Value::U64(70_000))],
        );
        assert!(matches!(result, Err(CodecError::ValueOutOfRange { name, .. }) if name == "voltage"));
    }

    #[test]
    fn test_dynamic_size_source_not_required() {
        let db = dynamic_db();
        let required = required_data_points(&db, "log").unwrap();
        assert_eq!(required, vec!["text".to_string()]);
    }

    #[test]
    fn test_constant_sized_array_source_still_required() {
        let mut db = CommunicationDatabase::new();
        db.add_constant(Constant {
            name: "LEN".to_string(),
            value: DefaultValue::Literal(Value::U64(2)),
            type_name: "uint8".to_string(),
            kind: TypeKind::Int { signed: false, width: 1 },
            description: "".to_string(),
        })
        .unwrap();
        db.add_telemetry("fixed", "").unwrap();
        let len = db.type_info("uint8", "", None).unwrap();
        db.add_telemetry_data_point("fixed", DataPoint { name: "len".to_string(), type_info: len })
            .unwrap();
        let data = db.type_info("uint8[LEN]", "", None).unwrap();
        db.add_telemetry_data_point("fixed", DataPoint { name: "data".to_string(), type_info: data })
            .unwrap();
        let required = required_data_points(&db, "fixed").unwrap();
        assert_eq!(required, vec!["len".to_string(), "data".to_string()]);
    }

    #[test]
    fn test_dynamic_size_backfilled_from_array_length() {
        let db = dynamic_db();
        let message = serialize(
            &db,
            "log",
            &[("text".to_string(), Value::Bytes(b"hello".to_vec()))],
        )
        .unwrap();
        assert_eq!(message[5], 5);
        assert_eq!(&message[6..], b"hello");
    }

    #[test]
    fn test_array_length_overrides_size_source_default() {
        let mut db = CommunicationDatabase::new();
        db.add_telemetry("log", "").unwrap();
        let len = db
            .type_info("uint8", "", Some(DefaultValue::Literal(Value::U64(3))))
            .unwrap();
        db.add_telemetry_data_point("log", DataPoint { name: "len".to_string(), type_info: len })
            .unwrap();
        let text = db.type_info("bytes[<len>]", "", None).unwrap();
        db.add_telemetry_data_point("log", DataPoint { name: "text".to_string(), type_info: text })
            .unwrap();
        let message = serialize(
            &db,
            "log",
            &[("text".to_string(), Value::Bytes(b"hello".to_vec()))],
        )
        .unwrap();
        assert_eq!(message[5], 5);
        assert_eq!(&message[6..], b"hello");
    }

    #[test]
    fn test_id_beyond_discriminator_byte_rejected() {
        let mut db = CommunicationDatabase::new();
        for i in 0..=256 {
            db.add_telemetry(&format!("tm{i}"), "").unwrap();
        }
        assert!(serialize(&db, "tm255", &[]).is_ok());
        assert!(matches!(
            serialize(&db, "tm256", &[]),
            Err(CodecError::IdOutOfRange { id: 256, .. })
        ));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let db = test_db();
        assert!(matches!(
            serialize(&db, "nope", &[]),
            Err(CodecError::UnknownType(_))
        ));
    }
}
