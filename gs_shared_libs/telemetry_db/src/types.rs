/*
Schema-level type model.

Every wire type is one closed tagged variant so the serializer, parser and
emulator all pattern-match exhaustively. Enum and struct kinds refer to
shared data types by name; the owning database resolves the name at use time.
*/

use std::fmt;

/// How an array data point gets its element count
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArraySize {
    /// Literal element count fixed in the schema
    Fixed(usize),
    /// Element count is the value of a named constant
    Constant(String),
    /// Element count is the runtime value of an earlier sibling field
    Dynamic(String),
}

/// Closed set of wire types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    Bool,
    /// Two's-complement integer, width in bytes (1, 2, 4 or 8)
    Int { signed: bool, width: u8 },
    F32,
    F64,
    Char,
    /// A single raw byte; only meaningful as an array element
    Bytes,
    /// Named shared enum data type
    Enum(String),
    /// Named shared struct data type
    Struct(String),
    Array {
        element: Box<TypeKind>,
        size: ArraySize,
    },
}

impl TypeKind {
    /// Resolve one of the base scalar type names
    pub fn from_base_name(name: &str) -> Option<TypeKind> {
        let kind = match name {
            "bool" => TypeKind::Bool,
            "char" => TypeKind::Char,
            "bytes" => TypeKind::Bytes,
            "float" => TypeKind::F32,
            "double" => TypeKind::F64,
            "uint8" => TypeKind::Int { signed: false, width: 1 },
            "uint16" => TypeKind::Int { signed: false, width: 2 },
            "uint32" => TypeKind::Int { signed: false, width: 4 },
            "uint64" => TypeKind::Int { signed: false, width: 8 },
            "int8" => TypeKind::Int { signed: true, width: 1 },
            "int16" => TypeKind::Int { signed: true, width: 2 },
            "int32" => TypeKind::Int { signed: true, width: 4 },
            "int64" => TypeKind::Int { signed: true, width: 8 },
            _ => return None,
        };
        Some(kind)
    }

    pub fn is_base_name(name: &str) -> bool {
        TypeKind::from_base_name(name).is_some()
    }

    /// Inclusive numeric range of an integer kind
    pub fn int_bounds(signed: bool, width: u8) -> (i128, i128) {
        let bits = u32::from(width) * 8;
        if signed {
            let max = (1i128 << (bits - 1)) - 1;
            (-max - 1, max)
        } else {
            (0, (1i128 << bits) - 1)
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, TypeKind::Int { .. } | TypeKind::F32 | TypeKind::F64)
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, TypeKind::Int { .. })
    }
}

/// A default value carried by a type: either a literal, or a reference to a
/// named constant that is re-resolved whenever the constant changes.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    Literal(Value),
    Constant(String),
}

/// Runtime value union mirroring `TypeKind`
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    I64(i64),
    U64(u64),
    F64(f64),
    Char(char),
    Bytes(Vec<u8>),
    /// Member name of a shared enum type
    EnumMember(String),
    /// Field values of a shared struct type, in declaration order
    Struct(Vec<(String, Value)>),
    Array(Vec<Value>),
}

impl Value {
    /// Unsigned interpretation, used when a field serves as an array size
    pub fn as_usize(&self) -> Option<usize> {
        match self {
            Value::U64(v) => usize::try_from(*v).ok(),
            Value::I64(v) => usize::try_from(*v).ok(),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{}", v),
            Value::I64(v) => write!(f, "{}", v),
            Value::U64(v) => write!(f, "{}", v),
            Value::F64(v) => write!(f, "{}", v),
            Value::Char(v) => write!(f, "{}", v),
            Value::Bytes(v) => write!(f, "{}", String::from_utf8_lossy(v)),
            Value::EnumMember(v) => write!(f, "{}", v),
            Value::Struct(fields) => {
                write!(f, "{{")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", name, value)?;
                }
                write!(f, "}}")
            }
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Resolved description of a field's type as it appears in the schema.
/// `type_name` keeps the textual spelling from the CSV (a base type, a unit
/// name or a shared type name, with an optional array suffix); `kind` is the
/// resolved semantics; `unit` is set when the spelling was a unit name.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeInfo {
    pub type_name: String,
    pub kind: TypeKind,
    pub unit: Option<String>,
    pub description: String,
    pub default: Option<DefaultValue>,
}

/// Named alias for a base type with a physical-quantity description.
/// A unit name may map to several variants sharing the base type.
#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    pub name: String,
    pub variants: Vec<TypeInfo>,
}

/// Named, typed literal usable as a default value elsewhere. The value may
/// itself be a reference to another constant.
#[derive(Debug, Clone, PartialEq)]
pub struct Constant {
    pub name: String,
    pub value: DefaultValue,
    pub type_name: String,
    pub kind: TypeKind,
    pub description: String,
}

/// A persisted device setting entry
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    pub id: u32,
    pub name: String,
    pub type_name: String,
    pub kind: TypeKind,
    pub default: DefaultValue,
    pub description: String,
}

/// One named, typed field within a telemetry or telecommand type
#[derive(Debug, Clone, PartialEq)]
pub struct DataPoint {
    pub name: String,
    pub type_info: TypeInfo,
}

/// A downlink message schema: id plus ordered data points
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryType {
    pub id: u32,
    pub name: String,
    pub description: String,
    pub data: Vec<DataPoint>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TelecommandResponse {
    pub name: String,
    pub type_name: String,
    pub kind: TypeKind,
    pub description: String,
}

/// An uplink command schema: id, arguments and an optional response type
#[derive(Debug, Clone, PartialEq)]
pub struct TelecommandType {
    pub id: u32,
    pub name: String,
    pub debug: bool,
    pub description: String,
    pub data: Vec<DataPoint>,
    pub response: Option<TelecommandResponse>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumMemberDef {
    pub name: String,
    pub doc: Option<String>,
}

/// Shared enum data type. Member values are the declaration indices; the
/// underlying type name fixes the encoded width.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumDef {
    pub name: String,
    pub doc: Option<String>,
    pub underlying: String,
    pub members: Vec<EnumMemberDef>,
    /// Default member name, if any
    pub default: Option<String>,
}

impl EnumDef {
    pub fn member_index(&self, member: &str) -> Option<usize> {
        self.members.iter().position(|m| m.name == member)
    }

    /// Encoded width in bytes, from the underlying type name (falls back to
    /// one byte if the name is not a base integer)
    pub fn width(&self) -> usize {
        match TypeKind::from_base_name(&self.underlying) {
            Some(TypeKind::Int { width, .. }) => usize::from(width),
            _ => 1,
        }
    }
}

/// Shared struct data type: ordered named fields, possibly referencing other
/// shared types. Cycle-free by construction; not verified at runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct StructDef {
    pub name: String,
    pub doc: Option<String>,
    pub fields: Vec<(String, TypeInfo)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_name_round_trip() {
        for name in [
            "bool", "char", "bytes", "float", "double", "uint8", "uint16", "uint32", "uint64",
            "int8", "int16", "int32", "int64",
        ] {
            assert!(TypeKind::from_base_name(name).is_some(), "{}", name);
        }
        assert!(TypeKind::from_base_name("uint24").is_none());
        assert!(TypeKind::from_base_name("Celsius").is_none());
    }

    #[test]
    fn test_int_bounds() {
        assert_eq!(TypeKind::int_bounds(false, 1), (0, 255));
        assert_eq!(TypeKind::int_bounds(true, 1), (-128, 127));
        assert_eq!(TypeKind::int_bounds(false, 2), (0, 65535));
        assert_eq!(
            TypeKind::int_bounds(true, 8),
            (i128::from(i64::MIN), i128::from(i64::MAX))
        );
        assert_eq!(TypeKind::int_bounds(false, 8).1, i128::from(u64::MAX));
    }

    #[test]
    fn test_enum_width_follows_underlying() {
        let mut def = EnumDef {
            name: "Mode".to_string(),
            doc: None,
            underlying: "uint8".to_string(),
            members: vec![],
            default: None,
        };
        assert_eq!(def.width(), 1);
        def.underlying = "uint16".to_string();
        assert_eq!(def.width(), 2);
    }

    #[test]
    fn test_value_as_usize() {
        assert_eq!(Value::U64(12).as_usize(), Some(12));
        assert_eq!(Value::I64(-1).as_usize(), None);
        assert_eq!(Value::F64(3.0).as_usize(), None);
    }
}
