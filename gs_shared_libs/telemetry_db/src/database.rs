/*
In-memory communication database.

Owns every schema entity for one tracked telemetry format. Mutating
operations keep the per-entity invariants (contiguous ids, unique names,
resolvable references) and notify registered change listeners so dependent
views can refresh. Instances compare field-wise so callers can detect
unsaved changes against a freshly loaded copy.
*/

use std::fmt;

use common::constants::{DEFAULT_SYNC_BYTE_1, DEFAULT_SYNC_BYTE_2};

use crate::errors::{DatabaseError, DynamicSizeError};
use crate::types::{
    ArraySize, Configuration, Constant, DataPoint, DefaultValue, EnumDef, StructDef,
    TelecommandResponse, TelecommandType, TelemetryType, TypeInfo, TypeKind, Unit, Value,
};

/// Constant names the database owns. Regenerated identically on every load,
/// never written to the editable CSVs, never user-edited or deleted.
pub const RESERVED_CONSTANT_NAMES: [&str; 3] =
    ["SYNC_BYTE_1", "SYNC_BYTE_2", "NUM_CONFIGURATIONS"];

const MAX_CONSTANT_CHAIN_DEPTH: usize = 32;

/// Emitted after every successful mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    UnitAdded(String),
    ConstantAdded(String),
    ConstantUpdated { old: String, new: String },
    ConstantRemoved(String),
    DataTypeAdded(String),
    ConfigurationAdded(String),
    ConfigurationRemoved(String),
    TelemetryAdded(String),
    TelemetryRemoved(String),
    TelecommandAdded(String),
    TelecommandRemoved(String),
    DataPointAdded { owner: String, name: String },
}

/// Nested view over a telemetry type's fields: one node per struct level,
/// one leaf per non-struct field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldTree<T> {
    Node(Vec<(String, FieldTree<T>)>),
    Leaf(T),
}

impl<T> FieldTree<T> {
    pub fn get(&self, path: &[&str]) -> Option<&FieldTree<T>> {
        let mut current = self;
        for segment in path {
            match current {
                FieldTree::Node(children) => {
                    current = children
                        .iter()
                        .find(|(name, _)| name == segment)
                        .map(|(_, tree)| tree)?;
                }
                FieldTree::Leaf(_) => return None,
            }
        }
        Some(current)
    }

    pub fn leaf(&self) -> Option<&T> {
        match self {
            FieldTree::Leaf(value) => Some(value),
            FieldTree::Node(_) => None,
        }
    }
}

pub struct CommunicationDatabase {
    units: Vec<Unit>,
    constants: Vec<Constant>,
    enums: Vec<EnumDef>,
    structs: Vec<StructDef>,
    configurations: Vec<Configuration>,
    telemetry: Vec<TelemetryType>,
    telecommands: Vec<TelecommandType>,
    listeners: Vec<Box<dyn Fn(&ChangeEvent) + Send>>,
}

impl fmt::Debug for CommunicationDatabase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CommunicationDatabase")
            .field("units", &self.units)
            .field("constants", &self.constants)
            .field("enums", &self.enums)
            .field("structs", &self.structs)
            .field("configurations", &self.configurations)
            .field("telemetry", &self.telemetry)
            .field("telecommands", &self.telecommands)
            .finish()
    }
}

impl Clone for CommunicationDatabase {
    fn clone(&self) -> Self {
        CommunicationDatabase {
            units: self.units.clone(),
            constants: self.constants.clone(),
            enums: self.enums.clone(),
            structs: self.structs.clone(),
            configurations: self.configurations.clone(),
            telemetry: self.telemetry.clone(),
            telecommands: self.telecommands.clone(),
            // Listeners belong to the original's views, not to the copy
            listeners: Vec::new(),
        }
    }
}

impl PartialEq for CommunicationDatabase {
    fn eq(&self, other: &Self) -> bool {
        self.units == other.units
            && self.constants == other.constants
            && self.enums == other.enums
            && self.structs == other.structs
            && self.configurations == other.configurations
            && self.telemetry == other.telemetry
            && self.telecommands == other.telecommands
    }
}

impl Default for CommunicationDatabase {
    fn default() -> Self {
        CommunicationDatabase::new()
    }
}

impl CommunicationDatabase {
    pub fn new() -> Self {
        CommunicationDatabase {
            units: Vec::new(),
            constants: reserved_constants(),
            enums: Vec::new(),
            structs: Vec::new(),
            configurations: Vec::new(),
            telemetry: Vec::new(),
            telecommands: Vec::new(),
            listeners: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Accessors

    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    pub fn constants(&self) -> &[Constant] {
        &self.constants
    }

    pub fn enums(&self) -> &[EnumDef] {
        &self.enums
    }

    pub fn structs(&self) -> &[StructDef] {
        &self.structs
    }

    pub fn configurations(&self) -> &[Configuration] {
        &self.configurations
    }

    pub fn telemetry(&self) -> &[TelemetryType] {
        &self.telemetry
    }

    pub fn telecommands(&self) -> &[TelecommandType] {
        &self.telecommands
    }

    pub fn unit(&self, name: &str) -> Option<&Unit> {
        self.units.iter().find(|u| u.name == name)
    }

    pub fn constant(&self, name: &str) -> Option<&Constant> {
        self.constants.iter().find(|c| c.name == name)
    }

    pub fn enum_def(&self, name: &str) -> Option<&EnumDef> {
        self.enums.iter().find(|e| e.name == name)
    }

    pub fn struct_def(&self, name: &str) -> Option<&StructDef> {
        self.structs.iter().find(|s| s.name == name)
    }

    pub fn configuration(&self, name: &str) -> Option<&Configuration> {
        self.configurations.iter().find(|c| c.name == name)
    }

    pub fn telemetry_type(&self, name: &str) -> Option<&TelemetryType> {
        self.telemetry.iter().find(|t| t.name == name)
    }

    pub fn telemetry_by_id(&self, id: u32) -> Option<&TelemetryType> {
        self.telemetry.iter().find(|t| t.id == id)
    }

    pub fn telecommand_type(&self, name: &str) -> Option<&TelecommandType> {
        self.telecommands.iter().find(|t| t.name == name)
    }

    pub fn telecommand_by_id(&self, id: u32) -> Option<&TelecommandType> {
        self.telecommands.iter().find(|t| t.id == id)
    }

    pub fn is_reserved_name(name: &str) -> bool {
        RESERVED_CONSTANT_NAMES.contains(&name)
    }

    /// User-defined shared data type names (enums and structs)
    pub fn shared_data_type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.enums.iter().map(|e| e.name.clone()).collect();
        names.extend(self.structs.iter().map(|s| s.name.clone()));
        names
    }

    /// Current sync byte pair from the reserved constants
    pub fn sync_bytes(&self) -> (u8, u8) {
        let byte_of = |name: &str, fallback: u8| {
            self.resolve_constant(name)
                .ok()
                .and_then(|v| v.as_usize())
                .and_then(|v| u8::try_from(v).ok())
                .unwrap_or(fallback)
        };
        (
            byte_of("SYNC_BYTE_1", DEFAULT_SYNC_BYTE_1),
            byte_of("SYNC_BYTE_2", DEFAULT_SYNC_BYTE_2),
        )
    }

    pub fn add_change_listener(&mut self, listener: Box<dyn Fn(&ChangeEvent) + Send>) {
        self.listeners.push(listener);
    }

    fn notify(&self, event: ChangeEvent) {
        for listener in &self.listeners {
            listener(&event);
        }
    }

    // ------------------------------------------------------------------
    // Type resolution

    /// True when `name` is taken in the type namespace (base names, units,
    /// shared enums and structs share one namespace)
    fn type_name_taken(&self, name: &str) -> bool {
        TypeKind::is_base_name(name)
            || self.unit(name).is_some()
            || self.enum_def(name).is_some()
            || self.struct_def(name).is_some()
    }

    /// Parse the textual type syntax used throughout the CSV files: a base
    /// type, unit or shared type name, with optional array suffixes
    /// `name[12]`, `name[SOME_CONSTANT]` or `name[<sibling_field>]`.
    pub fn parse_type(&self, text: &str) -> Result<(TypeKind, Option<String>), DatabaseError> {
        let text = text.trim();
        if let Some(open) = text.rfind('[') {
            let close = text
                .strip_suffix(']')
                .ok_or_else(|| DatabaseError::UnknownType(text.to_string()))?;
            let inner = &close[open + 1..];
            let (element, unit) = self.parse_type(&text[..open])?;
            let size = self.parse_array_size(inner)?;
            return Ok((
                TypeKind::Array {
                    element: Box::new(element),
                    size,
                },
                unit,
            ));
        }

        if let Some(kind) = TypeKind::from_base_name(text) {
            return Ok((kind, None));
        }
        if let Some(unit) = self.unit(text) {
            let kind = unit
                .variants
                .first()
                .map(|v| v.kind.clone())
                .ok_or_else(|| DatabaseError::UnknownType(text.to_string()))?;
            return Ok((kind, Some(text.to_string())));
        }
        if self.enum_def(text).is_some() {
            return Ok((TypeKind::Enum(text.to_string()), None));
        }
        if self.struct_def(text).is_some() {
            return Ok((TypeKind::Struct(text.to_string()), None));
        }
        Err(DatabaseError::UnknownType(text.to_string()))
    }

    fn parse_array_size(&self, inner: &str) -> Result<ArraySize, DatabaseError> {
        let inner = inner.trim();
        if let Ok(count) = inner.parse::<usize>() {
            return Ok(ArraySize::Fixed(count));
        }
        if let Some(field) = inner.strip_prefix('<').and_then(|s| s.strip_suffix('>')) {
            return Ok(ArraySize::Dynamic(field.to_string()));
        }
        if self.constant(inner).is_some() {
            return Ok(ArraySize::Constant(inner.to_string()));
        }
        Err(DatabaseError::UnknownConstant(inner.to_string()))
    }

    /// Build a TypeInfo from the textual type name, validating the default
    pub fn type_info(
        &self,
        type_name: &str,
        description: &str,
        default: Option<DefaultValue>,
    ) -> Result<TypeInfo, DatabaseError> {
        let (kind, unit) = self.parse_type(type_name)?;
        if let Some(default) = &default {
            self.validate_default(default, &kind, type_name)?;
        }
        Ok(TypeInfo {
            type_name: type_name.trim().to_string(),
            kind,
            unit,
            description: description.to_string(),
            default,
        })
    }

    fn validate_default(
        &self,
        default: &DefaultValue,
        kind: &TypeKind,
        type_name: &str,
    ) -> Result<(), DatabaseError> {
        let value = match default {
            DefaultValue::Literal(value) => value.clone(),
            DefaultValue::Constant(name) => self.resolve_constant(name)?,
        };
        if !self.value_conforms(&value, kind) {
            return Err(DatabaseError::ValueTypeMismatch {
                type_name: type_name.to_string(),
                value: value.to_string(),
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Values

    /// Parse a single CSV field into a value of the given scalar kind
    pub fn parse_scalar_value(&self, text: &str, kind: &TypeKind) -> Result<Value, DatabaseError> {
        let text = text.trim();
        let mismatch = |type_name: &str| DatabaseError::ValueTypeMismatch {
            type_name: type_name.to_string(),
            value: text.to_string(),
        };
        match kind {
            TypeKind::Bool => match text {
                "true" | "True" | "1" => Ok(Value::Bool(true)),
                "false" | "False" | "0" => Ok(Value::Bool(false)),
                _ => Err(mismatch("bool")),
            },
            TypeKind::Int { signed, width } => {
                let parsed: i128 = text.parse().map_err(|_| mismatch("integer"))?;
                let (min, max) = TypeKind::int_bounds(*signed, *width);
                if parsed < min || parsed > max {
                    return Err(mismatch("integer"));
                }
                if *signed {
                    Ok(Value::I64(parsed as i64))
                } else {
                    Ok(Value::U64(parsed as u64))
                }
            }
            TypeKind::F32 => {
                let parsed: f64 = text.parse().map_err(|_| mismatch("float"))?;
                if parsed.abs() > f64::from(f32::MAX) {
                    return Err(mismatch("float"));
                }
                Ok(Value::F64(parsed))
            }
            TypeKind::F64 => {
                let parsed: f64 = text.parse().map_err(|_| mismatch("double"))?;
                Ok(Value::F64(parsed))
            }
            TypeKind::Char => {
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if c.is_ascii() => Ok(Value::Char(c)),
                    _ => Err(mismatch("char")),
                }
            }
            TypeKind::Enum(name) => {
                let def = self
                    .enum_def(name)
                    .ok_or_else(|| DatabaseError::UnknownType(name.clone()))?;
                if def.member_index(text).is_some() {
                    Ok(Value::EnumMember(text.to_string()))
                } else {
                    Err(mismatch(name))
                }
            }
            TypeKind::Bytes | TypeKind::Struct(_) | TypeKind::Array { .. } => {
                Err(mismatch("scalar"))
            }
        }
    }

    /// Check a runtime value against a kind, resolving shared type and
    /// constant names along the way
    pub fn value_conforms(&self, value: &Value, kind: &TypeKind) -> bool {
        match (kind, value) {
            (TypeKind::Bool, Value::Bool(_)) => true,
            (TypeKind::Int { signed, width }, Value::I64(v)) => {
                let (min, max) = TypeKind::int_bounds(*signed, *width);
                i128::from(*v) >= min && i128::from(*v) <= max
            }
            (TypeKind::Int { signed, width }, Value::U64(v)) => {
                let (_, max) = TypeKind::int_bounds(*signed, *width);
                i128::from(*v) <= max
            }
            (TypeKind::F32, Value::F64(v)) => v.abs() <= f64::from(f32::MAX),
            (TypeKind::F64, Value::F64(_)) => true,
            (TypeKind::Char, Value::Char(c)) => c.is_ascii(),
            (TypeKind::Bytes, Value::U64(v)) => *v <= 255,
            (TypeKind::Enum(name), Value::EnumMember(member)) => self
                .enum_def(name)
                .map(|def| def.member_index(member).is_some())
                .unwrap_or(false),
            (TypeKind::Struct(name), Value::Struct(fields)) => {
                let Some(def) = self.struct_def(name) else {
                    return false;
                };
                def.fields.len() == fields.len()
                    && def.fields.iter().zip(fields.iter()).all(
                        |((def_name, info), (name, value))| {
                            def_name == name && self.value_conforms(value, &info.kind)
                        },
                    )
            }
            (TypeKind::Array { element, size }, Value::Bytes(bytes)) => {
                matches!(**element, TypeKind::Bytes)
                    && self.array_len_matches(size, bytes.len())
            }
            (TypeKind::Array { element, size }, Value::Array(items)) => {
                self.array_len_matches(size, items.len())
                    && items.iter().all(|item| self.value_conforms(item, element))
            }
            _ => false,
        }
    }

    fn array_len_matches(&self, size: &ArraySize, len: usize) -> bool {
        match self.array_size_elements(size) {
            Ok(expected) => expected == len,
            Err(DatabaseError::DynamicSize(_)) => true,
            Err(_) => false,
        }
    }

    /// Element count of an array size specification. Dynamic sizes yield
    /// `DatabaseError::DynamicSize` so callers can fall back to the runtime
    /// value of the referenced sibling.
    pub fn array_size_elements(&self, size: &ArraySize) -> Result<usize, DatabaseError> {
        match size {
            ArraySize::Fixed(count) => Ok(*count),
            ArraySize::Constant(name) => {
                let value = self.resolve_constant(name)?;
                value
                    .as_usize()
                    .ok_or_else(|| DatabaseError::ValueTypeMismatch {
                        type_name: "array size".to_string(),
                        value: value.to_string(),
                    })
            }
            ArraySize::Dynamic(_) => Err(DynamicSizeError.into()),
        }
    }

    /// Encoded byte width of a kind. Arrays with a dynamic size yield
    /// `DatabaseError::DynamicSize`.
    pub fn type_byte_length(&self, kind: &TypeKind) -> Result<usize, DatabaseError> {
        match kind {
            TypeKind::Bool | TypeKind::Char | TypeKind::Bytes => Ok(1),
            TypeKind::Int { width, .. } => Ok(usize::from(*width)),
            TypeKind::F32 => Ok(4),
            TypeKind::F64 => Ok(8),
            TypeKind::Enum(name) => self
                .enum_def(name)
                .map(|def| def.width())
                .ok_or_else(|| DatabaseError::UnknownType(name.clone())),
            TypeKind::Struct(name) => {
                let def = self
                    .struct_def(name)
                    .ok_or_else(|| DatabaseError::UnknownType(name.clone()))?;
                let mut total = 0;
                for (_, info) in &def.fields {
                    total += self.type_byte_length(&info.kind)?;
                }
                Ok(total)
            }
            TypeKind::Array { element, size } => {
                let count = self.array_size_elements(size)?;
                Ok(count * self.type_byte_length(element)?)
            }
        }
    }

    /// Resolve a constant to its literal value, following references
    pub fn resolve_constant(&self, name: &str) -> Result<Value, DatabaseError> {
        let mut current = name;
        for _ in 0..MAX_CONSTANT_CHAIN_DEPTH {
            let constant = self
                .constant(current)
                .ok_or_else(|| DatabaseError::UnknownConstant(current.to_string()))?;
            match &constant.value {
                DefaultValue::Literal(value) => return Ok(value.clone()),
                DefaultValue::Constant(next) => current = next,
            }
        }
        Err(DatabaseError::CircularReference(name.to_string()))
    }

    /// Resolve a default to its literal value
    pub fn resolve_default(&self, default: &DefaultValue) -> Result<Value, DatabaseError> {
        match default {
            DefaultValue::Literal(value) => Ok(value.clone()),
            DefaultValue::Constant(name) => self.resolve_constant(name),
        }
    }

    // ------------------------------------------------------------------
    // Units

    pub fn add_unit(&mut self, name: &str, variant: TypeInfo) -> Result<(), DatabaseError> {
        if !matches!(
            variant.kind,
            TypeKind::Bool | TypeKind::Int { .. } | TypeKind::F32 | TypeKind::F64 | TypeKind::Char
        ) {
            return Err(DatabaseError::ValueTypeMismatch {
                type_name: variant.type_name.clone(),
                value: format!("unit '{}' must alias a scalar base type", name),
            });
        }
        if let Some(unit) = self.units.iter_mut().find(|u| u.name == name) {
            // Variants of one unit share the base type
            if unit.variants.first().map(|v| &v.kind) != Some(&variant.kind) {
                return Err(DatabaseError::ValueTypeMismatch {
                    type_name: variant.type_name,
                    value: format!("variant base type differs for unit '{}'", name),
                });
            }
            unit.variants.push(variant);
            self.notify(ChangeEvent::UnitAdded(name.to_string()));
            return Ok(());
        }
        if self.type_name_taken(name) {
            return Err(DatabaseError::NameCollision(name.to_string()));
        }
        self.units.push(Unit {
            name: name.to_string(),
            variants: vec![variant],
        });
        self.notify(ChangeEvent::UnitAdded(name.to_string()));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Constants

    pub fn add_constant(&mut self, constant: Constant) -> Result<(), DatabaseError> {
        if Self::is_reserved_name(&constant.name) {
            return Err(DatabaseError::ReservedName(constant.name));
        }
        if self.constant(&constant.name).is_some() {
            return Err(DatabaseError::NameCollision(constant.name));
        }
        self.validate_constant(&constant)?;
        let name = constant.name.clone();
        self.constants.push(constant);
        self.notify(ChangeEvent::ConstantAdded(name));
        Ok(())
    }

    /// Replace the constant previously named `old_name`. Validation happens
    /// entirely before any state changes, so a failure leaves the database
    /// untouched; on rename, every reference to the old name is rewritten.
    pub fn update_constant(
        &mut self,
        updated: Constant,
        old_name: &str,
    ) -> Result<(), DatabaseError> {
        let index = self
            .constants
            .iter()
            .position(|c| c.name == old_name)
            .ok_or_else(|| DatabaseError::UnknownEntry(old_name.to_string()))?;
        if Self::is_reserved_name(old_name) {
            return Err(DatabaseError::ReservedName(old_name.to_string()));
        }
        let renamed = updated.name != old_name;
        if renamed
            && (Self::is_reserved_name(&updated.name) || self.constant(&updated.name).is_some())
        {
            return Err(DatabaseError::NameCollision(updated.name));
        }
        if let DefaultValue::Constant(target) = &updated.value {
            if target == &updated.name || target == old_name {
                return Err(DatabaseError::SelfReferentialDefault(updated.name));
            }
        }
        self.validate_constant(&updated)?;

        let new_name = updated.name.clone();
        self.constants[index] = updated;
        if renamed {
            self.rename_constant_references(old_name, &new_name);
        }
        self.notify(ChangeEvent::ConstantUpdated {
            old: old_name.to_string(),
            new: new_name,
        });
        Ok(())
    }

    pub fn delete_constant(&mut self, name: &str) -> Result<(), DatabaseError> {
        if Self::is_reserved_name(name) {
            return Err(DatabaseError::ReservedName(name.to_string()));
        }
        if self.constant(name).is_none() {
            return Err(DatabaseError::UnknownEntry(name.to_string()));
        }
        let count = self.constant_references(name);
        if count > 0 {
            return Err(DatabaseError::InUse {
                name: name.to_string(),
                count,
            });
        }
        self.constants.retain(|c| c.name != name);
        self.notify(ChangeEvent::ConstantRemoved(name.to_string()));
        Ok(())
    }

    /// Bulk-install user constants during load. A constant's value may
    /// reference one defined later in the file, so everything is installed
    /// first and validated afterwards.
    pub(crate) fn install_constants(
        &mut self,
        constants: Vec<Constant>,
    ) -> Result<(), DatabaseError> {
        for constant in constants {
            if Self::is_reserved_name(&constant.name) {
                return Err(DatabaseError::ReservedName(constant.name));
            }
            if self.constant(&constant.name).is_some() {
                return Err(DatabaseError::NameCollision(constant.name));
            }
            self.constants.push(constant);
        }
        for constant in self.constants.clone() {
            self.validate_constant(&constant)?;
        }
        Ok(())
    }

    fn validate_constant(&self, constant: &Constant) -> Result<(), DatabaseError> {
        if !matches!(
            constant.kind,
            TypeKind::Bool | TypeKind::Int { .. } | TypeKind::F32 | TypeKind::F64 | TypeKind::Char
        ) {
            return Err(DatabaseError::ValueTypeMismatch {
                type_name: constant.type_name.clone(),
                value: format!("constant '{}' must have a scalar type", constant.name),
            });
        }
        match &constant.value {
            DefaultValue::Constant(target) => {
                if target == &constant.name {
                    return Err(DatabaseError::SelfReferentialDefault(constant.name.clone()));
                }
                let value = self.resolve_constant(target)?;
                if !self.value_conforms(&value, &constant.kind) {
                    return Err(DatabaseError::ValueTypeMismatch {
                        type_name: constant.type_name.clone(),
                        value: value.to_string(),
                    });
                }
            }
            DefaultValue::Literal(value) => {
                if !self.value_conforms(value, &constant.kind) {
                    return Err(DatabaseError::ValueTypeMismatch {
                        type_name: constant.type_name.clone(),
                        value: value.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Number of places that reference the named constant: other constants'
    /// values, defaults anywhere in the schema, and constant-sized arrays
    pub fn constant_references(&self, name: &str) -> usize {
        let mut count = 0;
        for constant in &self.constants {
            if matches!(&constant.value, DefaultValue::Constant(n) if n == name) {
                count += 1;
            }
        }
        for def in &self.structs {
            for (_, info) in &def.fields {
                count += type_info_references(info, name);
            }
        }
        for config in &self.configurations {
            if matches!(&config.default, DefaultValue::Constant(n) if n == name) {
                count += 1;
            }
            count += kind_references(&config.kind, name);
        }
        for telemetry in &self.telemetry {
            for dp in &telemetry.data {
                count += type_info_references(&dp.type_info, name);
            }
        }
        for telecommand in &self.telecommands {
            for dp in &telecommand.data {
                count += type_info_references(&dp.type_info, name);
            }
            if let Some(response) = &telecommand.response {
                count += kind_references(&response.kind, name);
            }
        }
        count
    }

    /// Single deterministic pass rewriting every reference from `old` to
    /// `new`. Infallible by construction: it only renames matches.
    fn rename_constant_references(&mut self, old: &str, new: &str) {
        for constant in &mut self.constants {
            rename_default(&mut constant.value, old, new);
        }
        for def in &mut self.structs {
            for (_, info) in &mut def.fields {
                rename_type_info(info, old, new);
            }
        }
        for config in &mut self.configurations {
            rename_default(&mut config.default, old, new);
            rename_kind(&mut config.kind, old, new);
            rename_type_name(&mut config.type_name, old, new);
        }
        for telemetry in &mut self.telemetry {
            for dp in &mut telemetry.data {
                rename_type_info(&mut dp.type_info, old, new);
            }
        }
        for telecommand in &mut self.telecommands {
            for dp in &mut telecommand.data {
                rename_type_info(&mut dp.type_info, old, new);
            }
            if let Some(response) = &mut telecommand.response {
                rename_kind(&mut response.kind, old, new);
                rename_type_name(&mut response.type_name, old, new);
            }
        }
    }

    // ------------------------------------------------------------------
    // Shared data types

    pub fn add_shared_enum(&mut self, def: EnumDef) -> Result<(), DatabaseError> {
        if self.type_name_taken(&def.name) {
            return Err(DatabaseError::NameCollision(def.name));
        }
        if TypeKind::from_base_name(&def.underlying)
            .map(|k| !k.is_integer())
            .unwrap_or(true)
        {
            return Err(DatabaseError::UnknownType(def.underlying));
        }
        if let Some(default) = &def.default {
            if def.member_index(default).is_none() {
                return Err(DatabaseError::ValueTypeMismatch {
                    type_name: def.name.clone(),
                    value: default.clone(),
                });
            }
        }
        let name = def.name.clone();
        self.enums.push(def);
        self.notify(ChangeEvent::DataTypeAdded(name));
        Ok(())
    }

    pub fn add_shared_struct(&mut self, def: StructDef) -> Result<(), DatabaseError> {
        if self.type_name_taken(&def.name) {
            return Err(DatabaseError::NameCollision(def.name));
        }
        self.validate_field_sequence(
            def.fields
                .iter()
                .map(|(name, info)| (name.as_str(), info))
                .collect::<Vec<_>>()
                .as_slice(),
        )?;
        let name = def.name.clone();
        self.structs.push(def);
        self.notify(ChangeEvent::DataTypeAdded(name));
        Ok(())
    }

    /// Dynamic array sizes must reference an earlier integer field of the
    /// same sequence; constant sizes must resolve.
    fn validate_field_sequence(&self, fields: &[(&str, &TypeInfo)]) -> Result<(), DatabaseError> {
        for (index, (_, info)) in fields.iter().enumerate() {
            let mut kind = &info.kind;
            while let TypeKind::Array { element, size } = kind {
                match size {
                    ArraySize::Dynamic(sibling) => {
                        let earlier = fields[..index]
                            .iter()
                            .find(|(name, _)| name == sibling)
                            .map(|(_, info)| info);
                        match earlier {
                            Some(info) if info.kind.is_integer() => {}
                            _ => return Err(DatabaseError::UnknownEntry(sibling.clone())),
                        }
                    }
                    ArraySize::Constant(name) => {
                        self.array_size_elements(&ArraySize::Constant(name.clone()))?;
                    }
                    ArraySize::Fixed(_) => {}
                }
                kind = element;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Configurations

    pub fn add_configuration(
        &mut self,
        name: &str,
        type_name: &str,
        default: DefaultValue,
        description: &str,
    ) -> Result<(), DatabaseError> {
        if self.configuration(name).is_some() {
            return Err(DatabaseError::NameCollision(name.to_string()));
        }
        let (kind, _) = self.parse_type(type_name)?;
        self.validate_default(&default, &kind, type_name)?;
        self.configurations.push(Configuration {
            id: self.configurations.len() as u32,
            name: name.to_string(),
            type_name: type_name.to_string(),
            kind,
            default,
            description: description.to_string(),
        });
        self.renumber_configurations();
        self.notify(ChangeEvent::ConfigurationAdded(name.to_string()));
        Ok(())
    }

    pub fn delete_configuration(&mut self, name: &str) -> Result<(), DatabaseError> {
        if self.configuration(name).is_none() {
            return Err(DatabaseError::UnknownEntry(name.to_string()));
        }
        self.configurations.retain(|c| c.name != name);
        self.renumber_configurations();
        self.notify(ChangeEvent::ConfigurationRemoved(name.to_string()));
        Ok(())
    }

    fn renumber_configurations(&mut self) {
        for (index, config) in self.configurations.iter_mut().enumerate() {
            config.id = index as u32;
        }
        let count = self.configurations.len() as u64;
        if let Some(constant) = self
            .constants
            .iter_mut()
            .find(|c| c.name == "NUM_CONFIGURATIONS")
        {
            constant.value = DefaultValue::Literal(Value::U64(count));
        }
    }

    // ------------------------------------------------------------------
    // Telemetry and telecommands

    pub fn add_telemetry(&mut self, name: &str, description: &str) -> Result<(), DatabaseError> {
        if self.telemetry_type(name).is_some() {
            return Err(DatabaseError::NameCollision(name.to_string()));
        }
        self.telemetry.push(TelemetryType {
            id: self.telemetry.len() as u32,
            name: name.to_string(),
            description: description.to_string(),
            data: Vec::new(),
        });
        renumber(&mut self.telemetry, |t, id| t.id = id);
        self.notify(ChangeEvent::TelemetryAdded(name.to_string()));
        Ok(())
    }

    pub fn delete_telemetry(&mut self, name: &str) -> Result<(), DatabaseError> {
        if self.telemetry_type(name).is_none() {
            return Err(DatabaseError::UnknownEntry(name.to_string()));
        }
        self.telemetry.retain(|t| t.name != name);
        renumber(&mut self.telemetry, |t, id| t.id = id);
        self.notify(ChangeEvent::TelemetryRemoved(name.to_string()));
        Ok(())
    }

    pub fn add_telecommand(
        &mut self,
        name: &str,
        debug: bool,
        description: &str,
        response: Option<TelecommandResponse>,
    ) -> Result<(), DatabaseError> {
        if self.telecommand_type(name).is_some() {
            return Err(DatabaseError::NameCollision(name.to_string()));
        }
        self.telecommands.push(TelecommandType {
            id: self.telecommands.len() as u32,
            name: name.to_string(),
            debug,
            description: description.to_string(),
            data: Vec::new(),
            response,
        });
        renumber(&mut self.telecommands, |t, id| t.id = id);
        self.notify(ChangeEvent::TelecommandAdded(name.to_string()));
        Ok(())
    }

    pub fn delete_telecommand(&mut self, name: &str) -> Result<(), DatabaseError> {
        if self.telecommand_type(name).is_none() {
            return Err(DatabaseError::UnknownEntry(name.to_string()));
        }
        self.telecommands.retain(|t| t.name != name);
        renumber(&mut self.telecommands, |t, id| t.id = id);
        self.notify(ChangeEvent::TelecommandRemoved(name.to_string()));
        Ok(())
    }

    pub fn add_telemetry_data_point(
        &mut self,
        telemetry_name: &str,
        data_point: DataPoint,
    ) -> Result<(), DatabaseError> {
        let index = self
            .telemetry
            .iter()
            .position(|t| t.name == telemetry_name)
            .ok_or_else(|| DatabaseError::UnknownEntry(telemetry_name.to_string()))?;
        self.validate_new_data_point(&self.telemetry[index].data, &data_point)?;
        let dp_name = data_point.name.clone();
        self.telemetry[index].data.push(data_point);
        self.notify(ChangeEvent::DataPointAdded {
            owner: telemetry_name.to_string(),
            name: dp_name,
        });
        Ok(())
    }

    pub fn add_telecommand_data_point(
        &mut self,
        telecommand_name: &str,
        data_point: DataPoint,
    ) -> Result<(), DatabaseError> {
        let index = self
            .telecommands
            .iter()
            .position(|t| t.name == telecommand_name)
            .ok_or_else(|| DatabaseError::UnknownEntry(telecommand_name.to_string()))?;
        self.validate_new_data_point(&self.telecommands[index].data, &data_point)?;
        let dp_name = data_point.name.clone();
        self.telecommands[index].data.push(data_point);
        self.notify(ChangeEvent::DataPointAdded {
            owner: telecommand_name.to_string(),
            name: dp_name,
        });
        Ok(())
    }

    fn validate_new_data_point(
        &self,
        existing: &[DataPoint],
        data_point: &DataPoint,
    ) -> Result<(), DatabaseError> {
        if existing.iter().any(|dp| dp.name == data_point.name) {
            return Err(DatabaseError::NameCollision(data_point.name.clone()));
        }
        let mut sequence: Vec<(&str, &TypeInfo)> = existing
            .iter()
            .map(|dp| (dp.name.as_str(), &dp.type_info))
            .collect();
        sequence.push((data_point.name.as_str(), &data_point.type_info));
        self.validate_field_sequence(&sequence)
    }

    // ------------------------------------------------------------------
    // Reordering (interface only; unimplemented in the original editor)

    pub fn move_unit(&mut self, _name: &str, _to: usize) -> Result<(), DatabaseError> {
        Err(DatabaseError::NotImplemented)
    }

    pub fn move_constant(&mut self, _name: &str, _to: usize) -> Result<(), DatabaseError> {
        Err(DatabaseError::NotImplemented)
    }

    pub fn move_configuration(&mut self, _name: &str, _to: usize) -> Result<(), DatabaseError> {
        Err(DatabaseError::NotImplemented)
    }

    pub fn move_telemetry(&mut self, _name: &str, _to: usize) -> Result<(), DatabaseError> {
        Err(DatabaseError::NotImplemented)
    }

    pub fn move_telecommand(&mut self, _name: &str, _to: usize) -> Result<(), DatabaseError> {
        Err(DatabaseError::NotImplemented)
    }

    pub fn move_data_point(
        &mut self,
        _owner: &str,
        _name: &str,
        _to: usize,
    ) -> Result<(), DatabaseError> {
        Err(DatabaseError::NotImplemented)
    }

    // ------------------------------------------------------------------
    // Field traversal

    /// Depth-first walk over a telemetry type's data points, recursing into
    /// struct fields and short-circuiting on enum and array leaves. Returns
    /// two parallel trees: which leaf fields satisfy `predicate`, and which
    /// leaf fields carry a unit name.
    pub fn nested_leaf_fields(
        &self,
        telemetry_name: &str,
        predicate: &dyn Fn(&TypeKind) -> bool,
    ) -> Result<(FieldTree<bool>, FieldTree<Option<String>>), DatabaseError> {
        let telemetry = self
            .telemetry_type(telemetry_name)
            .ok_or_else(|| DatabaseError::UnknownEntry(telemetry_name.to_string()))?;
        let fields: Vec<(&str, &TypeInfo)> = telemetry
            .data
            .iter()
            .map(|dp| (dp.name.as_str(), &dp.type_info))
            .collect();
        self.walk_fields(&fields, predicate)
    }

    fn walk_fields(
        &self,
        fields: &[(&str, &TypeInfo)],
        predicate: &dyn Fn(&TypeKind) -> bool,
    ) -> Result<(FieldTree<bool>, FieldTree<Option<String>>), DatabaseError> {
        let mut matches = Vec::with_capacity(fields.len());
        let mut units = Vec::with_capacity(fields.len());
        for (name, info) in fields {
            match &info.kind {
                TypeKind::Struct(struct_name) => {
                    let def = self
                        .struct_def(struct_name)
                        .ok_or_else(|| DatabaseError::UnknownType(struct_name.clone()))?;
                    let children: Vec<(&str, &TypeInfo)> = def
                        .fields
                        .iter()
                        .map(|(child, info)| (child.as_str(), info))
                        .collect();
                    let (child_matches, child_units) = self.walk_fields(&children, predicate)?;
                    matches.push((name.to_string(), child_matches));
                    units.push((name.to_string(), child_units));
                }
                kind => {
                    matches.push((name.to_string(), FieldTree::Leaf(predicate(kind))));
                    units.push((name.to_string(), FieldTree::Leaf(info.unit.clone())));
                }
            }
        }
        Ok((FieldTree::Node(matches), FieldTree::Node(units)))
    }
}

fn renumber<T>(entries: &mut [T], set_id: impl Fn(&mut T, u32)) {
    for (index, entry) in entries.iter_mut().enumerate() {
        set_id(entry, index as u32);
    }
}

fn reserved_constants() -> Vec<Constant> {
    vec![
        Constant {
            name: "SYNC_BYTE_1".to_string(),
            value: DefaultValue::Literal(Value::U64(u64::from(DEFAULT_SYNC_BYTE_1))),
            type_name: "uint8".to_string(),
            kind: TypeKind::Int { signed: false, width: 1 },
            description: "First framing sync byte".to_string(),
        },
        Constant {
            name: "SYNC_BYTE_2".to_string(),
            value: DefaultValue::Literal(Value::U64(u64::from(DEFAULT_SYNC_BYTE_2))),
            type_name: "uint8".to_string(),
            kind: TypeKind::Int { signed: false, width: 1 },
            description: "Second framing sync byte".to_string(),
        },
        Constant {
            name: "NUM_CONFIGURATIONS".to_string(),
            value: DefaultValue::Literal(Value::U64(0)),
            type_name: "uint8".to_string(),
            kind: TypeKind::Int { signed: false, width: 1 },
            description: "Number of device configurations".to_string(),
        },
    ]
}

fn kind_references(kind: &TypeKind, name: &str) -> usize {
    match kind {
        TypeKind::Array { element, size } => {
            let own = usize::from(matches!(size, ArraySize::Constant(n) if n == name));
            own + kind_references(element, name)
        }
        _ => 0,
    }
}

fn type_info_references(info: &TypeInfo, name: &str) -> usize {
    let default = usize::from(matches!(&info.default, Some(DefaultValue::Constant(n)) if n == name));
    default + kind_references(&info.kind, name)
}

fn rename_default(default: &mut DefaultValue, old: &str, new: &str) {
    if let DefaultValue::Constant(name) = default {
        if name == old {
            *name = new.to_string();
        }
    }
}

fn rename_kind(kind: &mut TypeKind, old: &str, new: &str) {
    if let TypeKind::Array { element, size } = kind {
        if let ArraySize::Constant(name) = size {
            if name == old {
                *name = new.to_string();
            }
        }
        rename_kind(element, old, new);
    }
}

/// Keep the textual spelling `base[CONST]` in sync with a renamed constant
fn rename_type_name(type_name: &mut String, old: &str, new: &str) {
    let bracketed_old = format!("[{}]", old);
    if type_name.contains(&bracketed_old) {
        *type_name = type_name.replace(&bracketed_old, &format!("[{}]", new));
    }
}

fn rename_type_info(info: &mut TypeInfo, old: &str, new: &str) {
    if let Some(default) = &mut info.default {
        rename_default(default, old, new);
    }
    rename_kind(&mut info.kind, old, new);
    rename_type_name(&mut info.type_name, old, new);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> CommunicationDatabase {
        let mut db = CommunicationDatabase::new();
        let variant = db.type_info("float", "Temperature in celsius", None).unwrap();
        db.add_unit("celsius", variant).unwrap();
        db.add_constant(Constant {
            name: "PAYLOAD_SIZE".to_string(),
            value: DefaultValue::Literal(Value::U64(16)),
            type_name: "uint8".to_string(),
            kind: TypeKind::Int { signed: false, width: 1 },
            description: "Fixed payload length".to_string(),
        })
        .unwrap();
        db.add_shared_enum(EnumDef {
            name: "FlightMode".to_string(),
            doc: Some("Flight state machine position".to_string()),
            underlying: "uint8".to_string(),
            members: vec![
                EnumMemberDef { name: "ASCENT".to_string(), doc: None },
                EnumMemberDef { name: "FLOAT".to_string(), doc: None },
                EnumMemberDef { name: "DESCENT".to_string(), doc: None },
            ],
            default: None,
        })
        .unwrap();
        db
    }

    use crate::types::EnumMemberDef;

    #[test]
    fn test_reserved_constants_exist() {
        let db = CommunicationDatabase::new();
        for name in RESERVED_CONSTANT_NAMES {
            assert!(db.constant(name).is_some(), "{}", name);
        }
        assert_eq!(db.sync_bytes(), (0xAA, 0x55));
    }

    #[test]
    fn test_reserved_constants_are_locked() {
        let mut db = CommunicationDatabase::new();
        let c = db.constant("SYNC_BYTE_1").unwrap().clone();
        assert!(matches!(
            db.update_constant(c.clone(), "SYNC_BYTE_1"),
            Err(DatabaseError::ReservedName(_))
        ));
        assert!(matches!(
            db.delete_constant("SYNC_BYTE_2"),
            Err(DatabaseError::ReservedName(_))
        ));
        assert!(matches!(
            db.add_constant(c),
            Err(DatabaseError::ReservedName(_))
        ));
    }

    #[test]
    fn test_parse_type_syntax() {
        let db = test_db();
        let (kind, unit) = db.parse_type("celsius").unwrap();
        assert_eq!(kind, TypeKind::F32);
        assert_eq!(unit.as_deref(), Some("celsius"));

        let (kind, _) = db.parse_type("uint8[PAYLOAD_SIZE]").unwrap();
        assert_eq!(
            kind,
            TypeKind::Array {
                element: Box::new(TypeKind::Int { signed: false, width: 1 }),
                size: ArraySize::Constant("PAYLOAD_SIZE".to_string()),
            }
        );

        let (kind, _) = db.parse_type("float[<count>]").unwrap();
        assert!(matches!(
            kind,
            TypeKind::Array { size: ArraySize::Dynamic(ref s), .. } if s == "count"
        ));

        assert!(matches!(
            db.parse_type("kelvin"),
            Err(DatabaseError::UnknownType(_))
        ));
        assert!(matches!(
            db.parse_type("uint8[NO_SUCH_CONSTANT]"),
            Err(DatabaseError::UnknownConstant(_))
        ));
    }

    #[test]
    fn test_configuration_ids_stay_contiguous() {
        let mut db = test_db();
        for name in ["tx_power", "beacon_interval", "cutdown_altitude"] {
            db.add_configuration(
                name,
                "uint16",
                DefaultValue::Literal(Value::U64(0)),
                "",
            )
            .unwrap();
        }
        db.delete_configuration("beacon_interval").unwrap();
        let ids: Vec<u32> = db.configurations().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![0, 1]);
        assert_eq!(
            db.resolve_constant("NUM_CONFIGURATIONS").unwrap(),
            Value::U64(2)
        );
    }

    #[test]
    fn test_telemetry_ids_stay_contiguous() {
        let mut db = test_db();
        db.add_telemetry("gps", "").unwrap();
        db.add_telemetry("power", "").unwrap();
        db.add_telemetry("thermal", "").unwrap();
        assert!(matches!(
            db.add_telemetry("gps", ""),
            Err(DatabaseError::NameCollision(_))
        ));
        db.delete_telemetry("power").unwrap();
        let ids: Vec<u32> = db.telemetry().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![0, 1]);
        assert_eq!(db.telemetry_by_id(1).unwrap().name, "thermal");
    }

    #[test]
    fn test_constant_rename_cascades() {
        let mut db = test_db();
        db.add_constant(Constant {
            name: "DEFAULT_LEN".to_string(),
            value: DefaultValue::Constant("PAYLOAD_SIZE".to_string()),
            type_name: "uint8".to_string(),
            kind: TypeKind::Int { signed: false, width: 1 },
            description: "".to_string(),
        })
        .unwrap();
        db.add_telemetry("gps", "").unwrap();
        let info = db.type_info("uint8[PAYLOAD_SIZE]", "", None).unwrap();
        db.add_telemetry_data_point("gps", DataPoint { name: "raw".to_string(), type_info: info })
            .unwrap();
        db.add_configuration(
            "frame_len",
            "uint8",
            DefaultValue::Constant("PAYLOAD_SIZE".to_string()),
            "",
        )
        .unwrap();

        let mut renamed = db.constant("PAYLOAD_SIZE").unwrap().clone();
        renamed.name = "FRAME_SIZE".to_string();
        db.update_constant(renamed, "PAYLOAD_SIZE").unwrap();

        assert!(db.constant("PAYLOAD_SIZE").is_none());
        assert_eq!(
            db.constant("DEFAULT_LEN").unwrap().value,
            DefaultValue::Constant("FRAME_SIZE".to_string())
        );
        assert_eq!(
            db.configuration("frame_len").unwrap().default,
            DefaultValue::Constant("FRAME_SIZE".to_string())
        );
        let dp = &db.telemetry_type("gps").unwrap().data[0];
        assert_eq!(dp.type_info.type_name, "uint8[FRAME_SIZE]");
        assert!(matches!(
            &dp.type_info.kind,
            TypeKind::Array { size: ArraySize::Constant(n), .. } if n == "FRAME_SIZE"
        ));
        // Old resolution path is gone, new one yields the same value
        assert_eq!(db.resolve_constant("DEFAULT_LEN").unwrap(), Value::U64(16));
        assert_eq!(db.constant_references("PAYLOAD_SIZE"), 0);
    }

    #[test]
    fn test_self_referential_constant_rejected() {
        let mut db = test_db();
        let mut c = db.constant("PAYLOAD_SIZE").unwrap().clone();
        c.value = DefaultValue::Constant("PAYLOAD_SIZE".to_string());
        assert!(matches!(
            db.update_constant(c, "PAYLOAD_SIZE"),
            Err(DatabaseError::SelfReferentialDefault(_))
        ));
    }

    #[test]
    fn test_delete_referenced_constant_rejected() {
        let mut db = test_db();
        db.add_configuration(
            "frame_len",
            "uint8",
            DefaultValue::Constant("PAYLOAD_SIZE".to_string()),
            "",
        )
        .unwrap();
        assert!(matches!(
            db.delete_constant("PAYLOAD_SIZE"),
            Err(DatabaseError::InUse { count: 1, .. })
        ));
    }

    #[test]
    fn test_constant_value_must_match_type() {
        let mut db = test_db();
        assert!(matches!(
            db.add_constant(Constant {
                name: "TOO_BIG".to_string(),
                value: DefaultValue::Literal(Value::U64(300)),
                type_name: "uint8".to_string(),
                kind: TypeKind::Int { signed: false, width: 1 },
                description: "".to_string(),
            }),
            Err(DatabaseError::ValueTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_dynamic_size_requires_earlier_integer_sibling() {
        let mut db = test_db();
        db.add_telemetry("gps", "").unwrap();
        let info = db.type_info("float[<count>]", "", None).unwrap();
        assert!(matches!(
            db.add_telemetry_data_point(
                "gps",
                DataPoint { name: "samples".to_string(), type_info: info.clone() }
            ),
            Err(DatabaseError::UnknownEntry(_))
        ));

        let count_info = db.type_info("uint8", "", None).unwrap();
        db.add_telemetry_data_point(
            "gps",
            DataPoint { name: "count".to_string(), type_info: count_info },
        )
        .unwrap();
        db.add_telemetry_data_point(
            "gps",
            DataPoint { name: "samples".to_string(), type_info: info },
        )
        .unwrap();
    }

    #[test]
    fn test_nested_leaf_fields() {
        let mut db = test_db();
        let temp_info = db.type_info("celsius", "", None).unwrap();
        db.add_shared_struct(StructDef {
            name: "Reading".to_string(),
            doc: None,
            fields: vec![
                ("temperature".to_string(), temp_info),
                ("valid".to_string(), db.type_info("bool", "", None).unwrap()),
            ],
        })
        .unwrap();
        db.add_telemetry("env", "").unwrap();
        db.add_telemetry_data_point(
            "env",
            DataPoint {
                name: "reading".to_string(),
                type_info: db.type_info("Reading", "", None).unwrap(),
            },
        )
        .unwrap();
        db.add_telemetry_data_point(
            "env",
            DataPoint {
                name: "mode".to_string(),
                type_info: db.type_info("FlightMode", "", None).unwrap(),
            },
        )
        .unwrap();

        let (matches, units) = db
            .nested_leaf_fields("env", &|kind| kind.is_numeric())
            .unwrap();
        assert_eq!(
            matches.get(&["reading", "temperature"]).unwrap().leaf(),
            Some(&true)
        );
        assert_eq!(
            matches.get(&["reading", "valid"]).unwrap().leaf(),
            Some(&false)
        );
        // Enum leaves short-circuit: present, but not numeric
        assert_eq!(matches.get(&["mode"]).unwrap().leaf(), Some(&false));
        assert_eq!(
            units.get(&["reading", "temperature"]).unwrap().leaf(),
            Some(&Some("celsius".to_string()))
        );
    }

    #[test]
    fn test_move_operations_unimplemented() {
        let mut db = test_db();
        assert!(matches!(db.move_unit("celsius", 0), Err(DatabaseError::NotImplemented)));
        assert!(matches!(db.move_constant("PAYLOAD_SIZE", 0), Err(DatabaseError::NotImplemented)));
        assert!(matches!(db.move_telemetry("gps", 0), Err(DatabaseError::NotImplemented)));
    }

    #[test]
    fn test_change_listener_fires() {
        use std::sync::mpsc;
        let (tx, rx) = mpsc::channel();
        let mut db = test_db();
        db.add_change_listener(Box::new(move |event| {
            let _ = tx.send(event.clone());
        }));
        db.add_telemetry("gps", "").unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            ChangeEvent::TelemetryAdded("gps".to_string())
        );
    }

    #[test]
    fn test_shared_data_type_names() {
        let db = test_db();
        assert_eq!(db.shared_data_type_names(), vec!["FlightMode".to_string()]);
    }
}
