/*
Directory-based persistence of a communication database.

One schema lives in one directory: fixed-column CSV files for units,
constants, configurations, telemetry and telecommand argument lists, plus a
JSON file for the shared enum/struct data types. Saving writes everything to
a temporary sibling directory and swaps it into place, so readers never see
a half-written schema. A leftover `<dir>.backup` directory from a crash in
the narrow swap window is safe to ignore on the next load.

Reserved constants and framing types are structural, regenerated on every
load, and never written to the editable files.
*/

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value as JsonValue};

use crate::database::CommunicationDatabase;
use crate::errors::DatabaseError;
use crate::types::{
    Constant, DataPoint, DefaultValue, EnumDef, EnumMemberDef, StructDef, TelecommandResponse,
    TypeInfo, TypeKind,
};

const UNITS_FILE: &str = "units.csv";
const CONSTANTS_FILE: &str = "sharedConstants.csv";
const CONFIGURATION_FILE: &str = "configuration.csv";
const TELEMETRY_FILE: &str = "telemetry.csv";
const COMMANDS_FILE: &str = "commands.csv";
const SHARED_TYPES_FILE: &str = "sharedDataTypes.json";

const UNITS_HEADER: [&str; 3] = ["Name", "Type", "Description"];
const CONSTANTS_HEADER: [&str; 4] = ["Name", "Value", "Type", "Description"];
const CONFIGURATION_HEADER: [&str; 4] = ["Name", "Type", "Default Value", "Description"];
const TELEMETRY_HEADER: [&str; 2] = ["Name", "Description"];
const COMMANDS_HEADER: [&str; 6] = [
    "Name",
    "Debug",
    "Description",
    "Response name",
    "Response type",
    "Response description",
];
const TELEMETRY_ARG_HEADER: [&str; 3] = ["Name", "Type", "Description"];
const COMMAND_ARG_HEADER: [&str; 4] = ["Name", "Type", "Default", "Description"];

// ----------------------------------------------------------------------
// Save

/// Write the database to `directory` atomically: everything goes to a temp
/// sibling first, the old directory is moved aside as a backup, the temp is
/// moved into place, and only then is the backup deleted.
pub fn save(db: &CommunicationDatabase, directory: &Path) -> Result<(), DatabaseError> {
    let temp = temp_sibling(directory)?;
    if temp.exists() {
        fs::remove_dir_all(&temp).map_err(|e| DatabaseError::io(&temp, e))?;
    }
    fs::create_dir_all(&temp).map_err(|e| DatabaseError::io(&temp, e))?;

    if let Err(e) = write_all_files(db, &temp) {
        let _ = fs::remove_dir_all(&temp);
        return Err(e);
    }
    swap_into_place(&temp, directory)
}

/// Promote a fully written temp directory to the live path. Exposed within
/// the crate so the failure path can be exercised directly in tests.
pub(crate) fn swap_into_place(temp: &Path, live: &Path) -> Result<(), DatabaseError> {
    let backup = if live.exists() {
        let backup = backup_path(live);
        fs::rename(live, &backup).map_err(|e| DatabaseError::io(live, e))?;
        Some(backup)
    } else {
        None
    };

    if let Err(e) = fs::rename(temp, live) {
        // Put the previous state back before reporting the failure
        if let Some(backup) = &backup {
            let _ = fs::rename(backup, live);
        }
        return Err(DatabaseError::io(live, e));
    }

    if let Some(backup) = backup {
        let _ = fs::remove_dir_all(backup);
    }
    Ok(())
}

fn temp_sibling(directory: &Path) -> Result<PathBuf, DatabaseError> {
    let name = directory
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| DatabaseError::format(directory, "invalid directory name"))?;
    Ok(directory.with_file_name(format!("{}~tmp", name)))
}

fn backup_path(live: &Path) -> PathBuf {
    let mut candidate = live.as_os_str().to_owned();
    loop {
        candidate.push(".backup");
        let path = PathBuf::from(&candidate);
        if !path.exists() {
            return path;
        }
    }
}

fn write_all_files(db: &CommunicationDatabase, dir: &Path) -> Result<(), DatabaseError> {
    write_units(db, &dir.join(UNITS_FILE))?;
    write_constants(db, &dir.join(CONSTANTS_FILE))?;
    write_shared_types(db, &dir.join(SHARED_TYPES_FILE))?;
    write_configurations(db, &dir.join(CONFIGURATION_FILE))?;
    write_telemetry(db, dir)?;
    write_commands(db, dir)?;
    Ok(())
}

fn csv_writer(path: &Path) -> Result<csv::Writer<fs::File>, DatabaseError> {
    csv::Writer::from_path(path).map_err(|e| DatabaseError::format(path, e.to_string()))
}

fn write_row<const N: usize>(
    writer: &mut csv::Writer<fs::File>,
    path: &Path,
    row: [&str; N],
) -> Result<(), DatabaseError> {
    writer
        .write_record(row)
        .map_err(|e| DatabaseError::format(path, e.to_string()))
}

fn finish(mut writer: csv::Writer<fs::File>, path: &Path) -> Result<(), DatabaseError> {
    writer
        .flush()
        .map_err(|e| DatabaseError::io(path, e))
}

fn default_field(default: &DefaultValue) -> String {
    match default {
        DefaultValue::Constant(name) => name.clone(),
        DefaultValue::Literal(value) => value.to_string(),
    }
}

fn write_units(db: &CommunicationDatabase, path: &Path) -> Result<(), DatabaseError> {
    let mut writer = csv_writer(path)?;
    write_row(&mut writer, path, UNITS_HEADER)?;
    for unit in db.units() {
        for variant in &unit.variants {
            write_row(
                &mut writer,
                path,
                [&unit.name, &variant.type_name, &variant.description],
            )?;
        }
    }
    finish(writer, path)
}

fn write_constants(db: &CommunicationDatabase, path: &Path) -> Result<(), DatabaseError> {
    let mut writer = csv_writer(path)?;
    write_row(&mut writer, path, CONSTANTS_HEADER)?;
    for constant in db.constants() {
        if CommunicationDatabase::is_reserved_name(&constant.name) {
            continue;
        }
        write_row(
            &mut writer,
            path,
            [
                &constant.name,
                &default_field(&constant.value),
                &constant.type_name,
                &constant.description,
            ],
        )?;
    }
    finish(writer, path)
}

fn write_configurations(db: &CommunicationDatabase, path: &Path) -> Result<(), DatabaseError> {
    let mut writer = csv_writer(path)?;
    write_row(&mut writer, path, CONFIGURATION_HEADER)?;
    for config in db.configurations() {
        write_row(
            &mut writer,
            path,
            [
                &config.name,
                &config.type_name,
                &default_field(&config.default),
                &config.description,
            ],
        )?;
    }
    finish(writer, path)
}

fn write_telemetry(db: &CommunicationDatabase, dir: &Path) -> Result<(), DatabaseError> {
    let path = dir.join(TELEMETRY_FILE);
    let mut writer = csv_writer(&path)?;
    write_row(&mut writer, &path, TELEMETRY_HEADER)?;
    for telemetry in db.telemetry() {
        write_row(&mut writer, &path, [&telemetry.name, &telemetry.description])?;
    }
    finish(writer, &path)?;

    for telemetry in db.telemetry() {
        let arg_path = dir.join(format!("{}.csv", telemetry.name));
        let mut writer = csv_writer(&arg_path)?;
        write_row(&mut writer, &arg_path, TELEMETRY_ARG_HEADER)?;
        for dp in &telemetry.data {
            write_row(
                &mut writer,
                &arg_path,
                [&dp.name, &dp.type_info.type_name, &dp.type_info.description],
            )?;
        }
        finish(writer, &arg_path)?;
    }
    Ok(())
}

fn write_commands(db: &CommunicationDatabase, dir: &Path) -> Result<(), DatabaseError> {
    let path = dir.join(COMMANDS_FILE);
    let mut writer = csv_writer(&path)?;
    write_row(&mut writer, &path, COMMANDS_HEADER)?;
    for command in db.telecommands() {
        let (resp_name, resp_type, resp_desc) = match &command.response {
            Some(response) => (
                response.name.as_str(),
                response.type_name.as_str(),
                response.description.as_str(),
            ),
            None => ("", "", ""),
        };
        write_row(
            &mut writer,
            &path,
            [
                &command.name,
                if command.debug { "true" } else { "false" },
                &command.description,
                resp_name,
                resp_type,
                resp_desc,
            ],
        )?;
    }
    finish(writer, &path)?;

    for command in db.telecommands() {
        let arg_path = dir.join(format!("{}.csv", command.name));
        let mut writer = csv_writer(&arg_path)?;
        write_row(&mut writer, &arg_path, COMMAND_ARG_HEADER)?;
        for dp in &command.data {
            let default = dp
                .type_info
                .default
                .as_ref()
                .map(default_field)
                .unwrap_or_default();
            write_row(
                &mut writer,
                &arg_path,
                [
                    &dp.name,
                    &dp.type_info.type_name,
                    &default,
                    &dp.type_info.description,
                ],
            )?;
        }
        finish(writer, &arg_path)?;
    }
    Ok(())
}

fn write_shared_types(db: &CommunicationDatabase, path: &Path) -> Result<(), DatabaseError> {
    let mut root = Map::new();
    for def in db.enums() {
        let mut entry = Map::new();
        if let Some(doc) = &def.doc {
            entry.insert("__doc__".to_string(), json!(doc));
        }
        entry.insert("__type__".to_string(), json!(def.underlying));
        let values = if def.members.iter().any(|m| m.doc.is_some()) {
            let mut members = Map::new();
            for member in &def.members {
                members.insert(
                    member.name.clone(),
                    member.doc.as_ref().map(|d| json!(d)).unwrap_or(JsonValue::Null),
                );
            }
            JsonValue::Object(members)
        } else {
            json!(def.members.iter().map(|m| m.name.clone()).collect::<Vec<_>>())
        };
        entry.insert("__values__".to_string(), values);
        if let Some(default) = &def.default {
            entry.insert("__value__".to_string(), json!(default));
        }
        root.insert(def.name.clone(), JsonValue::Object(entry));
    }
    for def in db.structs() {
        let mut entry = Map::new();
        if let Some(doc) = &def.doc {
            entry.insert("__doc__".to_string(), json!(doc));
        }
        for (field_name, info) in &def.fields {
            let child = if info.description.is_empty() && info.default.is_none() {
                json!(info.type_name)
            } else {
                let mut child = Map::new();
                child.insert("__type__".to_string(), json!(info.type_name));
                if !info.description.is_empty() {
                    child.insert("__doc__".to_string(), json!(info.description));
                }
                if let Some(default) = &info.default {
                    child.insert("__value__".to_string(), json!(default_field(default)));
                }
                JsonValue::Object(child)
            };
            entry.insert(field_name.clone(), child);
        }
        root.insert(def.name.clone(), JsonValue::Object(entry));
    }

    let contents = serde_json::to_string_pretty(&JsonValue::Object(root))
        .map_err(|e| DatabaseError::format(path, e.to_string()))?;
    fs::write(path, contents).map_err(|e| DatabaseError::io(path, e))
}

// ----------------------------------------------------------------------
// Load

/// Load a database from a directory. Units and constants are loaded before
/// anything that can reference them; reserved constants are regenerated, not
/// read from disk.
pub fn load(directory: &Path) -> Result<CommunicationDatabase, DatabaseError> {
    let mut db = CommunicationDatabase::new();
    load_units(&mut db, &directory.join(UNITS_FILE))?;
    load_constants(&mut db, &directory.join(CONSTANTS_FILE))?;
    load_shared_types(&mut db, &directory.join(SHARED_TYPES_FILE))?;
    load_configurations(&mut db, &directory.join(CONFIGURATION_FILE))?;
    load_telemetry(&mut db, directory)?;
    load_commands(&mut db, directory)?;
    Ok(db)
}

fn csv_rows<const N: usize>(
    path: &Path,
    expected_header: [&str; N],
) -> Result<Vec<[String; N]>, DatabaseError> {
    let mut reader =
        csv::Reader::from_path(path).map_err(|e| DatabaseError::format(path, e.to_string()))?;
    let headers = reader
        .headers()
        .map_err(|e| DatabaseError::format(path, e.to_string()))?;
    if headers.iter().ne(expected_header.iter().copied()) {
        return Err(DatabaseError::format(
            path,
            format!("expected header {:?}, found {:?}", expected_header, headers),
        ));
    }
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| DatabaseError::format(path, e.to_string()))?;
        if record.len() != N {
            return Err(DatabaseError::format(
                path,
                format!("expected {} columns, found {}", N, record.len()),
            ));
        }
        let mut row: [String; N] = std::array::from_fn(|_| String::new());
        for (i, field) in record.iter().enumerate() {
            row[i] = field.to_string();
        }
        rows.push(row);
    }
    Ok(rows)
}

fn load_units(db: &mut CommunicationDatabase, path: &Path) -> Result<(), DatabaseError> {
    for [name, type_name, description] in csv_rows(path, UNITS_HEADER)? {
        let variant = db.type_info(&type_name, &description, None)?;
        db.add_unit(&name, variant)?;
    }
    Ok(())
}

fn load_constants(db: &mut CommunicationDatabase, path: &Path) -> Result<(), DatabaseError> {
    let rows = csv_rows(path, CONSTANTS_HEADER)?;
    // First collect the names so a value naming another row becomes a
    // reference instead of a parse failure
    let names: Vec<String> = rows.iter().map(|row| row[0].clone()).collect();
    let mut constants = Vec::with_capacity(rows.len());
    for [name, value_text, type_name, description] in rows {
        let (kind, _) = db.parse_type(&type_name)?;
        let value = if names.iter().any(|n| *n == value_text)
            || CommunicationDatabase::is_reserved_name(&value_text)
        {
            DefaultValue::Constant(value_text)
        } else {
            DefaultValue::Literal(db.parse_scalar_value(&value_text, &kind)?)
        };
        constants.push(Constant {
            name,
            value,
            type_name,
            kind,
            description,
        });
    }
    db.install_constants(constants)
}

fn load_configurations(db: &mut CommunicationDatabase, path: &Path) -> Result<(), DatabaseError> {
    for [name, type_name, default_text, description] in csv_rows(path, CONFIGURATION_HEADER)? {
        let (kind, _) = db.parse_type(&type_name)?;
        let default = parse_default_field(db, &default_text, &kind).ok_or_else(|| {
            DatabaseError::format(
                path,
                format!("configuration '{}' needs a default value", name),
            )
        })??;
        db.add_configuration(&name, &type_name, default, &description)?;
    }
    Ok(())
}

/// A default field is empty (None), the name of a constant, or a literal
fn parse_default_field(
    db: &CommunicationDatabase,
    text: &str,
    kind: &TypeKind,
) -> Option<Result<DefaultValue, DatabaseError>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if db.constant(text).is_some() {
        return Some(Ok(DefaultValue::Constant(text.to_string())));
    }
    Some(db.parse_scalar_value(text, kind).map(DefaultValue::Literal))
}

fn load_telemetry(db: &mut CommunicationDatabase, dir: &Path) -> Result<(), DatabaseError> {
    for [name, description] in csv_rows(&dir.join(TELEMETRY_FILE), TELEMETRY_HEADER)? {
        db.add_telemetry(&name, &description)?;
        let arg_path = dir.join(format!("{}.csv", name));
        for [dp_name, type_name, dp_description] in csv_rows(&arg_path, TELEMETRY_ARG_HEADER)? {
            let type_info = db.type_info(&type_name, &dp_description, None)?;
            db.add_telemetry_data_point(&name, DataPoint { name: dp_name, type_info })?;
        }
    }
    Ok(())
}

fn load_commands(db: &mut CommunicationDatabase, dir: &Path) -> Result<(), DatabaseError> {
    let path = dir.join(COMMANDS_FILE);
    for [name, debug, description, resp_name, resp_type, resp_desc] in
        csv_rows(&path, COMMANDS_HEADER)?
    {
        let response = if resp_name.is_empty() && resp_type.is_empty() {
            None
        } else {
            let (kind, _) = db.parse_type(&resp_type)?;
            Some(TelecommandResponse {
                name: resp_name,
                type_name: resp_type,
                kind,
                description: resp_desc,
            })
        };
        let debug = matches!(debug.trim(), "true" | "True" | "1");
        db.add_telecommand(&name, debug, &description, response)?;

        let arg_path = dir.join(format!("{}.csv", name));
        for [dp_name, type_name, default_text, dp_description] in
            csv_rows(&arg_path, COMMAND_ARG_HEADER)?
        {
            let (kind, _) = db.parse_type(&type_name)?;
            let default = match parse_default_field(db, &default_text, &kind) {
                Some(result) => Some(result?),
                None => None,
            };
            let type_info = db.type_info(&type_name, &dp_description, default)?;
            db.add_telecommand_data_point(&name, DataPoint { name: dp_name, type_info })?;
        }
    }
    Ok(())
}

fn load_shared_types(db: &mut CommunicationDatabase, path: &Path) -> Result<(), DatabaseError> {
    let contents = fs::read_to_string(path).map_err(|e| DatabaseError::io(path, e))?;
    let root: JsonValue = serde_json::from_str(&contents)
        .map_err(|e| DatabaseError::format(path, e.to_string()))?;
    let root = root
        .as_object()
        .ok_or_else(|| DatabaseError::format(path, "top level must be an object"))?;

    for (name, body) in root {
        let body = body
            .as_object()
            .ok_or_else(|| DatabaseError::format(path, format!("'{}' must be an object", name)))?;
        if body.contains_key("__values__") {
            db.add_shared_enum(parse_enum_def(name, body, path)?)?;
        } else {
            db.add_shared_struct(parse_struct_def(db, name, body, path)?)?;
        }
    }
    Ok(())
}

fn parse_enum_def(
    name: &str,
    body: &Map<String, JsonValue>,
    path: &Path,
) -> Result<EnumDef, DatabaseError> {
    let doc = body
        .get("__doc__")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let underlying = body
        .get("__type__")
        .and_then(|v| v.as_str())
        .unwrap_or("uint8")
        .to_string();
    let members = match body.get("__values__") {
        Some(JsonValue::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(|name| EnumMemberDef { name: name.to_string(), doc: None })
                    .ok_or_else(|| {
                        DatabaseError::format(path, format!("enum '{}' member must be a string", name))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(JsonValue::Object(entries)) => entries
            .iter()
            .map(|(member, doc)| EnumMemberDef {
                name: member.clone(),
                doc: doc.as_str().map(str::to_string),
            })
            .collect(),
        _ => {
            return Err(DatabaseError::format(
                path,
                format!("enum '{}' needs a __values__ list or map", name),
            ))
        }
    };
    let default = body
        .get("__value__")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    Ok(EnumDef {
        name: name.to_string(),
        doc,
        underlying,
        members,
        default,
    })
}

fn parse_struct_def(
    db: &CommunicationDatabase,
    name: &str,
    body: &Map<String, JsonValue>,
    path: &Path,
) -> Result<StructDef, DatabaseError> {
    let doc = body
        .get("__doc__")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let mut fields: Vec<(String, TypeInfo)> = Vec::new();
    for (field_name, descr) in body {
        if field_name.starts_with("__") {
            continue;
        }
        let info = match descr {
            JsonValue::String(type_name) => db.type_info(type_name, "", None)?,
            JsonValue::Object(child) => {
                let type_name = child
                    .get("__type__")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| {
                        DatabaseError::format(
                            path,
                            format!("field '{}.{}' needs a __type__", name, field_name),
                        )
                    })?;
                let field_doc = child.get("__doc__").and_then(|v| v.as_str()).unwrap_or("");
                let (kind, _) = db.parse_type(type_name)?;
                let default = match child.get("__value__") {
                    Some(JsonValue::String(text)) => match parse_default_field(db, text, &kind) {
                        Some(result) => Some(result?),
                        None => None,
                    },
                    Some(other) => {
                        return Err(DatabaseError::format(
                            path,
                            format!("field '{}.{}' default must be a string, got {}", name, field_name, other),
                        ))
                    }
                    None => None,
                };
                db.type_info(type_name, field_doc, default)?
            }
            _ => {
                return Err(DatabaseError::format(
                    path,
                    format!("field '{}.{}' must be a string or object", name, field_name),
                ))
            }
        };
        fields.push((field_name.clone(), info));
    }
    Ok(StructDef {
        name: name.to_string(),
        doc,
        fields,
    })
}
