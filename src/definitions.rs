//! Parameter catalogs.
//!
//! A catalog is a YAML document living in a definitions directory. It lists the parameters an
//! inverter exposes over Modbus, sorted into named groups:
//!
//! ```yaml
//! parameters:
//!   - group: PV input
//!     items:
//!       - name: PV1 Voltage
//!         uom: V
//!         scale: 0.1
//!         rule: 1
//!         registers: [0x006D]
//! ```
//!
//! Every item becomes a [`Parameter`] with its [`Decoder`] resolved from the item's `rule`.
use std::collections::BTreeMap;
use std::ops::Range;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};
use tracing::{debug, trace, warn};

use crate::decoder::Decoder;

/// The definitions directory shipped with this crate.
pub const DEFINITIONS_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/definitions");

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("catalog file {0:?} does not exist or is not a regular file")]
    NotFound(PathBuf),
    #[error("could not read the catalog file at {1:?}")]
    Read(#[source] std::io::Error, PathBuf),
    #[error("could not parse the catalog file at {1:?}")]
    Parse(#[source] serde_yaml::Error, PathBuf),
    #[error("catalog file at {0:?} has no top-level `parameters` key")]
    NoParameters(PathBuf),
    #[error("{0} is not a sequence")]
    NotASequence(String),
    #[error("{0} is not a mapping")]
    NotAMapping(String),
    #[error("{context} is missing the `{field}` field")]
    FieldMissing { field: &'static str, context: String },
    #[error("the `{1}` field of {2} has an unexpected value")]
    InvalidField(#[source] serde_yaml::Error, &'static str, String),
    #[error("{0} lists no registers")]
    NoRegisters(String),
    #[error("{0} lists {1} registers, more than a single read can cover")]
    TooManyRegisters(String, usize),
    #[error("could not list the catalogs in {1:?}")]
    ListDirectory(#[source] std::io::Error, PathBuf),
}

/// A typed description of one inverter parameter.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct Parameter {
    start_register: u16,
    length: u16,
    group: String,
    name: String,
    unit: String,
    scale: f64,
    #[serde(skip)]
    parser: Decoder,
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    lookup: Option<BTreeMap<i64, String>>,
}

impl Parameter {
    /// Address of the first register holding this parameter.
    pub fn start_register(&self) -> u16 {
        self.start_register
    }

    /// Number of consecutive registers holding this parameter. Never zero.
    pub fn length(&self) -> u16 {
        self.length
    }

    /// Addresses of all the registers holding this parameter.
    pub fn registers(&self) -> Range<u32> {
        let start = u32::from(self.start_register);
        start..start + u32::from(self.length)
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unit of measure, empty for unitless parameters.
    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn parser(&self) -> Decoder {
        self.parser
    }

    pub fn offset(&self) -> Option<f64> {
        self.offset
    }

    pub fn lookup(&self) -> Option<&BTreeMap<i64, String>> {
        self.lookup.as_ref()
    }

    /// The human readable label for an enumerated raw value, if the catalog defines one.
    pub fn label(&self, raw: i64) -> Option<&str> {
        self.lookup.as_ref()?.get(&raw).map(String::as_str)
    }
}

/// A directory holding catalog documents.
#[derive(Clone, Debug)]
pub struct Definitions {
    root: PathBuf,
}

impl Default for Definitions {
    fn default() -> Self {
        Self::new(DEFINITIONS_DIR)
    }
}

impl Definitions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, filename: impl AsRef<Path>) -> PathBuf {
        self.root.join(filename)
    }

    /// Filenames of all the catalogs in this directory, sorted.
    pub fn catalogs(&self) -> Result<Vec<String>, Error> {
        let list_error = |e| Error::ListDirectory(e, self.root.clone());
        let mut catalogs = Vec::new();
        for entry in std::fs::read_dir(&self.root).map_err(list_error)? {
            let path = entry.map_err(list_error)?.path();
            let is_yaml = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yaml" | "yml")
            );
            if !is_yaml || !path.is_file() {
                continue;
            }
            match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => catalogs.push(name.to_string()),
                None => trace!(message = "skipping catalog with a non UTF-8 name", path = ?path),
            }
        }
        catalogs.sort();
        Ok(catalogs)
    }

    /// Load the catalog document and return the raw list of groups under its `parameters` key.
    pub fn document(&self, filename: impl AsRef<Path>) -> Result<Value, Error> {
        let path = self.path(filename);
        if !path.is_file() {
            return Err(Error::NotFound(path));
        }
        debug!(message = "loading catalog", path = ?path);
        let content = std::fs::read_to_string(&path).map_err(|e| Error::Read(e, path.clone()))?;
        let document: Value =
            serde_yaml::from_str(&content).map_err(|e| Error::Parse(e, path.clone()))?;
        let Value::Mapping(mut document) = document else {
            return Err(Error::NoParameters(path));
        };
        document.remove("parameters").ok_or(Error::NoParameters(path))
    }

    /// Build the parameters of a catalog, in document order.
    ///
    /// With `force_debug` set every parameter is bound to [`Decoder::Debug`], regardless of its
    /// rule.
    pub fn parameters(
        &self,
        filename: impl AsRef<Path>,
        force_debug: bool,
    ) -> Result<Vec<Parameter>, Error> {
        let filename = filename.as_ref();
        let document = self.document(filename)?;
        let groups = document
            .as_sequence()
            .ok_or_else(|| Error::NotASequence("the `parameters` list".into()))?;
        let mut parameters = Vec::new();
        for (group_index, group) in groups.iter().enumerate() {
            let context = format!("group #{group_index}");
            let group = group.as_mapping().ok_or_else(|| Error::NotAMapping(context.clone()))?;
            let group_name = text(group, "group", &context)?;
            let items = field(group, "items", &context)?
                .as_sequence()
                .ok_or_else(|| Error::NotASequence(format!("items of group {group_name:?}")))?;
            for (item_index, item) in items.iter().enumerate() {
                let context = format!("item #{item_index} of group {group_name:?}");
                let item = item.as_mapping().ok_or_else(|| Error::NotAMapping(context.clone()))?;
                parameters.push(build_parameter(&group_name, item, &context, force_debug)?);
            }
        }
        debug!(
            message = "built parameters",
            catalog = ?filename,
            count = parameters.len(),
            force_debug
        );
        Ok(parameters)
    }
}

fn build_parameter(
    group: &str,
    item: &Mapping,
    context: &str,
    force_debug: bool,
) -> Result<Parameter, Error> {
    let rule: i64 = required(item, "rule", context)?;
    let registers: Vec<u16> = required(item, "registers", context)?;
    let Some(&start_register) = registers.first() else {
        return Err(Error::NoRegisters(context.to_string()));
    };
    let length = u16::try_from(registers.len())
        .map_err(|_| Error::TooManyRegisters(context.to_string(), registers.len()))?;
    if registers.windows(2).any(|w| u32::from(w[0]) + 1 != u32::from(w[1])) {
        warn!(
            message = "registers are not consecutive, reading the range starting at the first",
            context,
            registers = ?registers
        );
    }
    let lookup = match item.get("lookup") {
        None | Some(Value::Null) => None,
        Some(Value::Sequence(entries)) if entries.is_empty() => None,
        Some(raw) => Some(convert_lookup(raw, context)?),
    };
    let parser = if force_debug { Decoder::Debug } else { Decoder::from_rule(rule) };
    let parameter = Parameter {
        start_register,
        length,
        group: group.to_string(),
        name: text(item, "name", context)?,
        unit: match field(item, "uom", context)? {
            Value::Null => String::new(),
            _ => text(item, "uom", context)?,
        },
        scale: required(item, "scale", context)?,
        parser,
        offset: optional(item, "offset", context)?,
        lookup,
    };
    trace!(message = "built parameter", rule, parameter = ?parameter);
    Ok(parameter)
}

/// Convert a list of `{key, value}` records into a lookup table.
///
/// Later records replace earlier ones with the same key.
pub fn convert_lookup_table(raw_entries: &Value) -> Result<BTreeMap<i64, String>, Error> {
    convert_lookup(raw_entries, "lookup table")
}

fn convert_lookup(raw_entries: &Value, context: &str) -> Result<BTreeMap<i64, String>, Error> {
    let entries = raw_entries
        .as_sequence()
        .ok_or_else(|| Error::NotASequence(format!("lookup of {context}")))?;
    let mut lookup = BTreeMap::new();
    for (index, entry) in entries.iter().enumerate() {
        let context = format!("lookup entry #{index} of {context}");
        let entry = entry.as_mapping().ok_or_else(|| Error::NotAMapping(context.clone()))?;
        let key: i64 = required(entry, "key", &context)?;
        let value = text(entry, "value", &context)?;
        lookup.insert(key, value);
    }
    Ok(lookup)
}

fn field<'a>(record: &'a Mapping, field: &'static str, context: &str) -> Result<&'a Value, Error> {
    record.get(field).ok_or_else(|| Error::FieldMissing {
        field,
        context: context.to_string(),
    })
}

fn required<T: DeserializeOwned>(
    record: &Mapping,
    name: &'static str,
    context: &str,
) -> Result<T, Error> {
    let value = field(record, name, context)?;
    serde_yaml::from_value(value.clone())
        .map_err(|e| Error::InvalidField(e, name, context.to_string()))
}

/// Like [`required`], but numbers are taken verbatim as text (`name: 2023`).
fn text(record: &Mapping, name: &'static str, context: &str) -> Result<String, Error> {
    match field(record, name, context)? {
        Value::Number(n) => Ok(n.to_string()),
        _ => required(record, name, context),
    }
}

fn optional<T: DeserializeOwned>(
    record: &Mapping,
    name: &'static str,
    context: &str,
) -> Result<Option<T>, Error> {
    match record.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(_) => required(record, name, context).map(Some),
    }
}

/// Load a catalog document from [`DEFINITIONS_DIR`].
pub fn load_catalog_document(filename: impl AsRef<Path>) -> Result<Value, Error> {
    Definitions::default().document(filename)
}

/// Build the parameters of a catalog from [`DEFINITIONS_DIR`].
pub fn build_parameters(filename: impl AsRef<Path>, debug: bool) -> Result<Vec<Parameter>, Error> {
    Definitions::default().parameters(filename, debug)
}
