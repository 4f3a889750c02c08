// Tables, rows and queries

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// A field in a table that stores a reference to a file in the bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetSlot {
    pub field: &'static str,
    /// Older column consulted when `field` is empty
    pub legacy_field: Option<&'static str>,
    /// Bucket folder new uploads for this slot go into
    pub folder: &'static str,
}

impl AssetSlot {
    /// The reference currently stored for this slot, if any.
    pub fn reference<'a>(&self, record: &'a Record) -> Option<&'a str> {
        record
            .str_field(self.field)
            .or_else(|| self.legacy_field.and_then(|legacy| record.str_field(legacy)))
    }

    /// Every reference stored for this slot, current column first.
    pub fn references<'a>(&self, record: &'a Record) -> impl Iterator<Item = &'a str> {
        std::iter::once(self.field)
            .chain(self.legacy_field)
            .filter_map(move |column| record.str_field(column))
    }

    /// Field the resolved signed URL is written to.
    pub fn signed_field(&self) -> String {
        format!("signed_{}", self.field)
    }
}

const PROFILE_SLOTS: &[AssetSlot] = &[
    AssetSlot {
        field: "profile_image_url",
        legacy_field: Some("profile_image"),
        folder: "profiles",
    },
    AssetSlot {
        field: "resume_url",
        legacy_field: None,
        folder: "resumes",
    },
];

const PROJECT_SLOTS: &[AssetSlot] = &[AssetSlot {
    field: "image_url",
    legacy_field: None,
    folder: "projects",
}];

const CERTIFICATE_SLOTS: &[AssetSlot] = &[
    AssetSlot {
        field: "certificate_url",
        legacy_field: Some("certificate_file"),
        folder: "certificates",
    },
    AssetSlot {
        field: "image_url",
        legacy_field: None,
        folder: "certificates",
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Profile,
    About,
    Projects,
    Skills,
    Experience,
    Education,
    Certificates,
    ContactMessages,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl Table {
    pub const ALL: [Table; 8] = [
        Table::Profile,
        Table::About,
        Table::Projects,
        Table::Skills,
        Table::Experience,
        Table::Education,
        Table::Certificates,
        Table::ContactMessages,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Table::Profile => "profile",
            Table::About => "about",
            Table::Projects => "projects",
            Table::Skills => "skills",
            Table::Experience => "experience",
            Table::Education => "education",
            Table::Certificates => "certificates",
            Table::ContactMessages => "contact_messages",
        }
    }

    /// Tables holding exactly one row.
    pub fn is_singleton(&self) -> bool {
        matches!(self, Table::Profile | Table::About)
    }

    pub fn asset_slots(&self) -> &'static [AssetSlot] {
        match self {
            Table::Profile => PROFILE_SLOTS,
            Table::Projects => PROJECT_SLOTS,
            Table::Certificates => CERTIFICATE_SLOTS,
            _ => &[],
        }
    }

    pub fn asset_slot(&self, field: &str) -> Option<&'static AssetSlot> {
        self.asset_slots().iter().find(|slot| slot.field == field)
    }

    /// Columns some rows store as JSON-encoded strings instead of arrays.
    pub fn json_string_columns(&self) -> &'static [&'static str] {
        match self {
            Table::About => &["skills"],
            Table::Projects => &["technologies"],
            Table::Experience => &["achievements"],
            _ => &[],
        }
    }

    pub fn default_order(&self) -> Option<(&'static str, SortOrder)> {
        match self {
            Table::Projects | Table::Skills => Some(("display_order", SortOrder::Asc)),
            Table::Experience => Some(("start_date", SortOrder::Desc)),
            Table::Education => Some(("start_year", SortOrder::Desc)),
            Table::Certificates => Some(("issue_date", SortOrder::Desc)),
            Table::ContactMessages => Some(("created_at", SortOrder::Desc)),
            Table::Profile | Table::About => None,
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown table: {0}")]
pub struct UnknownTable(pub String);

impl FromStr for Table {
    type Err = UnknownTable;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Table::ALL
            .into_iter()
            .find(|table| table.name() == s)
            .ok_or_else(|| UnknownTable(s.to_string()))
    }
}

/// Textual form of a row's `id` (integer or UUID in the hosted schema).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.is_empty() => Some(Self(s.clone())),
            Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One row as a field/value map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(pub Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(&self) -> Option<RecordId> {
        self.0.get("id").and_then(RecordId::from_value)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// A non-empty string value.
    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.0
            .get(field)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(field.into(), value.into());
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Overlay `other` onto this record.
    pub fn merge(&mut self, other: Record) {
        self.0.extend(other.0);
    }

    /// Decode columns that hold a JSON document encoded as a string.
    pub fn decode_json_strings(&mut self, columns: &[&str]) {
        for column in columns {
            let decoded = match self.0.get(*column) {
                Some(Value::String(raw)) => serde_json::from_str::<Value>(raw).ok(),
                _ => None,
            };
            if let Some(decoded) = decoded {
                self.0.insert((*column).to_string(), decoded);
            }
        }
    }
}

impl TryFrom<Value> for Record {
    type Error = serde_json::Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        serde_json::from_value(value)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Object(record.0)
    }
}

/// Column names accepted in payloads and queries.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && name.len() <= 63
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectQuery {
    pub filters: Vec<(String, Value)>,
    pub order: Option<(String, SortOrder)>,
    pub limit: Option<i64>,
}

impl SelectQuery {
    pub fn all() -> Self {
        Self::default()
    }

    /// The listing order the portfolio uses for `table`.
    pub fn for_table(table: Table) -> Self {
        let mut query = Self::default();
        if let Some((column, order)) = table.default_order() {
            query.order = Some((column.to_string(), order));
        }
        if table.is_singleton() {
            query.limit = Some(1);
        }
        query
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((column.into(), value.into()));
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, order: SortOrder) -> Self {
        self.order = Some((column.into(), order));
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }
}
