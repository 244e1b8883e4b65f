//! Model Schemas
//!
//! Field descriptions for records and the create / read / update payload
//! schemas derived from them.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

/// Kind of a model field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Float,
    Boolean,
    DateTime,
    Json,
    /// Single related record
    Relation(&'static str),
    /// List of related records
    RelationList(&'static str),
}

impl FieldKind {
    /// Check whether the kind holds related records
    pub fn is_relation(&self) -> bool {
        matches!(self, Self::Relation(_) | Self::RelationList(_))
    }

    /// Check whether a non-null JSON value fits this kind
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::Text => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Float => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::DateTime => value
                .as_str()
                .map_or(false, |s| chrono::DateTime::parse_from_rfc3339(s).is_ok()),
            Self::Json => true,
            Self::Relation(_) => value.is_object(),
            Self::RelationList(_) => value.is_array(),
        }
    }
}

/// A model field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    /// Required on creation (has no default)
    pub required: bool,
}

impl FieldSpec {
    pub const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind, required: true }
    }

    pub const fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind, required: false }
    }
}

/// Field specs of [`crate::models::CommonFields`]
pub const COMMON_FIELD_SPECS: [FieldSpec; 5] = [
    FieldSpec::optional("id", FieldKind::Text),
    FieldSpec::optional("created_at", FieldKind::DateTime),
    FieldSpec::optional("updated_at", FieldKind::DateTime),
    FieldSpec::optional("is_deleted", FieldKind::Boolean),
    FieldSpec::optional("deleted_at", FieldKind::DateTime),
];

/// A record type managed by [`crate::services::DbService`].
///
/// Records are stored as JSON objects; `fields` lists every top-level key.
pub trait Model: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Model name, also used as the table name
    const NAME: &'static str;

    /// All fields of the record
    fn fields() -> &'static [FieldSpec];

    /// Fields that must be unique across the table
    fn unique_fields() -> &'static [&'static str] {
        &[]
    }

    /// Primary key
    fn id(&self) -> &str;

    fn has_field(name: &str) -> bool {
        Self::fields().iter().any(|f| f.name == name)
    }

    fn field(name: &str) -> Option<&'static FieldSpec> {
        Self::fields().iter().find(|f| f.name == name)
    }
}

/// A field inside a derived schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaField {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
}

/// A payload schema derived from a model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub name: String,
    pub fields: Vec<SchemaField>,
}

impl Schema {
    pub fn field(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Validate a payload, collecting every problem
    pub fn validate(&self, payload: &Map<String, Value>) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        for key in payload.keys() {
            if self.field(key).is_none() {
                errors.push(format!("{}: unknown field '{}'", self.name, key));
            }
        }

        for field in &self.fields {
            match payload.get(&field.name) {
                None | Some(Value::Null) if field.required => {
                    errors.push(format!("{}: field '{}' is required", self.name, field.name));
                }
                Some(value) if !value.is_null() && !field.kind.accepts(value) => {
                    errors.push(format!(
                        "{}: field '{}' expects {:?}",
                        self.name, field.name, field.kind
                    ));
                }
                _ => {}
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Builds create / read / update schemas for a model
#[derive(Debug, Clone)]
pub struct ModelSchema {
    name: String,
    base_fields: Vec<SchemaField>,
    related_fields: Vec<SchemaField>,
}

impl ModelSchema {
    /// Start from every field of a model
    pub fn new<M: Model>() -> Self {
        Self::named(M::NAME, M::fields())
    }

    /// Start from a field list under an explicit name
    pub fn named(name: &str, fields: &[FieldSpec]) -> Self {
        let mut schema = Self {
            name: name.to_string(),
            base_fields: Vec::new(),
            related_fields: Vec::new(),
        };

        for spec in fields {
            schema.push(SchemaField {
                name: spec.name.to_string(),
                kind: spec.kind,
                required: spec.required,
            });
        }
        schema
    }

    fn push(&mut self, field: SchemaField) {
        if field.kind.is_relation() {
            self.related_fields.push(field);
        } else {
            self.base_fields.push(field);
        }
    }

    /// Drop fields
    pub fn exclude(mut self, fields: &[&str]) -> Self {
        self.base_fields.retain(|f| !fields.contains(&f.name.as_str()));
        self.related_fields.retain(|f| !fields.contains(&f.name.as_str()));
        self
    }

    /// Add required fields
    pub fn append(mut self, fields: &[(&str, FieldKind)]) -> Self {
        for (name, kind) in fields {
            self.base_fields.retain(|f| f.name != *name);
            self.related_fields.retain(|f| f.name != *name);
            self.push(SchemaField {
                name: name.to_string(),
                kind: *kind,
                required: true,
            });
        }
        self
    }

    /// Change the kind of existing fields
    pub fn override_kinds(mut self, overrides: &[(&str, FieldKind)]) -> Self {
        for (name, kind) in overrides {
            let existing = self
                .base_fields
                .iter()
                .chain(self.related_fields.iter())
                .find(|f| f.name == *name)
                .cloned();

            if let Some(mut field) = existing {
                self.base_fields.retain(|f| f.name != *name);
                self.related_fields.retain(|f| f.name != *name);
                field.kind = *kind;
                self.push(field);
            }
        }
        self
    }

    /// Schema for creation, without relationships
    pub fn create_schema(&self) -> Schema {
        Schema {
            name: format!("{}Create", self.name),
            fields: self.base_fields.clone(),
        }
    }

    /// Schema for reading, relationships included
    pub fn read_schema(&self) -> Schema {
        Schema {
            name: format!("{}Read", self.name),
            fields: self
                .base_fields
                .iter()
                .chain(self.related_fields.iter())
                .cloned()
                .collect(),
        }
    }

    /// Schema for partial updates, every field optional
    pub fn update_schema(&self) -> Schema {
        Schema {
            name: format!("{}Update", self.name),
            fields: self
                .base_fields
                .iter()
                .cloned()
                .map(|mut f| {
                    f.required = false;
                    f
                })
                .collect(),
        }
    }
}
