//! DB Service
//!
//! Generic CRUD over [`Model`] records with soft delete, lookups, ordering
//! and pagination. Records live in a [`RecordStore`]; [`MemoryStore`] keeps
//! them in memory.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::models::{new_id, Model};
use crate::utils::current_time;
use crate::utils::filters::{
    compare_values, integrity_field_from_message, matches_all, parse_filters, LOOKUP_SEPARATOR,
};

/// Default page size of [`Query`]
pub const DEFAULT_LIMIT: usize = 100;

type Record = Map<String, Value>;

/// Record store error
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0}")]
    UniqueViolation(String),
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("Store error: {0}")]
    Backend(String),
}

/// DB service error
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Invalid field '{field}' for model '{model}'")]
    InvalidField { field: String, model: &'static str },
    #[error("Invalid prefetch field '{field}' for model '{model}'")]
    InvalidPrefetch { field: String, model: &'static str },
    #[error("{0} does not have a slug field.")]
    NoSlugField(&'static str),
    #[error("Multiple {0} records match")]
    MultipleResults(&'static str),
    #[error("{message}")]
    Integrity {
        message: String,
        field: Option<String>,
    },
    #[error("Invalid record: {0}")]
    InvalidRecord(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// How `delete` removes records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteMode {
    /// Flag the record as deleted and hide it from queries
    #[default]
    Soft,
    /// Remove the record
    Hard,
}

/// Persistence behind [`DbService`]
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a record, enforcing uniqueness of `unique` fields
    async fn insert(&self, table: &str, id: &str, record: Record, unique: &[&str]) -> Result<(), StoreError>;

    /// Replace an existing record, enforcing uniqueness of `unique` fields
    async fn update(&self, table: &str, id: &str, record: Record, unique: &[&str]) -> Result<(), StoreError>;

    /// Remove a record, returning whether it existed
    async fn remove(&self, table: &str, id: &str) -> Result<bool, StoreError>;

    /// Fetch a record by ID
    async fn get(&self, table: &str, id: &str) -> Result<Option<Record>, StoreError>;

    /// All records of a table, in ID order
    async fn scan(&self, table: &str) -> Result<Vec<Record>, StoreError>;
}

/// In-memory record store
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, BTreeMap<String, Record>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_unique(
        table: &str,
        rows: &BTreeMap<String, Record>,
        id: &str,
        record: &Record,
        unique: &[&str],
    ) -> Result<(), StoreError> {
        for field in unique {
            let Some(value) = record.get(*field).filter(|v| !v.is_null()) else {
                continue;
            };

            let taken = rows
                .iter()
                .any(|(other_id, other)| other_id != id && other.get(*field) == Some(value));

            if taken {
                let shown = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                return Err(StoreError::UniqueViolation(format!(
                    "duplicate key value violates unique constraint \"{}_{}_key\"\nDETAIL:  Key ({})=({}) already exists.",
                    table.to_lowercase(),
                    field,
                    field,
                    shown
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert(&self, table: &str, id: &str, record: Record, unique: &[&str]) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let rows = tables.entry(table.to_string()).or_default();

        if rows.contains_key(id) {
            return Err(StoreError::UniqueViolation(format!(
                "duplicate key value violates unique constraint \"{}_pkey\"\nDETAIL:  Key (id)=({}) already exists.",
                table.to_lowercase(),
                id
            )));
        }
        Self::check_unique(table, rows, id, &record, unique)?;

        rows.insert(id.to_string(), record);
        Ok(())
    }

    async fn update(&self, table: &str, id: &str, record: Record, unique: &[&str]) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let rows = tables
            .get_mut(table)
            .filter(|rows| rows.contains_key(id))
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        Self::check_unique(table, rows, id, &record, unique)?;

        rows.insert(id.to_string(), record);
        Ok(())
    }

    async fn remove(&self, table: &str, id: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .get_mut(table)
            .map_or(false, |rows| rows.remove(id).is_some()))
    }

    async fn get(&self, table: &str, id: &str) -> Result<Option<Record>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.get(table).and_then(|rows| rows.get(id)).cloned())
    }

    async fn scan(&self, table: &str) -> Result<Vec<Record>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default())
    }
}

/// Options of [`DbService::filter`]
#[derive(Debug, Clone)]
pub struct Query {
    pub limit: usize,
    pub offset: usize,
    /// Field to order by, `-field` for descending
    pub order_by: Option<String>,
    /// Relations to load along with the records
    pub prefetch: Vec<String>,
    /// `field__operator` lookups
    pub lookups: Map<String, Value>,
}

impl Default for Query {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
            order_by: None,
            prefetch: Vec::new(),
            lookups: Map::new(),
        }
    }
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn order_by(mut self, field: impl Into<String>) -> Self {
        self.order_by = Some(field.into());
        self
    }

    pub fn prefetch(mut self, relation: impl Into<String>) -> Self {
        self.prefetch.push(relation.into());
        self
    }

    /// Add a lookup such as `("views__gte", 10)`
    pub fn lookup(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.lookups.insert(key.into(), value.into());
        self
    }
}

/// Generic CRUD service for a model
pub struct DbService<M: Model> {
    store: Arc<dyn RecordStore>,
    delete_mode: DeleteMode,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> Clone for DbService<M> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            delete_mode: self.delete_mode,
            _model: PhantomData,
        }
    }
}

impl<M: Model> DbService<M> {
    /// Create a service using soft delete
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self::with_delete_mode(store, DeleteMode::Soft)
    }

    pub fn with_delete_mode(store: Arc<dyn RecordStore>, delete_mode: DeleteMode) -> Self {
        Self {
            store,
            delete_mode,
            _model: PhantomData,
        }
    }

    pub fn delete_mode(&self) -> DeleteMode {
        self.delete_mode
    }

    fn soft_delete_aware(&self) -> bool {
        self.delete_mode == DeleteMode::Soft && M::has_field("is_deleted")
    }

    fn is_visible(&self, record: &Record) -> bool {
        !self.soft_delete_aware() || record.get("is_deleted") != Some(&Value::Bool(true))
    }

    fn validate_lookups(&self, lookups: &Map<String, Value>) -> Result<(), DbError> {
        for key in lookups.keys() {
            // Unknown operators are dropped later by `parse_filters`
            let field = key.split(LOOKUP_SEPARATOR).next().unwrap_or(key);
            if !M::has_field(field) {
                return Err(DbError::InvalidField {
                    field: field.to_string(),
                    model: M::NAME,
                });
            }
        }
        Ok(())
    }

    fn validate_prefetch(&self, prefetch: &[String]) -> Result<(), DbError> {
        for relation in prefetch {
            let is_relation = M::field(relation).map_or(false, |f| f.kind.is_relation());
            if !is_relation {
                return Err(DbError::InvalidPrefetch {
                    field: relation.clone(),
                    model: M::NAME,
                });
            }
        }
        Ok(())
    }

    fn unique_fields() -> Vec<&'static str> {
        M::unique_fields().to_vec()
    }

    /// Visible records matching the lookups
    async fn matching(&self, lookups: &Map<String, Value>) -> Result<Vec<Record>, DbError> {
        self.validate_lookups(lookups)?;
        let names: Vec<&str> = M::fields().iter().map(|f| f.name).collect();
        let filters = parse_filters(lookups, &names);

        Ok(self
            .store
            .scan(M::NAME)
            .await?
            .into_iter()
            .filter(|r| self.is_visible(r) && matches_all(&filters, r))
            .collect())
    }

    fn to_model(record: Record) -> Result<M, DbError> {
        Ok(serde_json::from_value(Value::Object(record))?)
    }

    fn to_record(instance: &M) -> Result<Record, DbError> {
        match serde_json::to_value(instance)? {
            Value::Object(record) => Ok(record),
            _ => Err(DbError::Store(StoreError::Backend(format!(
                "{} does not serialize to an object",
                M::NAME
            )))),
        }
    }

    fn integrity_error(err: StoreError) -> DbError {
        match err {
            StoreError::UniqueViolation(message) => match integrity_field_from_message(&message) {
                Some(field) => {
                    let mut chars = field.chars();
                    let capitalized = match chars.next() {
                        Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                        None => String::new(),
                    };
                    DbError::Integrity {
                        message: format!("{} already exists.", capitalized),
                        field: Some(field),
                    }
                }
                None => DbError::Integrity {
                    message: format!("Integrity error: {}", message),
                    field: None,
                },
            },
            other => DbError::Store(other),
        }
    }

    /// Filter records with limit, offset and ordering
    pub async fn filter(&self, query: Query) -> Result<Vec<M>, DbError> {
        self.validate_prefetch(&query.prefetch)?;
        let mut records = self.matching(&query.lookups).await?;

        if let Some(order_by) = &query.order_by {
            let descending = order_by.starts_with('-');
            let field = order_by.trim_start_matches('-');

            if M::has_field(field) {
                records.sort_by(|a, b| {
                    let ordering = order_values(a.get(field), b.get(field));
                    if descending {
                        ordering.reverse()
                    } else {
                        ordering
                    }
                });
            }
        }

        records
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .map(Self::to_model)
            .collect()
    }

    /// Count visible records matching the lookups
    pub async fn count(&self, lookups: &Map<String, Value>) -> Result<usize, DbError> {
        Ok(self.matching(lookups).await?.len())
    }

    /// Fetch by primary key, soft-deleted records included
    pub async fn get(&self, pk: &str) -> Result<Option<M>, DbError> {
        self.store
            .get(M::NAME, pk)
            .await?
            .map(Self::to_model)
            .transpose()
    }

    /// Fetch a single visible record by primary key and/or lookups.
    ///
    /// More than one match is an error.
    pub async fn one(&self, pk: Option<&str>, lookups: &Map<String, Value>) -> Result<Option<M>, DbError> {
        let mut records: Vec<Record> = self
            .matching(lookups)
            .await?
            .into_iter()
            .filter(|r| pk.map_or(true, |pk| r.get("id").and_then(Value::as_str) == Some(pk)))
            .collect();

        match records.len() {
            0 => Ok(None),
            1 => Ok(Some(Self::to_model(records.remove(0))?)),
            _ => Err(DbError::MultipleResults(M::NAME)),
        }
    }

    /// Fetch a single visible record by slug
    pub async fn one_by_slug(&self, slug: &str) -> Result<Option<M>, DbError> {
        if !M::has_field("slug") {
            return Err(DbError::NoSlugField(M::NAME));
        }

        let mut lookups = Map::new();
        lookups.insert("slug".to_string(), Value::String(slug.to_string()));
        self.one(None, &lookups).await
    }

    /// All visible records matching the lookups
    pub async fn all(&self, lookups: &Map<String, Value>) -> Result<Vec<M>, DbError> {
        self.matching(lookups)
            .await?
            .into_iter()
            .map(Self::to_model)
            .collect()
    }

    /// Create a record from raw data. Keys outside the model are ignored;
    /// the ID and bookkeeping fields are filled in.
    pub async fn create(&self, data: Map<String, Value>) -> Result<M, DbError> {
        let mut record: Record = data
            .into_iter()
            .filter(|(key, _)| M::has_field(key))
            .collect();

        if M::has_field("id") && record.get("id").map_or(true, Value::is_null) {
            record.insert("id".to_string(), Value::String(new_id()));
        }
        let now = serde_json::to_value(current_time())?;
        for field in ["created_at", "updated_at"] {
            if M::has_field(field) && !record.contains_key(field) {
                record.insert(field.to_string(), now.clone());
            }
        }

        let instance = Self::to_model(record)?;
        self.create_instance(instance).await
    }

    /// Insert an already built record
    pub async fn create_instance(&self, instance: M) -> Result<M, DbError> {
        let mut record = Self::to_record(&instance)?;

        if M::has_field("is_deleted") {
            record.insert("is_deleted".to_string(), Value::Bool(false));
        }
        if M::has_field("deleted_at") {
            record.insert("deleted_at".to_string(), Value::Null);
        }
        if M::has_field("created_at") {
            record.insert("created_at".to_string(), serde_json::to_value(current_time())?);
        }

        let instance = Self::to_model(record.clone())?;
        let unique = Self::unique_fields();

        if let Err(e) = self.store.insert(M::NAME, instance.id(), record, &unique).await {
            tracing::warn!(model = M::NAME, "Create rejected: {}", e);
            return Err(Self::integrity_error(e));
        }

        tracing::debug!(model = M::NAME, id = instance.id(), "Created record");
        Ok(instance)
    }

    /// Partially update a record
    pub async fn update(&self, instance: &M, data: Map<String, Value>) -> Result<M, DbError> {
        let mut record = Self::to_record(instance)?;

        for (key, value) in data {
            if !M::has_field(&key) {
                return Err(DbError::InvalidField {
                    field: key,
                    model: M::NAME,
                });
            }
            record.insert(key, value);
        }

        if M::has_field("updated_at") {
            record.insert("updated_at".to_string(), serde_json::to_value(current_time())?);
        }

        let updated = Self::to_model(record.clone())?;
        let unique = Self::unique_fields();
        self.store
            .update(M::NAME, instance.id(), record, &unique)
            .await
            .map_err(Self::integrity_error)?;

        Ok(updated)
    }

    /// Delete a record. `force` removes it even in soft delete mode.
    pub async fn delete(&self, instance: &M, force: bool) -> Result<(), DbError> {
        if force || self.delete_mode == DeleteMode::Hard {
            self.store.remove(M::NAME, instance.id()).await?;
            tracing::debug!(model = M::NAME, id = instance.id(), "Removed record");
            return Ok(());
        }

        let mut record = Self::to_record(instance)?;
        if M::has_field("is_deleted") {
            record.insert("is_deleted".to_string(), Value::Bool(true));
        }
        if M::has_field("deleted_at") {
            record.insert("deleted_at".to_string(), serde_json::to_value(current_time())?);
        }

        let unique = Self::unique_fields();
        self.store.update(M::NAME, instance.id(), record, &unique).await?;
        tracing::debug!(model = M::NAME, id = instance.id(), "Soft deleted record");
        Ok(())
    }
}

/// Ordering for sorting; nulls and incomparable values sort last
fn order_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());

    match (a, b) {
        (Some(a), Some(b)) => compare_values(a, b).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
