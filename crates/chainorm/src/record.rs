//! Row wrappers returned by model finds.
//!
//! A [`Record`] carries one row, a delta of fields changed since it was loaded, and just
//! enough of its origin (table, database, a weak handle to the [`Orm`]) to persist that
//! delta and resolve associations. Each persistence call builds a fresh chain.

use crate::context::Orm;
use crate::error::{OrmError, OrmResult};
use crate::model::ModelChain;
use crate::relation::{Associations, Relation, RelationKind};
use crate::service::DbResult;
use crate::value::{Row, Value};
use std::sync::{Arc, Weak};

const TARGET: &str = "chainorm.record";

static NULL: Value = Value::Null;

#[derive(Debug, Clone)]
pub struct Record {
    table: String,
    db_name: String,
    row: Row,
    modified: Row,
    is_new: bool,
    strict: bool,
    orm: Weak<Orm>,
    associations: Option<Arc<Associations>>,
}

/// Result of resolving an association.
#[derive(Debug, Clone)]
pub enum Related {
    One(Option<Record>),
    Many(Vec<Record>),
}

impl Related {
    pub fn into_one(self) -> Option<Record> {
        match self {
            Related::One(record) => record,
            Related::Many(records) => records.into_iter().next(),
        }
    }

    pub fn into_many(self) -> Vec<Record> {
        match self {
            Related::One(record) => record.into_iter().collect(),
            Related::Many(records) => records,
        }
    }
}

impl Record {
    /// Wrap a row loaded from `table`.
    pub(crate) fn loaded(orm: &Arc<Orm>, table: &str, db_name: &str, row: Row, strict: bool) -> Self {
        Self {
            table: table.to_string(),
            db_name: db_name.to_string(),
            row,
            modified: Row::new(),
            is_new: false,
            strict,
            orm: Arc::downgrade(orm),
            associations: orm.associations().get(table),
        }
    }

    /// A record that has not been persisted yet; [`Record::save`] inserts it.
    pub fn new(orm: &Arc<Orm>, table: &str, row: Row) -> OrmResult<Self> {
        let config = orm.config().model_config(table);
        let db_name = match config.db {
            Some(db) => db,
            None => orm.default_db()?.to_string(),
        };
        let mut record = Self::loaded(orm, table, &db_name, row, config.strict);
        record.is_new = true;
        Ok(record)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn row(&self) -> &Row {
        &self.row
    }

    pub fn into_row(self) -> Row {
        self.row
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.row.keys()
    }

    /// Fields changed since load, with their new values.
    pub fn modified(&self) -> &Row {
        &self.modified
    }

    pub fn is_modified(&self) -> bool {
        !self.modified.is_empty()
    }

    /// Read a field. Unknown fields are an error on strict records and `NULL` otherwise.
    pub fn get(&self, field: &str) -> OrmResult<&Value> {
        match self.row.get(field) {
            Some(value) => Ok(value),
            None if self.strict => Err(self.not_found(field)),
            None => Ok(&NULL),
        }
    }

    pub fn get_many(&self, fields: &[&str]) -> OrmResult<Vec<&Value>> {
        fields.iter().map(|f| self.get(f)).collect()
    }

    pub fn id(&self) -> OrmResult<&Value> {
        self.row.get("id").ok_or_else(|| self.not_found("id"))
    }

    fn not_found(&self, field: &str) -> OrmError {
        OrmError::NotFoundField {
            table: self.table.clone(),
            field: field.to_string(),
        }
    }

    /// Change a field locally. Unknown fields are ignored with a warning; returns whether
    /// the value was applied. Changes to loaded records are tracked for [`Record::save`].
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> bool {
        let value = value.into();
        let Some(current) = self.row.get_mut(field) else {
            tracing::warn!(target: TARGET, table = %self.table, field, "ignoring set of unknown field");
            return false;
        };
        if *current != value {
            if !self.is_new {
                self.modified.insert(field, value.clone());
            }
            *current = value;
        }
        true
    }

    /// [`Record::set`] for every field of `fields`; returns how many were applied.
    pub fn set_many(&mut self, fields: Row) -> usize {
        let mut applied = 0;
        for (field, value) in fields {
            if self.set(&field, value) {
                applied += 1;
            }
        }
        applied
    }

    fn orm(&self) -> OrmResult<Arc<Orm>> {
        self.orm.upgrade().ok_or_else(|| {
            OrmError::Other(format!(
                "ORM context of this {} record has been dropped",
                self.table
            ))
        })
    }

    fn model(&self, table: &str) -> OrmResult<ModelChain> {
        self.orm()?.model_in(table, &self.db_name)
    }

    fn id_condition(&self) -> String {
        format!("{}.id = ?", self.table)
    }

    /// Persist pending changes. A loaded record issues one `UPDATE ... WHERE <table>.id = ?`
    /// with only the modified fields; a new record is inserted whole.
    ///
    /// Returns the driver result of the statement that ran. With nothing to persist no
    /// statement is issued and the result is `None`; the record itself is unchanged and
    /// stays usable through `&mut self`, so it is not handed back.
    pub async fn save(&mut self) -> OrmResult<Option<DbResult>> {
        if self.is_new {
            let mut m = self.model(&self.table)?;
            m.insert(self.row.clone())?;
            let result = m.execute().await?;
            if let Some(id) = result.insert_id {
                self.row.insert("id", id);
            }
            self.is_new = false;
            return Ok(Some(result));
        }
        if self.modified.is_empty() {
            return Ok(None);
        }

        let id = self.id()?.clone();
        let mut m = self.model(&self.table)?;
        m.update(self.modified.clone())?
            .where_(&self.id_condition(), vec![id])?;
        let result = m.execute().await?;
        self.modified = Row::new();
        Ok(Some(result))
    }

    /// Update the given fields by id, then apply them locally.
    ///
    /// The record keeps the field set it was loaded with: a strict record rejects fields
    /// it doesn't have before issuing anything, a lax one writes them but only applies
    /// known fields locally.
    pub async fn update(&mut self, fields: Row) -> OrmResult<DbResult> {
        if self.strict
            && let Some(unknown) = fields.keys().find(|k| self.row.get(k).is_none())
        {
            return Err(self.not_found(unknown));
        }
        let id = self.id()?.clone();
        let mut m = self.model(&self.table)?;
        m.update(fields.clone())?
            .where_(&self.id_condition(), vec![id])?;
        let result = m.execute().await?;
        for (k, v) in fields {
            self.modified.remove(&k);
            match self.row.get_mut(&k) {
                Some(current) => *current = v,
                None => tracing::debug!(
                    target: TARGET,
                    table = %self.table,
                    field = %k,
                    "updated field not loaded on record"
                ),
            }
        }
        Ok(result)
    }

    /// Delete this row by id.
    pub async fn delete(&self) -> OrmResult<DbResult> {
        let id = self.id()?.clone();
        let mut m = self.model(&self.table)?;
        m.delete()?.where_(&self.id_condition(), vec![id])?;
        m.execute().await
    }

    /// A find chain for this row by id.
    pub fn find(&self) -> OrmResult<ModelChain> {
        let id = self.id()?.clone();
        let mut m = self.model(&self.table)?;
        m.find(&[])?.where_(&self.id_condition(), vec![id])?;
        Ok(m)
    }

    /// Re-read the row by id, discarding local changes. Returns `false` if it is gone.
    pub async fn reload(&mut self) -> OrmResult<bool> {
        let Some(fresh) = self.find()?.first().await? else {
            return Ok(false);
        };
        self.row = fresh.into_row();
        self.modified = Row::new();
        Ok(true)
    }

    pub fn relations(&self) -> &[Relation] {
        match &self.associations {
            Some(assoc) => assoc.relations(),
            None => &[],
        }
    }

    /// Accessor names for the table's associations (`getX` / `findX`).
    pub fn relation_methods(&self) -> Vec<String> {
        self.relations()
            .iter()
            .flat_map(|r| [r.getter_name(), r.finder_name()])
            .collect()
    }

    pub fn relation(&self, name: &str) -> OrmResult<&Relation> {
        self.relations()
            .iter()
            .find(|r| r.matches(name))
            .ok_or_else(|| {
                OrmError::validation(format!("{} has no association named {name}", self.table))
            })
    }

    /// A find chain for the rows related through `relation`, left open for further
    /// conditions.
    pub fn find_relation(&self, relation: &Relation) -> OrmResult<ModelChain> {
        let key = self.get(relation.local_key())?.clone();
        let mut m = self.model(&relation.table)?;
        let fragment = format!("{}.{} = ?", relation.table, relation.remote_key());
        m.find(&[])?.where_(&fragment, vec![key])?;
        Ok(m)
    }

    /// Load the rows related through `relation`. A null local key yields nothing without
    /// querying.
    pub async fn load_relation(&self, relation: &Relation) -> OrmResult<Related> {
        if self.get(relation.local_key())?.is_null() {
            return Ok(match relation.kind {
                RelationKind::BelongsTo => Related::One(None),
                RelationKind::HasMany => Related::Many(Vec::new()),
            });
        }
        let mut m = self.find_relation(relation)?;
        Ok(match relation.kind {
            RelationKind::BelongsTo => Related::One(m.first().await?),
            RelationKind::HasMany => Related::Many(m.all().await?),
        })
    }

    /// [`Record::load_relation`] by association name (`protos`, `Protos`, `getProtos`).
    pub async fn get_related(&self, name: &str) -> OrmResult<Related> {
        let relation = self.relation(name)?.clone();
        self.load_relation(&relation).await
    }

    /// [`Record::find_relation`] by association name.
    pub fn find_related(&self, name: &str) -> OrmResult<ModelChain> {
        self.find_relation(self.relation(name)?)
    }

    pub fn to_json(&self) -> serde_json::Value {
        self.row.to_json()
    }
}
