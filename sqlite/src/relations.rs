//! Foreign-key and many-to-many resolution.
//!
//! On the write path reference fields collapse to the referenced primary
//! key, saving unsaved records first, and many-to-many lists are written to
//! their junction table with replace semantics. On the read path rows are
//! hydrated back into records: references become nested records and
//! many-to-many lists are loaded while the depth allows it.

use std::sync::Arc;

use ormagic_core::{Field, FieldType, ModelSchema, Record, Value, junction_column};
use tracing::debug;

use crate::error::{Result, SqliteError};
use crate::executor::{Executor, Row};
use crate::store::Store;

/// How far a record being hydrated is from the record originally requested.
///
/// Foreign keys and many-to-many lists are counted apart: following a
/// reference only increments `references`, so a record reached through a
/// foreign key still gets its lists while `relations` allows it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Depth {
    /// Foreign keys followed, checked against `max_reference_depth`.
    pub references: usize,
    /// Many-to-many edges followed, checked against `relation_depth`.
    pub relations: usize,
}

impl Depth {
    fn via_reference(self) -> Self {
        Self {
            references: self.references + 1,
            ..self
        }
    }

    fn via_relation(self) -> Self {
        Self {
            relations: self.relations + 1,
            ..self
        }
    }
}

impl<E: Executor + ?Sized> Store<'_, E> {
    /// Column values of a record, primary key excluded, in declaration order.
    ///
    /// Fields never set on the record are left out so that inserts fall back
    /// to column defaults and updates leave them untouched.
    pub(crate) fn column_values(&self, record: &mut Record) -> Result<Vec<(String, Value)>> {
        let schema = Arc::clone(record.schema());
        let mut columns = Vec::new();
        for field in schema.columns().filter(|f| !f.primary_key) {
            let Some(value) = record.get_mut(&field.name) else {
                continue;
            };
            let stored = match &field.field_type {
                FieldType::Reference(target) => self.resolve_reference(field, target, value)?,
                _ => value.to_column().ok_or_else(|| {
                    SqliteError::ConversionError(format!(
                        "field '{}' of {} cannot hold a list",
                        field.name,
                        schema.name()
                    ))
                })?,
            };
            columns.push((field.name.clone(), stored));
        }
        Ok(columns)
    }

    /// Reduces a reference value to the key stored in its column.
    fn resolve_reference(&self, field: &Field, target: &str, value: &mut Value) -> Result<Value> {
        match value {
            Value::Record(nested) => {
                if nested.model() != target {
                    return Err(SqliteError::ConversionError(format!(
                        "field '{}' expects a {target} record, got {}",
                        field.name,
                        nested.model()
                    )));
                }
                if nested.pk().is_none() {
                    self.save(nested)?;
                }
                Ok(nested.pk().cloned().unwrap_or_default())
            }
            Value::List(_) => Err(SqliteError::ConversionError(format!(
                "field '{}' references one {target} record, got a list",
                field.name
            ))),
            scalar => Ok(scalar.clone()),
        }
    }

    /// Replaces the junction rows of every many-to-many field set on a saved record.
    ///
    /// Unsaved related records are saved first. Fields left unset on the
    /// record are skipped, as are empty lists of a record that was just
    /// inserted and so has no junction rows yet.
    pub(crate) fn sync_many_to_many(&self, record: &mut Record, inserted: bool) -> Result<()> {
        let schema = Arc::clone(record.schema());
        let Some(pk) = record.pk().cloned() else {
            return Ok(());
        };

        for field in schema.reference_lists() {
            let Some(target) = field.field_type.target() else {
                continue;
            };
            let target = self.model(target)?;
            let Some(Value::List(items)) = record.get_mut(&field.name) else {
                continue;
            };

            let junction = if items.is_empty() {
                if inserted {
                    continue;
                }
                match self.junction_table(&schema, target)? {
                    Some(junction) => junction,
                    None => continue,
                }
            } else {
                self.ensure_junction(&schema, target)?
            };
            let own = junction_column(&schema);
            let other = junction_column(target);

            self.execute(
                &format!("DELETE FROM {junction} WHERE {own} = ?"),
                std::slice::from_ref(&pk),
            )?;
            let insert = format!("INSERT INTO {junction} ({own}, {other}) VALUES (?, ?)");
            for item in items.iter_mut() {
                if item.model() != target.name() {
                    return Err(SqliteError::ConversionError(format!(
                        "field '{}' expects {} records, got {}",
                        field.name,
                        target.name(),
                        item.model()
                    )));
                }
                if item.pk().is_none() {
                    self.save(item)?;
                }
                let item_pk = item.pk().cloned().unwrap_or_default();
                self.execute(&insert, &[pk.clone(), item_pk])?;
            }
            debug!(junction = %junction, count = items.len(), "synced many-to-many");
        }
        Ok(())
    }

    /// Builds a record from a row of the model's table.
    ///
    /// Reference columns are replaced by the referenced record while
    /// `depth.references` stays below `max_reference_depth`. Many-to-many
    /// lists are loaded only while `depth.relations` is below
    /// `relation_depth`; otherwise they stay unset.
    pub fn hydrate(&self, schema: &Arc<ModelSchema>, row: Row, depth: Depth) -> Result<Record> {
        let mut record = Record::blank(Arc::clone(schema));
        for (column, value) in row.into_pairs() {
            let Some(field) = schema.field(&column) else {
                continue;
            };
            let value = match &field.field_type {
                FieldType::Reference(target)
                    if !value.is_null() && depth.references < self.options().max_reference_depth =>
                {
                    match self.fetch_by_pk(target, &value, depth.via_reference())? {
                        Some(nested) => Value::Record(Box::new(nested)),
                        None => value,
                    }
                }
                _ => value,
            };
            record.set(column, value);
        }

        if depth.relations < self.options().relation_depth {
            for field in schema.reference_lists() {
                let related = self.fetch_related(&record, field, depth.via_relation())?;
                record.set(field.name.clone(), Value::List(related));
            }
        }
        Ok(record)
    }

    /// Loads one record of `model` by primary key.
    pub fn fetch_by_pk(&self, model: &str, pk: &Value, depth: Depth) -> Result<Option<Record>> {
        let schema = self.model(model)?;
        let sql = format!(
            "SELECT * FROM {} WHERE {} = ?",
            schema.table(),
            schema.primary_key().name
        );
        match self.query(&sql, std::slice::from_ref(pk))?.into_iter().next() {
            Some(row) => Ok(Some(self.hydrate(schema, row, depth)?)),
            None => Ok(None),
        }
    }

    /// Loads the records linked to `record` through a many-to-many field.
    pub fn fetch_related(&self, record: &Record, field: &Field, depth: Depth) -> Result<Vec<Record>> {
        let Some(target) = field.field_type.target() else {
            return Ok(Vec::new());
        };
        let Some(pk) = record.pk() else {
            return Ok(Vec::new());
        };
        let target = self.model(target)?;
        let Some(junction) = self.junction_table(record.schema(), target)? else {
            return Ok(Vec::new());
        };

        let target_pk = &target.primary_key().name;
        let sql = format!(
            "SELECT * FROM {table} WHERE {target_pk} IN \
             (SELECT {other} FROM {junction} WHERE {own} = ?) ORDER BY {target_pk}",
            table = target.table(),
            other = junction_column(target),
            own = junction_column(record.schema()),
        );
        self.query(&sql, std::slice::from_ref(pk))?
            .into_iter()
            .map(|row| self.hydrate(target, row, depth))
            .collect()
    }
}
