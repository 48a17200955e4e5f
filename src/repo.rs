use std::marker::PhantomData;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::model::{Record, new_id};
use crate::store::{DataService, Query};

/// Typed view of one table. Rows are decoded (and so checked) on the way
/// out and validated on the way in.
pub struct Repo<T> {
    service: Arc<dyn DataService>,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for Repo<T> {
    fn clone(&self) -> Self {
        Repo {
            service: Arc::clone(&self.service),
            _record: PhantomData,
        }
    }
}

fn decode<T: Record>(row: Value) -> Result<T> {
    serde_json::from_value(row).map_err(|e| {
        Error::Storage(format!("malformed row in {}: {}", T::TABLE, e))
    })
}

impl<T: Record> Repo<T> {
    pub fn new(service: Arc<dyn DataService>) -> Self {
        Repo {
            service,
            _record: PhantomData,
        }
    }

    /// Every row, ordered by the record's display field.
    pub fn fetch_all(&self) -> Result<Vec<T>> {
        self.fetch(Query::new())
    }

    /// Rows matching `query`; the record's ordering is applied when the query
    /// names none.
    pub fn fetch(&self, mut query: Query) -> Result<Vec<T>> {
        if query.order.is_none() {
            query.order = Some(T::ORDER);
        }
        self.service
            .select(T::TABLE, &query)?
            .into_iter()
            .map(decode::<T>)
            .collect()
    }

    pub fn find(&self, id: &str) -> Result<Option<T>> {
        let mut rows = self.service.select(T::TABLE, &Query::new().eq("id", id))?;
        match rows.pop() {
            Some(row) => decode(row).map(Some),
            None => Ok(None),
        }
    }

    /// Updates the row named by the record's id, or inserts the record under
    /// a freshly synthesized id when it has none.
    pub fn save(&self, record: T) -> Result<T> {
        record.validate()?;
        match record.id() {
            Some(id) => {
                let id = id.to_owned();
                let row = self.service.update(T::TABLE, &id, serde_json::to_value(&record)?)?;
                decode(row)
            }
            None => {
                let mut record = record;
                record.set_id(new_id(T::ID_PREFIX));
                self.insert(vec![record])?.into_iter().next().ok_or_else(|| {
                    Error::Storage(format!("insert into {} returned no row", T::TABLE))
                })
            }
        }
    }

    /// Inserts records as given; ids are kept when present.
    pub fn insert(&self, records: Vec<T>) -> Result<Vec<T>> {
        let mut rows = Vec::with_capacity(records.len());
        for record in &records {
            record.validate()?;
            rows.push(serde_json::to_value(record)?);
        }
        self.service
            .insert(T::TABLE, rows)?
            .into_iter()
            .map(decode::<T>)
            .collect()
    }

    /// Writes only the given fields of the row with `id`.
    pub fn patch(&self, id: &str, fields: Value) -> Result<T> {
        decode(self.service.update(T::TABLE, id, fields)?)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        match self.service.delete(T::TABLE, id)? {
            0 => Err(Error::NotFound { table: T::TABLE.name(), id: id.to_owned() }),
            _ => Ok(()),
        }
    }
}
