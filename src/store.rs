/*!
The data service: table-scoped select/insert/update/delete over JSON rows.

`DataService` is the seam to the backend. `LocalStore` implements it with one
JSON file per table under a data directory (or nothing at all, when built
with [`LocalStore::in_memory`]). Rows are plain `serde_json` objects here;
typing happens one layer up in [`crate::repo`].
*/
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs::{self, File, create_dir_all};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::Table;

/// Ordering of a select, by a single column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Order {
    pub column: &'static str,
    pub ascending: bool,
}

impl Order {
    pub const fn asc(column: &'static str) -> Self {
        Order { column, ascending: true }
    }

    pub const fn desc(column: &'static str) -> Self {
        Order { column, ascending: false }
    }
}

/// Equality filters plus an optional ordering.
#[derive(Clone, Debug, Default)]
pub struct Query {
    pub eq: Vec<(String, Value)>,
    pub order: Option<Order>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.eq.push((column.to_owned(), value.into()));
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = Some(order);
        self
    }

    pub fn matches(&self, row: &Value) -> bool {
        self.eq.iter().all(|(col, val)| row.get(col) == Some(val))
    }
}

pub trait DataService: Send + Sync {
    fn select(&self, table: Table, query: &Query) -> Result<Vec<Value>>;

    /// Inserts every row or none. Rows without an `id` get one assigned.
    fn insert(&self, table: Table, rows: Vec<Value>) -> Result<Vec<Value>>;

    /// Merges the fields of `patch` into the row with the given id.
    fn update(&self, table: Table, id: &str, patch: Value) -> Result<Value>;

    /// Returns the number of rows removed (0 or 1).
    fn delete(&self, table: Table, id: &str) -> Result<usize>;
}

fn row_id(row: &Value) -> Option<&str> {
    row.get("id").and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Orders JSON scalars the way a text/numeric column would sort.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .unwrap_or(0.0)
            .partial_cmp(&y.as_f64().unwrap_or(0.0))
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => {
            x.to_lowercase().cmp(&y.to_lowercase()).then_with(|| x.cmp(y))
        }
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        // nulls last
        (None | Some(Value::Null), _) => Ordering::Greater,
        (_, None | Some(Value::Null)) => Ordering::Less,
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

pub struct LocalStore {
    dir: Option<PathBuf>,
    tables: RwLock<HashMap<Table, Vec<Value>>>,
}

impl LocalStore {
    /// A store that never touches the disk.
    pub fn in_memory() -> Self {
        LocalStore {
            dir: None,
            tables: RwLock::new(HashMap::new()),
        }
    }

    /// Opens (creating if necessary) a data directory and loads every table
    /// file found in it.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.exists() {
            create_dir_all(&dir)?;
        }

        let mut tables = HashMap::new();
        for table in Table::ALL {
            let path = table_path(&dir, table);
            if !path.exists() {
                continue;
            }
            let mut contents = String::new();
            File::open(&path)?.read_to_string(&mut contents)?;
            let rows: Vec<Value> = serde_json::from_str(&contents).map_err(|e| {
                Error::Storage(format!("unable to parse {}: {}", path.display(), e))
            })?;
            log::debug!("Loaded {} rows from {}", rows.len(), path.display());
            tables.insert(table, rows);
        }

        Ok(LocalStore {
            dir: Some(dir),
            tables: RwLock::new(tables),
        })
    }

    fn persist(&self, table: Table, rows: &[Value]) -> Result<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };

        let path = table_path(dir, table);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(rows)?;
        let mut file = File::create(&tmp)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp, &path)?;

        Ok(())
    }
}

fn table_path(dir: &Path, table: Table) -> PathBuf {
    dir.join(format!("{}.json", table.name()))
}

fn poisoned<T>(_: T) -> Error {
    Error::Storage("table lock poisoned".to_owned())
}

impl DataService for LocalStore {
    fn select(&self, table: Table, query: &Query) -> Result<Vec<Value>> {
        let tables = self.tables.read().map_err(poisoned)?;
        let mut rows: Vec<Value> = tables
            .get(&table)
            .map(|rows| rows.iter().filter(|r| query.matches(r)).cloned().collect())
            .unwrap_or_default();

        if let Some(order) = query.order {
            rows.sort_by(|a, b| {
                let o = compare_values(a.get(order.column), b.get(order.column));
                if order.ascending { o } else { o.reverse() }
            });
        }

        Ok(rows)
    }

    fn insert(&self, table: Table, rows: Vec<Value>) -> Result<Vec<Value>> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        let existing = tables.entry(table).or_default();

        let mut prepared = Vec::with_capacity(rows.len());
        for row in rows {
            let Value::Object(mut obj) = row else {
                return Err(Error::Storage(format!("rows inserted into {} must be objects", table)));
            };
            let id = match obj.get("id").and_then(Value::as_str).filter(|s| !s.is_empty()) {
                Some(id) => id.to_owned(),
                None => {
                    let id = Uuid::new_v4().to_string();
                    obj.insert("id".to_owned(), Value::String(id.clone()));
                    id
                }
            };
            let clash = existing.iter().any(|r| row_id(r) == Some(id.as_str()))
                || prepared.iter().any(|r: &Value| row_id(r) == Some(id.as_str()));
            if clash {
                return Err(Error::Duplicate { table: table.name(), id });
            }
            prepared.push(Value::Object(obj));
        }

        let mut next = existing.clone();
        next.extend(prepared.iter().cloned());
        self.persist(table, &next)?;
        *existing = next;

        log::debug!("Inserted {} rows into {}", prepared.len(), table);
        Ok(prepared)
    }

    fn update(&self, table: Table, id: &str, patch: Value) -> Result<Value> {
        let Value::Object(patch) = patch else {
            return Err(Error::Storage(format!("update of {} needs an object", table)));
        };

        let mut tables = self.tables.write().map_err(poisoned)?;
        let rows = tables.entry(table).or_default();
        let idx = rows
            .iter()
            .position(|r| row_id(r) == Some(id))
            .ok_or_else(|| Error::NotFound { table: table.name(), id: id.to_owned() })?;

        let mut next = rows.clone();
        let obj: &mut Map<String, Value> = next[idx]
            .as_object_mut()
            .ok_or_else(|| Error::Storage(format!("row {} in {} is not an object", id, table)))?;
        for (k, v) in patch {
            // The key is never rewritten by an update.
            if k != "id" {
                obj.insert(k, v);
            }
        }
        let updated = next[idx].clone();

        self.persist(table, &next)?;
        *rows = next;
        Ok(updated)
    }

    fn delete(&self, table: Table, id: &str) -> Result<usize> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        let rows = tables.entry(table).or_default();
        let before = rows.len();
        let next: Vec<Value> = rows.iter().filter(|r| row_id(r) != Some(id)).cloned().collect();
        let removed = before - next.len();

        if removed > 0 {
            self.persist(table, &next)?;
            *rows = next;
        }
        Ok(removed)
    }
}
