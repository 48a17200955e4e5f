#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use tokio::sync::broadcast;

use feetrack::auth::{AuthEvent, AuthProvider, AuthUser, LocalAuth, Session};
use feetrack::error::{Error, Result};
use feetrack::model::Table;
use feetrack::store::{DataService, LocalStore, Query};

/// An in-memory store whose reads or inserts can be made to fail.
pub struct FlakyStore {
    inner: LocalStore,
    pub fail_select: AtomicBool,
    pub fail_insert: AtomicBool,
    /// Inserts succeed but report no rows back.
    pub swallow_insert: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(FlakyStore {
            inner: LocalStore::in_memory(),
            fail_select: AtomicBool::new(false),
            fail_insert: AtomicBool::new(false),
            swallow_insert: AtomicBool::new(false),
        })
    }
}

impl DataService for FlakyStore {
    fn select(&self, table: Table, query: &Query) -> Result<Vec<Value>> {
        if self.fail_select.load(Ordering::SeqCst) {
            return Err(Error::Storage("connection reset".to_owned()));
        }
        self.inner.select(table, query)
    }

    fn insert(&self, table: Table, rows: Vec<Value>) -> Result<Vec<Value>> {
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(Error::Storage("insert rejected".to_owned()));
        }
        let inserted = self.inner.insert(table, rows)?;
        if self.swallow_insert.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        Ok(inserted)
    }

    fn update(&self, table: Table, id: &str, patch: Value) -> Result<Value> {
        self.inner.update(table, id, patch)
    }

    fn delete(&self, table: Table, id: &str) -> Result<usize> {
        self.inner.delete(table, id)
    }
}

/// An in-memory auth service whose admin delete can be made to fail.
pub struct StubbornAuth {
    inner: LocalAuth,
    pub fail_delete: AtomicBool,
}

impl StubbornAuth {
    pub fn new() -> Arc<Self> {
        Arc::new(StubbornAuth {
            inner: LocalAuth::in_memory(),
            fail_delete: AtomicBool::new(false),
        })
    }
}

impl AuthProvider for StubbornAuth {
    fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        self.inner.sign_in(email, password)
    }

    fn sign_out(&self, token: &str) -> Result<()> {
        self.inner.sign_out(token)
    }

    fn session(&self, token: &str) -> Option<Session> {
        self.inner.session(token)
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.subscribe()
    }

    fn publish(&self, event: AuthEvent) {
        self.inner.publish(event)
    }

    fn create_user(&self, email: &str, password: &str, name: &str) -> Result<AuthUser> {
        self.inner.create_user(email, password, name)
    }

    fn delete_user(&self, user_id: &str) -> Result<()> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(Error::Auth("service unavailable".to_owned()));
        }
        self.inner.delete_user(user_id)
    }
}
