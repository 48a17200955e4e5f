/*!
The authentication service: credentials, sessions, and session-change
notifications.

`AuthProvider` is the seam; `LocalAuth` keeps argon2 password hashes in
`<data_dir>/auth.json` and sessions in memory. Admin-privileged calls
(`create_user`, `delete_user`) are only ever reached through
[`crate::users`].
*/
use std::collections::HashMap;
use std::fs::{self, File, create_dir_all};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::{Duration, SystemTime};

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::{Error, Result};

const AUTH_FILE: &str = "auth.json";
const SESSION_DURATION: u64 = 24 * 60 * 60; // 24 hours in seconds
const EVENT_CAPACITY: usize = 64;

/// A credential record held by the auth service.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    /// Display name supplied at creation (user metadata).
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub token: String,
    /// Subject: the auth user id.
    pub user_id: String,
    pub email: String,
    pub expires_at: SystemTime,
}

/// Session-change notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    SignedIn { token: String, user_id: String },
    SignedOut { token: String },
    UserDeleted { user_id: String },
    /// The profile row of a user changed (name or role).
    ProfileChanged { user_id: String },
}

pub trait AuthProvider: Send + Sync {
    fn sign_in(&self, email: &str, password: &str) -> Result<Session>;
    fn sign_out(&self, token: &str) -> Result<()>;
    /// The live session for `token`, if it exists and has not expired.
    fn session(&self, token: &str) -> Option<Session>;
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
    fn publish(&self, event: AuthEvent);

    fn create_user(&self, email: &str, password: &str, name: &str) -> Result<AuthUser>;
    fn delete_user(&self, user_id: &str) -> Result<()>;
}

pub struct LocalAuth {
    path: Option<PathBuf>,
    users: RwLock<HashMap<String, AuthUser>>,
    sessions: RwLock<HashMap<String, Session>>,
    events: broadcast::Sender<AuthEvent>,
    session_ttl: Duration,
}

fn poisoned<T>(_: T) -> Error {
    Error::Auth("auth state lock poisoned".to_owned())
}

impl LocalAuth {
    pub fn in_memory() -> Self {
        Self::with_path(None, HashMap::new())
    }

    /// Opens `<dir>/auth.json`, creating the directory and an empty file if
    /// they don't exist.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.exists() {
            create_dir_all(dir)?;
        }

        let path = dir.join(AUTH_FILE);
        if !path.exists() {
            let mut file = File::create(&path)?;
            file.write_all(b"{}")?;
        }

        let mut contents = String::new();
        File::open(&path)?.read_to_string(&mut contents)?;
        let users: HashMap<String, AuthUser> = serde_json::from_str(&contents)
            .map_err(|e| Error::Storage(format!("Failed to parse users data: {}", e)))?;
        log::debug!("Loaded {} auth users from {}", users.len(), path.display());

        Ok(Self::with_path(Some(path), users))
    }

    fn with_path(path: Option<PathBuf>, users: HashMap<String, AuthUser>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        LocalAuth {
            path,
            users: RwLock::new(users),
            sessions: RwLock::new(HashMap::new()),
            events,
            session_ttl: Duration::from_secs(SESSION_DURATION),
        }
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    fn save_users(&self, users: &HashMap<String, AuthUser>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(users)?;
        let tmp = path.with_extension("json.tmp");
        File::create(&tmp)?.write_all(json.as_bytes())?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl AuthProvider for LocalAuth {
    fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let user = {
            let users = self.users.read().map_err(poisoned)?;
            users
                .values()
                .find(|u| u.email.eq_ignore_ascii_case(email))
                .cloned()
        };

        let Some(user) = user else {
            return Err(Error::Auth("Invalid login credentials".to_owned()));
        };
        if !verify_password(password, &user.password_hash)? {
            return Err(Error::Auth("Invalid login credentials".to_owned()));
        }

        let session = Session {
            token: Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            email: user.email.clone(),
            expires_at: SystemTime::now() + self.session_ttl,
        };
        {
            let mut sessions = self.sessions.write().map_err(poisoned)?;
            let now = SystemTime::now();
            sessions.retain(|_, s| s.expires_at > now);
            sessions.insert(session.token.clone(), session.clone());
        }

        log::info!("User {} signed in", &user.email);
        self.publish(AuthEvent::SignedIn {
            token: session.token.clone(),
            user_id: user.id,
        });
        Ok(session)
    }

    fn sign_out(&self, token: &str) -> Result<()> {
        let removed = self.sessions.write().map_err(poisoned)?.remove(token);
        if let Some(session) = removed {
            log::info!("User {} signed out", &session.email);
            self.publish(AuthEvent::SignedOut { token: token.to_owned() });
        }
        Ok(())
    }

    fn session(&self, token: &str) -> Option<Session> {
        let now = SystemTime::now();
        let mut sessions = self.sessions.write().ok()?;
        match sessions.get(token) {
            Some(s) if s.expires_at > now => Some(s.clone()),
            Some(_) => {
                sessions.remove(token);
                None
            }
            None => None,
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: AuthEvent) {
        // No receivers is not an error.
        let _ = self.events.send(event);
    }

    fn create_user(&self, email: &str, password: &str, name: &str) -> Result<AuthUser> {
        if email.is_empty() || password.is_empty() {
            return Err(Error::Auth("Email and password cannot be empty".to_owned()));
        }

        let mut users = self.users.write().map_err(poisoned)?;
        if users.values().any(|u| u.email.eq_ignore_ascii_case(email)) {
            return Err(Error::Auth(
                "A user with this email address has already been registered".to_owned(),
            ));
        }

        let user = AuthUser {
            id: Uuid::new_v4().to_string(),
            email: email.to_owned(),
            password_hash: hash_password(password)?,
            name: name.to_owned(),
        };

        let mut next = users.clone();
        next.insert(user.id.clone(), user.clone());
        self.save_users(&next)?;
        *users = next;

        log::info!("Created auth user {} ({})", &user.email, &user.id);
        Ok(user)
    }

    fn delete_user(&self, user_id: &str) -> Result<()> {
        let mut users = self.users.write().map_err(poisoned)?;
        if !users.contains_key(user_id) {
            return Err(Error::Auth("User not found".to_owned()));
        }

        let mut next = users.clone();
        next.remove(user_id);
        self.save_users(&next)?;
        *users = next;
        drop(users);

        self.sessions
            .write()
            .map_err(poisoned)?
            .retain(|_, s| s.user_id != user_id);

        log::info!("Deleted auth user {}", user_id);
        self.publish(AuthEvent::UserDeleted { user_id: user_id.to_owned() });
        Ok(())
    }
}

/// Hash a password using Argon2id with a random salt.
fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    match argon2.hash_password(password.as_bytes(), &salt) {
        Ok(hash) => Ok(hash.to_string()),
        Err(_) => Err(Error::Auth("Password hashing failed".to_owned())),
    }
}

/// Checks a plaintext password against a stored Argon2 hash.
fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(hash) => hash,
        Err(_) => return Err(Error::Auth("Invalid password hash format".to_owned())),
    };

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(_) => Ok(true),
        Err(_) => Ok(false), // Password didn't match
    }
}
