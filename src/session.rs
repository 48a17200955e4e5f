/*!
The auth state holder.

An [`AuthState`] tracks one console client's session, the profile resolved
for it, and the derived role. It is an ordinary value owned by whoever
needs it (the HTTP layer keeps one per browser session), not a global.
*/
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::auth::{AuthEvent, AuthProvider, Session};
use crate::model::{Role, User};
use crate::repo::Repo;
use crate::store::DataService;

#[derive(Default)]
struct Inner {
    session: Option<Session>,
    user: Option<User>,
    events: Option<broadcast::Receiver<AuthEvent>>,
}

pub struct AuthState {
    auth: Arc<dyn AuthProvider>,
    profiles: Repo<User>,
    inner: Mutex<Inner>,
    loading: AtomicBool,
}

/// Holds the loading flag up for as long as it lives.
struct Loading<'a>(&'a AtomicBool);

impl<'a> Loading<'a> {
    fn start(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Loading(flag)
    }
}

impl Drop for Loading<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl AuthState {
    pub fn new(auth: Arc<dyn AuthProvider>, data: Arc<dyn DataService>) -> Self {
        AuthState {
            auth,
            profiles: Repo::new(data),
            inner: Mutex::new(Inner::default()),
            loading: AtomicBool::new(false),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        // State is a plain cache; a panic mid-update leaves nothing torn.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Signs in and resolves the profile. Any failure yields `false`.
    pub fn authenticate(&self, email: &str, password: &str) -> bool {
        let _loading = Loading::start(&self.loading);

        let events = self.auth.subscribe();
        let session = match self.auth.sign_in(email, password) {
            Ok(s) => s,
            Err(e) => {
                log::warn!("Login failed: {}", &e);
                return false;
            }
        };

        let Some(user) = self.resolve(&session) else {
            let _ = self.auth.sign_out(&session.token);
            return false;
        };
        let mut inner = self.inner();
        inner.events = Some(events);
        inner.session = Some(session);
        inner.user = Some(user);
        true
    }

    pub fn deauthenticate(&self) {
        let _loading = Loading::start(&self.loading);

        let token = self.inner().session.as_ref().map(|s| s.token.clone());
        if let Some(token) = token {
            if let Err(e) = self.auth.sign_out(&token) {
                log::warn!("Sign-out failed: {}", &e);
            }
        }
        *self.inner() = Inner::default();
    }

    /// Looks up the profile row whose id is the session subject. A missing
    /// row yields a Staff user named after the session email; a failed
    /// lookup yields no user at all.
    fn resolve(&self, session: &Session) -> Option<User> {
        match self.profiles.find(&session.user_id) {
            Ok(Some(profile)) => Some(User {
                id: session.user_id.clone(),
                name: if profile.name.is_empty() { session.email.clone() } else { profile.name },
                email: session.email.clone(),
                role: profile.role,
            }),
            Ok(None) => Some(User {
                id: session.user_id.clone(),
                name: session.email.clone(),
                email: session.email.clone(),
                role: Role::Staff,
            }),
            Err(e) => {
                log::warn!("Profile lookup for {} failed: {}", &session.user_id, &e);
                None
            }
        }
    }

    /// Applies every session-change notification received since the last
    /// call.
    pub fn sync(&self) {
        let mut pending = Vec::new();
        {
            let mut guard = self.inner();
            let inner = &mut *guard;
            let Some(rx) = inner.events.as_mut() else {
                return;
            };
            loop {
                match rx.try_recv() {
                    Ok(event) => pending.push(event),
                    Err(TryRecvError::Lagged(n)) => {
                        log::debug!("Auth state lagged {} events; refreshing", n);
                        pending.push(AuthEvent::ProfileChanged {
                            user_id: inner.session.as_ref().map(|s| s.user_id.clone()).unwrap_or_default(),
                        });
                    }
                    Err(TryRecvError::Empty | TryRecvError::Closed) => break,
                }
            }
        }

        for event in pending {
            self.on_event(&event);
        }
    }

    fn on_event(&self, event: &AuthEvent) {
        let Some(session) = self.inner().session.clone() else {
            return;
        };

        match event {
            AuthEvent::SignedOut { token } if *token == session.token => {
                log::debug!("Session for {} ended", &session.email);
                *self.inner() = Inner::default();
            }
            AuthEvent::UserDeleted { user_id } if *user_id == session.user_id => {
                log::debug!("User {} was deleted", &session.email);
                *self.inner() = Inner::default();
            }
            AuthEvent::ProfileChanged { user_id } if *user_id == session.user_id => {
                self.refresh();
            }
            _ => {}
        }
    }

    /// Re-derives the user from the current session. An expired or unknown
    /// session, or a failed profile lookup, leaves the state unauthenticated.
    pub fn refresh(&self) {
        let Some(token) = self.inner().session.as_ref().map(|s| s.token.clone()) else {
            return;
        };

        let _loading = Loading::start(&self.loading);
        let user = match self.auth.session(&token) {
            Some(session) => self.resolve(&session),
            None => None,
        };

        let mut inner = self.inner();
        if user.is_none() {
            *inner = Inner::default();
        } else {
            inner.user = user;
        }
    }

    pub fn user(&self) -> Option<User> {
        self.inner().user.clone()
    }

    pub fn role(&self) -> Option<Role> {
        self.inner().user.as_ref().map(|u| u.role)
    }

    pub fn token(&self) -> Option<String> {
        self.inner().session.as_ref().map(|s| s.token.clone())
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }
}
