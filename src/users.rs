/*!
User administration.

A console user is two things: a credential in the auth service and a profile
row in the `users` table, keyed by the same id. Creating and deleting a user
touches both, and the two calls are not atomic:

* create: auth user first, then the profile. A failed profile insert deletes
  the auth user again.
* delete: profile first, then the auth user. If the second call fails the
  profile is gone but the credential remains; this is reported and logged,
  and has to be cleaned up by hand.
*/
use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use crate::auth::{AuthEvent, AuthProvider};
use crate::error::{Error, Result};
use crate::model::{Record, Role, User};
use crate::repo::Repo;
use crate::store::DataService;

const MIN_PASSWORD: usize = 6;

/// The add/edit user form.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct UserForm {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(default)]
    pub password: Option<String>,
}

impl UserForm {
    fn id(&self) -> Option<&str> {
        self.id.as_deref().filter(|s| !s.is_empty())
    }

    fn password(&self) -> Option<&str> {
        self.password.as_deref().filter(|s| !s.is_empty())
    }

    fn profile(&self, id: String) -> User {
        User {
            id,
            name: self.name.trim().to_owned(),
            email: self.email.trim().to_owned(),
            role: self.role,
        }
    }

    fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        if let Err(Error::Validation(msg)) = self.profile(String::new()).validate() {
            errors.push(msg);
        }
        if let Some(p) = self.password() {
            if p.chars().count() < MIN_PASSWORD {
                errors.push("Password must be at least 6 characters.".to_owned());
            }
        }
        if errors.is_empty() { Ok(()) } else { Err(Error::validation(errors)) }
    }
}

pub struct UserAdmin {
    auth: Arc<dyn AuthProvider>,
    profiles: Repo<User>,
}

impl UserAdmin {
    pub fn new(auth: Arc<dyn AuthProvider>, data: Arc<dyn DataService>) -> Self {
        UserAdmin {
            auth,
            profiles: Repo::new(data),
        }
    }

    pub fn list(&self) -> Result<Vec<User>> {
        self.profiles.fetch_all()
    }

    /// Saves the form: update when it carries an id, add otherwise.
    pub fn save(&self, form: &UserForm) -> Result<User> {
        if form.id().is_some() {
            self.update_user(form)
        } else {
            self.add_user(form)
        }
    }

    pub fn add_user(&self, form: &UserForm) -> Result<User> {
        form.validate()?;
        let Some(password) = form.password() else {
            return Err(Error::Validation("Password is required for new users.".to_owned()));
        };

        let created = self
            .auth
            .create_user(form.email.trim(), password, form.name.trim())
            .map_err(|e| Error::Auth(format!("Failed to create auth user: {}", e)))?;

        let inserted = self
            .profiles
            .insert(vec![form.profile(created.id.clone())])
            .and_then(|rows| {
                rows.into_iter()
                    .next()
                    .ok_or_else(|| Error::Storage("no profile row returned".to_owned()))
            });

        match inserted {
            Ok(user) => {
                log::info!("Added user {} ({})", &created.email, &created.id);
                Ok(user)
            }
            Err(e) => {
                log::warn!("Profile insert for {} failed, removing auth user: {}", &created.id, &e);
                if let Err(undo) = self.auth.delete_user(&created.id) {
                    log::error!(
                        "Auth user {} ({}) left without a profile: {}",
                        &created.email, &created.id, &undo
                    );
                }
                Err(Error::Storage(format!("Failed to create user profile: {}", e)))
            }
        }
    }

    /// Changes name and role only; email and password stay as they are.
    pub fn update_user(&self, form: &UserForm) -> Result<User> {
        form.validate()?;
        let Some(id) = form.id() else {
            return Err(Error::Validation("User ID is missing.".to_owned()));
        };

        let user = self
            .profiles
            .patch(id, json!({ "name": form.name.trim(), "role": form.role }))
            .map_err(|e| Error::Storage(format!("Failed to update user: {}", e)))?;

        self.auth.publish(AuthEvent::ProfileChanged { user_id: id.to_owned() });
        log::info!("Updated user {}", id);
        Ok(user)
    }

    pub fn delete_user(&self, user_id: &str) -> Result<()> {
        if user_id.is_empty() {
            return Err(Error::Validation("User ID is missing.".to_owned()));
        }

        self.profiles
            .delete(user_id)
            .map_err(|e| Error::Storage(format!("Could not delete user profile: {}", e)))?;

        if let Err(e) = self.auth.delete_user(user_id) {
            log::error!(
                "Profile {} deleted but its auth user remains; needs manual cleanup: {}",
                user_id, &e
            );
            return Err(Error::Auth(format!(
                "Profile deleted, but failed to delete auth user: {}",
                e
            )));
        }

        log::info!("Deleted user {} from auth and profiles", user_id);
        Ok(())
    }
}
