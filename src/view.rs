/*!
Entity list views: load a table, save through a form, delete with
confirmation. Every outcome is reported as a [`Notice`]; nothing here fails
the caller.
*/
use serde::Serialize;

use crate::model::Record;
use crate::repo::Repo;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    #[default]
    Default,
    Destructive,
}

/// A user-visible notification ("toast").
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Notice {
    pub title: String,
    pub description: String,
    pub variant: Variant,
}

impl Notice {
    pub fn success(title: impl Into<String>, description: impl Into<String>) -> Self {
        Notice {
            title: title.into(),
            description: description.into(),
            variant: Variant::Default,
        }
    }

    pub fn failure(title: impl Into<String>, description: impl Into<String>) -> Self {
        Notice {
            title: title.into(),
            description: description.into(),
            variant: Variant::Destructive,
        }
    }
}

pub struct ListView<T: Record> {
    repo: Repo<T>,
    rows: Vec<T>,
    loading: bool,
    notices: Vec<Notice>,
}

impl<T: Record> ListView<T> {
    /// A view that has not fetched yet; it reports loading until the first
    /// [`load`](Self::load) resolves.
    pub fn new(repo: Repo<T>) -> Self {
        ListView {
            repo,
            rows: Vec::new(),
            loading: true,
            notices: Vec::new(),
        }
    }

    /// Fetches every row in display order. On failure the previous rows stay.
    pub fn load(&mut self) -> &[T] {
        self.loading = true;
        match self.repo.fetch_all() {
            Ok(rows) => self.rows = rows,
            Err(e) => {
                log::warn!("Fetching {} failed: {}", T::TABLE, &e);
                self.notices.push(Notice::failure(
                    format!("Error fetching {}", T::TABLE),
                    e.to_string(),
                ));
            }
        }
        self.loading = false;
        &self.rows
    }

    /// Updates when the record has an id, inserts under a new id otherwise,
    /// then re-fetches. Returns whether the write succeeded.
    pub fn save(&mut self, record: T) -> bool {
        let updating = record.id().is_some();
        let outcome = self.repo.save(record);
        let ok = match outcome {
            Ok(saved) => {
                let verb = if updating { "updated" } else { "created" };
                log::info!("{} {} {}", T::LABEL, saved.id().unwrap_or_default(), verb);
                self.notices.push(Notice::success(
                    format!("{} saved", T::LABEL),
                    format!("{} {} successfully.", T::LABEL, verb),
                ));
                true
            }
            Err(e) => {
                log::warn!("Saving {} failed: {}", T::LABEL, &e);
                self.notices.push(Notice::failure(format!("Error saving {}", T::LABEL), e.to_string()));
                false
            }
        };
        if ok {
            self.load();
        }
        ok
    }

    /// Deletes the row with `id` once the user has confirmed, then re-fetches.
    pub fn delete(&mut self, id: &str, confirmed: bool) -> bool {
        if !confirmed {
            log::debug!("Delete of {} {} not confirmed", T::LABEL, id);
            return false;
        }

        match self.repo.delete(id) {
            Ok(()) => {
                log::info!("{} {} deleted", T::LABEL, id);
                self.notices.push(Notice::success(
                    format!("{} deleted", T::LABEL),
                    format!("{} deleted successfully.", T::LABEL),
                ));
                self.load();
                true
            }
            Err(e) => {
                log::warn!("Deleting {} {} failed: {}", T::LABEL, id, &e);
                self.notices.push(Notice::failure(format!("Error deleting {}", T::LABEL), e.to_string()));
                false
            }
        }
    }

    pub fn rows(&self) -> &[T] {
        &self.rows
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }
}
