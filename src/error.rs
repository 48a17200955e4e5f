use thiserror::Error;

/// Errors raised by the data service, the auth service and the console
/// operations built on top of them.
///
/// The `Display` text is what ends up in user-visible notices, so variants
/// carry the backend's own message rather than a generic label.
#[derive(Debug, Error)]
pub enum Error {
    #[error("no row with id {id:?} in table {table}")]
    NotFound { table: &'static str, id: String },

    #[error("duplicate key {id:?} in table {table}")]
    Duplicate { table: &'static str, id: String },

    /// One or more form fields failed validation; messages are already
    /// joined for display.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Auth(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "web")]
    #[error(transparent)]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[cfg(feature = "web")]
    #[error("template error: {0}")]
    Template(#[from] handlebars::TemplateError),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn validation(messages: Vec<String>) -> Self {
        Error::Validation(messages.join(", "))
    }
}
