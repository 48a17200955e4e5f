/*!
# Fee Tracker

A fee-tracking administration console. Admin and Staff users manage schools,
courses, users, and student payment records through list pages with
add/edit/delete forms, and review payments on a filterable, paginated
dashboard with CSV and Excel downloads.

## Architecture

### Services
- **store**: `DataService`, table-scoped select/insert/update/delete over
  JSON rows. `LocalStore` keeps one JSON file per table (or runs in memory).
- **auth**: `AuthProvider`, sign-in, sessions, session-change notifications,
  and admin create/delete of users. `LocalAuth` stores argon2 hashes.

### Console
- **model** / **repo**: the four record types and typed, validated access
  to their tables
- **session**: `AuthState`, the per-client auth state holder
- **view**: `ListView`, load/save/delete of one table with notices
- **users**: two-step user administration across auth and profiles
- **dashboard**: payment filters, debounced search, superseded-result gate
- **table**: column specs and the fixed 10-row pager
- **export**: CSV and XLSX reports
- **seed**: demo data
- **app**: the axum router, cookie sessions and handlebars pages
- **config**: `feetrack.toml`

## Binaries

- `feetrack [config.toml]` serves the console
- `seed [config.toml]` fills the configured data directory with demo data
*/

pub mod auth;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod export;
pub mod model;
pub mod repo;
pub mod seed;
pub mod session;
pub mod store;
pub mod table;
pub mod users;
pub mod view;

#[cfg(feature = "web")]
pub mod app;

pub use error::{Error, Result};
