/*!
Server configuration: a TOML file whose every field is optional, laid over
built-in defaults.

```toml
data_dir = "data"
host = "127.0.0.1"
port = 3000
static_dir = "static"
session_hours = 24
search_debounce_ms = 500
```
*/
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

pub const DEFAULT_CONFIG_FILE: &str = "feetrack.toml";

#[derive(Deserialize)]
struct ConfigFile {
    data_dir: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
    static_dir: Option<PathBuf>,
    session_hours: Option<u64>,
    search_debounce_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Cfg {
    pub data_dir: PathBuf,
    pub addr: SocketAddr,
    pub static_dir: PathBuf,
    pub session_ttl: Duration,
    pub search_debounce: Duration,
}

impl std::default::Default for Cfg {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            static_dir: PathBuf::from("static"),
            session_ttl: Duration::from_secs(24 * 60 * 60),
            search_debounce: crate::dashboard::SEARCH_DEBOUNCE,
        }
    }
}

impl Cfg {
    pub fn from_toml(contents: &str) -> Result<Self> {
        let cf: ConfigFile = toml::from_str(contents)
            .map_err(|e| Error::Validation(format!("Unable to deserialize config file: {}", &e)))?;

        let mut c = Self::default();

        if let Some(p) = cf.data_dir {
            c.data_dir = p;
        }
        if let Some(s) = cf.host {
            c.addr.set_ip(s.parse().map_err(|e| {
                Error::Validation(format!("Error parsing {:?} as IP address: {}", &s, &e))
            })?);
        }
        if let Some(n) = cf.port {
            c.addr.set_port(n);
        }
        if let Some(p) = cf.static_dir {
            c.static_dir = p;
        }
        if let Some(h) = cf.session_hours {
            c.session_ttl = Duration::from_secs(h * 60 * 60);
        }
        if let Some(ms) = cf.search_debounce_ms {
            c.search_debounce = Duration::from_millis(ms);
        }

        Ok(c)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file_contents = std::fs::read_to_string(path)?;
        Self::from_toml(&file_contents)
    }

    /// Reads the file at `path` when given, else `feetrack.toml` if present,
    /// else the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::from_file(DEFAULT_CONFIG_FILE),
            None => Ok(Self::default()),
        }
    }
}
