use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::PalisadeError;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    pub server: Server,
    #[serde(default)]
    pub authz: Authz,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Authz {
    /// Directory of `.kdl` policy files. Unset means the built-in policy.
    #[serde(default)]
    pub policies_dir: Option<PathBuf>,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8181,
        }
    }
}

impl Settings {
    pub fn load(path: &str) -> Result<Self, PalisadeError> {
        let mut builder = config::Config::builder()
            .set_default("server.host", Server::default().host)?
            .set_default("server.port", Server::default().port)?;

        // Optional file
        if Path::new(path).exists() {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment overrides: PALISADE__SERVER__PORT=9090, etc.
        builder = builder.add_source(config::Environment::with_prefix("PALISADE").separator("__"));

        let cfg = builder.build()?;
        let mut s: Settings = cfg.try_deserialize()?;

        // Normalize policies dir to be relative to current dir
        if let Some(dir) = s.authz.policies_dir.as_mut() {
            if dir.is_relative() {
                *dir = std::env::current_dir()?.join(&*dir);
            }
        }

        Ok(s)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
