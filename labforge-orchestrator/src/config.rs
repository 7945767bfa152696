use std::collections::HashMap;
use std::str::FromStr;

use anyhow::{Context, Result};

pub const DEFAULT_HTTP_PORT: u16 = 8001;
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => anyhow::bail!("LABFORGE_STORE must be 'postgres' or 'memory' (got '{}')", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub store: StoreBackend,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub http_port: u16,
    pub db_max_connections: u32,
}

impl OrchestratorConfig {
    /// Read `.env` (if present) then the process environment.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_vars(std::env::vars().collect())
    }

    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| {
            vars.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let store = match get("LABFORGE_STORE") {
            Some(v) => v.parse()?,
            None => StoreBackend::Postgres,
        };
        let database_url = get("DATABASE_URL");
        if store == StoreBackend::Postgres && database_url.is_none() {
            anyhow::bail!("DATABASE_URL must be set (or LABFORGE_STORE=memory)");
        }

        let http_port = match get("ORCHESTRATOR_HTTP_PORT") {
            Some(v) => v.parse().context("ORCHESTRATOR_HTTP_PORT must be a port number")?,
            None => DEFAULT_HTTP_PORT,
        };
        let db_max_connections = match get("DB_MAX_CONNECTIONS") {
            Some(v) => v.parse().context("DB_MAX_CONNECTIONS must be a positive integer")?,
            None => DEFAULT_DB_MAX_CONNECTIONS,
        };

        Ok(Self {
            store,
            database_url,
            redis_url: get("REDIS_URL"),
            http_port,
            db_max_connections,
        })
    }
}
