//! Server configuration read from the environment.

use anyhow::Context;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

const DEFAULT_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_ORIGINS: [&str; 2] = ["http://localhost:3000", "http://127.0.0.1:3000"];
const DEFAULT_NEXT_ROUND_DELAY_MS: u64 = 9_000;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    /// Browser origins allowed to open a socket
    pub allowed_origins: HashSet<String>,
    /// Pause between a gin and the next deal
    pub next_round_delay: Duration,
    /// Target used when `create_room` doesn't name one
    pub default_target_score: u32,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let addr = get("SERVER_ADDR")
            .unwrap_or_else(|| DEFAULT_ADDR.into())
            .parse()
            .context("SERVER_ADDR is not a socket address")?;

        // Comma-separated, e.g. ALLOWED_ORIGINS=http://localhost:3000,https://gin.example
        let allowed_origins = match get("ALLOWED_ORIGINS") {
            Some(raw) => parse_origins(&raw),
            None => default_origins(),
        };

        let next_round_delay = match get("NEXT_ROUND_DELAY_MS") {
            Some(raw) => Duration::from_millis(
                raw.trim()
                    .parse()
                    .context("NEXT_ROUND_DELAY_MS is not a number of milliseconds")?,
            ),
            None => Duration::from_millis(DEFAULT_NEXT_ROUND_DELAY_MS),
        };

        let default_target_score = match get("DEFAULT_TARGET_SCORE") {
            Some(raw) => raw
                .trim()
                .parse()
                .context("DEFAULT_TARGET_SCORE is not a positive integer")?,
            None => gin_core::DEFAULT_TARGET_SCORE,
        };
        if default_target_score == 0 {
            anyhow::bail!("DEFAULT_TARGET_SCORE must be at least 1");
        }

        Ok(Self {
            addr,
            allowed_origins,
            next_round_delay,
            default_target_score,
        })
    }

    /// Connections without an `Origin` header are not browsers and are let through.
    pub fn origin_allowed(&self, origin: Option<&str>) -> bool {
        origin.map_or(true, |o| self.allowed_origins.contains(o))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            allowed_origins: default_origins(),
            next_round_delay: Duration::from_millis(DEFAULT_NEXT_ROUND_DELAY_MS),
            default_target_score: gin_core::DEFAULT_TARGET_SCORE,
        }
    }
}

fn default_origins() -> HashSet<String> {
    DEFAULT_ORIGINS.iter().map(|s| s.to_string()).collect()
}

fn parse_origins(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "null")
        .map(str::to_string)
        .collect()
}
