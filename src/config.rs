//! Server configuration: CLI flags override environment variables, which override
//! defaults.
//!
//! | flag            | env                   | default                     |
//! |-----------------|-----------------------|-----------------------------|
//! | `--http-port N` | `CREWDESK_HTTP_PORT`  | 9000                        |
//! | `--jwt-secret S`| `CREWDESK_JWT_SECRET` | development secret (warns)  |
//! | `--token-ttl D` | `CREWDESK_TOKEN_TTL`  | `7d`                        |
//! | `--data-file P` | `CREWDESK_DATA_FILE`  | none (memory only)          |

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::identity::DEFAULT_TOKEN_TTL;

pub const DEFAULT_HTTP_PORT: u16 = 9000;
pub const DEV_JWT_SECRET: &str = "please-change-this-in-prod";
/// Longest accepted token lifetime (100 years); keeps `iat + ttl` well inside the
/// token's i64 seconds range.
pub const MAX_TOKEN_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub http_port: u16,
    pub jwt_secret: String,
    pub token_ttl: Duration,
    /// JSON snapshot backing the document store; `None` keeps everything in memory.
    pub data_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            jwt_secret: DEV_JWT_SECRET.to_string(),
            token_ttl: DEFAULT_TOKEN_TTL,
            data_file: None,
        }
    }
}

/// Parse `7d`, `12h`, `30m`, `45s` or a bare number of seconds.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() { return Err(anyhow!("empty duration")); }
    let (num, unit) = match s.char_indices().last() {
        Some((i, c)) if c.is_ascii_alphabetic() => (&s[..i], c.to_ascii_lowercase()),
        _ => (s, 's'),
    };
    let n: u64 = num.trim().parse().map_err(|_| anyhow!("invalid duration '{}'", s))?;
    let scale: u64 = match unit {
        's' => 1,
        'm' => 60,
        'h' => 60 * 60,
        'd' => 24 * 60 * 60,
        other => return Err(anyhow!("unknown duration unit '{}' in '{}'", other, s)),
    };
    let secs = n.checked_mul(scale).ok_or_else(|| anyhow!("duration out of range: '{}'", s))?;
    if secs == 0 { return Err(anyhow!("duration must be positive: '{}'", s)); }
    Ok(Duration::from_secs(secs))
}

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
        i += 1;
    }
    None
}

pub fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

impl ServerConfig {
    /// Resolve from the process arguments and environment.
    pub fn load() -> Result<Self> {
        let args: Vec<String> = std::env::args().collect();
        let env: HashMap<String, String> = std::env::vars().collect();
        Self::from_sources(&args, &env)
    }

    pub fn from_sources(args: &[String], env: &HashMap<String, String>) -> Result<Self> {
        let mut cfg = Self::default();
        let pick = |flag: &str, var: &str| arg_value(args, flag).or_else(|| env.get(var).cloned());

        if let Some(p) = pick("--http-port", "CREWDESK_HTTP_PORT") {
            cfg.http_port = p.trim().parse::<u16>().map_err(|_| anyhow!("invalid http port '{}'", p))?;
        }
        if let Some(s) = pick("--jwt-secret", "CREWDESK_JWT_SECRET") {
            if s.is_empty() { return Err(anyhow!("jwt secret must not be empty")); }
            cfg.jwt_secret = s;
        }
        if let Some(t) = pick("--token-ttl", "CREWDESK_TOKEN_TTL") {
            let ttl = parse_duration(&t)?;
            if ttl > MAX_TOKEN_TTL {
                return Err(anyhow!("token ttl '{}' exceeds the {}-day maximum", t, MAX_TOKEN_TTL.as_secs() / 86_400));
            }
            cfg.token_ttl = ttl;
        }
        if let Some(f) = pick("--data-file", "CREWDESK_DATA_FILE") {
            if !f.trim().is_empty() { cfg.data_file = Some(PathBuf::from(f.trim())); }
        }
        Ok(cfg)
    }

    pub fn uses_dev_secret(&self) -> bool { self.jwt_secret == DEV_JWT_SECRET }
}
