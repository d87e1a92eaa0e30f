//! Relay configuration: CLI flags over environment over TOML file over
//! defaults.

use std::env;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::framer::FrameLimits;
use crate::token::TokenStore;

pub const DEFAULT_PORT: u16 = 8889;
pub const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub host: IpAddr,
    pub port: u16,
    pub token_path: PathBuf,
    pub limits: FrameLimits,
}

impl RelayConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub token_path: Option<PathBuf>,
}

impl ConfigOverrides {
    /// `DANDY_HOST`, `DANDY_PORT`, `DANDY_TOKEN_PATH`. Unparseable ports
    /// are ignored with a warning.
    pub fn from_env() -> Self {
        let port = env::var("DANDY_PORT").ok().and_then(|raw| {
            let trimmed = raw.trim();
            match trimmed.parse::<u16>() {
                Ok(port) => Some(port),
                Err(err) => {
                    tracing::warn!("Invalid DANDY_PORT value '{}': {}", raw, err);
                    None
                }
            }
        });

        Self {
            host: non_empty_var("DANDY_HOST"),
            port,
            token_path: non_empty_var("DANDY_TOKEN_PATH").map(PathBuf::from),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub token_path: Option<PathBuf>,
    pub max_header_bytes: Option<usize>,
    pub max_body_bytes: Option<usize>,
}

#[derive(Deserialize)]
struct RootConfig {
    #[serde(default)]
    server: Option<RawServerConfig>,
}

#[derive(Deserialize, Default)]
struct RawServerConfig {
    host: Option<String>,
    port: Option<u16>,
    token_path: Option<String>,
    max_header_bytes: Option<usize>,
    max_body_bytes: Option<usize>,
}

impl RawServerConfig {
    fn into_file_config(self, base: &Path) -> FileConfig {
        FileConfig {
            host: self.host,
            port: self.port,
            token_path: self
                .token_path
                .map(|value| resolve_relative(base, Path::new(&value))),
            max_header_bytes: self.max_header_bytes,
            max_body_bytes: self.max_body_bytes,
        }
    }
}

/// Read the `[server]` table. A missing file is not an error.
pub fn load_file_config(path: Option<&Path>) -> Result<Option<FileConfig>> {
    let Some(path) = path else {
        return Ok(None);
    };

    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read relay config from {}", path.display()))?;
    let parsed: RootConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse TOML config {}", path.display()))?;

    Ok(parsed
        .server
        .map(|raw| raw.into_file_config(path.parent().unwrap_or(Path::new(".")))))
}

/// Merge every layer. The host must be a loopback address.
pub fn resolve_config(
    cli: &ConfigOverrides,
    env: &ConfigOverrides,
    file: Option<&FileConfig>,
) -> Result<RelayConfig> {
    let host = match cli
        .host
        .as_deref()
        .or(env.host.as_deref())
        .or_else(|| file.and_then(|cfg| cfg.host.as_deref()))
    {
        Some(raw) => parse_loopback_host(raw)?,
        None => DEFAULT_HOST,
    };

    let port = cli
        .port
        .or(env.port)
        .or_else(|| file.and_then(|cfg| cfg.port))
        .unwrap_or(DEFAULT_PORT);

    let token_path = match cli
        .token_path
        .clone()
        .or_else(|| env.token_path.clone())
        .or_else(|| file.and_then(|cfg| cfg.token_path.clone()))
    {
        Some(path) => path,
        None => TokenStore::default_path()?,
    };

    let defaults = FrameLimits::default();
    let limits = FrameLimits {
        max_header_bytes: file
            .and_then(|cfg| cfg.max_header_bytes)
            .unwrap_or(defaults.max_header_bytes),
        max_body_bytes: file
            .and_then(|cfg| cfg.max_body_bytes)
            .unwrap_or(defaults.max_body_bytes),
    };
    if limits.max_header_bytes == 0 || limits.max_body_bytes == 0 {
        return Err(anyhow!("max_header_bytes and max_body_bytes must be positive"));
    }

    Ok(RelayConfig {
        host,
        port,
        token_path,
        limits,
    })
}

fn parse_loopback_host(raw: &str) -> Result<IpAddr> {
    let trimmed = raw.trim();
    let host = if trimmed.eq_ignore_ascii_case("localhost") {
        DEFAULT_HOST
    } else {
        trimmed
            .parse::<IpAddr>()
            .with_context(|| format!("Invalid bind host '{}'", raw))?
    };

    if !host.is_loopback() {
        return Err(anyhow!(
            "Refusing to bind {}: the relay only accepts local clients",
            host
        ));
    }
    Ok(host)
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn resolve_relative(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
