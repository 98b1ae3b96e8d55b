//! # Access Control
//!
//! Bearer-token authentication for `/api/*` and `/v1/*`. Keys come from the
//! `[auth]` section of the config file and are held only as SHA-256 hashes.
//! With no keys configured, authentication is off.

use axum::http::Method;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Permission scopes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Read,
    Write,
    Admin,
}

/// `[auth]` config section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// Tokens granted every scope.
    #[serde(default)]
    pub tokens: Vec<String>,
    /// Tokens with an explicit scope list.
    #[serde(default)]
    pub keys: Vec<KeyConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeyConfig {
    #[serde(default)]
    pub label: String,
    pub token: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<Scope>,
}

fn default_scopes() -> Vec<Scope> {
    vec![Scope::Read]
}

#[derive(Debug, Clone)]
pub struct ApiKey {
    pub label: String,
    key_hash: String,
    pub scopes: Vec<Scope>,
}

pub struct AuthLayer {
    keys: Vec<ApiKey>,
}

impl AuthLayer {
    pub fn from_config(config: &AuthConfig) -> Self {
        let unrestricted = config.tokens.iter().enumerate().map(|(i, token)| ApiKey {
            label: format!("token-{}", i + 1),
            key_hash: sha256_hex(token),
            scopes: vec![Scope::Admin],
        });
        let scoped = config.keys.iter().map(|k| ApiKey {
            label: k.label.clone(),
            key_hash: sha256_hex(&k.token),
            scopes: k.scopes.clone(),
        });
        Self {
            keys: unrestricted.chain(scoped).collect(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.keys.is_empty()
    }

    /// Validate a bearer token. Returns the matching key.
    pub fn validate_token(&self, token: &str) -> Option<&ApiKey> {
        let hash = sha256_hex(token);
        self.keys.iter().find(|k| constant_time_eq(&k.key_hash, &hash))
    }

    pub fn has_scope(&self, key: &ApiKey, required: Scope) -> bool {
        if key.scopes.contains(&Scope::Admin) {
            return true;
        }
        key.scopes.contains(&required)
    }
}

/// Scope a request needs, or `None` for routes outside the API.
pub fn required_scope(path: &str, method: &Method) -> Option<Scope> {
    if !path.starts_with("/api") && !path.starts_with("/v1") {
        return None;
    }
    if path.starts_with("/api/maintenance") && *method == Method::GET {
        return Some(Scope::Read);
    }
    if path.starts_with("/api/maintenance")
        || path.starts_with("/api/logs/vacuum")
        || *method == Method::DELETE
    {
        return Some(Scope::Admin);
    }
    match *method {
        Method::GET | Method::HEAD => Some(Scope::Read),
        _ => Some(Scope::Write),
    }
}

fn sha256_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    format!("{:x}", digest)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        diff |= x ^ y;
    }
    diff == 0
}
