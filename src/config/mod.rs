use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::date_util::now_millis;
use crate::error::{Error, Result};

const CREDENTIALS_FILE: &str = "ml_credentials.json";
const TOKENS_FILE: &str = "ml_tokens.json";

/// Tokens are considered expired this long before the server says so.
pub const EXPIRY_MARGIN_SECS: i64 = 300;

/// Locations of the two JSON documents the tool reads and writes.
#[derive(Debug, Clone)]
pub struct Settings {
    pub config_dir: PathBuf,
}

impl Settings {
    /// Settings rooted at the default directory (`~/.melimedia`).
    pub fn default_location() -> Result<Self> {
        let dir = dirs::home_dir()
            .ok_or_else(|| Error::Config("cannot determine home directory".into()))?
            .join(".melimedia");
        Ok(Self { config_dir: dir })
    }

    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: dir.into(),
        }
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.config_dir.join(CREDENTIALS_FILE)
    }

    pub fn tokens_path(&self) -> PathBuf {
        self.config_dir.join(TOKENS_FILE)
    }

    pub fn token_store(&self) -> TokenStore {
        TokenStore::new(self.tokens_path())
    }

    /// Load the operator-provided application credentials.
    pub fn load_credentials(&self) -> Result<Credentials> {
        let path = self.credentials_path();
        let raw = std::fs::read_to_string(&path).map_err(|e| {
            Error::Config(format!("cannot read credentials at {}: {e}", path.display()))
        })?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Application credentials registered with MercadoLibre.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    #[serde(alias = "client_id")]
    pub client_id: String,
    #[serde(alias = "client_secret")]
    pub client_secret: String,
    #[serde(alias = "redirect_uri")]
    pub redirect_uri: String,
}

/// OAuth token pair plus the moment it was issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenState {
    pub access_token: String,
    pub refresh_token: String,
    /// Epoch milliseconds at which the access token was issued.
    #[serde(alias = "issuedAt", default)]
    pub issued_at: i64,
    /// Lifetime in seconds as reported by the identity provider.
    #[serde(alias = "expiresIn")]
    pub expires_in: i64,
}

impl TokenState {
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_millis())
    }

    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        let lifetime_ms = (self.expires_in - EXPIRY_MARGIN_SECS).max(0) * 1000;
        now_ms >= self.issued_at + lifetime_ms
    }
}

/// Durable storage for the token state.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `Ok(None)` when no token has been stored yet.
    pub fn load(&self) -> Result<Option<TokenState>> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write to a sibling temp file and rename it over the target.
    pub fn save(&self, state: &TokenState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(state)?)?;
        std::fs::rename(&tmp, &self.path)?;
        log::debug!("Tokens saved to {}", self.path.display());
        Ok(())
    }
}

/// Endpoints and transport timeouts.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub api_base: String,
    pub auth_base: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.mercadolibre.com".to_string(),
            auth_base: "https://auth.mercadolibre.com.ar".to_string(),
            timeout: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl ApiConfig {
    /// Config pointing both bases at one server (used with mock servers).
    pub fn with_base(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            api_base: base.clone(),
            auth_base: base,
            ..Default::default()
        }
    }

    pub fn token_url(&self) -> String {
        format!("{}/oauth/token", self.api_base)
    }

    pub fn build_http_client(&self) -> Result<reqwest::Client> {
        Ok(reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout)
            .build()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(issued_at: i64, expires_in: i64) -> TokenState {
        TokenState {
            access_token: "APP_USR-a".to_string(),
            refresh_token: "TG-r".to_string(),
            issued_at,
            expires_in,
        }
    }

    #[test]
    fn test_token_not_expired_within_lifetime() {
        let t = state(1_000_000, 21_600);
        assert!(!t.is_expired_at(1_000_000 + 60_000));
    }

    #[test]
    fn test_token_expired_inside_margin() {
        let t = state(1_000_000, 21_600);
        // 5 minutes before the nominal expiry counts as expired
        let nominal = 1_000_000 + 21_600 * 1000;
        assert!(t.is_expired_at(nominal - 299_000));
        assert!(!t.is_expired_at(nominal - 301_000));
    }

    #[test]
    fn test_token_with_short_lifetime_is_expired() {
        let t = state(1_000_000, 10);
        assert!(t.is_expired_at(1_000_000));
    }

    #[test]
    fn test_token_state_accepts_camel_case_issued_at() {
        let raw = r#"{"access_token":"a","refresh_token":"r","issuedAt":5,"expires_in":21600}"#;
        let t: TokenState = serde_json::from_str(raw).unwrap();
        assert_eq!(t.issued_at, 5);
        assert_eq!(t.expires_in, 21600);
    }

    #[test]
    fn test_credentials_accept_both_casings() {
        let camel = r#"{"clientId":"1","clientSecret":"s","redirectUri":"https://x"}"#;
        let snake = r#"{"client_id":"1","client_secret":"s","redirect_uri":"https://x"}"#;
        let a: Credentials = serde_json::from_str(camel).unwrap();
        let b: Credentials = serde_json::from_str(snake).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_token_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("nested").join("tokens.json"));
        assert!(store.load().unwrap().is_none());

        let t = state(42, 21_600);
        store.save(&t).unwrap();
        assert_eq!(store.load().unwrap(), Some(t));
        assert!(!dir.path().join("nested").join("tokens.json.tmp").exists());
    }

    #[test]
    fn test_settings_paths() {
        let s = Settings::at("/tmp/mm");
        assert!(s.credentials_path().ends_with("ml_credentials.json"));
        assert!(s.tokens_path().ends_with("ml_tokens.json"));
    }

    #[test]
    fn test_load_credentials_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let s = Settings::at(dir.path());
        assert!(matches!(s.load_credentials(), Err(Error::Config(_))));
    }

    #[test]
    fn test_api_config_token_url() {
        let c = ApiConfig::with_base("http://127.0.0.1:9");
        assert_eq!(c.token_url(), "http://127.0.0.1:9/oauth/token");
        assert_eq!(c.auth_base, "http://127.0.0.1:9");
    }
}
