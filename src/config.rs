//! Credential configuration
//!
//! The config file carries a single `[alexa]` section with the OAuth
//! client identity and token state. It is rewritten whenever a token is
//! acquired or refreshed, so the refresh token and expiry survive
//! restarts.

use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::avs::auth::TokenGrant;

/// Safety margin before the advertised expiry at which the token is
/// already treated as stale.
const TOKEN_SAFETY_MARGIN_SECS: u64 = 120;

/// The `[alexa]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub access_token: String,
    /// Epoch seconds at which the access token was issued.
    pub created_time: u64,
    /// Advertised lifetime of the access token in seconds.
    pub expired_in: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct ConfigFile {
    alexa: Credentials,
}

impl Credentials {
    /// Is the access token still usable at `now`?
    ///
    /// Monotone in `now`: once this turns false it stays false until a
    /// refresh updates the token state.
    pub fn token_is_live(&self, now: u64) -> bool {
        !self.access_token.is_empty()
            && now < (self.created_time + self.expired_in).saturating_sub(TOKEN_SAFETY_MARGIN_SECS)
    }

    /// Fold a token grant into the credential state.
    pub fn apply_grant(&mut self, grant: &TokenGrant, now: u64) {
        self.access_token = grant.access_token.clone();
        if let Some(refresh) = &grant.refresh_token {
            self.refresh_token = refresh.clone();
        }
        self.created_time = now;
        self.expired_in = grant.expires_in;
    }
}

/// Current time in epoch seconds.
pub fn now_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Load credentials from the config file.
pub fn load(path: &Path) -> anyhow::Result<Credentials> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("cannot read config file {}", path.display()))?;
    let file: ConfigFile = toml::from_str(&contents)
        .with_context(|| format!("cannot parse config file {}", path.display()))?;
    Ok(file.alexa)
}

/// Rewrite the config file with the current credential state.
pub fn save(path: &Path, creds: &Credentials) -> anyhow::Result<()> {
    let file = ConfigFile {
        alexa: creds.clone(),
    };
    let contents = toml::to_string_pretty(&file).context("cannot serialise config")?;
    fs::write(path, contents)
        .with_context(|| format!("cannot write config file {}", path.display()))?;
    tracing::debug!("Config rewritten: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(created_time: u64, expired_in: u64) -> Credentials {
        Credentials {
            access_token: "Atza|token".to_string(),
            created_time,
            expired_in,
            ..Default::default()
        }
    }

    #[test]
    fn test_token_liveness_window() {
        let c = creds(1000, 3600);
        // Edge is created_time + expired_in - 120 = 4480.
        assert!(c.token_is_live(1000));
        assert!(c.token_is_live(4479));
        assert!(!c.token_is_live(4480));
        assert!(!c.token_is_live(4600));
    }

    #[test]
    fn test_token_liveness_is_monotone() {
        let c = creds(1000, 3600);
        let mut was_dead = false;
        for now in (0..6000).step_by(7) {
            let live = c.token_is_live(now);
            if was_dead {
                assert!(!live, "token came back to life at now={}", now);
            }
            was_dead = was_dead || !live;
        }
        assert!(was_dead);
    }

    #[test]
    fn test_empty_token_is_never_live() {
        let mut c = creds(1000, 3600);
        c.access_token.clear();
        assert!(!c.token_is_live(1000));
    }

    #[test]
    fn test_zeroed_state_is_never_live() {
        let c = creds(0, 0);
        assert!(!c.token_is_live(0));
    }

    #[test]
    fn test_refresh_revives_token() {
        // Refresh at now=4600 with a new hour-long grant.
        let mut c = creds(1000, 3600);
        assert!(!c.token_is_live(4600));

        let grant = TokenGrant {
            access_token: "Atza|fresh".to_string(),
            refresh_token: None,
            expires_in: 3600,
        };
        c.apply_grant(&grant, 4600);

        assert_eq!(c.created_time, 4600);
        assert_eq!(c.expired_in, 3600);
        assert_eq!(c.access_token, "Atza|fresh");
        assert!(c.token_is_live(4600));
        assert!(!c.token_is_live(4600 + 3600 - 120));
    }

    #[test]
    fn test_grant_keeps_refresh_token_when_absent() {
        let mut c = Credentials {
            refresh_token: "Atzr|keep".to_string(),
            ..Default::default()
        };
        let grant = TokenGrant {
            access_token: "Atza|x".to_string(),
            refresh_token: None,
            expires_in: 900,
        };
        c.apply_grant(&grant, 100);
        assert_eq!(c.refresh_token, "Atzr|keep");

        let grant = TokenGrant {
            access_token: "Atza|y".to_string(),
            refresh_token: Some("Atzr|new".to_string()),
            expires_in: 900,
        };
        c.apply_grant(&grant, 200);
        assert_eq!(c.refresh_token, "Atzr|new");
    }

    #[test]
    fn test_save_load_roundtrip() {
        let file = tempfile::NamedTempFile::with_suffix(".conf").unwrap();
        let c = Credentials {
            client_id: "amzn1.application-oa2-client.abc".to_string(),
            client_secret: "s3cret".to_string(),
            refresh_token: "Atzr|r".to_string(),
            access_token: "Atza|a".to_string(),
            created_time: 1_700_000_000,
            expired_in: 3600,
        };

        save(file.path(), &c).unwrap();
        let loaded = load(file.path()).unwrap();

        assert_eq!(loaded.client_id, c.client_id);
        assert_eq!(loaded.client_secret, c.client_secret);
        assert_eq!(loaded.refresh_token, c.refresh_token);
        assert_eq!(loaded.access_token, c.access_token);
        assert_eq!(loaded.created_time, c.created_time);
        assert_eq!(loaded.expired_in, c.expired_in);
    }

    #[test]
    fn test_load_partial_section_uses_defaults() {
        let file = tempfile::NamedTempFile::with_suffix(".conf").unwrap();
        fs::write(
            file.path(),
            "[alexa]\nclient_id = \"abc\"\nclient_secret = \"def\"\n",
        )
        .unwrap();

        let loaded = load(file.path()).unwrap();
        assert_eq!(loaded.client_id, "abc");
        assert!(loaded.refresh_token.is_empty());
        assert_eq!(loaded.created_time, 0);
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(load(Path::new("/nonexistent/harken.conf")).is_err());
    }
}
