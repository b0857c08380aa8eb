// ── Zapdesk Configuration ──────────────────────────────────────────────────
// Environment-driven settings, resolved once at startup. Every knob has a
// default matching a local single-host deployment (gateway on :3002, API on
// :3001, SQLite under ~/.zapdesk).

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL of the WAHA-compatible gateway, no trailing slash needed.
    pub base_url: String,
    /// Sent as `X-Api-Key` when non-empty.
    pub api_key: String,
    /// Per-request timeout for gateway calls.
    pub timeout_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            base_url: "http://localhost:3002".into(),
            api_key: String::new(),
            timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Bounded create-poll: attempts × delay is the hard latency ceiling.
    pub poll_attempts: u32,
    pub poll_delay_ms: u64,
    /// Wait before the first QR fetch once the pairing window opens.
    pub qr_settle_ms: u64,
    /// Physical gateway slot assigned to sessions that have none yet.
    pub default_slot: String,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        LifecycleConfig {
            poll_attempts: 10,
            poll_delay_ms: 3_000,
            qr_settle_ms: 2_000,
            default_slot: "default".into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        AuthConfig { access_ttl_secs: 86_400, refresh_ttl_secs: 604_800 }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub db_path: PathBuf,
    pub gateway: GatewayConfig,
    pub lifecycle: LifecycleConfig,
    pub auth: AuthConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults_gateway = GatewayConfig::default();
        let defaults_lifecycle = LifecycleConfig::default();
        let defaults_auth = AuthConfig::default();

        AppConfig {
            bind_addr: env_or("ZAPDESK_BIND", "127.0.0.1:3001"),
            db_path: std::env::var("ZAPDESK_DB")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_db_path()),
            gateway: GatewayConfig {
                base_url: env_or("WAHA_BASE_URL", &defaults_gateway.base_url),
                api_key: env_or("WAHA_API_KEY", ""),
                timeout_ms: env_parse("WAHA_TIMEOUT_MS", defaults_gateway.timeout_ms),
            },
            lifecycle: LifecycleConfig {
                poll_attempts: env_parse("ZAPDESK_POLL_ATTEMPTS", defaults_lifecycle.poll_attempts),
                poll_delay_ms: env_parse("ZAPDESK_POLL_DELAY_MS", defaults_lifecycle.poll_delay_ms),
                qr_settle_ms: env_parse("ZAPDESK_QR_SETTLE_MS", defaults_lifecycle.qr_settle_ms),
                default_slot: env_or("WAHA_DEFAULT_SESSION", &defaults_lifecycle.default_slot),
            },
            auth: AuthConfig {
                access_ttl_secs: env_parse("ZAPDESK_ACCESS_TOKEN_TTL_SECS", defaults_auth.access_ttl_secs),
                refresh_ttl_secs: env_parse("ZAPDESK_REFRESH_TOKEN_TTL_SECS", defaults_auth.refresh_ttl_secs),
            },
        }
    }
}

/// Default database location: `~/.zapdesk/zapdesk.db`.
pub fn default_db_path() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_default();
    let dir = home.join(".zapdesk");
    std::fs::create_dir_all(&dir).ok();
    dir.join("zapdesk.db")
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_parse<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let lifecycle = LifecycleConfig::default();
        assert_eq!(lifecycle.poll_attempts, 10);
        assert_eq!(lifecycle.poll_delay_ms, 3_000);
        assert_eq!(lifecycle.default_slot, "default");
        let gateway = GatewayConfig::default();
        assert_eq!(gateway.timeout_ms, 30_000);
    }
}
