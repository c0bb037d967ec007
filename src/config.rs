use std::net::IpAddr;
use std::time::Duration;

/// The fee split applied to every session: the platform charges
/// `platform_cents` and the "saved" figure is measured against
/// `baseline_cents` (the incumbent meter fee).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSchedule {
    pub platform_cents: i64,
    pub baseline_cents: i64,
}

impl FeeSchedule {
    pub fn saved_cents(&self) -> i64 {
        (self.baseline_cents - self.platform_cents).max(0)
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            platform_cents: 5,
            baseline_cents: 37,
        }
    }
}

/// Runtime configuration, read once at startup from `PARKD_*` environment
/// variables. Unset or unparseable values fall back to the defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: String,
    pub bind: String,
    pub data_dir: String,
    pub password: String,
    pub max_connections: usize,
    pub fees: FeeSchedule,
    pub sweep_interval: Duration,
    pub update_channel: String,
    /// Client addresses allowed to connect. Empty = allow all.
    pub allowed_peers: Vec<IpAddr>,
    pub payment_timeout: Duration,
    pub metrics_port: Option<u16>,
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env_or("PARKD_PORT", "5433"),
            bind: env_or("PARKD_BIND", "0.0.0.0"),
            data_dir: env_or("PARKD_DATA_DIR", "./data"),
            password: env_or("PARKD_PASSWORD", "parkd"),
            max_connections: env_parsed("PARKD_MAX_CONNECTIONS").unwrap_or(256),
            fees: FeeSchedule {
                platform_cents: env_parsed("PARKD_PLATFORM_FEE_CENTS").unwrap_or(5),
                baseline_cents: env_parsed("PARKD_BASELINE_FEE_CENTS").unwrap_or(37),
            },
            sweep_interval: Duration::from_secs(
                env_parsed("PARKD_SWEEP_INTERVAL_SECS").unwrap_or(300),
            ),
            update_channel: env_or("PARKD_UPDATE_CHANNEL", "parking_updates"),
            allowed_peers: parse_peers(&env_or("PARKD_ALLOWED_PEERS", "")),
            payment_timeout: Duration::from_secs(
                env_parsed("PARKD_PAYMENT_TIMEOUT_SECS").unwrap_or(10),
            ),
            metrics_port: env_parsed("PARKD_METRICS_PORT"),
            tls_cert: std::env::var("PARKD_TLS_CERT").ok(),
            tls_key: std::env::var("PARKD_TLS_KEY").ok(),
        }
    }

    pub fn peer_allowed(&self, peer: IpAddr) -> bool {
        self.allowed_peers.is_empty() || self.allowed_peers.contains(&peer)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: "5433".into(),
            bind: "0.0.0.0".into(),
            data_dir: "./data".into(),
            password: "parkd".into(),
            max_connections: 256,
            fees: FeeSchedule::default(),
            sweep_interval: Duration::from_secs(300),
            update_channel: "parking_updates".into(),
            allowed_peers: Vec::new(),
            payment_timeout: Duration::from_secs(10),
            metrics_port: None,
            tls_cert: None,
            tls_key: None,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

/// Comma-separated IP list; entries that fail to parse are ignored with a
/// warning so a typo doesn't silently lock everything out as "allow all".
fn parse_peers(raw: &str) -> Vec<IpAddr> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse() {
            Ok(ip) => Some(ip),
            Err(_) => {
                tracing::warn!("ignoring unparseable PARKD_ALLOWED_PEERS entry: {s}");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_schedule_defaults() {
        let fees = FeeSchedule::default();
        assert_eq!(fees.platform_cents, 5);
        assert_eq!(fees.baseline_cents, 37);
        assert_eq!(fees.saved_cents(), 32);
    }

    #[test]
    fn fee_saved_never_negative() {
        let fees = FeeSchedule {
            platform_cents: 50,
            baseline_cents: 37,
        };
        assert_eq!(fees.saved_cents(), 0);
    }

    #[test]
    fn peer_list_parsing() {
        let peers = parse_peers("127.0.0.1, 10.0.0.2,garbage,");
        assert_eq!(peers.len(), 2);
        assert_eq!(peers[0], "127.0.0.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn empty_allow_list_allows_all() {
        let cfg = Config::default();
        assert!(cfg.peer_allowed("192.168.1.1".parse().unwrap()));
    }

    #[test]
    fn allow_list_rejects_unknown_peer() {
        let cfg = Config {
            allowed_peers: parse_peers("127.0.0.1"),
            ..Config::default()
        };
        assert!(cfg.peer_allowed("127.0.0.1".parse().unwrap()));
        assert!(!cfg.peer_allowed("10.1.1.1".parse().unwrap()));
    }
}
