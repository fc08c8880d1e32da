use std::env;

/// The five weights applied to the detector fan-out's weighted sum.
///
/// `velocity + device + geo + behavior + external` must equal 1.0; this is
/// asserted once at start-up rather than trusted, because a silently wrong
/// weight set changes every decision the engine makes.
#[derive(Debug, Clone, Copy)]
pub struct Weights {
    pub velocity: f64,
    pub device: f64,
    pub geo: f64,
    pub behavior: f64,
    pub external: f64,
}

impl Weights {
    pub fn sum(&self) -> f64 {
        self.velocity + self.device + self.geo + self.behavior + self.external
    }
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            velocity: 0.25,
            device: 0.20,
            geo: 0.20,
            behavior: 0.20,
            external: 0.15,
        }
    }
}

/// Process-wide, immutable configuration constructed once at start-up and
/// handed to the orchestrator and every detector by reference.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub bind_addr: String,
    pub redis_url: String,
    pub hmac_secret: String,

    pub weights: Weights,

    pub fan_out_deadline_ms: u64,
    pub external_reputation_timeout_ms: u64,
    pub cache_op_timeout_ms: u64,

    pub fatf_high_risk_countries: Vec<String>,

    pub api_keys: Vec<String>,
    pub enable_auth: bool,
    pub rate_limit_per_minute: u32,
}

/// The 42-country high-risk/FATF-monitored list used by the geo analyzer.
/// Kept as a compiled default; overridable via `FATF_HIGH_RISK_COUNTRIES`
/// for environments that need to diverge from the shipped list without a
/// rebuild.
const DEFAULT_FATF_COUNTRIES: &[&str] = &[
    "AF", "AL", "BB", "BF", "KH", "CI", "HR", "CD", "GI", "HT", "JM", "KE", "MC", "ML", "MZ",
    "MM", "NA", "NP", "NG", "PK", "PA", "PH", "SN", "SS", "SY", "TZ", "TR", "UG", "AE", "VU",
    "VE", "YE", "IR", "KP", "CU", "SD", "LY", "SO", "ZW", "BY", "RU", "IQ",
];

impl EngineConfig {
    /// Loads configuration from the environment, applying the same
    /// `.unwrap_or_else`/parse-or-default idiom throughout. Returns an error
    /// (never panics) when a loaded value is structurally invalid — this
    /// makes every failure here a candidate for `main`'s fatal exit path.
    pub fn from_env() -> anyhow::Result<Self> {
        let hmac_secret = env::var("FRAUD_HMAC_SECRET")
            .map_err(|_| anyhow::anyhow!("FRAUD_HMAC_SECRET must be set"))?;
        if hmac_secret.trim().is_empty() {
            anyhow::bail!("FRAUD_HMAC_SECRET must not be empty");
        }

        let redis_url =
            env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let weights = Weights {
            velocity: env_f64("WEIGHT_VELOCITY", Weights::default().velocity),
            device: env_f64("WEIGHT_DEVICE", Weights::default().device),
            geo: env_f64("WEIGHT_GEO", Weights::default().geo),
            behavior: env_f64("WEIGHT_BEHAVIOR", Weights::default().behavior),
            external: env_f64("WEIGHT_EXTERNAL", Weights::default().external),
        };

        if (weights.sum() - 1.0).abs() > 1e-9 {
            anyhow::bail!(
                "configured weights must sum to 1.0, got {} (velocity={}, device={}, geo={}, behavior={}, external={})",
                weights.sum(),
                weights.velocity,
                weights.device,
                weights.geo,
                weights.behavior,
                weights.external
            );
        }

        let fan_out_deadline_ms = env::var("FAN_OUT_DEADLINE_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(200);

        let external_reputation_timeout_ms = env::var("EXTERNAL_REPUTATION_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(80);

        let cache_op_timeout_ms = env::var("CACHE_OP_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(500);

        let fatf_high_risk_countries = env::var("FATF_HIGH_RISK_COUNTRIES")
            .map(|v| v.split(',').map(|s| s.trim().to_uppercase()).collect())
            .unwrap_or_else(|_| {
                DEFAULT_FATF_COUNTRIES
                    .iter()
                    .map(|s| s.to_string())
                    .collect()
            });

        let api_keys = env::var("API_KEYS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let enable_auth = env::var("ENABLE_AUTH")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(true);

        let rate_limit_per_minute = env::var("RATE_LIMIT_PER_MINUTE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);

        Ok(Self {
            bind_addr,
            redis_url,
            hmac_secret,
            weights,
            fan_out_deadline_ms,
            external_reputation_timeout_ms,
            cache_op_timeout_ms,
            fatf_high_risk_countries,
            api_keys,
            enable_auth,
            rate_limit_per_minute,
        })
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
