use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub jwt: JwtConfig,
    #[serde(default)]
    pub otp: OtpConfig,
    #[serde(default)]
    pub passkey: PasskeyConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    #[serde(default = "default_jwt_secret")]
    pub secret: String,
    #[serde(default)]
    pub previous_secrets: Vec<String>,
    #[serde(default = "default_access_token_expire")]
    pub access_token_expire_minutes: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtpConfig {
    #[serde(default = "default_otp_ttl")]
    pub ttl_seconds: u64,
    /// Echo freshly issued codes in API responses. Development only; codes are
    /// always delivered out-of-band by email.
    #[serde(default)]
    pub expose_code: bool,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PasskeyConfig {
    #[serde(default = "default_rp_id")]
    pub rp_id: String,
    #[serde(default = "default_rp_name")]
    pub rp_name: String,
    #[serde(default = "default_rp_origin")]
    pub rp_origin: String,
    #[serde(default = "default_challenge_ttl")]
    pub challenge_ttl_seconds: u64,
}

// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    1420
}

fn default_db_path() -> String {
    "data/bookline.db".to_string()
}

fn default_jwt_secret() -> String {
    // Replaced by a generated, persisted secret on first start
    "your-super-secret-key-change-it".to_string()
}

fn default_access_token_expire() -> u64 {
    60 // 1 hour
}

fn default_otp_ttl() -> u64 {
    600 // 10 minutes
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_rp_id() -> String {
    "localhost".to_string()
}

fn default_rp_name() -> String {
    "Bookline".to_string()
}

fn default_rp_origin() -> String {
    "http://localhost:3000".to_string()
}

fn default_challenge_ttl() -> u64 {
    300 // 5 minutes
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: default_jwt_secret(),
            previous_secrets: Vec::new(),
            access_token_expire_minutes: default_access_token_expire(),
        }
    }
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_otp_ttl(),
            expose_code: false,
            sweep_interval_seconds: default_sweep_interval(),
        }
    }
}

impl Default for PasskeyConfig {
    fn default() -> Self {
        Self {
            rp_id: default_rp_id(),
            rp_name: default_rp_name(),
            rp_origin: default_rp_origin(),
            challenge_ttl_seconds: default_challenge_ttl(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            jwt: JwtConfig::default(),
            otp: OtpConfig::default(),
            passkey: PasskeyConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::load_from_file()?;
        config.apply_env_overrides();
        config.ensure_directories()?;
        config.ensure_jwt_secret()?;
        config.ensure_passkey_defaults();
        tracing::info!(
            "Passkey config: rp_id={}, rp_origin={}, rp_name={}",
            config.passkey.rp_id,
            config.passkey.rp_origin,
            config.passkey.rp_name
        );
        if config.otp.expose_code {
            tracing::warn!("otp.expose_code is enabled; OTP values will appear in API responses");
        }
        Ok(config)
    }

    /// Ensure JWT secret is secure and persisted
    fn ensure_jwt_secret(&mut self) -> anyhow::Result<()> {
        // If secret is the default one or empty
        if self.jwt.secret == default_jwt_secret() || self.jwt.secret.is_empty() {
            let secret_path = Path::new("data/.jwt_secret");

            if secret_path.exists() {
                // Load existing secret
                let secret = fs::read_to_string(secret_path)?;
                self.jwt.secret = secret.trim().to_string();
                tracing::info!("Loaded persisted JWT secret from data/.jwt_secret");
            } else {
                // Generate new strong secret
                let secret = uuid::Uuid::new_v4().to_string();

                // Ensure data directory exists
                if let Some(parent) = secret_path.parent() {
                    fs::create_dir_all(parent)?;
                }

                // Save to file
                fs::write(secret_path, &secret)?;
                self.jwt.secret = secret;
                tracing::info!("Generated and persisted new JWT secret to data/.jwt_secret");
            }
        }
        Ok(())
    }

    /// Load configuration from conf.ini or config.toml
    fn load_from_file() -> anyhow::Result<Self> {
        let config_paths = ["conf.ini", "config.toml", "data/conf.ini", "data/config.toml"];

        for path in config_paths {
            if Path::new(path).exists() {
                let content = fs::read_to_string(path)?;
                let config: Config = toml::from_str(&content)?;
                tracing::info!("Loaded configuration from {}", path);
                return Ok(config);
            }
        }

        tracing::info!("No configuration file found, using defaults");
        Ok(Config::default())
    }

    /// Apply environment variable overrides
    /// Format: BL_CONF_<SECTION>_<KEY>
    fn apply_env_overrides(&mut self) {
        // Server overrides
        if let Ok(val) = env::var("BL_CONF_SERVER_HOST") {
            self.server.host = val;
        }
        if let Ok(val) = env::var("BL_CONF_SERVER_PORT") {
            if let Ok(port) = val.parse() {
                self.server.port = port;
            }
        }

        // Database overrides
        if let Ok(val) = env::var("BL_CONF_DATABASE_PATH") {
            self.database.path = val;
        }

        // JWT overrides
        if let Ok(val) = env::var("BL_CONF_JWT_SECRET") {
            self.jwt.secret = val;
        }
        if let Ok(val) = env::var("BL_CONF_JWT_PREVIOUS_SECRETS") {
            self.jwt.previous_secrets = val
                .split(',')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .collect();
        }
        if let Ok(val) = env::var("BL_CONF_JWT_ACCESS_EXPIRE") {
            if let Ok(minutes) = val.parse() {
                self.jwt.access_token_expire_minutes = minutes;
            }
        }

        // OTP overrides
        if let Ok(val) = env::var("BL_CONF_OTP_TTL_SECONDS") {
            if let Ok(seconds) = val.parse() {
                self.otp.ttl_seconds = seconds;
            }
        }
        if let Ok(val) = env::var("BL_CONF_OTP_EXPOSE_CODE") {
            if let Ok(v) = val.parse() {
                self.otp.expose_code = v;
            }
        }
        if let Ok(val) = env::var("BL_CONF_OTP_SWEEP_INTERVAL") {
            if let Ok(seconds) = val.parse() {
                self.otp.sweep_interval_seconds = seconds;
            }
        }

        // Passkey overrides
        if let Ok(val) = env::var("BL_CONF_PASSKEY_RP_ID") {
            if !val.trim().is_empty() {
                self.passkey.rp_id = val;
            }
        }
        if let Ok(val) = env::var("BL_CONF_PASSKEY_RP_NAME") {
            if !val.trim().is_empty() {
                self.passkey.rp_name = val;
            }
        }
        if let Ok(val) = env::var("BL_CONF_PASSKEY_RP_ORIGIN") {
            if !val.trim().is_empty() {
                self.passkey.rp_origin = val;
            }
        }
        if let Ok(val) = env::var("BL_CONF_PASSKEY_CHALLENGE_TTL") {
            if let Ok(seconds) = val.parse() {
                self.passkey.challenge_ttl_seconds = seconds;
            }
        }
    }

    fn ensure_passkey_defaults(&mut self) {
        if self.passkey.rp_id.trim().is_empty() {
            self.passkey.rp_id = default_rp_id();
        }
        if self.passkey.rp_name.trim().is_empty() {
            self.passkey.rp_name = default_rp_name();
        }
        if self.passkey.rp_origin.trim().is_empty() {
            self.passkey.rp_origin = default_rp_origin();
        }
        if self.passkey.challenge_ttl_seconds == 0 {
            self.passkey.challenge_ttl_seconds = default_challenge_ttl();
        }
    }

    /// Ensure required directories exist
    fn ensure_directories(&self) -> anyhow::Result<()> {
        // Ensure database directory exists
        if let Some(parent) = Path::new(&self.database.path).parent() {
            fs::create_dir_all(parent)?;
        }

        Ok(())
    }
}
