use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_TOKEN_STORE_PATH: &str = "outstanding_tokens.dat";
pub const DEFAULT_SIGNING_KEY_PATH: &str = "publisher_signing_key.der";
pub const DEFAULT_RSA_KEY_BITS: usize = 2048;
pub const MIN_RSA_KEY_BITS: usize = 1024;
pub const DEFAULT_MAX_TOKENS_PER_REQUEST: u32 = 1000;

#[derive(Clone, Debug)]
pub struct PublisherConfig {
    pub host: String,
    pub port: u16,
    /// `None` keeps outstanding tokens in memory only
    pub token_store_path: Option<PathBuf>,
    pub signing_key_path: PathBuf,
    pub rsa_key_bits: usize,
    pub max_tokens_per_request: u32,
    pub rate_limit_per_second: u64,
    pub rate_limit_burst: u32,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            token_store_path: Some(PathBuf::from(DEFAULT_TOKEN_STORE_PATH)),
            signing_key_path: PathBuf::from(DEFAULT_SIGNING_KEY_PATH),
            rsa_key_bits: DEFAULT_RSA_KEY_BITS,
            max_tokens_per_request: DEFAULT_MAX_TOKENS_PER_REQUEST,
            rate_limit_per_second: 10,
            rate_limit_burst: 20,
        }
    }
}

impl PublisherConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let host = lookup("HOST").unwrap_or(defaults.host);
        let port = parse_or("PORT", lookup("PORT"), defaults.port)?;

        let token_store_path = match lookup("TOKEN_STORE_PATH") {
            Some(path) if path.trim().is_empty() => None,
            Some(path) => Some(expand_path(&path)),
            None => defaults.token_store_path,
        };
        let signing_key_path = lookup("SIGNING_KEY_PATH")
            .map(|p| expand_path(&p))
            .unwrap_or(defaults.signing_key_path);

        let rsa_key_bits = parse_or("RSA_KEY_BITS", lookup("RSA_KEY_BITS"), defaults.rsa_key_bits)?;
        if rsa_key_bits < MIN_RSA_KEY_BITS {
            anyhow::bail!(
                "RSA_KEY_BITS must be at least {}, got {}",
                MIN_RSA_KEY_BITS,
                rsa_key_bits
            );
        }

        let max_tokens_per_request = parse_or(
            "MAX_TOKENS_PER_REQUEST",
            lookup("MAX_TOKENS_PER_REQUEST"),
            defaults.max_tokens_per_request,
        )?;
        if max_tokens_per_request == 0 {
            anyhow::bail!("MAX_TOKENS_PER_REQUEST must be positive");
        }

        let rate_limit_per_second = parse_or(
            "RATE_LIMIT_PER_SECOND",
            lookup("RATE_LIMIT_PER_SECOND"),
            defaults.rate_limit_per_second,
        )?;
        let rate_limit_burst = parse_or(
            "RATE_LIMIT_BURST",
            lookup("RATE_LIMIT_BURST"),
            defaults.rate_limit_burst,
        )?;

        Ok(Self {
            host,
            port,
            token_store_path,
            signing_key_path,
            rsa_key_bits,
            max_tokens_per_request,
            rate_limit_per_second,
            rate_limit_burst,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid {} value {:?}: {}", key, value, e)),
        None => Ok(default),
    }
}

fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).to_string())
}
