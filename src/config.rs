use std::path::PathBuf;

pub const DEFAULT_PROXY_PORT: u16 = 8080;
pub const DEFAULT_UPSTREAM_ORIGIN: &str = "http://127.0.0.1:1234";
pub const DEFAULT_PROMPTS_DIR: &str = "./prompts";
pub const DEFAULT_TOKEN_LIMIT: u64 = 65536;

/// Static proxy configuration, read-only after startup.
#[derive(Clone, Debug)]
pub struct ProxyConfig {
    /// Local port to listen on.
    pub port: u16,
    /// Upstream origin, e.g. `https://api.openai.com`. Inbound path and query
    /// are appended verbatim.
    pub upstream_origin: String,
    /// Directory where request/response events are persisted.
    pub prompts_dir: PathBuf,
    /// Token budget for downstream consumers of the event stream. The proxy
    /// itself does not enforce it.
    pub token_limit: u64,
}

impl ProxyConfig {
    /// Host/authority portion of the upstream origin, used to label events.
    pub fn upstream_label(&self) -> String {
        self.upstream_origin
            .trim_end_matches('/')
            .split("://")
            .last()
            .unwrap_or(&self.upstream_origin)
            .to_string()
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PROXY_PORT,
            upstream_origin: DEFAULT_UPSTREAM_ORIGIN.to_string(),
            prompts_dir: PathBuf::from(DEFAULT_PROMPTS_DIR),
            token_limit: DEFAULT_TOKEN_LIMIT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_label_strips_scheme() {
        let config = ProxyConfig {
            upstream_origin: "https://api.openai.com".to_string(),
            ..ProxyConfig::default()
        };
        assert_eq!(config.upstream_label(), "api.openai.com");
    }

    #[test]
    fn upstream_label_keeps_port() {
        let config = ProxyConfig::default();
        assert_eq!(config.upstream_label(), "127.0.0.1:1234");
    }
}
