//! HTTP客户端模块 - 解读服务等外部调用共用一个连接池

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{info, warn};

#[cfg(feature = "reqwest")]
use reqwest::Client;

use crate::util::config::CompletionConfig;

/// HTTP客户端配置
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// 请求超时时间（秒）
    pub timeout_secs: u64,
    /// 连接超时时间（秒）
    pub connect_timeout_secs: u64,
    pub user_agent: String,
    pub pool_idle_timeout_secs: u64,
    pub pool_max_idle_per_host: usize,
    pub http_proxy: Option<String>,
    pub https_proxy: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            connect_timeout_secs: 10,
            user_agent: format!("Lab-Interpreter/{}", env!("CARGO_PKG_VERSION")),
            pool_idle_timeout_secs: 90,
            pool_max_idle_per_host: 4,
            http_proxy: None,
            https_proxy: None,
        }
    }
}

impl HttpClientConfig {
    /// 以解读服务的超时为准
    pub fn for_completion(completion: &CompletionConfig) -> Self {
        Self {
            timeout_secs: completion.timeout_secs.max(1),
            ..Self::default()
        }
    }

    /// 从环境变量加载代理配置
    pub fn with_env_proxy(mut self) -> Self {
        self.http_proxy = std::env::var("HTTP_PROXY").ok().filter(|v| !v.is_empty());
        self.https_proxy = std::env::var("HTTPS_PROXY").ok().filter(|v| !v.is_empty());
        self
    }
}

/// HTTP客户端包装器
#[derive(Clone)]
pub struct HttpClient {
    #[cfg(feature = "reqwest")]
    client: Client,
    config: HttpClientConfig,
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        #[cfg(feature = "reqwest")]
        {
            let client = Self::build_reqwest_client(&config)?;
            Ok(Self { client, config })
        }

        #[cfg(not(feature = "reqwest"))]
        {
            warn!("HTTP客户端功能在当前编译配置下未启用");
            Ok(Self { config })
        }
    }

    #[cfg(feature = "reqwest")]
    fn build_reqwest_client(config: &HttpClientConfig) -> Result<Client> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .user_agent(&config.user_agent)
            .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_secs))
            .pool_max_idle_per_host(config.pool_max_idle_per_host);

        if let Some(proxy_url) = &config.http_proxy {
            match reqwest::Proxy::http(proxy_url) {
                Ok(proxy) => {
                    info!(event = "client.http_proxy.enabled", proxy = %proxy_url);
                    builder = builder.proxy(proxy);
                }
                Err(e) => warn!("HTTP代理配置无效: {} ({})", proxy_url, e),
            }
        }

        if let Some(proxy_url) = &config.https_proxy {
            match reqwest::Proxy::https(proxy_url) {
                Ok(proxy) => {
                    info!(event = "client.https_proxy.enabled", proxy = %proxy_url);
                    builder = builder.proxy(proxy);
                }
                Err(e) => warn!("HTTPS代理配置无效: {} ({})", proxy_url, e),
            }
        }

        builder.build().context("构建HTTP客户端失败")
    }

    #[cfg(feature = "reqwest")]
    pub fn reqwest_client(&self) -> &Client {
        &self.client
    }

    pub fn is_available(&self) -> bool {
        cfg!(feature = "reqwest")
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("available", &self.is_available())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_timeout_drives_client_timeout() {
        let completion = CompletionConfig {
            timeout_secs: 15,
            ..CompletionConfig::default()
        };
        let config = HttpClientConfig::for_completion(&completion);
        assert_eq!(config.timeout_secs, 15);
        assert_eq!(config.connect_timeout_secs, 10);
    }

    #[cfg(feature = "reqwest")]
    #[test]
    fn test_client_creation() {
        let client = HttpClient::new(HttpClientConfig::default()).unwrap();
        assert!(client.is_available());
    }
}
