//! 配置加载和管理模块
//! 处理配置文件的读取、写入、环境变量覆盖和模板生成

use super::types::*;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// 配置加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 从YAML文件读取配置
    pub fn read_yaml(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        let config_str = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        let config = serde_yaml::from_str(&config_str)
            .with_context(|| format!("解析配置文件失败: {}", path.display()))?;
        Ok(config)
    }

    /// 读取配置并应用环境变量覆盖
    pub fn load_with_env_overrides(path: impl AsRef<Path>) -> Result<Config> {
        let config = Self::read_yaml(path)?;
        Ok(Self::apply_env_overrides(config))
    }

    /// 从进程环境变量读取配置覆盖
    pub fn apply_env_overrides(config: Config) -> Config {
        Self::apply_overrides_from(config, |key| std::env::var(key).ok())
    }

    /// 按给定的变量来源覆盖配置（便于测试注入）
    pub fn apply_overrides_from<F>(mut config: Config, lookup: F) -> Config
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("LAB_HOST").filter(|v| !v.trim().is_empty()) {
            tracing::info!(event = "config.override", key = "LAB_HOST", value = %host);
            config.server.host = host;
        }

        if let Some(port_str) = lookup("LAB_PORT") {
            match port_str.trim().parse::<u16>() {
                Ok(port) => {
                    config.server.port = port;
                    tracing::info!(event = "config.override", key = "LAB_PORT", value = port);
                }
                Err(_) => tracing::warn!("[warn] LAB_PORT 无法解析为端口号: {}", port_str),
            }
        }

        if let Some(level) = lookup("LAB_LOG_LEVEL").filter(|v| !v.trim().is_empty()) {
            tracing::info!(event = "config.override", key = "LAB_LOG_LEVEL", value = %level);
            config.logging.level = level;
        }

        // 凭据只记录是否覆盖，不打印明文
        if let Some(key) = lookup("OPENAI_API_KEY").filter(|v| !v.trim().is_empty()) {
            config.completion.api_key = Some(key.trim().to_string());
            tracing::info!(event = "config.override", key = "OPENAI_API_KEY", value = "[hidden]");
        }

        if let Some(url) = lookup("LAB_COMPLETION_URL").filter(|v| !v.trim().is_empty()) {
            tracing::info!(event = "config.override", key = "LAB_COMPLETION_URL", value = %url);
            config.completion.base_url = url.trim().trim_end_matches('/').to_string();
        }

        if let Some(model) = lookup("LAB_COMPLETION_MODEL").filter(|v| !v.trim().is_empty()) {
            tracing::info!(event = "config.override", key = "LAB_COMPLETION_MODEL", value = %model);
            config.completion.model = model;
        }

        if let Some(flag) = lookup("LAB_DISPATCH_BEFORE_CLASSIFY") {
            match Self::parse_bool(&flag) {
                Ok(enabled) => {
                    config.pipeline.dispatch_before_classify = enabled;
                    tracing::info!(
                        event = "config.override",
                        key = "LAB_DISPATCH_BEFORE_CLASSIFY",
                        value = enabled
                    );
                }
                Err(_) => tracing::warn!(
                    "[warn] LAB_DISPATCH_BEFORE_CLASSIFY 无法解析为布尔值: {}",
                    flag
                ),
            }
        }

        config
    }

    pub fn parse_bool(value: &str) -> Result<bool> {
        match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(anyhow::anyhow!("无效的布尔值: {}", other)),
        }
    }
}

/// 配置写入器
pub struct ConfigWriter;

impl ConfigWriter {
    /// 写入YAML，必要时创建父目录
    pub fn write_yaml_with_dir(config: &Config, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let yaml = serde_yaml::to_string(config)?;
        fs::write(path, yaml).with_context(|| format!("写入配置文件失败: {}", path.display()))?;
        Ok(())
    }

    /// 生成配置模板（全部为默认值，凭据留空）
    pub fn generate_template() -> Config {
        Config::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn env_overrides_apply() {
        let config = ConfigLoader::apply_overrides_from(
            Config::default(),
            lookup_from(&[
                ("LAB_PORT", "9100"),
                ("OPENAI_API_KEY", " sk-test "),
                ("LAB_COMPLETION_URL", "http://127.0.0.1:8080/v1/"),
                ("LAB_DISPATCH_BEFORE_CLASSIFY", "yes"),
            ]),
        );
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.completion.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.completion.base_url, "http://127.0.0.1:8080/v1");
        assert!(config.pipeline.dispatch_before_classify);
    }

    #[test]
    fn invalid_overrides_are_ignored() {
        let config = ConfigLoader::apply_overrides_from(
            Config::default(),
            lookup_from(&[("LAB_PORT", "not-a-port"), ("OPENAI_API_KEY", "   ")]),
        );
        assert_eq!(config.server.port, 8964);
        assert!(config.completion.api_key.is_none());
    }

    #[test]
    fn partial_yaml_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "server:\n  port: 7000\nsession:\n  max_images: 1\n").unwrap();

        let config = ConfigLoader::read_yaml(&path).unwrap();
        assert_eq!(config.server.port, 7000);
        assert_eq!(config.session.max_images, 1);
        assert_eq!(config.completion.model, "gpt-3.5-turbo");
        assert_eq!(config.export.filename, "interpretacion-analisis.pdf");
    }

    #[test]
    fn template_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config").join("config.yaml");
        ConfigWriter::write_yaml_with_dir(&ConfigWriter::generate_template(), &path).unwrap();
        let config = ConfigLoader::read_yaml(&path).unwrap();
        assert_eq!(config.session.max_images, MAX_IMAGES_CAP);
    }
}
