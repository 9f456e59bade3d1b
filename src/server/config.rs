//! 配置管理模块
//! 负责配置文件的查找、加载、验证和日志初始化

use crate::util::config::{Config, ConfigLoader, ConfigValidator, ValidationReport};
use crate::util::log::log_init_with_config;
use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

pub const CONFIG_FILE_NAME: &str = "config.yaml";
pub const LOG_FILE_PREFIX: &str = "lab-interpreter";

/// 配置管理器
pub struct ConfigManager;

impl ConfigManager {
    /// 加载和验证配置
    pub fn load_and_validate() -> Result<(Config, ValidationReport)> {
        let config_path = Self::find_config_file_path(CONFIG_FILE_NAME);
        Self::load_and_validate_from(&config_path)
    }

    /// 从指定路径加载；文件不存在时写出模板并使用默认值
    pub fn load_and_validate_from(config_path: &Path) -> Result<(Config, ValidationReport)> {
        info!(event = "config.load", path = %config_path.display());

        let config = if config_path.exists() {
            ConfigLoader::load_with_env_overrides(config_path)?
        } else {
            Self::write_template(config_path)
        };

        let report = ConfigValidator::validate_all(&config);
        Ok((config, report))
    }

    fn write_template(config_path: &Path) -> Config {
        info!("[note] 创建默认配置文件: {}", config_path.display());
        let config = Config::default();
        if let Err(e) = config.write_yaml_to_path(config_path) {
            warn!("[fail] 创建默认配置文件失败: {}", e);
        }
        ConfigLoader::apply_env_overrides(config)
    }

    /// 初始化日志系统，返回的 guard 需持有到进程退出
    pub fn initialize_logging(config: &Config) -> Result<Option<WorkerGuard>> {
        log_init_with_config(LOG_FILE_PREFIX, &config.logging)
    }

    /// 查找配置文件路径，适应开发和部署目录
    pub fn find_config_file_path(filename: &str) -> PathBuf {
        let current_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf));
        Self::find_config_in(&current_dir, exe_dir.as_deref(), filename)
    }

    fn find_config_in(current_dir: &Path, exe_dir: Option<&Path>, filename: &str) -> PathBuf {
        // 当前目录下的 config/
        let config_in_current = current_dir.join("config").join(filename);
        if config_in_current.exists() {
            return config_in_current;
        }

        // 在 bin/ 下运行时使用上级目录的 config/
        if let Some(parent) = current_dir.parent() {
            let config_in_parent = parent.join("config").join(filename);
            if config_in_parent.exists() {
                return config_in_parent;
            }
        }

        if let Some(exe_dir) = exe_dir {
            if exe_dir.file_name() == Some(std::ffi::OsStr::new("bin")) {
                if let Some(project_root) = exe_dir.parent() {
                    let config_in_root = project_root.join("config").join(filename);
                    if config_in_root.exists() {
                        return config_in_root;
                    }
                }
            }
        }

        current_dir.join(filename)
    }
}
