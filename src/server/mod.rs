//! 服务器模块
//!
//! - 配置管理 (config.rs)
//! - HTTP服务器设置 (http.rs)
//!
//! ```ignore
//! let server = ServerBootstrap::new()?;
//! server.start().await?;
//! ```

pub mod config;
pub mod http;

pub use config::ConfigManager;
pub use http::{HttpServer, ServerManager};

use crate::build_info;
use crate::util::config::{Config, ValidationReport};
use crate::AppState;
use anyhow::{Context, Result};
use std::time::Duration;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;

/// 闲置会话扫描间隔上限
const SWEEP_INTERVAL_CAP: Duration = Duration::from_secs(60);

/// 服务器引导程序 - 统一的服务器启动入口
pub struct ServerBootstrap {
    config: Config,
    validation_report: ValidationReport,
    _log_guard: Option<WorkerGuard>,
}

impl ServerBootstrap {
    /// 加载配置、初始化日志并检查配置
    pub fn new() -> Result<Self> {
        let (config, validation_report) = ConfigManager::load_and_validate()?;
        let log_guard = ConfigManager::initialize_logging(&config)?;

        validation_report.log();
        if validation_report.has_errors() {
            return Err(anyhow::anyhow!(
                "配置验证失败: {} 个错误",
                validation_report.error_count()
            ));
        }

        info!("[ok] 服务器引导程序初始化完成");
        Ok(Self {
            config,
            validation_report,
            _log_guard: log_guard,
        })
    }

    /// 启动服务器，阻塞直到关闭
    pub async fn start(self) -> Result<()> {
        info!("=== 化验单解读服务启动 ===");
        info!("版本信息: {}", build_info::summary());
        info!("服务端口: {}", self.config.get_port());

        let app_state = AppState::from_config(self.config.clone()).context("创建应用状态失败")?;

        let sweep_interval = Duration::from_secs(self.config.session.idle_timeout_secs / 4)
            .clamp(Duration::from_secs(1), SWEEP_INTERVAL_CAP);
        let sweeper = app_state.sessions.clone().spawn_sweeper(sweep_interval);

        let server = ServerManager::create_server(&self.config, app_state).await?;
        let result = ServerManager::start_server(server).await;

        sweeper.abort();
        result
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn validation_report(&self) -> &ValidationReport {
        &self.validation_report
    }
}

/// 便捷函数：快速启动服务器
pub async fn start_server() -> Result<()> {
    let bootstrap = ServerBootstrap::new()?;
    bootstrap.start().await
}
