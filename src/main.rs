use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use lab_interpreter::model::ImagePayload;
use lab_interpreter::server::{self, ConfigManager};
use lab_interpreter::util::log::log_init_console;
use lab_interpreter::util::report::PdfExportGenerator;
use lab_interpreter::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    std::panic::set_hook(Box::new(|panic_info| {
        let payload = panic_info.payload();
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s
        } else {
            "Unknown panic payload"
        };

        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "Unknown location".to_string());

        eprintln!("[PANIC] 程序异常退出");
        eprintln!("位置: {}", location);
        eprintln!("原因: {}", message);
        tracing::error!(event = "panic.raised", location = %location, reason = %message);

        let panic_msg = format!(
            "PANIC OCCURRED\nLocation: {}\nReason: {}\nTime: {}\n\n",
            location,
            message,
            chrono::Utc::now()
        );
        if let Err(e) = std::fs::write("./panic.log", &panic_msg) {
            eprintln!("[WARN] 无法写入panic.log: {}", e);
        } else {
            eprintln!("[OK] Panic信息已保存到 ./panic.log");
        }

        std::io::stderr().flush().ok();
    }));

    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.first().map(String::as_str) {
        Some("interpret") => run_interpret(&args[1..]).await,
        Some("check-config") | Some("--check-config") => run_check_config(),
        Some("serve") | None => server::start_server().await,
        Some(other) => bail!(
            "未知命令: {}（可用: serve | interpret <image>... [--out <dir>] | check-config）",
            other
        ),
    }
}

/// 单次模式：对本地图片运行完整流程
async fn run_interpret(args: &[String]) -> anyhow::Result<()> {
    let (images, out_dir) = parse_interpret_args(args)?;

    let (config, report) = ConfigManager::load_and_validate()?;
    log_init_console(&config.logging.level);
    report.log();
    if report.has_errors() {
        bail!("配置验证失败: {} 个错误", report.error_count());
    }

    let max_images = config.session.max_images;
    if images.len() > max_images {
        bail!("最多只能提交 {} 张图片", max_images);
    }

    let mut payloads = Vec::with_capacity(images.len());
    for path in &images {
        payloads.push(read_payload(path)?);
    }

    let app_state = AppState::from_config(config)?;
    let outcome = app_state.runner.evaluate(&payloads).await;

    println!("{}", outcome.text());
    if let Some(disclaimer) = outcome.disclaimer() {
        println!();
        println!("{}", disclaimer);
    }

    if outcome.is_interpretation() {
        let artifact = app_state
            .exporter
            .export(outcome.text())
            .await
            .context("导出 PDF 失败")?;
        std::fs::create_dir_all(&out_dir)
            .with_context(|| format!("创建输出目录失败: {}", out_dir.display()))?;
        let target = out_dir.join(&artifact.filename);
        std::fs::write(&target, &artifact.bytes)
            .with_context(|| format!("写入 PDF 失败: {}", target.display()))?;
        eprintln!("PDF 已保存: {}", target.display());
    }
    Ok(())
}

fn parse_interpret_args(args: &[String]) -> anyhow::Result<(Vec<PathBuf>, PathBuf)> {
    let mut images = Vec::new();
    let mut out_dir = PathBuf::from(".");
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--out" {
            let Some(dir) = iter.next() else {
                bail!("--out 需要一个目录参数");
            };
            out_dir = PathBuf::from(dir);
        } else {
            images.push(PathBuf::from(arg));
        }
    }
    if images.is_empty() {
        bail!("用法: lab-interpreter interpret <image>... [--out <dir>]");
    }
    Ok((images, out_dir))
}

fn read_payload(path: &Path) -> anyhow::Result<ImagePayload> {
    let content_type = mime_guess::from_path(path)
        .first()
        .map(|mime| mime.essence_str().to_string())
        .filter(|ct| ct.starts_with("image/"))
        .with_context(|| format!("不支持的文件类型: {}", path.display()))?;
    let bytes = std::fs::read(path).with_context(|| format!("读取图片失败: {}", path.display()))?;
    Ok(ImagePayload {
        bytes: Arc::from(bytes),
        content_type,
    })
}

fn run_check_config() -> anyhow::Result<()> {
    let (config, report) = ConfigManager::load_and_validate()?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    let exporter = PdfExportGenerator::from_config(&config.export);
    match exporter.pdf_generator().check_pdf_tools() {
        Ok(()) => println!("PDF 工具可用: {}", config.export.wkhtmltopdf_binary),
        Err(e) => println!("PDF 工具不可用: {}", e),
    }

    if report.has_errors() {
        bail!("配置验证失败: {} 个错误", report.error_count());
    }
    Ok(())
}
