//! Wristlink CLI
//!
//! 命令行客户端，通过 BLE 直接访问手表文件系统

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use regex::Regex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing_subscriber::EnvFilter;
use wristlink_core::{BleResolver, ClientSettings, DeviceClient, Fetched, LogLevel};

#[derive(Parser)]
#[command(name = "wristlink", version, about = "运动手表 BLE 文件访问工具")]
struct Cli {
    /// 日志级别 (error/warn/info/debug/trace)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 扫描附近设备
    Scan {
        /// 扫描超时时间 (秒)，默认使用配置文件
        #[arg(short, long)]
        timeout: Option<u64>,
    },
    /// 列出目录
    Ls {
        /// 设备 ID 或硬件地址
        device: String,
        /// 设备上的目录
        #[arg(default_value = "/")]
        path: String,
        /// 递归列出子目录
        #[arg(short, long)]
        recursive: bool,
        /// 只显示名称匹配的文件（正则）
        #[arg(short, long)]
        pattern: Option<String>,
        /// 显示文件大小
        #[arg(short, long)]
        size: bool,
    },
    /// 读取文件或目录
    Get {
        device: String,
        path: String,
        /// 保存到本地文件 (默认输出到 stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// 写入文件
    Put {
        device: String,
        /// 本地文件
        local: PathBuf,
        /// 设备上的目标路径
        remote: String,
    },
    /// 按顺序删除文件，遇错即停
    Rm {
        device: String,
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// 删除空目录
    Rmdir { device: String, path: String },
    /// 监听设备推送通知，Ctrl-C 退出
    Watch {
        device: String,
        /// 以 JSON 行输出
        #[arg(long)]
        json: bool,
    },
}

fn init_logging(level: LogLevel) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.filter_directive()));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // 桥接 log crate（wristlink-core 使用）到 tracing
    tracing_log::LogTracer::init_with_filter(level.to_log_filter())?;
    Ok(())
}

async fn connect(settings: &ClientSettings) -> Result<DeviceClient> {
    let resolver = BleResolver::new(settings.clone()).await?;
    Ok(DeviceClient::new(Arc::new(resolver), settings))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = ClientSettings::load();

    let level = cli.log_level.unwrap_or(if settings.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    });
    init_logging(level)?;

    match cli.command {
        Commands::Scan { timeout } => {
            let duration = timeout.map_or(settings.scan_timeout(), Duration::from_secs);
            println!("🔍 扫描设备 ({}s)...", duration.as_secs());
            let resolver = BleResolver::new(settings.clone()).await?;
            let devices = resolver.scan(duration).await?;
            if devices.is_empty() {
                println!("   未发现设备");
            }
            for (i, dev) in devices.iter().enumerate() {
                let rssi = dev
                    .rssi
                    .map(|r| format!("{} dBm", r))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "   [{}] {} ({}) id={} rssi={}",
                    i,
                    dev.name,
                    dev.address,
                    dev.device_id.as_deref().unwrap_or("-"),
                    rssi
                );
            }
        }
        Commands::Ls {
            device,
            path,
            recursive,
            pattern,
            size,
        } => {
            let regex = pattern
                .as_deref()
                .map(Regex::new)
                .transpose()
                .context("invalid --pattern")?;
            // 目录总是放行，否则无法下探
            let accepts = move |name: &str| {
                name.ends_with('/') || regex.as_ref().is_none_or(|re| re.is_match(name))
            };

            let client = connect(&settings).await?;
            let entries = client
                .list_filtered(&device, &path, recursive, &accepts)
                .await?;
            for entry in entries {
                if size && !entry.path.ends_with('/') {
                    println!("{:>10}  {}", entry.size, entry.path);
                } else {
                    println!("{}", entry.path);
                }
            }
        }
        Commands::Get {
            device,
            path,
            output,
        } => {
            let client = connect(&settings).await?;
            match client.fetch(&device, &path).await? {
                Fetched::Directory(dir) => {
                    for entry in dir.entries {
                        println!("{:>10}  {}", entry.size, entry.name);
                    }
                }
                Fetched::File(bytes) => match output {
                    Some(output) => {
                        tokio::fs::write(&output, &bytes)
                            .await
                            .with_context(|| format!("failed to write {}", output.display()))?;
                        println!("📥 {} -> {} ({} bytes)", path, output.display(), bytes.len());
                    }
                    None => {
                        let mut stdout = tokio::io::stdout();
                        stdout.write_all(&bytes).await?;
                        stdout.flush().await?;
                    }
                },
            }
        }
        Commands::Put {
            device,
            local,
            remote,
        } => {
            let file = tokio::fs::File::open(&local)
                .await
                .with_context(|| format!("failed to open {}", local.display()))?;
            let body = ReaderStream::new(file)
                .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
                .boxed();

            let client = connect(&settings).await?;
            client.write_file_stream(&device, &remote, body).await?;
            println!("📤 {} -> {}", local.display(), remote);
        }
        Commands::Rm { device, paths } => {
            let client = connect(&settings).await?;
            client.delete_many(&device, &paths).await?;
            println!("🗑️  已删除 {} 项", paths.len());
        }
        Commands::Rmdir { device, path } => {
            let client = connect(&settings).await?;
            if client.delete_directory_if_empty(&device, &path).await? {
                println!("🗑️  已删除 {}", path);
            } else {
                println!("   {} 不为空，保留", path);
            }
        }
        Commands::Watch { device, json } => {
            let client = connect(&settings).await?;
            let mut events = client.notifications(&device).await?;
            tracing::info!("Watching notifications from {}", device);

            loop {
                tokio::select! {
                    event = events.next() => {
                        let Some(event) = event else {
                            tracing::warn!("Notification stream ended");
                            break;
                        };
                        if json {
                            let line = serde_json::json!({
                                "tag": event.kind.tag(),
                                "kind": event.kind.to_string(),
                                "parsed": event.parsed,
                                "raw": event.raw,
                            });
                            println!("{}", line);
                        } else {
                            match &event.parsed {
                                Some(value) => println!("🔔 {}: {:?}", event.kind, value),
                                None => println!("🔔 {} ({} bytes)", event.kind, event.raw.len()),
                            }
                        }
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
        }
    }

    Ok(())
}
