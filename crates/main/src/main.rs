//! 闪电贷跨场所套利机器人
//!
//! 使用方法:
//!   # 只模拟不广播
//!   cargo run -p flash_arbitrage -- --dry-run
//!
//!   # 只跑一个周期
//!   cargo run -p flash_arbitrage -- --dry-run --once

mod bootstrap;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use utils::LoggerManager;

use crate::bootstrap::{setup_panic_hook, Application};

#[derive(Parser, Debug)]
#[command(name = "flash_arbitrage")]
#[command(about = "闪电贷跨场所套利机器人")]
pub struct Cli {
    /// 强制 dry-run (覆盖 DRY_RUN 配置)
    #[arg(long)]
    pub dry_run: bool,

    /// 只执行一个监控周期后退出
    #[arg(long)]
    pub once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 初始化日志系统
    let _logger = LoggerManager::init();

    // 设置 panic hook
    setup_panic_hook();

    info!("========================================");
    info!("  闪电贷套利机器人启动");
    info!("========================================");

    let app = Application::start(&cli).await?;
    if cli.once {
        app.run_once().await;
    } else {
        app.run().await;
    }
    app.shutdown();

    Ok(())
}
