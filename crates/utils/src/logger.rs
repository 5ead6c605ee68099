use std::fs;
use tracing::Metadata;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::filter::{FilterFn, LevelFilter};
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, Layer, Registry};
use time::macros::offset;

const LOG_DIR: &str = "logs";

/// 按 target 分类的日志文件
const LOG_FILES: [&str; 5] = ["app.log", "strategy.log", "opportunity.log", "settlement.log", "rpc_stats.log"];

/// 根据 target 决定写入哪个日志文件
///
/// - strategy.log: 监控/模拟周期
/// - opportunity.log: 套利机会与提交执行
/// - settlement.log: 结算状态机与结算事件
/// - rpc_stats.log: RPC 与流水线计数
/// - app.log: 其余
pub fn log_file_for(target: &str) -> &'static str {
    match target {
        "strategy" => "strategy.log",
        "arbitrage_opportunity" | "arbitrage_execution" => "opportunity.log",
        "settlement" => "settlement.log",
        "rpc_stats" => "rpc_stats.log",
        _ => "app.log",
    }
}

/// 日志管理器 - 基于target分类的日志系统
pub struct LoggerManager {
    _guards: Vec<non_blocking::WorkerGuard>,
}

impl LoggerManager {
    /// 初始化日志系统 (控制台 + 按天滚动的分类文件)
    pub fn init() -> Self {
        fs::create_dir_all(LOG_DIR).ok();

        // 东八区时间
        let timer = OffsetTime::new(offset!(+8), time::format_description::well_known::Rfc3339);

        let mut guards = Vec::with_capacity(LOG_FILES.len());
        let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::with_capacity(LOG_FILES.len() + 1);

        // 控制台: INFO 以上，rpc_stats 的 DEBUG 细节只进文件
        layers.push(
            fmt::layer()
                .compact()
                .with_target(true)
                .with_timer(timer.clone())
                .with_filter(LevelFilter::INFO)
                .boxed(),
        );

        for file in LOG_FILES {
            let (writer, guard) = non_blocking(rolling::daily(LOG_DIR, file));
            guards.push(guard);

            let level = if file == "app.log" { LevelFilter::INFO } else { LevelFilter::DEBUG };
            layers.push(
                fmt::layer()
                    .compact()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(true)
                    .with_timer(timer.clone())
                    .with_filter(level)
                    .with_filter(FilterFn::new(move |metadata: &Metadata<'_>| {
                        log_file_for(metadata.target()) == file
                    }))
                    .boxed(),
            );
        }

        tracing_subscriber::registry().with(layers).init();

        Self { _guards: guards }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_routing() {
        assert_eq!(log_file_for("settlement"), "settlement.log");
        assert_eq!(log_file_for("arbitrage_execution"), "opportunity.log");
        assert_eq!(log_file_for("arbitrage_opportunity"), "opportunity.log");
        assert_eq!(log_file_for("strategy"), "strategy.log");
        assert_eq!(log_file_for("dex::uniswap::v3"), "app.log");
    }
}
