//! RPC 请求与套利流水线计数
//!
//! RPC 请求通过 `StatsHttp` 传输层自动计数，流水线计数由策略与执行模块调用

use ethers::providers::{Http, JsonRpcClient, Provider, ProviderError};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::VecDeque;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::info;
use url::Url;

/// 最近一分钟的 RPC 请求窗口
struct MinuteWindow {
    timestamps: Mutex<VecDeque<Instant>>,
}

impl MinuteWindow {
    fn new() -> Self {
        Self {
            timestamps: Mutex::new(VecDeque::with_capacity(1024)),
        }
    }

    fn record(&self, now: Instant) {
        let mut ts = self.timestamps.lock();
        ts.push_back(now);
        Self::evict(&mut ts, now);
    }

    fn count(&self, now: Instant) -> u64 {
        let mut ts = self.timestamps.lock();
        Self::evict(&mut ts, now);
        ts.len() as u64
    }

    fn evict(ts: &mut VecDeque<Instant>, now: Instant) {
        let Some(cutoff) = now.checked_sub(Duration::from_secs(60)) else {
            return;
        };
        while ts.front().map_or(false, |t| *t < cutoff) {
            ts.pop_front();
        }
    }
}

/// 流水线计数器
pub struct PipelineStats {
    start_time: Instant,
    rpc_window: MinuteWindow,
    rpc_total: AtomicU64,
    cycles: AtomicU64,
    opportunities: AtomicU64,
    simulations_failed: AtomicU64,
    submissions: AtomicU64,
    settlements_reverted: AtomicU64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            rpc_window: MinuteWindow::new(),
            rpc_total: AtomicU64::new(0),
            cycles: AtomicU64::new(0),
            opportunities: AtomicU64::new(0),
            simulations_failed: AtomicU64::new(0),
            submissions: AtomicU64::new(0),
            settlements_reverted: AtomicU64::new(0),
        }
    }

    pub fn record_rpc(&self) {
        self.rpc_total.fetch_add(1, Ordering::Relaxed);
        self.rpc_window.record(Instant::now());
    }

    pub fn record_cycle(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_opportunity(&self) {
        self.opportunities.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_simulation_failed(&self) {
        self.simulations_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_submission(&self) {
        self.submissions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_settlement_reverted(&self) {
        self.settlements_reverted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PipelineStatsSnapshot {
        let uptime = self.start_time.elapsed().as_secs();
        let rpc_total = self.rpc_total.load(Ordering::Relaxed);
        PipelineStatsSnapshot {
            uptime_seconds: uptime,
            rpc_total,
            rpc_last_1m: self.rpc_window.count(Instant::now()),
            rpc_avg_per_sec: if uptime > 0 { rpc_total as f64 / uptime as f64 } else { 0.0 },
            cycles: self.cycles.load(Ordering::Relaxed),
            opportunities: self.opportunities.load(Ordering::Relaxed),
            simulations_failed: self.simulations_failed.load(Ordering::Relaxed),
            submissions: self.submissions.load(Ordering::Relaxed),
            settlements_reverted: self.settlements_reverted.load(Ordering::Relaxed),
        }
    }

    pub fn log(&self) {
        let s = self.snapshot();
        info!(
            target: "rpc_stats",
            uptime_secs = s.uptime_seconds,
            rpc_1m = s.rpc_last_1m,
            rpc_total = s.rpc_total,
            rpc_avg = format!("{:.2}", s.rpc_avg_per_sec),
            cycles = s.cycles,
            opportunities = s.opportunities,
            simulations_failed = s.simulations_failed,
            submissions = s.submissions,
            reverted = s.settlements_reverted,
            "流水线统计"
        );
    }
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

/// 统计快照
#[derive(Debug, Clone)]
pub struct PipelineStatsSnapshot {
    pub uptime_seconds: u64,
    pub rpc_total: u64,
    pub rpc_last_1m: u64,
    pub rpc_avg_per_sec: f64,
    pub cycles: u64,
    pub opportunities: u64,
    pub simulations_failed: u64,
    pub submissions: u64,
    pub settlements_reverted: u64,
}

impl std::fmt::Display for PipelineStatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "运行{}s | RPC: {}次(avg {:.2}/s) | 周期: {} | 机会: {} | 模拟失败: {} | 提交: {}",
            self.uptime_seconds,
            self.rpc_total,
            self.rpc_avg_per_sec,
            self.cycles,
            self.opportunities,
            self.simulations_failed,
            self.submissions,
        )
    }
}

/// 全局统计实例
static PIPELINE_STATS: Lazy<PipelineStats> = Lazy::new(PipelineStats::new);

pub fn record_rpc_request() {
    PIPELINE_STATS.record_rpc();
}

pub fn record_cycle() {
    PIPELINE_STATS.record_cycle();
}

pub fn record_opportunity() {
    PIPELINE_STATS.record_opportunity();
}

pub fn record_simulation_failed() {
    PIPELINE_STATS.record_simulation_failed();
}

pub fn record_submission() {
    PIPELINE_STATS.record_submission();
}

pub fn record_settlement_reverted() {
    PIPELINE_STATS.record_settlement_reverted();
}

pub fn get_pipeline_stats() -> PipelineStatsSnapshot {
    PIPELINE_STATS.snapshot()
}

pub fn log_pipeline_stats() {
    PIPELINE_STATS.log();
}

/// 带统计功能的 HTTP 传输层
#[derive(Debug, Clone)]
pub struct StatsHttp {
    inner: Http,
}

impl StatsHttp {
    pub fn new(url: &str) -> Result<Self, ProviderError> {
        let parsed: Url = url
            .parse()
            .map_err(|e| ProviderError::CustomError(format!("Invalid URL: {}", e)))?;
        Ok(Self { inner: Http::new(parsed) })
    }
}

#[async_trait::async_trait]
impl JsonRpcClient for StatsHttp {
    type Error = <Http as JsonRpcClient>::Error;

    async fn request<T, R>(&self, method: &str, params: T) -> Result<R, Self::Error>
    where
        T: Debug + Serialize + Send + Sync,
        R: DeserializeOwned + Send,
    {
        record_rpc_request();
        JsonRpcClient::request(&self.inner, method, params).await
    }
}

/// 带统计的 Provider，附带定时输出统计的后台任务
pub struct RpcStatsProvider {
    provider: Arc<Provider<StatsHttp>>,
    log_task: Option<JoinHandle<()>>,
}

impl RpcStatsProvider {
    /// `log_interval_secs` 为 0 时不启动定时任务
    pub fn new(url: &str, log_interval_secs: u64) -> Result<Self, ProviderError> {
        let provider = Arc::new(Provider::new(StatsHttp::new(url)?));

        let log_task = (log_interval_secs > 0).then(|| {
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(log_interval_secs));
                loop {
                    interval.tick().await;
                    log_pipeline_stats();
                }
            })
        });

        Ok(Self { provider, log_task })
    }

    pub fn provider(&self) -> Arc<Provider<StatsHttp>> {
        self.provider.clone()
    }

    /// 输出最终统计并停止定时任务
    pub fn stop(&mut self) {
        log_pipeline_stats();
        if let Some(handle) = self.log_task.take() {
            handle.abort();
        }
    }
}

impl Drop for RpcStatsProvider {
    fn drop(&mut self) {
        if let Some(handle) = self.log_task.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_counters() {
        let stats = PipelineStats::new();
        for _ in 0..3 {
            stats.record_rpc();
        }
        stats.record_cycle();
        stats.record_opportunity();
        stats.record_simulation_failed();

        let s = stats.snapshot();
        assert_eq!(s.rpc_total, 3);
        assert_eq!(s.rpc_last_1m, 3);
        assert_eq!(s.cycles, 1);
        assert_eq!(s.opportunities, 1);
        assert_eq!(s.simulations_failed, 1);
        assert_eq!(s.submissions, 0);
    }
}
