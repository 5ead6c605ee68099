mod logger;
mod rpc_stats;

pub use logger::{log_file_for, LoggerManager};
pub use rpc_stats::{
    get_pipeline_stats, log_pipeline_stats, record_cycle, record_opportunity, record_rpc_request,
    record_settlement_reverted, record_simulation_failed, record_submission, PipelineStats,
    PipelineStatsSnapshot, RpcStatsProvider, StatsHttp,
};
