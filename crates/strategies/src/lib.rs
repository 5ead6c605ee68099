mod monitor;
mod path_builder;
mod runner;
mod simulator;

pub use monitor::{MonitorCycle, OpportunityMonitor, PoolGroup};
pub use path_builder::{build_triangular, build_two_venue_path, BuiltPath};
pub use runner::{CycleReport, StrategyRunner};
pub use simulator::{effective_probe, PreTradeSimulator, SimulationReport, SimulatorConfig};
