//! BaRT：把批处理系统的记帐日志转换为 SGAS Usage Record
//!
//! 支持 Slurm（sacct 查询）、Torque（accounting 日志）和 Maui（stats 日志）。
//! 每次运行从上次的断点继续，每个作业只生成一次 UR。

pub mod common;
pub mod config;
pub mod error;
pub mod generator;
pub mod lrms;
pub mod mapfile;
pub mod state;
pub mod usagerecord;

// 日志初始化 - 需要 logging 功能
#[cfg(feature = "logging")]
pub mod logging;

pub use config::Config;
pub use error::{BartError, Result};
pub use generator::{RunSummary, run};
pub use mapfile::IdentityMap;
pub use usagerecord::UsageRecord;
