//! UR 生成流程
//!
//! 读取状态 → 后端定位日志 → 逐条生成并写出 UR → 保存状态。
//! 状态由后端通过 `RunContext` 保存：按天日志的后端每写出一条 UR 保存一次，
//! Slurm 只在本次写出过 UR 时保存。

use crate::config::Config;
use crate::error::Result;
use crate::lrms::{LrmsBackend, RunContext, create_backend};
use crate::mapfile::IdentityMap;
use crate::state::read_state;
use std::collections::BTreeSet;
use std::time::Instant;

/// 一次运行的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// 写出的 UR 数量
    pub records_written: usize,
    /// 没有用户映射的本地用户
    pub missing_user_mappings: BTreeSet<String>,
}

/// 按配置选择后端并运行
pub fn run(config: &Config) -> Result<RunSummary> {
    let mut backend = create_backend(config)?;
    tracing::info!(lrms = config.lrms()?.section(), "开始生成 UR");
    run_with_backend(config, backend.as_mut())
}

/// 使用给定的后端运行一次
///
/// # Errors
/// 映射文件无法读取时返回 `Config` 错误；UR 或状态文件写入失败时返回 IO 错误。
/// 单条记录的问题只记录日志，不会中止运行。
pub fn run_with_backend(config: &Config, backend: &mut dyn LrmsBackend) -> Result<RunSummary> {
    let start = Instant::now();

    let hostname = config.hostname()?;
    let user_map = IdentityMap::load(&config.common.usermap)?;
    let project_map = IdentityMap::load(&config.common.vomap)?;

    let state_path = config.common.statedir.join(backend.state_file());
    let state = read_state(&state_path)?;
    backend.parse_generator_state(state.as_deref());
    tracing::debug!(
        backend = backend.name(),
        state = %backend.create_generator_state(),
        "已读取状态"
    );

    let mut ctx = RunContext::new(hostname, &user_map, &project_map, config.ur_dir(), state_path);
    let records_written = backend.generate_usage_records(&mut ctx)?;

    let summary = RunSummary {
        records_written,
        missing_user_mappings: ctx.missing_user_mappings,
    };
    report_missing_mappings(&summary.missing_user_mappings, config.common.suppress_usermap_info);

    tracing::info!(
        backend = backend.name(),
        records = summary.records_written,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "UR 生成结束"
    );
    Ok(summary)
}

fn report_missing_mappings(missing: &BTreeSet<String>, suppressed: bool) {
    if missing.is_empty() || suppressed {
        return;
    }
    let users: Vec<&str> = missing.iter().map(String::as_str).collect();
    tracing::info!("以下用户没有映射: {}", users.join(", "));
}
