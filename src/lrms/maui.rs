//! Maui 后端
//!
//! 读取 `<spooldir>/stats/<Www_Mmm_DD_YYYY>` 中的作业统计，每行 44 个以空白分隔的字段。

use super::logfile::{DailyCursor, LogFormat, scan_daily_logs};
use super::{LrmsBackend, RunContext};
use crate::common::{epoch_to_utc, is_numeric_id};
use crate::config::MauiConfig;
use crate::error::{BartError, Result};
use crate::usagerecord::UsageRecord;
use std::path::Path;

/// 统计文件名的日期格式
pub const MAUI_DATE_FORMAT: &str = "%a_%b_%d_%Y";

/// 统计文件所在子目录
pub const STATS_DIR: &str = "stats";

/// Maui 配置文件名
pub const MAUI_CFG_FILE: &str = "maui.cfg";

/// VO 信息的来源标识
pub const VO_TYPE: &str = "bart-vomap";

/// 每条记录的字段数
pub const FIELD_COUNT: usize = 44;

// 字段位置
const JOB_ID: usize = 0;
const USER: usize = 3;
const JOB_STATE: usize = 6;
const REQ_CLASS: usize = 7;
const SUBMIT_TIME: usize = 8;
const START_TIME: usize = 10;
const END_TIME: usize = 11;
const ALLOC_TASKS: usize = 21;
const ACCOUNT: usize = 25;
const UTILIZED_CPU: usize = 29;
const PROCS_PER_TASK: usize = 31;
const HOSTS: usize = 37;

/// Maui 统计文件格式
#[derive(Debug, Clone, Copy, Default)]
pub struct MauiLogFormat;

impl LogFormat for MauiLogFormat {
    type Entry = Vec<String>;

    fn accept(&self, line: &str) -> bool {
        // 文件以 VERSION 行开头，有时还有说明性的注释行
        !(line.starts_with("VERSION") || line.starts_with('#') || line.trim().is_empty())
    }

    fn split(&self, line: &str) -> Result<Vec<String>> {
        let fields: Vec<String> = line.split_whitespace().map(String::from).collect();
        if fields.len() != FIELD_COUNT {
            return Err(BartError::format_error(
                format!(
                    "Maui 记录字段数为 {}，第一个字段 {}",
                    fields.len(),
                    fields.first().map(String::as_str).unwrap_or_default()
                ),
                line,
            ));
        }
        Ok(fields)
    }

    fn entry_id<'e>(&self, entry: &'e Vec<String>) -> &'e str {
        &entry[JOB_ID]
    }
}

/// 从 `maui.cfg` 读取 SERVERHOST
pub fn read_server_host(spool_dir: &Path) -> Option<String> {
    const SERVERHOST: &str = "SERVERHOST";
    let path = spool_dir.join(MAUI_CFG_FILE);
    let host = std::fs::read_to_string(&path).ok().and_then(|content| {
        content
            .lines()
            .map(str::trim)
            .find_map(|line| line.strip_prefix(SERVERHOST))
            .map(|rest| rest.trim().to_string())
            .filter(|h| !h.is_empty())
    });
    if host.is_none() {
        tracing::warn!(path = %path.display(), "无法获取 Maui 服务器主机名");
    }
    host
}

/// 去掉 `[batch:1]` 中的方括号和冒号后缀
pub fn clean_queue(req_class: &str) -> String {
    let queue = req_class.replace(['[', ']'], "");
    match queue.split_once(':') {
        Some((name, _)) => name.to_string(),
        None => queue,
    }
}

/// CPU 时间修正
///
/// Linux 上编译的 Maui 会把主节点的 CPU 时间乘以任务数，而较新的 Torque 已经上报了
/// 正确的总 CPU 时间，两者叠加后并行作业的 CPU 时间会偏高。CPU 时间超过
/// 墙钟时间 × 任务数时除以任务数。效率很低的作业无法被这个规则识别。
pub fn correct_cpu_time(utilized_cpu: f64, wall_time: f64, tasks: u64) -> f64 {
    if tasks > 0 && utilized_cpu > wall_time * tasks as f64 {
        utilized_cpu / tasks as f64
    } else {
        utilized_cpu
    }
}

fn field<T: std::str::FromStr>(entry: &[String], index: usize, name: &str) -> Result<T> {
    entry[index]
        .parse::<T>()
        .map_err(|_| BartError::format_error(format!("Maui 字段 {name}"), entry[index].as_str()))
}

/// 把一条 Maui 记录转换为 UR，返回 `None` 表示跳过
pub fn create_usage_record(
    entry: &[String],
    server_host: Option<&str>,
    ctx: &mut RunContext<'_>,
) -> Result<Option<UsageRecord>> {
    if entry.len() != FIELD_COUNT {
        return Err(BartError::format_error(
            format!("Maui 记录字段数应为 {FIELD_COUNT}"),
            entry.len().to_string(),
        ));
    }
    let job_id = entry[JOB_ID].as_str();
    let user_name = entry[USER].as_str();
    let job_state = entry[JOB_STATE].as_str();

    if job_state != "Completed" {
        tracing::info!(job_id, state = job_state, "作业未完成，跳过");
        return Ok(None);
    }
    if ctx.is_suppressed_user(user_name) {
        tracing::info!(job_id, user = user_name, "用户配置为不生成 UR");
        return Ok(None);
    }

    let submit_time = epoch_to_utc(field(entry, SUBMIT_TIME, "submit")?)?;
    let start: i64 = field(entry, START_TIME, "start")?;
    let end: i64 = field(entry, END_TIME, "end")?;
    let alloc_tasks: u64 = field(entry, ALLOC_TASKS, "tasks")?;
    let utilized_cpu: f64 = field(entry, UTILIZED_CPU, "utilized cpu")?;
    let procs_per_task: u64 = field(entry, PROCS_PER_TASK, "procs")?;
    let hosts: Vec<&str> = entry[HOSTS].split(':').collect();

    let job_identifier = match server_host {
        Some(server) if is_numeric_id(job_id) => format!("{job_id}.{server}"),
        _ => job_id.to_string(),
    };
    let fqdn_job_id = format!("{}:{}", ctx.hostname, job_identifier);

    let account = Some(entry[ACCOUNT].as_str()).filter(|a| *a != "[NONE]" && !a.is_empty());

    let wall_time = end
        .checked_sub(start)
        .ok_or_else(|| BartError::format_error("Maui 墙钟时间溢出", format!("{start}..{end}")))?
        as f64;
    let cpu_time = correct_cpu_time(utilized_cpu, wall_time, alloc_tasks);
    if cpu_time != utilized_cpu {
        tracing::warn!(job_id, utilized_cpu, cpu_time, "CPU 时间超过墙钟时间 × 任务数，已按任务数修正");
    }

    let mut ur = UsageRecord::new();
    ur.record_id = Some(fqdn_job_id.clone());
    ur.local_job_id = Some(job_identifier);
    ur.global_job_id = Some(fqdn_job_id);
    ur.local_user_id = Some(user_name.to_string());
    ur.global_user_name = ctx.global_user_name(user_name);
    ur.vo_info.extend(ctx.vo_for(account, user_name, VO_TYPE));
    ur.machine_name = Some(ctx.hostname.clone());
    ur.queue = Some(clean_queue(&entry[REQ_CLASS]));
    ur.processors = Some(procs_per_task.checked_mul(alloc_tasks).ok_or_else(|| {
        BartError::format_error("Maui 处理器数溢出", format!("{procs_per_task}x{alloc_tasks}"))
    })?);
    ur.node_count = Some(hosts.len() as u64);
    ur.host = Some(hosts.join(","));
    ur.submit_time = Some(submit_time);
    ur.start_time = Some(epoch_to_utc(start)?);
    ur.end_time = Some(epoch_to_utc(end)?);
    ur.cpu_duration = Some(cpu_time);
    ur.wall_duration = Some(wall_time);
    ur.project_name = account.map(str::to_string);

    Ok(Some(ur))
}

/// Maui 后端
pub struct Maui {
    config: MauiConfig,
    cursor: Option<DailyCursor>,
}

impl Maui {
    pub fn new(config: MauiConfig) -> Self {
        Self { config, cursor: None }
    }
}

impl LrmsBackend for Maui {
    fn name(&self) -> &'static str {
        "maui"
    }

    fn state_file(&self) -> &str {
        &self.config.statefile
    }

    fn parse_generator_state(&mut self, state: Option<&str>) {
        self.cursor = Some(DailyCursor::from_state(state, MAUI_DATE_FORMAT));
    }

    fn create_generator_state(&self) -> String {
        self.cursor
            .clone()
            .unwrap_or_else(|| DailyCursor::from_state(None, MAUI_DATE_FORMAT))
            .to_string()
    }

    fn generate_usage_records(&mut self, ctx: &mut RunContext<'_>) -> Result<usize> {
        let server_host = read_server_host(&self.config.spooldir);
        let stats_dir = self.config.spooldir.join(STATS_DIR);
        let mut cursor = self
            .cursor
            .take()
            .unwrap_or_else(|| DailyCursor::from_state(None, MAUI_DATE_FORMAT));

        let result = scan_daily_logs(
            &MauiLogFormat,
            &stats_dir,
            MAUI_DATE_FORMAT,
            &mut cursor,
            ctx,
            |entry: &Vec<String>, ctx: &mut RunContext<'_>| {
                create_usage_record(entry, server_host.as_deref(), ctx)
            },
        );
        self.cursor = Some(cursor);

        let count = result?;
        tracing::info!(count, "Maui UR 生成完成");
        Ok(count)
    }
}
