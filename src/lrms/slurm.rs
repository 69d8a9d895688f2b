//! Slurm 后端
//!
//! 每次运行用 sacct 查询一个时间窗口内结束的作业。状态为上一个窗口的结束时间
//! （本地时间，`%Y-%m-%dT%H:%M:%S`），只有写出过 UR 时才会前移。

use super::nodes::expand_node_list;
use super::{LrmsBackend, RunContext};
use crate::common::{self, INVALID_SECONDS, LOCAL_TIME_FORMAT, compact_timestamp, local_to_utc};
use crate::config::{ProcessorSource, SlurmConfig};
use crate::error::{BartError, Result};
use crate::usagerecord::UsageRecord;
use chrono::{Duration, Local, NaiveDateTime};
use nix::unistd::{Uid, User};
use std::process::Command;

/// sacct 输出的列
pub const SACCT_FORMAT: &str =
    "JobID,UID,Partition,Submit,Start,End,Account,Elapsed,UserCPU,AllocCPUS,NodeList,AllocTRES";

/// 只查询已经结束的作业：取消、完成、失败、节点失败、超时
pub const SACCT_STATES: &str = "ca,cd,f,nf,to";

/// VO 信息的来源标识
pub const VO_TYPE: &str = "lrmsurgen-projectmap";

/// 没有分配节点时 sacct 输出的占位文本
const NO_NODES: &str = "None assigned";

/// 按时间窗口查询作业记帐数据
pub trait AccountingQuery {
    /// 返回查询的完整标准输出（第一行为表头）
    fn query(&self, start: &str, end: &str) -> Result<String>;
}

/// 调用 sacct 命令查询
#[derive(Debug, Clone)]
pub struct SacctCommand {
    program: String,
}

impl SacctCommand {
    pub fn new<S: Into<String>>(program: S) -> Self {
        Self { program: program.into() }
    }
}

impl AccountingQuery for SacctCommand {
    fn query(&self, start: &str, end: &str) -> Result<String> {
        tracing::debug!(program = %self.program, start, end, "执行 sacct 查询");
        let output = Command::new(&self.program)
            .arg("--allusers")
            .arg("--parsable2")
            .arg(format!("--format={SACCT_FORMAT}"))
            .arg(format!("--state={SACCT_STATES}"))
            .arg(format!("--starttime={start}"))
            .arg(format!("--endtime={end}"))
            .output()
            .map_err(|e| BartError::source_unavailable(self.program.clone(), e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BartError::source_unavailable(
                self.program.clone(),
                format!("{}: {}", output.status, stderr.trim()),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// sacct 输出的一行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlurmEntry {
    pub job_id: String,
    pub uid: String,
    pub partition: String,
    pub submit: String,
    pub start: String,
    pub end: String,
    pub account: String,
    pub elapsed: String,
    pub user_cpu: String,
    pub alloc_cpus: String,
    pub node_list: String,
    pub alloc_tres: Option<String>,
}

impl SlurmEntry {
    /// 解析 `|` 分隔的一行，至少需要 11 列（AllocTRES 可选）
    pub fn parse(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.trim_end_matches(['\r', '\n']).split('|').collect();
        if fields.len() < 11 {
            return Err(BartError::format_error(
                format!("sacct 输出列数 {}", fields.len()),
                line,
            ));
        }
        let field = |i: usize| fields[i].trim().to_string();
        Ok(Self {
            job_id: field(0),
            uid: field(1),
            partition: field(2),
            submit: field(3),
            start: field(4),
            end: field(5),
            account: field(6),
            elapsed: field(7),
            user_cpu: field(8),
            alloc_cpus: field(9),
            node_list: field(10),
            alloc_tres: fields.get(11).map(|s| s.trim().to_string()),
        })
    }

    /// 作业步骤没有 UID 或分区
    pub fn is_job_step(&self) -> bool {
        self.uid.is_empty() || self.partition.is_empty()
    }
}

/// 把 UID 解析为用户名，查不到时使用 UID 本身
pub fn resolve_user(uid: &str) -> String {
    let Ok(raw) = uid.parse::<u32>() else {
        return uid.to_string();
    };
    match User::from_uid(Uid::from_raw(raw)) {
        Ok(Some(user)) => user.name,
        Ok(None) => uid.to_string(),
        Err(e) => {
            tracing::warn!(uid, error = %e, "无法查询用户数据库");
            uid.to_string()
        }
    }
}

/// 从 `cpu=96,mem=500G,node=2` 中取 cpu 数量
pub fn tres_cpu_count(tres: &str) -> Option<u64> {
    tres.split(',')
        .filter_map(|item| item.split_once('='))
        .find(|(key, _)| key.trim() == "cpu")
        .and_then(|(_, value)| value.trim().parse().ok())
}

/// 计算查询窗口的结束时间
///
/// 距上次结束时间超过 `max_days` 天时，窗口只前移 `max_days` 天；`max_days` 为 0 表示不限制。
pub fn window_end(start: &str, now: NaiveDateTime, max_days: u32) -> Result<String> {
    let start_time = parse_state_time(start)?;
    let max_window = Duration::days(i64::from(max_days));
    let end = if max_days > 0 && now - start_time > max_window {
        start_time + max_window
    } else {
        now
    };
    Ok(end.format(LOCAL_TIME_FORMAT).to_string())
}

fn parse_state_time(value: &str) -> Result<NaiveDateTime> {
    let trimmed = value.split('.').next().unwrap_or_default();
    NaiveDateTime::parse_from_str(trimmed, LOCAL_TIME_FORMAT)
        .map_err(|_| BartError::format_error("Slurm 状态时间", value))
}

fn seconds(value: &str) -> Option<f64> {
    match common::get_seconds(value) {
        INVALID_SECONDS => None,
        s => Some(s as f64),
    }
}

/// Slurm 后端
pub struct Slurm<Q: AccountingQuery> {
    config: SlurmConfig,
    query: Q,
    state: Option<String>,
}

impl<Q: AccountingQuery> Slurm<Q> {
    pub fn new(config: SlurmConfig, query: Q) -> Self {
        Self { config, query, state: None }
    }

    fn default_state(&self) -> String {
        let now = Local::now().naive_local();
        let start = i64::try_from(self.config.statefile_default)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|back| now.checked_sub_signed(back))
            .unwrap_or_else(|| {
                tracing::warn!(
                    statefile_default = self.config.statefile_default,
                    "statefile_default 超出时间范围，从当前时间开始"
                );
                now
            });
        start.format(LOCAL_TIME_FORMAT).to_string()
    }

    fn processors(&self, entry: &SlurmEntry) -> Option<u64> {
        let alloc_cpus = || entry.alloc_cpus.parse::<u64>().ok();
        match self.config.processors {
            ProcessorSource::AllocCpus => alloc_cpus(),
            ProcessorSource::Tres => {
                match entry.alloc_tres.as_deref().and_then(tres_cpu_count) {
                    Some(count) => Some(count),
                    None => {
                        tracing::warn!(job_id = %entry.job_id, "AllocTRES 中没有 cpu 数量，使用 AllocCPUS");
                        alloc_cpus()
                    }
                }
            }
        }
    }

    /// 把一条 sacct 记录转换为 UR，返回 `None` 表示跳过
    pub fn create_usage_record(
        &self,
        entry: &SlurmEntry,
        ctx: &mut RunContext<'_>,
    ) -> Result<Option<UsageRecord>> {
        if entry.is_job_step() {
            return Ok(None);
        }

        let user_name = resolve_user(&entry.uid);
        if ctx.is_suppressed_user(&user_name) {
            tracing::info!(job_id = %entry.job_id, user = %user_name, "用户配置为不生成 UR");
            return Ok(None);
        }

        let submit_time = local_to_utc(&entry.submit)?;
        let start_time = local_to_utc(&entry.start)?;
        let end_time = local_to_utc(&entry.end)?;

        let fqdn_job_id = format!("{}:{}", ctx.hostname, entry.job_id);
        let record_id = if self.config.idtimestamp {
            format!("{fqdn_job_id}:{}", compact_timestamp(&start_time))
        } else {
            fqdn_job_id.clone()
        };

        let hosts = if entry.node_list.is_empty() || entry.node_list == NO_NODES {
            Vec::new()
        } else {
            expand_node_list(&entry.node_list)
        };

        let account = (!entry.account.is_empty()).then_some(entry.account.as_str());

        let mut ur = UsageRecord::new();
        ur.record_id = Some(record_id);
        ur.local_job_id = Some(entry.job_id.clone());
        ur.global_job_id = Some(fqdn_job_id);
        ur.global_user_name = ctx.global_user_name(&user_name);
        ur.vo_info.extend(ctx.vo_for(account, &user_name, VO_TYPE));
        ur.local_user_id = Some(user_name);
        ur.machine_name = Some(ctx.hostname.clone());
        ur.queue = Some(entry.partition.clone());
        ur.processors = self.processors(entry);
        if !hosts.is_empty() {
            ur.node_count = Some(hosts.len() as u64);
            ur.host = Some(hosts.join(","));
        }
        ur.submit_time = Some(submit_time);
        ur.start_time = Some(start_time);
        ur.end_time = Some(end_time);
        ur.cpu_duration = seconds(&entry.user_cpu);
        ur.wall_duration = seconds(&entry.elapsed);
        ur.project_name = account.map(str::to_string);

        Ok(Some(ur))
    }
}

impl<Q: AccountingQuery> LrmsBackend for Slurm<Q> {
    fn name(&self) -> &'static str {
        "slurm"
    }

    fn state_file(&self) -> &str {
        &self.config.statefile
    }

    fn parse_generator_state(&mut self, state: Option<&str>) {
        let state = match state.map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) if parse_state_time(s).is_ok() => s.to_string(),
            Some(s) => {
                tracing::warn!(state = s, "状态文件中的时间无法识别，使用默认起始时间");
                self.default_state()
            }
            None => self.default_state(),
        };
        self.state = Some(state);
    }

    fn create_generator_state(&self) -> String {
        self.state.clone().unwrap_or_else(|| self.default_state())
    }

    fn generate_usage_records(&mut self, ctx: &mut RunContext<'_>) -> Result<usize> {
        let start = self.create_generator_state();
        let end = window_end(&start, Local::now().naive_local(), self.config.max_days)?;

        let output = match self.query.query(&start, &end) {
            Ok(output) => output,
            Err(e) if e.is_source_unavailable() => {
                tracing::error!(start, end, error = %e, "sacct 查询失败");
                return Ok(0);
            }
            Err(e) => return Err(e),
        };

        let mut count = 0;
        // 第一行是表头
        for line in output.lines().skip(1) {
            if line.trim().is_empty() {
                continue;
            }
            let entry = match SlurmEntry::parse(line) {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::error!(error = %e, "sacct 输出格式错误，跳过该行");
                    continue;
                }
            };
            match self.create_usage_record(&entry, ctx) {
                Ok(Some(ur)) => {
                    ctx.write_ur(&ur)?;
                    count += 1;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(job_id = %entry.job_id, error = %e, "无法生成 UR，跳过该作业");
                }
            }
        }

        // 没有写出任何 UR 时保留旧状态，下次重新查询这个窗口
        if count > 0 {
            ctx.persist_state(&end)?;
            self.state = Some(end);
        }

        tracing::info!(count, "Slurm UR 生成完成");
        Ok(count)
    }
}
