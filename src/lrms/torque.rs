//! Torque 后端
//!
//! 读取 `<spooldir>/server_priv/accounting/YYYYMMDD` 中的作业结束（`E`）记录。
//! 每行形如 `06/18/2012 00:41:29;E;123.server;user=alice queue=batch ...`。

use super::logfile::{DailyCursor, LogFormat, scan_daily_logs};
use super::{LrmsBackend, RunContext};
use crate::common::{is_numeric_id, parse_epoch, parse_hms};
use crate::config::TorqueConfig;
use crate::error::{BartError, Result};
use crate::usagerecord::UsageRecord;
use std::collections::HashMap;

/// 日志文件名的日期格式
pub const TORQUE_DATE_FORMAT: &str = "%Y%m%d";

/// VO 信息的来源标识
pub const VO_TYPE: &str = "bart-vomap";

/// 记录类型字符所在的位置（`MM/DD/YYYY HH:MM:SS;` 之后）
const ENTRY_TYPE_OFFSET: usize = 20;

/// 一条 Torque 记录：作业号、记录类型、用户以及全部 `key=value` 字段
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TorqueEntry {
    pub entry_type: String,
    pub job_id: String,
    pub user: String,
    pub fields: HashMap<String, String>,
}

impl TorqueEntry {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    fn require(&self, key: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| BartError::format_error(format!("Torque 作业 {} 缺少字段", self.job_id), key))
    }

    fn parse_count(&self, key: &str) -> Option<Result<u64>> {
        self.get(key).map(|v| {
            v.trim()
                .parse::<u64>()
                .map_err(|_| BartError::format_error(format!("Torque 字段 {key}"), v))
        })
    }
}

/// Torque 记帐日志格式
#[derive(Debug, Clone, Copy, Default)]
pub struct TorqueLogFormat;

impl LogFormat for TorqueLogFormat {
    type Entry = TorqueEntry;

    fn accept(&self, line: &str) -> bool {
        line.as_bytes().get(ENTRY_TYPE_OFFSET) == Some(&b'E')
    }

    fn split(&self, line: &str) -> Result<TorqueEntry> {
        let tokens: Vec<&str> = line.split(' ').collect();
        let head: Vec<&str> = tokens
            .get(1)
            .map(|t| t.split(';').collect())
            .unwrap_or_default();
        if head.len() < 4 {
            return Err(BartError::format_error("Torque 记录头", line));
        }
        let user = head[3]
            .split_once('=')
            .map(|(_, v)| v.to_string())
            .ok_or_else(|| BartError::format_error("Torque 记录用户", line))?;

        let mut fields = HashMap::new();
        for token in &tokens {
            // 记录头中的 user=... 也会在这里被收集
            let token = token.trim();
            let token = token.rsplit(';').next().unwrap_or(token);
            if let Some((key, value)) = token.split_once('=') {
                fields.insert(key.to_string(), value.to_string());
            }
        }

        Ok(TorqueEntry {
            entry_type: head[1].to_string(),
            job_id: head[2].to_string(),
            user,
            fields,
        })
    }

    fn entry_id<'e>(&self, entry: &'e TorqueEntry) -> &'e str {
        &entry.job_id
    }
}

/// 根据 `Resource_List.nodes` 计算核数
///
/// 语法：`{<节点数>|<主机名>}[:ppn=<每节点进程数>][:<属性>...][+...]`
pub fn core_count(nodes: &str) -> u64 {
    nodes
        .split('+')
        .map(|request| {
            let mut parts = request.split(':');
            let first = parts.next().unwrap_or_default();
            let node_count = first.parse::<u64>().unwrap_or(1);
            let ppn = parts
                .filter_map(|p| p.strip_prefix("ppn="))
                .find_map(|p| p.parse::<u64>().ok());
            node_count.saturating_mul(ppn.unwrap_or(1))
        })
        .fold(0, u64::saturating_add)
}

/// 处理器数量和节点数量，按 ncpus、nodes、mppwidth/size、执行主机数的顺序推断
fn resource_counts(entry: &TorqueEntry, hosts: usize) -> Result<(u64, u64)> {
    let job_id = entry.job_id.as_str();
    let host_count = hosts as u64;

    if let Some(ncpus) = entry.parse_count("Resource_List.ncpus") {
        return Ok((ncpus?, host_count));
    }
    if let Some(nodes) = entry.get("Resource_List.nodes") {
        return Ok((core_count(nodes), host_count));
    }

    // Cray 等系统使用 mppwidth，旧版本使用 size
    let width = entry
        .parse_count("Resource_List.mppwidth")
        .or_else(|| entry.parse_count("Resource_List.size"));
    if let Some(width) = width {
        let cores = width?;
        let node_count = match entry.parse_count("Resource_List.mppnodect") {
            Some(count) => count?,
            None => {
                tracing::warn!(job_id, "缺少 mppnodect，使用 核数/mppnppn 推算节点数");
                match entry.parse_count("Resource_List.mppnppn") {
                    Some(Ok(nppn)) if nppn > 0 => cores / nppn,
                    _ => {
                        tracing::warn!(job_id, "无法推算节点数，使用执行主机数");
                        host_count
                    }
                }
            }
        };
        return Ok((cores, node_count));
    }

    tracing::warn!(job_id, "缺少处理器数量，使用执行主机数");
    Ok((host_count, host_count))
}

/// Torque 后端
pub struct Torque {
    config: TorqueConfig,
    cursor: Option<DailyCursor>,
}

impl Torque {
    pub fn new(config: TorqueConfig) -> Self {
        Self { config, cursor: None }
    }

    /// 把一条 `E` 记录转换为 UR，返回 `None` 表示跳过
    pub fn create_usage_record(
        entry: &TorqueEntry,
        ctx: &mut RunContext<'_>,
    ) -> Result<Option<UsageRecord>> {
        let user_name = entry.user.as_str();
        if ctx.is_suppressed_user(user_name) {
            tracing::info!(job_id = %entry.job_id, user = user_name, "用户配置为不生成 UR");
            return Ok(None);
        }

        let submit_time = parse_epoch(entry.require("ctime")?)?;
        let start_time = parse_epoch(entry.require("start")?)?;
        let end_time = parse_epoch(entry.require("end")?)?;
        let cpu_time = parse_hms(entry.require("resources_used.cput")?)?;
        let wall_time = parse_hms(entry.require("resources_used.walltime")?)?;

        let mut hosts: Vec<&str> = Vec::new();
        for host in entry.get("exec_host").unwrap_or_default().split('+') {
            let host = host.split('/').next().unwrap_or_default();
            if !host.is_empty() && !hosts.contains(&host) {
                hosts.push(host);
            }
        }
        let (processors, node_count) = resource_counts(entry, hosts.len())?;

        let job_identifier = if is_numeric_id(&entry.job_id) {
            format!("{}.{}", entry.job_id, ctx.hostname)
        } else {
            entry.job_id.clone()
        };
        let fqdn_job_id = format!("{}:{}", ctx.hostname, job_identifier);

        let account = entry.get("account").filter(|a| !a.is_empty());

        let exit_code = match entry.get("Exit_status") {
            Some(v) => match v.trim().parse::<i32>() {
                Ok(code) => Some(code),
                Err(_) => {
                    tracing::error!(job_id = %entry.job_id, value = v, "无法解析 Exit_status");
                    None
                }
            },
            None => None,
        };

        let mut ur = UsageRecord::new();
        ur.record_id = Some(fqdn_job_id.clone());
        ur.local_job_id = Some(job_identifier);
        ur.global_job_id = Some(fqdn_job_id);
        ur.local_user_id = Some(user_name.to_string());
        ur.global_user_name = ctx.global_user_name(user_name);
        ur.vo_info.extend(ctx.vo_for(account, user_name, VO_TYPE));
        ur.machine_name = Some(ctx.hostname.clone());
        ur.queue = entry.get("queue").map(str::to_string);
        ur.project_name = account.map(str::to_string);
        ur.processors = Some(processors);
        ur.node_count = Some(node_count);
        if !hosts.is_empty() {
            ur.host = Some(hosts.join(","));
        }
        ur.submit_time = Some(submit_time);
        ur.start_time = Some(start_time);
        ur.end_time = Some(end_time);
        ur.cpu_duration = Some(cpu_time as f64);
        ur.wall_duration = Some(wall_time as f64);
        ur.exit_code = exit_code;

        Ok(Some(ur))
    }
}

impl LrmsBackend for Torque {
    fn name(&self) -> &'static str {
        "torque"
    }

    fn state_file(&self) -> &str {
        &self.config.statefile
    }

    fn parse_generator_state(&mut self, state: Option<&str>) {
        self.cursor = Some(DailyCursor::from_state(state, TORQUE_DATE_FORMAT));
    }

    fn create_generator_state(&self) -> String {
        self.cursor
            .clone()
            .unwrap_or_else(|| DailyCursor::from_state(None, TORQUE_DATE_FORMAT))
            .to_string()
    }

    fn generate_usage_records(&mut self, ctx: &mut RunContext<'_>) -> Result<usize> {
        let accounting_dir = self.config.spooldir.join("server_priv").join("accounting");
        let mut cursor = self
            .cursor
            .take()
            .unwrap_or_else(|| DailyCursor::from_state(None, TORQUE_DATE_FORMAT));

        let result = scan_daily_logs(
            &TorqueLogFormat,
            &accounting_dir,
            TORQUE_DATE_FORMAT,
            &mut cursor,
            ctx,
            Self::create_usage_record,
        );
        self.cursor = Some(cursor);

        let count = result?;
        tracing::info!(count, "Torque UR 生成完成");
        Ok(count)
    }
}
