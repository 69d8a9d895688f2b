//! 各批处理系统共用的工具函数

use crate::error::{BartError, Result};
use crate::usagerecord::UsageRecord;
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use std::path::{Path, PathBuf};

/// `get_seconds` 无法解析时的返回值
pub const INVALID_SECONDS: i64 = -1;

/// Slurm 等系统使用的本地时间格式
pub const LOCAL_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

fn clock_part(value: &str, max: Option<i64>) -> Option<i64> {
    if value.is_empty() || value.len() > 2 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let n: i64 = value.parse().ok()?;
    match max {
        Some(max) if n > max => None,
        _ => Some(n),
    }
}

/// 把 `[天-]时:分:秒[.小数]` 或 `分:秒[.小数]` 转换为秒数
///
/// 小数部分直接截断。格式不正确时返回 `INVALID_SECONDS`（-1）并记录日志。
///
/// # Examples
///
/// ```
/// use bart_logger::common::get_seconds;
///
/// assert_eq!(get_seconds("5-00:00:26"), 432026);
/// assert_eq!(get_seconds("2:3.1"), 123);
/// assert_eq!(get_seconds("1:a:3"), -1);
/// ```
pub fn get_seconds(value: &str) -> i64 {
    match parse_clock(value) {
        Some(seconds) => seconds,
        None => {
            tracing::info!(value, "时间字符串格式不正确");
            INVALID_SECONDS
        }
    }
}

fn parse_clock(value: &str) -> Option<i64> {
    let value = value.split('.').next().unwrap_or_default();

    let (days, clock) = match value.split_once('-') {
        Some((days, clock)) => {
            if days.is_empty() || !days.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            (days.parse::<i64>().ok()?, clock)
        }
        None => (0, value),
    };

    let parts: Vec<&str> = clock.split(':').collect();
    let seconds = match parts.as_slice() {
        [h, m, s] => {
            clock_part(h, Some(23))? * 3600
                + clock_part(m, Some(59))? * 60
                + clock_part(s, Some(61))?
        }
        // 带天数时必须是完整的 时:分:秒
        [m, s] if days == 0 && !value.contains('-') => {
            clock_part(m, Some(59))? * 60 + clock_part(s, Some(61))?
        }
        _ => return None,
    };
    Some(days * 86_400 + seconds)
}

/// 解析 `HH:MM:SS` 形式的资源用量（小时数不限两位）
pub fn parse_hms(value: &str) -> Result<i64> {
    let parts: Vec<&str> = value.trim().split(':').collect();
    let [h, m, s] = parts.as_slice() else {
        return Err(BartError::format_error("HH:MM:SS 时长", value));
    };
    let parse = |v: &str| {
        v.parse::<i64>()
            .map_err(|_| BartError::format_error("HH:MM:SS 时长", value))
    };
    Ok(parse(h)? * 3600 + parse(m)? * 60 + parse(s)?)
}

/// 把本地时间字符串（可带小数秒）转换为 UTC
pub fn local_to_utc(value: &str) -> Result<DateTime<Utc>> {
    let trimmed = value.split('.').next().unwrap_or_default();
    let naive = NaiveDateTime::parse_from_str(trimmed, LOCAL_TIME_FORMAT)
        .map_err(|_| BartError::format_error("本地时间", value))?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| BartError::format_error("本地时间不存在", value))
}

/// epoch 秒转换为 UTC 时间
pub fn epoch_to_utc(epoch: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(epoch, 0)
        .ok_or_else(|| BartError::format_error("epoch 时间", epoch.to_string()))
}

/// 解析字符串形式的 epoch 秒
pub fn parse_epoch(value: &str) -> Result<DateTime<Utc>> {
    let epoch = value
        .trim()
        .parse::<i64>()
        .map_err(|_| BartError::format_error("epoch 时间", value))?;
    epoch_to_utc(epoch)
}

/// 去掉标点的紧凑时间戳，如 `20120612224103`
pub fn compact_timestamp(time: &DateTime<Utc>) -> String {
    time.format("%Y%m%d%H%M%S").to_string()
}

/// 按给定格式返回后一天的日期字符串
pub fn incremental_date(date: &str, format: &str) -> Result<String> {
    let day = NaiveDate::parse_from_str(date, format)
        .map_err(|_| BartError::format_error("日志日期", date))?;
    let next = day
        .succ_opt()
        .ok_or_else(|| BartError::format_error("日志日期超出范围", date))?;
    Ok(next.format(format).to_string())
}

/// 作业号是否为纯数字
pub fn is_numeric_id(job_id: &str) -> bool {
    !job_id.is_empty() && job_id.bytes().all(|b| b.is_ascii_digit())
}

/// 把 UR 写入输出目录，文件名为 record_id
///
/// 输出目录不存在时自动创建。
pub fn write_ur(ur: &UsageRecord, ur_dir: &Path) -> Result<PathBuf> {
    let record_id = ur
        .record_id
        .as_deref()
        .ok_or_else(|| BartError::invariant("UsageRecord 缺少 record_id，无法写出"))?;
    if !ur_dir.exists() {
        std::fs::create_dir_all(ur_dir)?;
    }
    let path = ur_dir.join(record_id);
    ur.write_xml(&path)?;
    tracing::info!(path = %path.display(), "已写出 UR");
    Ok(path)
}
