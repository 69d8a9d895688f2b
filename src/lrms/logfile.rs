//! 按天滚动的日志文件读取
//!
//! 每个日志单元是一个以日期命名的文件。读取是单向的：文件在第一次读取时才打开，
//! 打开失败返回 `SourceUnavailable`，由调用方决定是否为错误（当天的文件可能尚未创建）。

use super::RunContext;
use crate::common::incremental_date;
use crate::error::{BartError, Result};
use crate::usagerecord::UsageRecord;
use chrono::{NaiveDate, Utc};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// 一种按行记录的日志格式
pub trait LogFormat {
    /// 一行解析后的条目
    type Entry;

    /// 该行是否为需要处理的条目（注释、版本行等返回 false）
    fn accept(&self, line: &str) -> bool;

    /// 把一行拆分为条目，格式不符时返回 `Format` 错误
    fn split(&self, line: &str) -> Result<Self::Entry>;

    /// 条目的作业号，用于断点定位
    fn entry_id<'e>(&self, entry: &'e Self::Entry) -> &'e str;
}

/// 单个日志文件的单向读取器
pub struct LogFileParser<'f, F: LogFormat> {
    format: &'f F,
    path: PathBuf,
    reader: Option<BufReader<File>>,
    line_num: usize,
}

impl<'f, F: LogFormat> LogFileParser<'f, F> {
    pub fn new<P: Into<PathBuf>>(format: &'f F, path: P) -> Self {
        Self { format, path: path.into(), reader: None, line_num: 0 }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn reader(&mut self) -> Result<&mut BufReader<File>> {
        if self.reader.is_none() {
            let file = File::open(&self.path).map_err(|e| {
                BartError::source_unavailable(self.path.display().to_string(), e.to_string())
            })?;
            self.reader = Some(BufReader::new(file));
        }
        self.reader
            .as_mut()
            .ok_or_else(|| BartError::invariant("日志文件未打开"))
    }

    /// 读取下一行，文件读完返回 `None`
    ///
    /// 不是有效 UTF-8 的字节按替换字符处理，整行仍交给格式解析。
    fn read_line(&mut self) -> Result<Option<String>> {
        let mut buf = Vec::new();
        if self.reader()?.read_until(b'\n', &mut buf)? == 0 {
            return Ok(None);
        }
        self.line_num += 1;
        while matches!(buf.last(), Some(b'\n' | b'\r')) {
            buf.pop();
        }
        let line = match String::from_utf8(buf) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(
                    file = %self.path.display(),
                    line = self.line_num,
                    "日志行不是有效的 UTF-8，按替换字符处理"
                );
                String::from_utf8_lossy(e.as_bytes()).into_owned()
            }
        };
        Ok(Some(line))
    }

    /// 下一条条目，文件读完返回 `None`
    ///
    /// 格式不符的行记录错误后跳过。
    pub fn next_entry(&mut self) -> Result<Option<F::Entry>> {
        let format = self.format;
        loop {
            let Some(line) = self.read_line()? else {
                return Ok(None);
            };
            if !format.accept(&line) {
                continue;
            }
            match format.split(&line) {
                Ok(entry) => return Ok(Some(entry)),
                Err(e) => {
                    tracing::error!(
                        file = %self.path.display(),
                        line = self.line_num,
                        error = %e,
                        "日志行格式错误，不生成 UR"
                    );
                }
            }
        }
    }

    /// 定位到指定作业号之后
    ///
    /// 找不到该作业号时会读完整个文件。
    pub fn seek_to_after(&mut self, entry_id: &str) -> Result<()> {
        while let Some(entry) = self.next_entry()? {
            if self.format.entry_id(&entry) == entry_id {
                break;
            }
        }
        Ok(())
    }
}

/// 按天日志的断点：`<作业号|-> <日期>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyCursor {
    pub job_id: Option<String>,
    pub date: String,
}

impl DailyCursor {
    /// 从状态字符串解析断点，状态为空时从昨天（UTC）开始
    pub fn from_state(state: Option<&str>, date_format: &str) -> Self {
        match state.map(str::trim).filter(|s| !s.is_empty()) {
            Some(state) => {
                let (job_id, date) = state.split_once(' ').unwrap_or(("-", state));
                let date = date.trim();
                if NaiveDate::parse_from_str(date, date_format).is_err() {
                    tracing::warn!(state, "状态文件中的日期无法识别，从昨天开始");
                    return Self::yesterday(date_format);
                }
                Self {
                    job_id: (job_id != "-").then(|| job_id.to_string()),
                    date: date.to_string(),
                }
            }
            None => Self::yesterday(date_format),
        }
    }

    fn yesterday(date_format: &str) -> Self {
        let yesterday = Utc::now() - chrono::Duration::hours(24);
        Self { job_id: None, date: yesterday.format(date_format).to_string() }
    }
}

impl fmt::Display for DailyCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.job_id.as_deref().unwrap_or("-"), self.date)
    }
}

/// 从断点开始逐天扫描日志，直到今天（UTC）的文件读完
///
/// `build` 返回 `Ok(None)` 表示跳过该条目；返回错误时记录日志并跳过。
/// 每写出一条 UR 立即保存断点。返回写出的 UR 数量。
pub fn scan_daily_logs<F, B>(
    format: &F,
    log_dir: &Path,
    date_format: &str,
    cursor: &mut DailyCursor,
    ctx: &mut RunContext<'_>,
    mut build: B,
) -> Result<usize>
where
    F: LogFormat,
    B: FnMut(&F::Entry, &mut RunContext<'_>) -> Result<Option<UsageRecord>>,
{
    let today_date = Utc::now().date_naive();
    let today = today_date.format(date_format).to_string();

    let mut date = cursor.date.clone();
    let mut seek_id = cursor.job_id.clone();
    if NaiveDate::parse_from_str(&date, date_format).is_ok_and(|d| d > today_date) {
        tracing::warn!(date, "断点日期晚于今天，从今天开始");
        date = today.clone();
        seek_id = None;
    }

    let mut count = 0;
    loop {
        let mut parser = LogFileParser::new(format, log_dir.join(&date));
        let opened = match seek_id.take() {
            Some(id) => parser.seek_to_after(&id),
            None => Ok(()),
        };

        let mut result = opened;
        while result.is_ok() {
            let entry = match parser.next_entry() {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    result = Err(e);
                    break;
                }
            };
            let job_id = format.entry_id(&entry).to_string();
            let ur = match build(&entry, &mut *ctx) {
                Ok(Some(ur)) => ur,
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!(job_id, error = %e, "无法生成 UR，跳过该作业");
                    continue;
                }
            };
            ctx.write_ur(&ur)?;
            count += 1;

            cursor.job_id = Some(job_id);
            cursor.date = date.clone();
            ctx.persist_state(&cursor.to_string())?;
        }

        match result {
            Ok(()) => {}
            // 当天的日志可能还没有生成
            Err(e) if e.is_source_unavailable() && date == today => {}
            Err(e) if e.is_source_unavailable() => {
                tracing::error!(file = %parser.path().display(), date, error = %e, "无法读取日志文件");
            }
            Err(e) => return Err(e),
        }

        if date == today {
            break;
        }
        date = incremental_date(&date, date_format)?;
    }

    Ok(count)
}
