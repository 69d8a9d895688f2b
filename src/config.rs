//! 配置管理模块
//!
//! 提供统一的配置文件读取和管理功能。配置文件为 TOML 格式，按节划分：
//! `[common]` 为公共选项，`[slurm]`、`[torque]`、`[maui]` 为各批处理系统的选项。
//! 所有选项都有默认值，未知选项视为配置错误。

use crate::error::{BartError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 默认配置文件路径
pub const DEFAULT_CONFIG_FILE: &str = "/etc/bart/bart.toml";

/// 主配置结构体
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// 公共配置
    pub common: CommonConfig,
    /// Slurm 配置
    pub slurm: SlurmConfig,
    /// Torque 配置
    pub torque: TorqueConfig,
    /// Maui 配置
    pub maui: MauiConfig,
}

/// 批处理系统类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LrmsKind {
    Slurm,
    Torque,
    Maui,
}

impl LrmsKind {
    /// 配置节名称
    pub fn section(self) -> &'static str {
        match self {
            LrmsKind::Slurm => "slurm",
            LrmsKind::Torque => "torque",
            LrmsKind::Maui => "maui",
        }
    }
}

/// 公共配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CommonConfig {
    /// 本机主机名，用于 record_id 和 MachineName；为空时取系统主机名
    pub hostname: Option<String>,
    /// 使用的批处理系统
    pub lrms: Option<LrmsKind>,
    /// 用户映射文件
    pub usermap: PathBuf,
    /// 项目/VO 映射文件
    pub vomap: PathBuf,
    /// UR 输出目录（实际写入其下的 `urs` 子目录）
    pub logdir: PathBuf,
    /// 运行日志文件
    pub logfile: Option<PathBuf>,
    /// 状态文件目录
    pub statedir: PathBuf,
    /// 是否不输出缺失用户映射的汇总信息
    pub suppress_usermap_info: bool,
    /// 日志级别 (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for CommonConfig {
    fn default() -> Self {
        Self {
            hostname: None,
            lrms: None,
            usermap: PathBuf::from("/etc/bart/usermap"),
            vomap: PathBuf::from("/etc/bart/vomap"),
            logdir: PathBuf::from("/var/spool/bart/usagerecords"),
            logfile: Some(PathBuf::from("/var/log/bart-logger.log")),
            statedir: PathBuf::from("/var/spool/bart"),
            suppress_usermap_info: false,
            log_level: "info".to_string(),
        }
    }
}

/// Slurm 处理器数量的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessorSource {
    /// sacct 的 AllocCPUS 列
    AllocCpus,
    /// sacct 的 AllocTRES 列中的 `cpu=` 项
    Tres,
}

/// `statefile_default` 的上限：十年
pub const MAX_STATEFILE_DEFAULT: u64 = 10 * 365 * 86_400;

/// Slurm 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SlurmConfig {
    /// 状态文件名（相对 statedir）
    pub statefile: String,
    /// 没有状态时向前回溯的秒数
    pub statefile_default: u64,
    /// record_id 是否追加作业开始时间
    pub idtimestamp: bool,
    /// 单次查询的最大时间窗口（天），0 表示不限制
    pub max_days: u32,
    /// 处理器数量来源
    pub processors: ProcessorSource,
    /// sacct 命令
    pub sacct: String,
}

impl Default for SlurmConfig {
    fn default() -> Self {
        Self {
            statefile: "slurm.state".to_string(),
            statefile_default: 50_000,
            idtimestamp: true,
            max_days: 7,
            processors: ProcessorSource::AllocCpus,
            sacct: "sacct".to_string(),
        }
    }
}

/// Torque 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TorqueConfig {
    /// 状态文件名（相对 statedir）
    pub statefile: String,
    /// Torque spool 目录
    pub spooldir: PathBuf,
}

impl Default for TorqueConfig {
    fn default() -> Self {
        Self {
            statefile: "torque.state".to_string(),
            spooldir: PathBuf::from("/var/spool/torque"),
        }
    }
}

/// Maui 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MauiConfig {
    /// 状态文件名（相对 statedir）
    pub statefile: String,
    /// Maui spool 目录
    pub spooldir: PathBuf,
}

impl Default for MauiConfig {
    fn default() -> Self {
        Self {
            statefile: "maui.state".to_string(),
            spooldir: PathBuf::from("/var/spool/maui"),
        }
    }
}

impl Config {
    /// 从文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            BartError::config_error(format!(
                "无法读取配置文件 {}: {e}",
                path.display()
            ))
        })?;
        Self::from_str(&content)
    }

    /// 从字符串加载配置
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        // 验证日志级别
        match self.common.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(BartError::config_error(format!(
                    "无效的日志级别: {}",
                    self.common.log_level
                )));
            }
        }

        if self.common.lrms.is_none() {
            return Err(BartError::config_error(
                "[common] 节缺少 lrms 选项",
            ));
        }

        for (section, statefile) in [
            ("slurm", &self.slurm.statefile),
            ("torque", &self.torque.statefile),
            ("maui", &self.maui.statefile),
        ] {
            if statefile.trim().is_empty() {
                return Err(BartError::config_error(format!(
                    "[{section}] statefile 不能为空"
                )));
            }
        }

        if self.slurm.sacct.trim().is_empty() {
            return Err(BartError::config_error("[slurm] sacct 不能为空"));
        }

        if self.slurm.statefile_default > MAX_STATEFILE_DEFAULT {
            return Err(BartError::config_error(format!(
                "[slurm] statefile_default 超出范围: {} (最大 {MAX_STATEFILE_DEFAULT} 秒)",
                self.slurm.statefile_default
            )));
        }

        Ok(())
    }

    /// 当前选择的批处理系统
    pub fn lrms(&self) -> Result<LrmsKind> {
        self.common
            .lrms
            .ok_or_else(|| BartError::config_error("[common] 节缺少 lrms 选项"))
    }

    /// 本机主机名：优先配置值，否则使用系统主机名
    pub fn hostname(&self) -> Result<String> {
        if let Some(name) = self.common.hostname.as_deref() {
            if !name.trim().is_empty() {
                return Ok(name.trim().to_string());
            }
        }
        let name = nix::unistd::gethostname().map_err(|e| {
            BartError::config_error(format!("无法获取系统主机名: {e}"))
        })?;
        name.into_string().map_err(|_| {
            BartError::config_error("系统主机名不是有效的 UTF-8")
        })
    }

    /// UR 输出目录
    pub fn ur_dir(&self) -> PathBuf {
        self.common.logdir.join("urs")
    }
}
