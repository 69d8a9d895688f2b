//! Usage Record 内存模型

use chrono::{DateTime, Utc};
use serde::Serialize;

/// VO 属性（group 必填，role / capability 可选）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VoAttribute {
    pub group: String,
    pub role: Option<String>,
    pub capability: Option<String>,
}

impl VoAttribute {
    pub fn new<S: Into<String>>(group: S) -> Self {
        Self { group: group.into(), ..Default::default() }
    }
}

/// 一个 VO 信息块
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VoInformation {
    /// VO 名称，每个块必填
    pub name: String,
    /// 映射来源标识，写为 `vo:type` 属性
    pub vo_type: Option<String>,
    pub issuer: Option<String>,
    pub attributes: Vec<VoAttribute>,
}

impl VoInformation {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    pub fn with_type<S: Into<String>>(mut self, vo_type: S) -> Self {
        self.vo_type = Some(vo_type.into());
        self
    }
}

/// 一条作业使用记录
///
/// 除 `record_id` 外全部字段可选，未设置的字段不会出现在 XML 中。
/// 时长字段的单位均为秒。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageRecord {
    pub record_id: Option<String>,

    pub global_job_id: Option<String>,
    pub local_job_id: Option<String>,
    pub local_user_id: Option<String>,
    pub global_user_name: Option<String>,
    pub vo_info: Vec<VoInformation>,

    pub job_name: Option<String>,
    pub charge: Option<f64>,
    pub status: Option<String>,
    pub machine_name: Option<String>,
    pub queue: Option<String>,
    pub host: Option<String>,
    pub node_count: Option<u64>,
    pub processors: Option<u64>,
    pub submit_host: Option<String>,
    pub project_name: Option<String>,

    pub submit_time: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,

    pub wall_duration: Option<f64>,
    pub cpu_duration: Option<f64>,

    // sgas 扩展
    pub user_time: Option<f64>,
    pub kernel_time: Option<f64>,
    pub exit_code: Option<i32>,
    pub major_page_faults: Option<u64>,
    pub runtime_environments: Vec<String>,
}

impl UsageRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// JobIdentity 元素是否需要输出
    pub fn has_job_identity(&self) -> bool {
        self.global_job_id.is_some() || self.local_job_id.is_some()
    }

    /// UserIdentity 元素是否需要输出
    pub fn has_user_identity(&self) -> bool {
        self.local_user_id.is_some()
            || self.global_user_name.is_some()
            || !self.vo_info.is_empty()
    }
}
