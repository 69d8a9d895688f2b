//! Usage Record 标准的 XML 命名空间和元素名

/// UR 文档中使用的命名空间
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    /// OGF Usage Record
    Ur,
    /// DEISA 扩展（SubmitTime）
    Deisa,
    /// SGAS VO 扩展
    Vo,
    /// SGAS 辅助扩展
    Sgas,
    /// 日志器标识
    Logger,
    /// 文件传输统计
    Transfer,
}

impl Namespace {
    /// 写出时声明的全部命名空间
    pub const DECLARED: [Namespace; 5] = [
        Namespace::Ur,
        Namespace::Deisa,
        Namespace::Vo,
        Namespace::Sgas,
        Namespace::Logger,
    ];

    pub const fn uri(self) -> &'static str {
        match self {
            Namespace::Ur => "http://schema.ogf.org/urf/2003/09/urf",
            Namespace::Deisa => "http://rmis.deisa.org/acct",
            Namespace::Vo => "http://www.sgas.se/namespaces/2009/05/ur/vo",
            Namespace::Sgas => "http://www.sgas.se/namespaces/2009/07/ur",
            Namespace::Logger => "http://www.sgas.se/namespaces/2010/08/logger",
            Namespace::Transfer => {
                "http://www.sgas.se/namespaces/2010/10/filetransfer"
            }
        }
    }

    pub const fn prefix(self) -> &'static str {
        match self {
            Namespace::Ur => "ur",
            Namespace::Deisa => "deisa",
            Namespace::Vo => "vo",
            Namespace::Sgas => "sgas",
            Namespace::Logger => "logger",
            Namespace::Transfer => "tr",
        }
    }
}

/// 带命名空间的元素或属性名
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QName {
    pub namespace: Namespace,
    pub local: &'static str,
}

impl QName {
    pub const fn new(namespace: Namespace, local: &'static str) -> Self {
        Self { namespace, local }
    }

    /// 写出时使用的 `prefix:local` 形式
    pub fn prefixed(&self) -> String {
        format!("{}:{}", self.namespace.prefix(), self.local)
    }

    /// 判断解析得到的 (命名空间 URI, 本地名) 是否为该名称
    pub fn matches(&self, namespace: Option<&str>, local: &str) -> bool {
        namespace == Some(self.namespace.uri()) && local == self.local
    }
}

use Namespace::{Deisa, Logger, Sgas, Transfer, Ur, Vo};

// usage record
pub const USAGE_RECORDS: QName = QName::new(Ur, "UsageRecords");
pub const JOB_USAGE_RECORD: QName = QName::new(Ur, "JobUsageRecord");
pub const RECORD_IDENTITY: QName = QName::new(Ur, "RecordIdentity");
pub const RECORD_ID: QName = QName::new(Ur, "recordId");
pub const CREATE_TIME: QName = QName::new(Ur, "createTime");
pub const JOB_IDENTITY: QName = QName::new(Ur, "JobIdentity");
pub const GLOBAL_JOB_ID: QName = QName::new(Ur, "GlobalJobId");
pub const LOCAL_JOB_ID: QName = QName::new(Ur, "LocalJobId");
pub const USER_IDENTITY: QName = QName::new(Ur, "UserIdentity");
pub const LOCAL_USER_ID: QName = QName::new(Ur, "LocalUserId");
pub const GLOBAL_USER_NAME: QName = QName::new(Ur, "GlobalUserName");
pub const JOB_NAME: QName = QName::new(Ur, "JobName");
pub const STATUS: QName = QName::new(Ur, "Status");
pub const CHARGE: QName = QName::new(Ur, "Charge");
pub const WALL_DURATION: QName = QName::new(Ur, "WallDuration");
pub const CPU_DURATION: QName = QName::new(Ur, "CpuDuration");
pub const NODE_COUNT: QName = QName::new(Ur, "NodeCount");
pub const PROCESSORS: QName = QName::new(Ur, "Processors");
pub const START_TIME: QName = QName::new(Ur, "StartTime");
pub const END_TIME: QName = QName::new(Ur, "EndTime");
pub const PROJECT_NAME: QName = QName::new(Ur, "ProjectName");
pub const SUBMIT_HOST: QName = QName::new(Ur, "SubmitHost");
pub const MACHINE_NAME: QName = QName::new(Ur, "MachineName");
pub const HOST: QName = QName::new(Ur, "Host");
pub const QUEUE: QName = QName::new(Ur, "Queue");

// sgas vo
pub const VO: QName = QName::new(Vo, "VO");
pub const VO_TYPE: QName = QName::new(Vo, "type");
pub const VO_NAME: QName = QName::new(Vo, "Name");
pub const VO_ISSUER: QName = QName::new(Vo, "Issuer");
pub const VO_ATTRIBUTE: QName = QName::new(Vo, "Attribute");
pub const VO_GROUP: QName = QName::new(Vo, "Group");
pub const VO_ROLE: QName = QName::new(Vo, "Role");
pub const VO_CAPABILITY: QName = QName::new(Vo, "Capability");

// deisa
pub const SUBMIT_TIME: QName = QName::new(Deisa, "SubmitTime");

// sgas
pub const USER_TIME: QName = QName::new(Sgas, "UserTime");
pub const KERNEL_TIME: QName = QName::new(Sgas, "KernelTime");
pub const EXIT_CODE: QName = QName::new(Sgas, "ExitCode");
pub const MAJOR_PAGE_FAULTS: QName = QName::new(Sgas, "MajorPageFaults");
pub const RUNTIME_ENVIRONMENT: QName = QName::new(Sgas, "RuntimeEnvironment");
// 已废弃，仅用于识别并告警
pub const KSI2K_WALL_DURATION: QName = QName::new(Sgas, "KSI2KWallDuration");
pub const KSI2K_CPU_DURATION: QName = QName::new(Sgas, "KSI2KCpuDuration");

// logger
pub const LOGGER_NAME: QName = QName::new(Logger, "LoggerName");
pub const LOGGER_VERSION: QName = QName::new(Logger, "version");

// file transfers
pub const FILE_TRANSFERS: QName = QName::new(Transfer, "FileTransfers");
pub const FILE_DOWNLOAD: QName = QName::new(Transfer, "FileDownload");
pub const FILE_UPLOAD: QName = QName::new(Transfer, "FileUpload");
pub const TRANSFER_URL: QName = QName::new(Transfer, "URL");
pub const TRANSFER_SIZE: QName = QName::new(Transfer, "Size");
pub const TRANSFER_START_TIME: QName = QName::new(Transfer, "StartTime");
pub const TRANSFER_END_TIME: QName = QName::new(Transfer, "EndTime");
pub const TRANSFER_BYPASS_CACHE: QName = QName::new(Transfer, "BypassCache");
pub const TRANSFER_RETRIEVED_FROM_CACHE: QName =
    QName::new(Transfer, "RetrievedFromCache");

/// LoggerName 元素的固定内容
pub const LOGGER_NAME_VALUE: &str = "SGAS-BaRT";
/// LoggerName 元素的 version 属性
pub const LOGGER_VERSION_VALUE: &str = env!("CARGO_PKG_VERSION");
