//! 错误类型定义
//!
//! 这个模块定义了库中使用的所有错误类型，使用 thiserror 提供丰富的错误信息。
//!
//! 错误分为四类：
//! - `Format`：单条记录或单个字段无法解析，调用方记录日志后跳过该条目
//! - `Config`：配置缺失/非法或映射文件无法读取，可能导致整次运行中止
//! - `SourceUnavailable`：预期存在的日志单元或外部命令输出缺失，跳过该单元继续
//! - `Invariant`：试图序列化缺少 record_id 的 UR，只影响该条记录

/// 库内统一的结果类型
pub type Result<T> = std::result::Result<T, BartError>;

/// UR 生成过程中的错误类型
#[derive(Debug, thiserror::Error)]
pub enum BartError {
    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// 格式错误
    #[error("格式错误 ({context}): {value}")]
    Format { context: String, value: String },

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 日志源不可用
    #[error("日志源不可用 ({source_name}): {reason}")]
    SourceUnavailable { source_name: String, reason: String },

    /// 不变量被破坏
    #[error("不变量错误: {0}")]
    Invariant(String),

    /// XML 错误
    #[error("XML错误: {0}")]
    Xml(#[from] quick_xml::Error),

    /// TOML 解析错误
    #[error("TOML解析错误: {0}")]
    Toml(#[from] toml::de::Error),
}

impl BartError {
    /// 创建一个格式错误
    pub fn format_error<C: Into<String>, V: Into<String>>(
        context: C,
        value: V,
    ) -> Self {
        let context = context.into();
        let value = value.into();
        tracing::error!(%context, %value, "格式错误");
        Self::Format { context, value }
    }

    /// 创建一个配置错误
    pub fn config_error<S: Into<String>>(message: S) -> Self {
        let message = message.into();
        tracing::error!("配置错误: {}", message);
        Self::Config(message)
    }

    /// 创建一个日志源不可用错误
    pub fn source_unavailable<S: Into<String>, R: Into<String>>(
        source_name: S,
        reason: R,
    ) -> Self {
        let source_name = source_name.into();
        let reason = reason.into();
        // 当天的数据源缺失属于正常情况，由调用方决定日志级别
        tracing::debug!(%source_name, %reason, "数据源不可用");
        Self::SourceUnavailable { source_name, reason }
    }

    /// 创建一个不变量错误
    pub fn invariant<S: Into<String>>(message: S) -> Self {
        let message = message.into();
        tracing::error!("不变量错误: {}", message);
        Self::Invariant(message)
    }

    /// 检查是否为 IO 错误
    pub fn is_io_error(&self) -> bool {
        matches!(self, BartError::Io(_))
    }

    /// 检查是否为格式错误
    pub fn is_format_error(&self) -> bool {
        matches!(self, BartError::Format { .. })
    }

    /// 检查是否为配置错误
    pub fn is_config_error(&self) -> bool {
        matches!(self, BartError::Config(_) | BartError::Toml(_))
    }

    /// 检查是否为日志源不可用错误
    pub fn is_source_unavailable(&self) -> bool {
        matches!(self, BartError::SourceUnavailable { .. })
    }

    /// 检查是否为不变量错误
    pub fn is_invariant_error(&self) -> bool {
        matches!(self, BartError::Invariant(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_creation() {
        let format_err = BartError::format_error("duration", "1:a:3");
        assert!(format_err.is_format_error());

        let config_err = BartError::config_error("lrms missing");
        assert!(config_err.is_config_error());
        assert!(!config_err.is_io_error());

        let inv = BartError::invariant("no record id");
        assert!(inv.is_invariant_error());

        let src = BartError::source_unavailable("sacct", "exit status 1");
        assert!(src.is_source_unavailable());
    }

    #[test]
    fn test_error_from() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: BartError = io_err.into();
        assert!(err.is_io_error());
    }

    #[test]
    fn test_error_display() {
        let err = BartError::Format {
            context: "maui entry".to_string(),
            value: "bad line".to_string(),
        };

        let display = format!("{}", err);
        assert!(display.contains("maui entry"));
        assert!(display.contains("bad line"));
    }
}
