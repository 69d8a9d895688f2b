//! Usage Record 模型与 XML 编解码
//!
//! - `types`：内存模型
//! - `writer`：序列化为 UR XML
//! - `parser`：宽松解析为字段表
//! - `duration`：ISO 8601 时长
//! - `verify`：文档有效性检查

pub mod duration;
pub mod elements;
pub mod parser;
pub mod types;
pub mod verify;
pub mod writer;

pub use duration::parse_duration;
pub use parser::{UrFields, parse_usage_record};
pub use types::{UsageRecord, VoAttribute, VoInformation};
pub use verify::verify;
pub use writer::{format_duration, format_timestamp};
