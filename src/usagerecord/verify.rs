//! UR 文档校验

use super::elements as el;
use super::parser::parse_document;

/// 检查 UR 文档是否有效
///
/// 有效的条件：XML 格式正确，根元素为 `JobUsageRecord`，并且带有 record id。
pub fn verify(xml: &str) -> bool {
    let root = match parse_document(xml) {
        Ok(root) => root,
        Err(e) => {
            tracing::debug!(error = %e, "UR 文档解析失败");
            return false;
        }
    };
    if !root.is(el::JOB_USAGE_RECORD) {
        return false;
    }
    root.children()
        .iter()
        .filter(|c| c.is(el::RECORD_IDENTITY))
        .any(|c| c.attribute(el::RECORD_ID).is_some_and(|id| !id.is_empty()))
}
