//! 用户/项目映射表
//!
//! 映射文件每行一条 `key "value"`，`#` 开头的行和空行忽略，格式不符的行静默跳过。
//! 值为 `-` 表示“已知但不上报”，与“未知（不存在该键）”区分开。

use crate::error::{BartError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;

lazy_static! {
    static ref MAPPING_RE: Regex = Regex::new(r#"^\s*(.*?)\s*"(.*)""#).unwrap();
}

/// 不可变的映射表，每次运行构建一次
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityMap {
    map: HashMap<String, Option<String>>,
}

impl IdentityMap {
    /// 空映射表
    pub fn new() -> Self {
        Self::default()
    }

    /// 从文件加载映射表
    ///
    /// # Errors
    /// 文件无法打开时返回 `BartError::Config`，是否当作空表处理由调用方决定。
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            BartError::config_error(format!(
                "无法读取映射文件 {}: {e}",
                path.display()
            ))
        })?;
        let map = Self::parse(&content);
        tracing::debug!(path = %path.display(), entries = map.len(), "映射文件加载完成");
        Ok(map)
    }

    /// 解析映射文件内容
    pub fn parse(content: &str) -> Self {
        let mut map = HashMap::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some(caps) = MAPPING_RE.captures(line) else {
                tracing::trace!(line, "跳过格式不符的映射行");
                continue;
            };
            let key = caps[1].trim();
            if key.is_empty() {
                continue;
            }
            let value = caps[2].trim();
            let value = if value == "-" { None } else { Some(value.to_string()) };
            map.insert(key.to_string(), value);
        }
        Self { map }
    }

    /// 查询映射值：未知键和被显式屏蔽的键都返回 `None`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).and_then(|v| v.as_deref())
    }

    /// 映射表中是否出现过该键（包括值为 `-` 的键）
    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// 该键是否被显式屏蔽（值为 `-`）
    pub fn is_suppressed(&self, key: &str) -> bool {
        matches!(self.map.get(key), Some(None))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, Option<V>)> for IdentityMap {
    fn from_iter<I: IntoIterator<Item = (K, Option<V>)>>(iter: I) -> Self {
        Self {
            map: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.map(Into::into)))
                .collect(),
        }
    }
}
