//! 批处理系统后端
//!
//! 每个后端实现 `LrmsBackend`：解析/生成自己的状态字符串，读取自己的日志源，
//! 把日志条目转换为 UR 并通过 `RunContext` 写出。

pub mod logfile;
pub mod maui;
pub mod nodes;
pub mod slurm;
pub mod torque;

pub use crate::config::LrmsKind;
pub use maui::Maui;
pub use slurm::{AccountingQuery, SacctCommand, Slurm};
pub use torque::Torque;

use crate::common::write_ur;
use crate::config::Config;
use crate::error::Result;
use crate::mapfile::IdentityMap;
use crate::state::write_state;
use crate::usagerecord::{UsageRecord, VoInformation};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// 一次运行中各后端共享的上下文
pub struct RunContext<'a> {
    /// 本机主机名
    pub hostname: String,
    pub user_map: &'a IdentityMap,
    pub project_map: &'a IdentityMap,
    /// UR 输出目录
    pub ur_dir: PathBuf,
    /// 状态文件路径
    pub state_path: PathBuf,
    /// 本次运行中没有映射的用户
    pub missing_user_mappings: BTreeSet<String>,
}

impl<'a> RunContext<'a> {
    pub fn new(
        hostname: impl Into<String>,
        user_map: &'a IdentityMap,
        project_map: &'a IdentityMap,
        ur_dir: impl Into<PathBuf>,
        state_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            user_map,
            project_map,
            ur_dir: ur_dir.into(),
            state_path: state_path.into(),
            missing_user_mappings: BTreeSet::new(),
        }
    }

    /// 保存断点
    pub fn persist_state(&self, state: &str) -> Result<()> {
        write_state(&self.state_path, state)
    }

    /// 写出一条 UR
    pub fn write_ur(&self, ur: &UsageRecord) -> Result<PathBuf> {
        write_ur(ur, &self.ur_dir)
    }

    /// 用户是否被映射为 `-`（不上报）
    pub fn is_suppressed_user(&self, user: &str) -> bool {
        self.user_map.is_suppressed(user)
    }

    /// 查询用户的全局名，没有映射时记入缺失集合
    pub fn global_user_name(&mut self, user: &str) -> Option<String> {
        let mapped = self.user_map.get(user).map(str::to_string);
        if mapped.is_none() {
            self.missing_user_mappings.insert(user.to_string());
        }
        mapped
    }

    /// 按账户查找项目映射，找不到时退回到用户名
    pub fn vo_for(&self, account: Option<&str>, user: &str, vo_type: &str) -> Option<VoInformation> {
        account
            .and_then(|a| self.project_map.get(a))
            .or_else(|| self.project_map.get(user))
            .map(|name| VoInformation::new(name).with_type(vo_type))
    }
}

/// 批处理系统后端
pub trait LrmsBackend {
    /// 后端名称
    fn name(&self) -> &'static str;

    /// 状态文件名（相对状态目录）
    fn state_file(&self) -> &str;

    /// 解析状态文件内容，`None` 表示没有状态
    fn parse_generator_state(&mut self, state: Option<&str>);

    /// 当前状态的字符串形式
    fn create_generator_state(&self) -> String;

    /// 生成 UR，返回写出的数量
    fn generate_usage_records(&mut self, ctx: &mut RunContext<'_>) -> Result<usize>;
}

/// 按配置创建后端
pub fn create_backend(config: &Config) -> Result<Box<dyn LrmsBackend>> {
    let backend: Box<dyn LrmsBackend> = match config.lrms()? {
        LrmsKind::Slurm => Box::new(Slurm::new(
            config.slurm.clone(),
            SacctCommand::new(config.slurm.sacct.clone()),
        )),
        LrmsKind::Torque => Box::new(Torque::new(config.torque.clone())),
        LrmsKind::Maui => Box::new(Maui::new(config.maui.clone())),
    };
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vo_lookup_falls_back_to_user() {
        let users = IdentityMap::new();
        let projects: IdentityMap =
            [("proj", Some("vo-proj")), ("alice", Some("vo-alice"))].into_iter().collect();
        let ctx = RunContext::new("h", &users, &projects, "/tmp/urs", "/tmp/s");

        assert_eq!(ctx.vo_for(Some("proj"), "alice", "t").unwrap().name, "vo-proj");
        assert_eq!(ctx.vo_for(Some("other"), "alice", "t").unwrap().name, "vo-alice");
        assert_eq!(ctx.vo_for(None, "alice", "t").unwrap().vo_type.as_deref(), Some("t"));
        assert!(ctx.vo_for(None, "bob", "t").is_none());
    }

    #[test]
    fn test_missing_user_recorded() {
        let users: IdentityMap = [("alice", Some("alice@example.org"))].into_iter().collect();
        let projects = IdentityMap::new();
        let mut ctx = RunContext::new("h", &users, &projects, "/tmp/urs", "/tmp/s");

        assert_eq!(ctx.global_user_name("alice").as_deref(), Some("alice@example.org"));
        assert_eq!(ctx.global_user_name("carol"), None);
        assert_eq!(ctx.missing_user_mappings.iter().collect::<Vec<_>>(), vec!["carol"]);
    }
}
