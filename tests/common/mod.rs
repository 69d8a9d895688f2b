//! 集成测试的公共工具

#![allow(dead_code)]

use bart_logger::config::{Config, LrmsKind};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// 测试使用的主机名
pub const HOSTNAME: &str = "hostname.example.com";

/// 用户映射：bob 被屏蔽，carol 不在表中
pub const USERMAP: &str = "# 用户映射\nalice \"alice@example.org\"\nbob \"-\"\n";

/// 项目映射
pub const VOMAP: &str = "snic020-11-15 \"snic\"\nproj-a \"vo-a\"\nalice \"vo-alice\"\n";

/// 写入文件，自动创建父目录
pub fn write_file<P: AsRef<Path>>(path: P, content: &str) {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

/// 一个临时的运行环境：映射文件、状态目录、UR 目录、spool 目录都在同一个临时目录下
pub struct TestEnv {
    pub dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        let env = Self { dir: TempDir::new().unwrap() };
        write_file(env.path("etc/usermap"), USERMAP);
        write_file(env.path("etc/vomap"), VOMAP);
        env
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    /// 指向临时目录的配置
    pub fn config(&self, lrms: LrmsKind) -> Config {
        let mut config = Config::default();
        config.common.lrms = Some(lrms);
        config.common.hostname = Some(HOSTNAME.to_string());
        config.common.usermap = self.path("etc/usermap");
        config.common.vomap = self.path("etc/vomap");
        config.common.logdir = self.path("usagerecords");
        config.common.statedir = self.path("state");
        config.common.logfile = None;
        config.torque.spooldir = self.path("torque");
        config.maui.spooldir = self.path("maui");
        config
    }

    pub fn ur_dir(&self) -> PathBuf {
        self.path("usagerecords/urs")
    }

    /// UR 目录中的文件名（排序后）
    pub fn ur_files(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(self.ur_dir()) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    pub fn read_ur(&self, record_id: &str) -> String {
        fs::read_to_string(self.ur_dir().join(record_id)).unwrap()
    }

    pub fn state(&self, statefile: &str) -> Option<String> {
        fs::read_to_string(self.path("state").join(statefile)).ok()
    }
}
