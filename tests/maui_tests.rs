//! Maui 后端的集成测试

mod common;

use chrono::Utc;
use common::{HOSTNAME, TestEnv, write_file};

/// 构造一条 44 字段的统计记录
fn stats_line(job_id: &str, user: &str, state: &str, account: &str, hosts: &str) -> String {
    let mut fields = vec!["0".to_string(); 44];
    fields[0] = job_id.to_string();
    fields[3] = user.to_string();
    fields[6] = state.to_string();
    fields[7] = "[batch:1]".to_string();
    fields[8] = "1339972800".to_string();
    fields[10] = "1339976400".to_string();
    fields[11] = "1339980000".to_string();
    fields[21] = "4".to_string();
    fields[25] = account.to_string();
    fields[29] = "7200.5".to_string();
    fields[31] = "2".to_string();
    fields[37] = hosts.to_string();
    fields.join(" ")
}

fn today() -> String {
    Utc::now().format("%a_%b_%d_%Y").to_string()
}

fn yesterday() -> String {
    (Utc::now() - chrono::Duration::days(1)).format("%a_%b_%d_%Y").to_string()
}

#[cfg(test)]
mod maui_tests {
    use super::*;
    use bart_logger::config::LrmsKind;
    use bart_logger::generator::run_with_backend;
    use bart_logger::lrms::logfile::LogFormat;
    use bart_logger::lrms::maui::{MauiLogFormat, create_usage_record, read_server_host};
    use bart_logger::lrms::{Maui, RunContext};
    use bart_logger::mapfile::IdentityMap;

    #[test]
    fn test_completed_job_to_usage_record() {
        let users = IdentityMap::parse("alice \"alice@example.org\"\n");
        let projects = IdentityMap::parse("proj-a \"vo-a\"\n");
        let mut ctx = RunContext::new(HOSTNAME, &users, &projects, "/tmp/urs", "/tmp/state");

        let line = stats_line("1001", "alice", "Completed", "proj-a", "n1:n2");
        let entry = MauiLogFormat.split(&line).unwrap();
        let ur = create_usage_record(&entry, Some("maui.example.org"), &mut ctx)
            .unwrap()
            .unwrap();

        assert_eq!(ur.local_job_id.as_deref(), Some("1001.maui.example.org"));
        assert_eq!(
            ur.record_id.as_deref(),
            Some("hostname.example.com:1001.maui.example.org")
        );
        assert_eq!(ur.global_user_name.as_deref(), Some("alice@example.org"));
        assert_eq!(ur.vo_info[0].name, "vo-a");
        assert_eq!(ur.queue.as_deref(), Some("batch"));
        assert_eq!(ur.processors, Some(8));
        assert_eq!(ur.node_count, Some(2));
        assert_eq!(ur.host.as_deref(), Some("n1,n2"));
        assert_eq!(ur.wall_duration, Some(3600.0));
        assert_eq!(ur.cpu_duration, Some(7200.5));
        assert_eq!(ur.project_name.as_deref(), Some("proj-a"));
    }

    #[test]
    fn test_cpu_time_correction_and_no_account() {
        let users = IdentityMap::new();
        let projects = IdentityMap::new();
        let mut ctx = RunContext::new(HOSTNAME, &users, &projects, "/tmp/urs", "/tmp/state");

        let mut fields: Vec<String> = MauiLogFormat
            .split(&stats_line("1002", "carol", "Completed", "[NONE]", "n1"))
            .unwrap();
        // 4 个任务、墙钟 3600 秒：超过 14400 秒的 CPU 时间按任务数修正
        fields[29] = "57600".to_string();

        let ur = create_usage_record(&fields, None, &mut ctx).unwrap().unwrap();
        assert_eq!(ur.cpu_duration, Some(14400.0));
        assert_eq!(ur.project_name, None);
        // 没有服务器主机名时作业号保持原样
        assert_eq!(ur.local_job_id.as_deref(), Some("1002"));
        assert!(ctx.missing_user_mappings.contains("carol"));
    }

    #[test]
    fn test_unfinished_jobs_are_skipped() {
        let users = IdentityMap::new();
        let projects = IdentityMap::new();
        let mut ctx = RunContext::new(HOSTNAME, &users, &projects, "/tmp/urs", "/tmp/state");

        let entry = MauiLogFormat
            .split(&stats_line("1003", "alice", "Removed", "proj-a", "n1"))
            .unwrap();
        assert!(create_usage_record(&entry, None, &mut ctx).unwrap().is_none());
    }

    #[test]
    fn test_bad_entries_are_format_errors() {
        let users = IdentityMap::new();
        let projects = IdentityMap::new();
        let mut ctx = RunContext::new(HOSTNAME, &users, &projects, "/tmp/urs", "/tmp/state");

        // 字段不足
        let short: Vec<String> = vec!["1004".to_string(), "1".to_string()];
        assert!(create_usage_record(&short, None, &mut ctx).unwrap_err().is_format_error());

        // 墙钟时间溢出
        let mut fields = MauiLogFormat
            .split(&stats_line("1005", "alice", "Completed", "proj-a", "n1"))
            .unwrap();
        fields[10] = i64::MIN.to_string();
        fields[11] = i64::MAX.to_string();
        assert!(create_usage_record(&fields, None, &mut ctx).unwrap_err().is_format_error());

        // 处理器数溢出
        let mut fields = MauiLogFormat
            .split(&stats_line("1006", "alice", "Completed", "proj-a", "n1"))
            .unwrap();
        fields[31] = u64::MAX.to_string();
        assert!(create_usage_record(&fields, None, &mut ctx).unwrap_err().is_format_error());
    }

    #[test]
    fn test_read_server_host() {
        let env = TestEnv::new();
        write_file(env.path("maui/maui.cfg"), "# maui.cfg\nSERVERHOST    maui.example.org\nADMIN1 root\n");
        assert_eq!(
            read_server_host(&env.path("maui")).as_deref(),
            Some("maui.example.org")
        );
        assert_eq!(read_server_host(&env.path("missing")), None);
    }

    #[test]
    fn test_scan_stats_and_resume() {
        let env = TestEnv::new();
        let config = env.config(LrmsKind::Maui);
        let date = today();
        write_file(env.path("maui/maui.cfg"), "SERVERHOST maui.example.org\n");
        let stats = env.path("maui/stats").join(&date);
        write_file(
            &stats,
            &format!(
                "VERSION 230\n{}\n{}\n{}\n",
                stats_line("2001", "alice", "Completed", "proj-a", "n1:n2"),
                stats_line("2002", "bob", "Completed", "proj-a", "n3"),
                stats_line("2003", "carol", "Completed", "[NONE]", "n4"),
            ),
        );

        let mut backend = Maui::new(config.maui.clone());
        let first = run_with_backend(&config, &mut backend).unwrap();
        // bob 被屏蔽
        assert_eq!(first.records_written, 2);
        assert_eq!(
            env.ur_files(),
            vec![
                "hostname.example.com:2001.maui.example.org".to_string(),
                "hostname.example.com:2003.maui.example.org".to_string(),
            ]
        );
        // 状态中保存日志里的原始作业号
        let state = env.state("maui.state").unwrap();
        assert_eq!(state.trim(), format!("2003 {date}"));

        let mut backend = Maui::new(config.maui.clone());
        let second = run_with_backend(&config, &mut backend).unwrap();
        assert_eq!(second.records_written, 0);
        assert_eq!(env.state("maui.state").unwrap(), state);
    }

    #[test]
    fn test_malformed_line_is_skipped() {
        let env = TestEnv::new();
        let config = env.config(LrmsKind::Maui);
        write_file(
            env.path("maui/stats").join(today()),
            &format!(
                "2100 too few fields\n{}\n",
                stats_line("2101", "alice", "Completed", "proj-a", "n1")
            ),
        );

        let mut backend = Maui::new(config.maui.clone());
        let summary = run_with_backend(&config, &mut backend).unwrap();
        assert_eq!(summary.records_written, 1);
        assert_eq!(env.ur_files(), vec!["hostname.example.com:2101".to_string()]);
    }

    #[test]
    fn test_resume_across_day_rollover() {
        let env = TestEnv::new();
        let config = env.config(LrmsKind::Maui);
        let (yesterday, today) = (yesterday(), today());
        write_file(
            env.path("maui/stats").join(&yesterday),
            &format!(
                "VERSION 230\n{}\n{}\n",
                stats_line("3001", "alice", "Completed", "proj-a", "n1"),
                stats_line("3002", "alice", "Completed", "proj-a", "n1"),
            ),
        );
        write_file(
            env.path("maui/stats").join(&today),
            &format!("VERSION 230\n{}\n", stats_line("3101", "alice", "Completed", "proj-a", "n2")),
        );
        write_file(env.path("state/maui.state"), &format!("3001 {yesterday}\n"));

        let mut backend = Maui::new(config.maui.clone());
        let summary = run_with_backend(&config, &mut backend).unwrap();

        assert_eq!(summary.records_written, 2);
        assert_eq!(
            env.ur_files(),
            vec![
                "hostname.example.com:3002".to_string(),
                "hostname.example.com:3101".to_string(),
            ]
        );
        assert_eq!(env.state("maui.state").unwrap().trim(), format!("3101 {today}"));
    }
}
