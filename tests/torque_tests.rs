//! Torque 后端的集成测试

mod common;

use chrono::Utc;
use common::{HOSTNAME, TestEnv, write_file};
use std::path::PathBuf;

fn today() -> String {
    Utc::now().format("%Y%m%d").to_string()
}

fn yesterday() -> String {
    (Utc::now() - chrono::Duration::days(1)).format("%Y%m%d").to_string()
}

fn end_record(job_id: &str, user: &str, extra: &str) -> String {
    format!(
        "06/18/2012 00:41:29;E;{job_id};user={user} group=users jobname=run queue=batch ctime=1339972800 qtime=1339972800 etime=1339972800 start=1339976400 exec_host=n1/0+n1/1+n2/0 {extra} end=1339980000 Exit_status=0 resources_used.cput=00:10:00 resources_used.walltime=01:00:00"
    )
}

fn accounting_file(env: &TestEnv, date: &str) -> PathBuf {
    env.path("torque/server_priv/accounting").join(date)
}

#[cfg(test)]
mod torque_tests {
    use super::*;
    use bart_logger::config::LrmsKind;
    use bart_logger::generator::run_with_backend;
    use bart_logger::lrms::{LrmsBackend, RunContext, Torque};
    use bart_logger::lrms::logfile::LogFormat;
    use bart_logger::lrms::torque::TorqueLogFormat;
    use bart_logger::mapfile::IdentityMap;
    use bart_logger::usagerecord::parse_usage_record;
    use serde_json::Value;

    #[test]
    fn test_end_record_to_usage_record() {
        let users = IdentityMap::parse("alice \"alice@example.org\"\n");
        let projects = IdentityMap::parse("proj-a \"vo-a\"\n");
        let mut ctx = RunContext::new(HOSTNAME, &users, &projects, "/tmp/urs", "/tmp/state");

        let line = end_record("4711", "alice", "account=proj-a Resource_List.nodes=2:ppn=2");
        let entry = TorqueLogFormat.split(&line).unwrap();
        let ur = Torque::create_usage_record(&entry, &mut ctx).unwrap().unwrap();

        // 纯数字作业号追加主机名
        assert_eq!(ur.local_job_id.as_deref(), Some("4711.hostname.example.com"));
        assert_eq!(
            ur.record_id.as_deref(),
            Some("hostname.example.com:4711.hostname.example.com")
        );
        assert_eq!(ur.local_user_id.as_deref(), Some("alice"));
        assert_eq!(ur.global_user_name.as_deref(), Some("alice@example.org"));
        assert_eq!(ur.vo_info[0].name, "vo-a");
        assert_eq!(ur.vo_info[0].vo_type.as_deref(), Some("bart-vomap"));
        assert_eq!(ur.project_name.as_deref(), Some("proj-a"));
        assert_eq!(ur.queue.as_deref(), Some("batch"));
        assert_eq!(ur.processors, Some(4));
        assert_eq!(ur.node_count, Some(2));
        assert_eq!(ur.host.as_deref(), Some("n1,n2"));
        assert_eq!(ur.cpu_duration, Some(600.0));
        assert_eq!(ur.wall_duration, Some(3600.0));
        assert_eq!(ur.exit_code, Some(0));

        let fields = parse_usage_record(&ur.to_xml().unwrap()).unwrap();
        assert_eq!(fields["submit_time"], Value::from("2012-06-17T22:40:00Z"));
        assert_eq!(fields["start_time"], Value::from("2012-06-17T23:40:00Z"));
        assert_eq!(fields["end_time"], Value::from("2012-06-18T00:40:00Z"));
    }

    #[test]
    fn test_missing_required_field_is_error() {
        let users = IdentityMap::new();
        let projects = IdentityMap::new();
        let mut ctx = RunContext::new(HOSTNAME, &users, &projects, "/tmp/urs", "/tmp/state");

        let entry = TorqueLogFormat
            .split("06/18/2012 00:41:29;E;1.srv;user=alice queue=batch end=1339980000")
            .unwrap();
        let err = Torque::create_usage_record(&entry, &mut ctx).unwrap_err();
        assert!(err.is_format_error());
    }

    #[test]
    fn test_scan_from_yesterday_and_resume() {
        let env = TestEnv::new();
        let config = env.config(LrmsKind::Torque);
        let date = today();
        let file = accounting_file(&env, &date);
        write_file(
            &file,
            &format!(
                "{}\n06/18/2012 00:41:29;Q;125.srv;queue=batch\n{}\n",
                end_record("123.srv", "alice", "Resource_List.ncpus=3"),
                end_record("124", "carol", "Resource_List.ncpus=1"),
            ),
        );

        // 没有状态文件：从昨天开始，昨天的文件不存在只记录错误
        let mut backend = Torque::new(config.torque.clone());
        let first = run_with_backend(&config, &mut backend).unwrap();
        assert_eq!(first.records_written, 2);
        assert_eq!(
            env.ur_files(),
            vec![
                "hostname.example.com:123.srv".to_string(),
                "hostname.example.com:124.hostname.example.com".to_string(),
            ]
        );
        assert!(first.missing_user_mappings.contains("carol"));
        assert!(!first.missing_user_mappings.contains("alice"));

        let state = env.state("torque.state").unwrap();
        assert_eq!(state.trim(), format!("124 {date}"));

        // 再运行一次：没有新记录，状态不变
        let mut backend = Torque::new(config.torque.clone());
        let second = run_with_backend(&config, &mut backend).unwrap();
        assert_eq!(second.records_written, 0);
        assert_eq!(env.state("torque.state").unwrap(), state);

        // 追加一条记录后只处理新记录
        let mut content = std::fs::read_to_string(&file).unwrap();
        content.push_str(&end_record("126.srv", "alice", "Resource_List.ncpus=2"));
        content.push('\n');
        write_file(&file, &content);

        let mut backend = Torque::new(config.torque.clone());
        let third = run_with_backend(&config, &mut backend).unwrap();
        assert_eq!(third.records_written, 1);
        assert_eq!(env.ur_files().len(), 3);
        assert_eq!(env.state("torque.state").unwrap().trim(), format!("126.srv {date}"));
        assert_eq!(backend.create_generator_state(), format!("126.srv {date}"));
    }

    #[test]
    fn test_suppressed_user_is_skipped() {
        let env = TestEnv::new();
        let config = env.config(LrmsKind::Torque);
        write_file(
            accounting_file(&env, &today()),
            &format!("{}\n", end_record("200.srv", "bob", "Resource_List.ncpus=1")),
        );

        let mut backend = Torque::new(config.torque.clone());
        let summary = run_with_backend(&config, &mut backend).unwrap();
        assert_eq!(summary.records_written, 0);
        assert!(env.ur_files().is_empty());
        assert!(summary.missing_user_mappings.is_empty());
    }

    #[test]
    fn test_written_record_content() {
        let env = TestEnv::new();
        let config = env.config(LrmsKind::Torque);
        write_file(
            accounting_file(&env, &today()),
            &format!("{}\n", end_record("300.srv", "alice", "Resource_List.ncpus=3")),
        );

        bart_logger::run(&config).unwrap();

        let xml = env.read_ur("hostname.example.com:300.srv");
        assert!(bart_logger::usagerecord::verify(&xml));
        let fields = parse_usage_record(&xml).unwrap();
        assert_eq!(fields["global_user_name"], Value::from("alice@example.org"));
        // 没有 account 时按用户名查 VO
        assert_eq!(fields["vo_name"], Value::from("vo-alice"));
        assert_eq!(fields["processors"], Value::from(3));
        assert_eq!(fields["host"], Value::from("n1,n2"));
    }

    #[test]
    fn test_invalid_utf8_line_does_not_stop_the_run() {
        let env = TestEnv::new();
        let config = env.config(LrmsKind::Torque);
        let file = accounting_file(&env, &today());
        let line = end_record("76.srv", "alice", "Resource_List.ncpus=1");
        let (head, tail) = line.split_once("jobname=run").unwrap();
        let mut content = Vec::new();
        content.extend_from_slice(head.as_bytes());
        // Latin-1 编码的作业名
        content.extend_from_slice(b"jobname=caf\xe9");
        content.extend_from_slice(tail.as_bytes());
        content.push(b'\n');
        content.extend_from_slice(end_record("77.srv", "alice", "Resource_List.ncpus=1").as_bytes());
        content.push(b'\n');
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(&file, content).unwrap();

        let summary = bart_logger::run(&config).unwrap();
        assert_eq!(summary.records_written, 2);
        assert_eq!(
            env.ur_files(),
            vec![
                "hostname.example.com:76.srv".to_string(),
                "hostname.example.com:77.srv".to_string(),
            ]
        );
        assert_eq!(env.state("torque.state").unwrap().trim(), format!("77.srv {}", today()));
    }

    #[test]
    fn test_resume_across_day_rollover() {
        let env = TestEnv::new();
        let config = env.config(LrmsKind::Torque);
        let (yesterday, today) = (yesterday(), today());
        write_file(
            accounting_file(&env, &yesterday),
            &format!(
                "{}\n{}\n{}\n",
                end_record("100.srv", "alice", "Resource_List.ncpus=1"),
                end_record("101.srv", "alice", "Resource_List.ncpus=1"),
                end_record("102.srv", "alice", "Resource_List.ncpus=1"),
            ),
        );
        write_file(
            accounting_file(&env, &today),
            &format!(
                "{}\n{}\n",
                end_record("201.srv", "alice", "Resource_List.ncpus=1"),
                end_record("202.srv", "alice", "Resource_List.ncpus=1"),
            ),
        );
        write_file(env.path("state/torque.state"), &format!("101.srv {yesterday}\n"));

        let mut backend = Torque::new(config.torque.clone());
        let summary = run_with_backend(&config, &mut backend).unwrap();

        // 断点只作用于第一个文件：昨天断点之后的记录和今天的全部记录都被处理
        assert_eq!(summary.records_written, 3);
        assert_eq!(
            env.ur_files(),
            vec![
                "hostname.example.com:102.srv".to_string(),
                "hostname.example.com:201.srv".to_string(),
                "hostname.example.com:202.srv".to_string(),
            ]
        );
        assert_eq!(env.state("torque.state").unwrap().trim(), format!("202.srv {today}"));
    }
}
