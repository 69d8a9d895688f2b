//! Usage Record XML 序列化

use super::elements::{self as el, Namespace, QName};
use super::types::{UsageRecord, VoInformation};
use crate::error::{BartError, Result};
use chrono::{DateTime, Utc};
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use std::path::Path;

/// 固定的 XML 声明
pub const XML_HEADER: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" ?>\n";

/// UR 中时间戳的文本格式
pub const ISO_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// 格式化 UTC 时间戳
pub fn format_timestamp(time: &DateTime<Utc>) -> String {
    time.format(ISO_TIME_FORMAT).to_string()
}

/// 秒数转为 ISO 8601 时长，始终是平铺的秒数；负值的符号放在 `P` 之前
pub fn format_duration(seconds: f64) -> String {
    if seconds < 0.0 {
        format!("-PT{:.6}S", -seconds)
    } else {
        format!("PT{seconds:.6}S")
    }
}

struct XmlOut {
    inner: Writer<Vec<u8>>,
}

impl XmlOut {
    fn new() -> Self {
        Self { inner: Writer::new(Vec::new()) }
    }

    fn start(&mut self, name: QName, attributes: &[(String, &str)]) -> Result<()> {
        let tag = name.prefixed();
        let mut start = BytesStart::new(tag.as_str());
        for (key, value) in attributes {
            start.push_attribute((key.as_str(), *value));
        }
        self.inner.write_event(Event::Start(start))?;
        Ok(())
    }

    fn end(&mut self, name: QName) -> Result<()> {
        let tag = name.prefixed();
        self.inner.write_event(Event::End(BytesEnd::new(tag.as_str())))?;
        Ok(())
    }

    fn text_element(
        &mut self,
        name: QName,
        attributes: &[(String, &str)],
        text: &str,
    ) -> Result<()> {
        self.start(name, attributes)?;
        self.inner.write_event(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }

    /// 值为 `None` 时不输出元素
    fn optional<T, F>(&mut self, name: QName, value: Option<T>, render: F) -> Result<()>
    where
        F: FnOnce(T) -> String,
    {
        match value {
            Some(v) => self.text_element(name, &[], &render(v)),
            None => Ok(()),
        }
    }

    fn finish(self) -> Result<String> {
        String::from_utf8(self.inner.into_inner())
            .map_err(|e| BartError::invariant(format!("UR 序列化结果不是 UTF-8: {e}")))
    }
}

impl UsageRecord {
    /// 序列化为 XML 文档，创建时间取当前时间
    ///
    /// # Errors
    /// 未设置 `record_id` 时返回 `BartError::Invariant`。
    pub fn to_xml(&self) -> Result<String> {
        self.to_xml_at(Utc::now())
    }

    /// 使用指定的创建时间序列化
    pub fn to_xml_at(&self, create_time: DateTime<Utc>) -> Result<String> {
        let record_id = self
            .record_id
            .as_deref()
            .ok_or_else(|| BartError::invariant("UsageRecord 缺少 record_id，无法序列化"))?;

        let mut out = XmlOut::new();

        let namespaces: Vec<(String, &str)> = Namespace::DECLARED
            .iter()
            .map(|ns| (format!("xmlns:{}", ns.prefix()), ns.uri()))
            .collect();
        out.start(el::JOB_USAGE_RECORD, &namespaces)?;

        let create_time = format_timestamp(&create_time);
        let identity_attrs = [
            (el::RECORD_ID.prefixed(), record_id),
            (el::CREATE_TIME.prefixed(), create_time.as_str()),
        ];
        out.start(el::RECORD_IDENTITY, &identity_attrs)?;
        out.end(el::RECORD_IDENTITY)?;

        if self.has_job_identity() {
            out.start(el::JOB_IDENTITY, &[])?;
            out.optional(el::GLOBAL_JOB_ID, self.global_job_id.as_deref(), str::to_string)?;
            out.optional(el::LOCAL_JOB_ID, self.local_job_id.as_deref(), str::to_string)?;
            out.end(el::JOB_IDENTITY)?;
        }

        if self.has_user_identity() {
            out.start(el::USER_IDENTITY, &[])?;
            out.optional(el::LOCAL_USER_ID, self.local_user_id.as_deref(), str::to_string)?;
            out.optional(
                el::GLOBAL_USER_NAME,
                self.global_user_name.as_deref(),
                str::to_string,
            )?;
            for vo in &self.vo_info {
                write_vo(&mut out, vo)?;
            }
            out.end(el::USER_IDENTITY)?;
        }

        out.optional(el::JOB_NAME, self.job_name.as_deref(), str::to_string)?;
        out.optional(el::CHARGE, self.charge, |c| c.to_string())?;
        out.optional(el::STATUS, self.status.as_deref(), str::to_string)?;
        out.optional(el::MACHINE_NAME, self.machine_name.as_deref(), str::to_string)?;
        out.optional(el::QUEUE, self.queue.as_deref(), str::to_string)?;
        out.optional(el::HOST, self.host.as_deref(), str::to_string)?;
        out.optional(el::NODE_COUNT, self.node_count, |n| n.to_string())?;
        out.optional(el::PROCESSORS, self.processors, |n| n.to_string())?;
        out.optional(el::SUBMIT_HOST, self.submit_host.as_deref(), str::to_string)?;
        out.optional(el::PROJECT_NAME, self.project_name.as_deref(), str::to_string)?;
        out.optional(el::SUBMIT_TIME, self.submit_time.as_ref(), format_timestamp)?;
        out.optional(el::START_TIME, self.start_time.as_ref(), format_timestamp)?;
        out.optional(el::END_TIME, self.end_time.as_ref(), format_timestamp)?;
        out.optional(el::WALL_DURATION, self.wall_duration, format_duration)?;
        out.optional(el::CPU_DURATION, self.cpu_duration, format_duration)?;

        out.optional(el::USER_TIME, self.user_time, format_duration)?;
        out.optional(el::KERNEL_TIME, self.kernel_time, format_duration)?;
        out.optional(el::EXIT_CODE, self.exit_code, |c| c.to_string())?;
        out.optional(el::MAJOR_PAGE_FAULTS, self.major_page_faults, |n| n.to_string())?;
        for env in &self.runtime_environments {
            out.text_element(el::RUNTIME_ENVIRONMENT, &[], env)?;
        }

        out.text_element(
            el::LOGGER_NAME,
            &[(el::LOGGER_VERSION.prefixed(), el::LOGGER_VERSION_VALUE)],
            el::LOGGER_NAME_VALUE,
        )?;

        out.end(el::JOB_USAGE_RECORD)?;

        let body = out.finish()?;
        Ok(format!("{XML_HEADER}{body}"))
    }

    /// 序列化并写入文件（UTF-8）
    pub fn write_xml<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let xml = self.to_xml()?;
        std::fs::write(path.as_ref(), xml)?;
        Ok(())
    }
}

fn write_vo(out: &mut XmlOut, vo: &VoInformation) -> Result<()> {
    let type_attr: Vec<(String, &str)> = vo
        .vo_type
        .as_deref()
        .map(|t| vec![(el::VO_TYPE.prefixed(), t)])
        .unwrap_or_default();
    out.start(el::VO, &type_attr)?;
    out.text_element(el::VO_NAME, &[], &vo.name)?;
    out.optional(el::VO_ISSUER, vo.issuer.as_deref(), str::to_string)?;
    for attr in &vo.attributes {
        out.start(el::VO_ATTRIBUTE, &[])?;
        out.text_element(el::VO_GROUP, &[], &attr.group)?;
        out.optional(el::VO_ROLE, attr.role.as_deref(), str::to_string)?;
        out.optional(el::VO_CAPABILITY, attr.capability.as_deref(), str::to_string)?;
        out.end(el::VO_ATTRIBUTE)?;
    }
    out.end(el::VO)
}
