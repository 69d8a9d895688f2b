//! Usage Record XML 解析
//!
//! 解析器是宽松的：未知元素只记录警告，无法解析的数值记录错误并置为 `null`，
//! 只有文档本身不合法时才返回错误。结果是一个 `serde_json::Map`，键为字段名。

use super::duration::parse_duration;
use super::elements::{self as el, QName};
use super::writer::ISO_TIME_FORMAT;
use crate::error::{BartError, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;
use serde_json::{Map, Value};

/// 解析得到的字段表
pub type UrFields = Map<String, Value>;

/// 只保留命名空间和文本的简化元素树
#[derive(Debug, Default)]
pub(crate) struct XmlElement {
    namespace: Option<String>,
    local: String,
    attributes: Vec<(Option<String>, String, String)>,
    text: String,
    children: Vec<XmlElement>,
}

impl XmlElement {
    pub(crate) fn is(&self, name: QName) -> bool {
        name.matches(self.namespace.as_deref(), &self.local)
    }

    /// 按限定名查找属性，找不到时退回到无前缀的同名属性
    pub(crate) fn attribute(&self, name: QName) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(ns, local, _)| name.matches(ns.as_deref(), local))
            .or_else(|| {
                self.attributes
                    .iter()
                    .find(|(ns, local, _)| ns.is_none() && local == name.local)
            })
            .map(|(_, _, value)| value.as_str())
    }

    pub(crate) fn children(&self) -> &[XmlElement] {
        &self.children
    }

    fn text(&self) -> &str {
        self.text.trim()
    }

    fn tag(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{{{ns}}}{}", self.local),
            None => self.local.clone(),
        }
    }
}

fn resolved_namespace(result: ResolveResult) -> Option<String> {
    match result {
        ResolveResult::Bound(Namespace(uri)) => Some(String::from_utf8_lossy(uri).into_owned()),
        _ => None,
    }
}

fn open_element(reader: &NsReader<&[u8]>, start: &BytesStart) -> Result<XmlElement> {
    let (ns, local) = reader.resolve_element(start.name());
    let mut element = XmlElement {
        namespace: resolved_namespace(ns),
        local: String::from_utf8_lossy(local.as_ref()).into_owned(),
        ..Default::default()
    };
    for attr in start.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        // 命名空间声明本身不作为属性保存
        if attr.key.as_namespace_binding().is_some() {
            continue;
        }
        let (ns, local) = reader.resolve_attribute(attr.key);
        let value = attr.unescape_value()?.into_owned();
        element.attributes.push((
            resolved_namespace(ns),
            String::from_utf8_lossy(local.as_ref()).into_owned(),
            value,
        ));
    }
    Ok(element)
}

fn close_element(
    stack: &mut Vec<XmlElement>,
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => {
            return Err(BartError::format_error("UR 文档", "存在多个根元素"));
        }
    }
    Ok(())
}

/// 把 XML 文本读成元素树
pub(crate) fn parse_document(xml: &str) -> Result<XmlElement> {
    let mut reader = NsReader::from_str(xml);
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                let element = open_element(&reader, &start)?;
                stack.push(element);
            }
            Event::Empty(start) => {
                let element = open_element(&reader, &start)?;
                close_element(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| BartError::format_error("UR 文档", "多余的结束标签"))?;
                close_element(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text.unescape()?);
                }
            }
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(BartError::format_error("UR 文档", "存在未闭合的元素"));
    }
    root.ok_or_else(|| BartError::format_error("UR 文档", "没有根元素"))
}

fn parse_int(value: &str) -> Value {
    match value.parse::<i64>() {
        Ok(v) => Value::from(v),
        Err(_) => {
            tracing::error!(value, "无法解析整数值");
            Value::Null
        }
    }
}

fn parse_float(value: &str) -> Value {
    match value.parse::<f64>() {
        Ok(v) => Value::from(v),
        Err(_) => {
            tracing::error!(value, "无法解析浮点数值");
            Value::Null
        }
    }
}

fn parse_bool(value: &str) -> Value {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" => Value::Bool(true),
        "false" | "0" => Value::Bool(false),
        _ => {
            tracing::error!(value, "无法解析布尔值");
            Value::Null
        }
    }
}

/// 时长转为整数秒，小数部分向下取整
fn parse_iso_duration(value: &str) -> Value {
    match parse_duration(value) {
        Ok(seconds) => Value::from(seconds.floor() as i64),
        Err(e) => {
            tracing::error!(value, error = %e, "无法解析时长");
            Value::Null
        }
    }
}

/// 时间戳统一为 `YYYY-MM-DDTHH:MM:SSZ`（UTC），无时区的时间按 UTC 处理
fn parse_timestamp(value: &str) -> Value {
    let parsed = DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(value.trim_end_matches('Z'), "%Y-%m-%dT%H:%M:%S")
                .map(|t| t.and_utc())
        });
    match parsed {
        Ok(t) => Value::from(t.format(ISO_TIME_FORMAT).to_string()),
        Err(_) => {
            tracing::error!(value, "无法解析时间戳");
            Value::Null
        }
    }
}

fn string(value: &str) -> Value {
    Value::from(value)
}

/// 解析 UR XML 文档
///
/// 接受单个 `JobUsageRecord`，也接受以 `UsageRecords` 包裹的文档（取第一条记录）。
///
/// # Errors
/// 文档不是合法 XML、没有根元素或根元素不是 UR 时返回错误。
pub fn parse_usage_record(xml: &str) -> Result<UrFields> {
    let root = parse_document(xml)?;
    let record = if root.is(el::USAGE_RECORDS) {
        root.children
            .into_iter()
            .find(|c| c.is(el::JOB_USAGE_RECORD))
            .ok_or_else(|| BartError::format_error("UR 文档", "UsageRecords 中没有记录"))?
    } else {
        root
    };
    if !record.is(el::JOB_USAGE_RECORD) {
        return Err(BartError::format_error("UR 文档", format!("未知的根元素 {}", record.tag())));
    }
    Ok(decode_record(&record))
}

fn decode_record(record: &XmlElement) -> UrFields {
    let mut fields = UrFields::new();

    for element in &record.children {
        let text = element.text();

        if element.is(el::RECORD_IDENTITY) {
            if let Some(id) = element.attribute(el::RECORD_ID) {
                fields.insert("record_id".into(), string(id));
            }
            if let Some(ct) = element.attribute(el::CREATE_TIME) {
                fields.insert("create_time".into(), parse_timestamp(ct));
            }
        } else if element.is(el::JOB_IDENTITY) {
            decode_job_identity(element, &mut fields);
        } else if element.is(el::USER_IDENTITY) {
            decode_user_identity(element, &mut fields);
        } else if element.is(el::JOB_NAME) {
            fields.insert("job_name".into(), string(text));
        } else if element.is(el::CHARGE) {
            fields.insert("charge".into(), parse_float(text));
        } else if element.is(el::STATUS) {
            fields.insert("status".into(), string(text));
        } else if element.is(el::MACHINE_NAME) {
            fields.insert("machine_name".into(), string(text));
        } else if element.is(el::QUEUE) {
            fields.insert("queue".into(), string(text));
        } else if element.is(el::HOST) {
            fields.insert("host".into(), string(text));
        } else if element.is(el::NODE_COUNT) {
            fields.insert("node_count".into(), parse_int(text));
        } else if element.is(el::PROCESSORS) {
            fields.insert("processors".into(), parse_int(text));
        } else if element.is(el::SUBMIT_HOST) {
            fields.insert("submit_host".into(), string(text));
        } else if element.is(el::PROJECT_NAME) {
            fields.insert("project_name".into(), string(text));
        } else if element.is(el::SUBMIT_TIME) {
            fields.insert("submit_time".into(), parse_timestamp(text));
        } else if element.is(el::START_TIME) {
            fields.insert("start_time".into(), parse_timestamp(text));
        } else if element.is(el::END_TIME) {
            fields.insert("end_time".into(), parse_timestamp(text));
        } else if element.is(el::WALL_DURATION) {
            fields.insert("wall_duration".into(), parse_iso_duration(text));
        } else if element.is(el::CPU_DURATION) {
            fields.insert("cpu_duration".into(), parse_iso_duration(text));
        } else if element.is(el::USER_TIME) {
            fields.insert("user_time".into(), parse_iso_duration(text));
        } else if element.is(el::KERNEL_TIME) {
            fields.insert("kernel_time".into(), parse_iso_duration(text));
        } else if element.is(el::EXIT_CODE) {
            fields.insert("exit_code".into(), parse_int(text));
        } else if element.is(el::MAJOR_PAGE_FAULTS) {
            fields.insert("major_page_faults".into(), parse_int(text));
        } else if element.is(el::RUNTIME_ENVIRONMENT) {
            push_to_list(&mut fields, "runtime_environments", string(text));
        } else if element.is(el::FILE_TRANSFERS) {
            decode_file_transfers(element, &mut fields);
        } else if element.is(el::KSI2K_WALL_DURATION) || element.is(el::KSI2K_CPU_DURATION) {
            tracing::warn!(element = %element.tag(), "KSI2K 时长元素已废弃，忽略");
        } else if element.is(el::LOGGER_NAME) {
            // 日志器标识不进入字段表
        } else {
            tracing::warn!(element = %element.tag(), "未识别的 UR 元素，跳过");
        }
    }

    // 旧版日志器只写 NodeCount，实际含义是处理器数
    if !fields.contains_key("processors") {
        if let Some(node_count) = fields.remove("node_count") {
            fields.insert("processors".into(), node_count);
        }
    }

    fields
}

fn push_to_list(fields: &mut UrFields, key: &str, value: Value) {
    match fields.get_mut(key) {
        Some(Value::Array(items)) => items.push(value),
        _ => {
            fields.insert(key.to_string(), Value::Array(vec![value]));
        }
    }
}

fn decode_job_identity(element: &XmlElement, fields: &mut UrFields) {
    for child in &element.children {
        if child.is(el::GLOBAL_JOB_ID) {
            fields.insert("global_job_id".into(), string(child.text()));
        } else if child.is(el::LOCAL_JOB_ID) {
            fields.insert("local_job_id".into(), string(child.text()));
        } else {
            tracing::warn!(element = %child.tag(), "未识别的 JobIdentity 子元素，跳过");
        }
    }
}

fn decode_user_identity(element: &XmlElement, fields: &mut UrFields) {
    for child in &element.children {
        if child.is(el::LOCAL_USER_ID) {
            fields.insert("local_user_id".into(), string(child.text()));
        } else if child.is(el::GLOBAL_USER_NAME) {
            fields.insert("global_user_name".into(), string(child.text()));
        } else if child.is(el::VO) {
            decode_vo(child, fields);
        } else {
            tracing::warn!(element = %child.tag(), "未识别的 UserIdentity 子元素，跳过");
        }
    }
}

/// VO 信息展平为 `vo_*` 字段，出现多个 VO 块时以最后一个为准
fn decode_vo(element: &XmlElement, fields: &mut UrFields) {
    if let Some(vo_type) = element.attribute(el::VO_TYPE) {
        fields.insert("vo_type".into(), string(vo_type));
    }
    for child in &element.children {
        if child.is(el::VO_NAME) {
            fields.insert("vo_name".into(), string(child.text()));
        } else if child.is(el::VO_ISSUER) {
            fields.insert("vo_issuer".into(), string(child.text()));
        } else if child.is(el::VO_ATTRIBUTE) {
            let mut attr = Map::new();
            attr.insert("group".into(), Value::Null);
            attr.insert("role".into(), Value::Null);
            for part in &child.children {
                if part.is(el::VO_GROUP) {
                    attr.insert("group".into(), string(part.text()));
                } else if part.is(el::VO_ROLE) {
                    attr.insert("role".into(), string(part.text()));
                } else if part.is(el::VO_CAPABILITY) {
                    attr.insert("capability".into(), string(part.text()));
                } else {
                    tracing::warn!(element = %part.tag(), "未识别的 VO 属性元素，跳过");
                }
            }
            push_to_list(fields, "vo_attrs", Value::Object(attr));
        } else {
            tracing::warn!(element = %child.tag(), "未识别的 VO 子元素，跳过");
        }
    }
}

fn decode_file_transfers(element: &XmlElement, fields: &mut UrFields) {
    for child in &element.children {
        let key = if child.is(el::FILE_DOWNLOAD) {
            "downloads"
        } else if child.is(el::FILE_UPLOAD) {
            "uploads"
        } else {
            tracing::warn!(element = %child.tag(), "未识别的文件传输元素，跳过");
            continue;
        };

        let mut transfer = Map::new();
        for part in &child.children {
            let text = part.text();
            if part.is(el::TRANSFER_URL) {
                transfer.insert("url".into(), string(text));
            } else if part.is(el::TRANSFER_SIZE) {
                transfer.insert("size".into(), parse_int(text));
            } else if part.is(el::TRANSFER_START_TIME) {
                transfer.insert("start_time".into(), parse_timestamp(text));
            } else if part.is(el::TRANSFER_END_TIME) {
                transfer.insert("end_time".into(), parse_timestamp(text));
            } else if part.is(el::TRANSFER_BYPASS_CACHE) {
                transfer.insert("bypass_cache".into(), parse_bool(text));
            } else if part.is(el::TRANSFER_RETRIEVED_FROM_CACHE) {
                transfer.insert("from_cache".into(), parse_bool(text));
            } else {
                tracing::warn!(element = %part.tag(), "未识别的文件传输字段，跳过");
            }
        }
        push_to_list(fields, key, Value::Object(transfer));
    }
}
