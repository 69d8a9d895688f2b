//! ISO 8601 时长解析
//!
//! 支持 `[+-]P[nY][nM][nW][nD][T[nH][nM][nS]]`，数值可带小数（`.` 或 `,`）。
//! 年、月没有固定长度，非零的年或月视为格式错误。

use crate::error::{BartError, Result};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref ISO_DURATION_RE: Regex = Regex::new(
        r"^(?P<sign>[+-])?P(?:(?P<years>\d+(?:[,.]\d+)?)Y)?(?:(?P<months>\d+(?:[,.]\d+)?)M)?(?:(?P<weeks>\d+(?:[,.]\d+)?)W)?(?:(?P<days>\d+(?:[,.]\d+)?)D)?(?:T(?:(?P<hours>\d+(?:[,.]\d+)?)H)?(?:(?P<minutes>\d+(?:[,.]\d+)?)M)?(?:(?P<seconds>\d+(?:[,.]\d+)?)S)?)?$"
    )
    .unwrap();
}

const UNITS: [(&str, f64); 5] = [
    ("weeks", 7.0 * 86_400.0),
    ("days", 86_400.0),
    ("hours", 3_600.0),
    ("minutes", 60.0),
    ("seconds", 1.0),
];

/// 把 ISO 8601 时长解析为总秒数（可为负）
pub fn parse_duration(value: &str) -> Result<f64> {
    let caps = ISO_DURATION_RE
        .captures(value.trim())
        .ok_or_else(|| BartError::format_error("ISO 8601 时长", value))?;

    let component = |name: &str| -> Result<f64> {
        match caps.name(name) {
            Some(m) => m
                .as_str()
                .replace(',', ".")
                .parse::<f64>()
                .map_err(|_| BartError::format_error("ISO 8601 时长", value)),
            None => Ok(0.0),
        }
    };

    if component("years")? != 0.0 || component("months")? != 0.0 {
        return Err(BartError::format_error(
            "ISO 8601 时长不支持年或月",
            value,
        ));
    }

    let mut total = 0.0;
    for (name, factor) in UNITS {
        total += component(name)? * factor;
    }

    if caps.name("sign").map(|m| m.as_str()) == Some("-") {
        total = -total;
    }
    Ok(total)
}
