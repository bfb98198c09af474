// ==========================================
// 诊所排班系统 - SQL 行映射工具
// ==========================================

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::Type;

pub const DATE_FMT: &str = "%Y-%m-%d";
pub const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

pub fn fmt_date(date: NaiveDate) -> String {
    date.format(DATE_FMT).to_string()
}

pub fn fmt_datetime(ts: NaiveDateTime) -> String {
    ts.format(DATETIME_FMT).to_string()
}

/// 解析日期列；格式错误转换为 rusqlite 列类型错误，不静默回退
pub fn parse_date_column(idx: usize, raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FMT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub fn parse_datetime_column(idx: usize, raw: &str) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, DATETIME_FMT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// 枚举列解析失败
pub fn invalid_enum(idx: usize, raw: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        Type::Text,
        format!("无法识别的枚举值: {}", raw).into(),
    )
}
