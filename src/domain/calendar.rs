// ==========================================
// 诊所排班系统 - 日历领域模型
// ==========================================
// 职责: 节假日、营业周 (BusinessWeek)、月度日历上下文
// 红线: 营业周 = 周一至周六中的非休诊日，配额核算单位
// ==========================================

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ==========================================
// Holiday - 节假日
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holiday {
    pub holiday_date: NaiveDate,
    pub name: String,
    /// true: 休诊（不计入营业日，也不计入 OFF 预算）
    /// false: 照常营业，但该日出勤计入 holiday 公平性维度
    pub closed: bool,
}

// ==========================================
// BusinessWeek - 营业周
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusinessWeek {
    pub index: usize,                   // 月内序号，从 1 开始
    pub week_start: NaiveDate,          // 所在自然周的周一（可能落在上月）
    pub calendar_days: Vec<NaiveDate>,  // 本月内的周一至周六
    pub business_days: Vec<NaiveDate>,  // calendar_days 去除休诊日
}

impl BusinessWeek {
    pub fn business_day_count(&self) -> usize {
        self.business_days.len()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.business_days.contains(&date)
    }

    pub fn week_end(&self) -> NaiveDate {
        self.week_start + Duration::days(5)
    }

    /// 本月内的首末日期（落库替换区间）
    pub fn calendar_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((*self.calendar_days.first()?, *self.calendar_days.last()?))
    }
}

// ==========================================
// CalendarContext - 月度日历上下文
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarContext {
    pub clinic_id: String,
    pub year: i32,
    pub month: u32,
    pub business_days: Vec<NaiveDate>,
    pub weeks: Vec<BusinessWeek>,
    pub closed_holidays: BTreeSet<NaiveDate>,
    pub open_holidays: BTreeSet<NaiveDate>,
}

impl CalendarContext {
    pub fn is_business_day(&self, date: NaiveDate) -> bool {
        self.business_days.binary_search(&date).is_ok()
    }

    pub fn is_open_holiday(&self, date: NaiveDate) -> bool {
        self.open_holidays.contains(&date)
    }

    pub fn is_weekend(&self, date: NaiveDate) -> bool {
        date.weekday() == Weekday::Sat
    }

    /// 是否紧邻休诊节假日（跳过周日向前/向后各看一天）
    pub fn is_holiday_adjacent(&self, date: NaiveDate) -> bool {
        let prev = step_skipping_sunday(date, -1);
        let next = step_skipping_sunday(date, 1);
        self.closed_holidays.contains(&prev) || self.closed_holidays.contains(&next)
    }

    pub fn week_of(&self, date: NaiveDate) -> Option<&BusinessWeek> {
        self.weeks.iter().find(|w| w.contains(date))
    }

    pub fn week_by_start(&self, week_start: NaiveDate) -> Option<&BusinessWeek> {
        self.weeks.iter().find(|w| w.week_start == week_start)
    }

    /// 本月第一天与最后一天
    pub fn month_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        month_bounds(self.year, self.month)
    }
}

/// 月份首末日期
pub fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next_first = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((first, next_first - Duration::days(1)))
}

/// 上一个统计期
pub fn previous_period(year: i32, month: u32) -> (i32, u32) {
    if month == 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}

/// 日期所在自然周的周一
pub fn monday_of(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

fn step_skipping_sunday(date: NaiveDate, direction: i64) -> NaiveDate {
    let mut d = date + Duration::days(direction);
    if d.weekday() == Weekday::Sun {
        d += Duration::days(direction);
    }
    d
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_month_bounds_handles_december() {
        assert_eq!(month_bounds(2025, 12), Some((d(2025, 12, 1), d(2025, 12, 31))));
        assert_eq!(month_bounds(2024, 2), Some((d(2024, 2, 1), d(2024, 2, 29))));
        assert_eq!(month_bounds(2024, 13), None);
    }

    #[test]
    fn test_previous_period_wraps_year() {
        assert_eq!(previous_period(2025, 1), (2024, 12));
        assert_eq!(previous_period(2025, 7), (2025, 6));
    }

    #[test]
    fn test_holiday_adjacency_skips_sunday() {
        let mut closed = BTreeSet::new();
        // 2025-05-05 (周一) 休诊
        closed.insert(d(2025, 5, 5));
        let ctx = CalendarContext {
            clinic_id: "C1".to_string(),
            year: 2025,
            month: 5,
            business_days: vec![],
            weeks: vec![],
            closed_holidays: closed,
            open_holidays: BTreeSet::new(),
        };
        assert!(ctx.is_holiday_adjacent(d(2025, 5, 3))); // 周六，隔周日
        assert!(ctx.is_holiday_adjacent(d(2025, 5, 6)));
        assert!(!ctx.is_holiday_adjacent(d(2025, 5, 7)));
    }
}
