// ==========================================
// 诊所排班系统 - 月度日历构建
// ==========================================
// 输入: 统计期 + 节假日
// 输出: CalendarContext（营业日 + 按周一至周六切分的营业周）
// 规则:
// - 周日永不营业
// - 休诊节假日同时从营业日数与 OFF 预算中剔除，不写任何排班行
// - 照常营业的节假日仍是营业日
// - 营业周裁剪到本月之内
// ==========================================

use crate::domain::calendar::{month_bounds, monday_of, BusinessWeek, CalendarContext, Holiday};
use crate::engine::error::{EngineError, EngineResult};
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// 节假日邻接判定需要向月外多看的天数（跨一个周日）
pub const HOLIDAY_LOOKAROUND_DAYS: i64 = 2;

pub struct CalendarContextBuilder;

impl CalendarContextBuilder {
    /// 节假日查询区间（含月外邻接日）
    pub fn holiday_query_range(year: i32, month: u32) -> EngineResult<(NaiveDate, NaiveDate)> {
        let (first, last) = month_bounds(year, month).ok_or(EngineError::InvalidPeriod { year, month })?;
        Ok((
            first - Duration::days(HOLIDAY_LOOKAROUND_DAYS),
            last + Duration::days(HOLIDAY_LOOKAROUND_DAYS),
        ))
    }

    /// 构建月度日历上下文
    ///
    /// # 参数
    /// - holidays: 可包含月外的节假日（用于邻接判定），月外的不影响营业日
    pub fn build(clinic_id: &str, year: i32, month: u32, holidays: &[Holiday]) -> EngineResult<CalendarContext> {
        let (first, last) = month_bounds(year, month).ok_or(EngineError::InvalidPeriod { year, month })?;

        let closed_holidays: BTreeSet<NaiveDate> = holidays
            .iter()
            .filter(|h| h.closed)
            .map(|h| h.holiday_date)
            .collect();
        let open_holidays: BTreeSet<NaiveDate> = holidays
            .iter()
            .filter(|h| !h.closed && h.holiday_date >= first && h.holiday_date <= last)
            .map(|h| h.holiday_date)
            .collect();

        let mut grouped: BTreeMap<NaiveDate, (Vec<NaiveDate>, Vec<NaiveDate>)> = BTreeMap::new();
        let mut business_days = Vec::new();
        let mut date = first;
        while date <= last {
            if date.weekday() != Weekday::Sun {
                let entry = grouped.entry(monday_of(date)).or_default();
                entry.0.push(date);
                if !closed_holidays.contains(&date) {
                    entry.1.push(date);
                    business_days.push(date);
                }
            }
            date += Duration::days(1);
        }

        let weeks: Vec<BusinessWeek> = grouped
            .into_iter()
            .enumerate()
            .map(|(i, (week_start, (calendar_days, week_business_days)))| BusinessWeek {
                index: i + 1,
                week_start,
                calendar_days,
                business_days: week_business_days,
            })
            .collect();

        debug!(
            clinic_id = %clinic_id,
            year,
            month,
            business_days = business_days.len(),
            weeks = weeks.len(),
            closed_holidays = closed_holidays.len(),
            "月度日历构建完成"
        );

        Ok(CalendarContext {
            clinic_id: clinic_id.to_string(),
            year,
            month,
            business_days,
            weeks,
            closed_holidays,
            open_holidays,
        })
    }
}
