// ==========================================
// 诊所排班系统 - 岗位需求计算
// ==========================================
// 输入: 月度日历 + 医生组合规则 + 医生出诊表
// 输出: 每个营业日、每个班次、每个岗位的最少/最多人数，及周汇总
// 匹配: 精确医生集合优先于通配规则（见 DoctorCombination::specificity）
// 无匹配: 记 UnresolvedDoctorCombination 告警，当天不计入周需求
// ==========================================

use crate::domain::calendar::{BusinessWeek, CalendarContext};
use crate::domain::doctor_rule::{DoctorCombination, DoctorDaySchedule, StaffRange};
use crate::domain::types::{CategoryId, ShiftType};
use crate::engine::error::EngineWarning;
use chrono::{Datelike, NaiveDate, Weekday};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

// ==========================================
// DayDemand - 单日需求
// ==========================================
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DayDemand {
    pub day: BTreeMap<CategoryId, StaffRange>,
    pub night: BTreeMap<CategoryId, StaffRange>,
    /// 白班是否匹配到规则；未匹配的日子不计入周需求
    pub resolved: bool,
}

impl DayDemand {
    pub fn requirements(&self, shift_type: ShiftType) -> &BTreeMap<CategoryId, StaffRange> {
        match shift_type {
            ShiftType::Night => &self.night,
            _ => &self.day,
        }
    }
}

// ==========================================
// WeekDemandTotals - 营业周需求汇总
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct WeekDemandTotals {
    pub week_start: NaiveDate,
    pub business_days: usize,
    pub resolved_days: usize,
    pub required_min: BTreeMap<CategoryId, u32>,
    pub total_required_min: u32,
}

// ==========================================
// SlotDemand - 月度需求表
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct SlotDemand {
    days: BTreeMap<NaiveDate, DayDemand>,
    pub warnings: Vec<EngineWarning>,
}

impl SlotDemand {
    pub fn day(&self, date: NaiveDate) -> Option<&DayDemand> {
        self.days.get(&date)
    }

    /// 某日某班次某岗位的人数区间
    ///
    /// None 表示当天该岗位无约束（最少 0，不设上限）
    pub fn range(&self, date: NaiveDate, shift_type: ShiftType, category_id: &str) -> Option<StaffRange> {
        self.days
            .get(&date)
            .and_then(|d| d.requirements(shift_type).get(category_id))
            .copied()
    }

    /// 周汇总：只统计已匹配规则的营业日
    pub fn week_totals(&self, week: &BusinessWeek) -> WeekDemandTotals {
        let mut required_min: BTreeMap<CategoryId, u32> = BTreeMap::new();
        let mut resolved_days = 0;
        for date in &week.business_days {
            let Some(demand) = self.days.get(date) else {
                continue;
            };
            if !demand.resolved {
                continue;
            }
            resolved_days += 1;
            for (category_id, range) in demand.day.iter().chain(demand.night.iter()) {
                *required_min.entry(category_id.clone()).or_insert(0) += range.min;
            }
        }
        let total_required_min = required_min.values().sum();
        WeekDemandTotals {
            week_start: week.week_start,
            business_days: week.business_day_count(),
            resolved_days,
            required_min,
            total_required_min,
        }
    }
}

// ==========================================
// WeeklySlotCalculator - 需求计算器
// ==========================================
pub struct WeeklySlotCalculator;

impl Default for WeeklySlotCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl WeeklySlotCalculator {
    pub fn new() -> Self {
        Self
    }

    /// 计算整月需求
    pub fn calculate(
        &self,
        ctx: &CalendarContext,
        rules: &[DoctorCombination],
        schedules: &BTreeMap<NaiveDate, DoctorDaySchedule>,
    ) -> SlotDemand {
        let empty = BTreeSet::new();
        let mut demand = SlotDemand::default();

        for date in &ctx.business_days {
            let weekday = date.weekday();
            let schedule = schedules.get(date);
            let day_doctors = schedule.map(|s| &s.day_doctors).unwrap_or(&empty);

            let mut day_demand = DayDemand::default();
            match Self::resolve(rules, day_doctors, weekday, false) {
                Some(rule) => {
                    day_demand.day = rule.requirements.clone();
                    day_demand.resolved = true;
                }
                None => {
                    warn!(date = %date, doctors = ?day_doctors, "医生组合无匹配规则（白班）");
                    demand.warnings.push(EngineWarning::UnresolvedDoctorCombination {
                        date: *date,
                        doctors: day_doctors.iter().cloned().collect(),
                        night_shift: false,
                    });
                }
            }

            if let Some(s) = schedule.filter(|s| s.has_night_session()) {
                match Self::resolve(rules, &s.night_doctors, weekday, true) {
                    Some(rule) if day_demand.resolved => day_demand.night = rule.requirements.clone(),
                    Some(_) => {
                        debug!(date = %date, doctors = ?s.night_doctors, "白班无匹配规则，夜诊需求不计入");
                    }
                    None => {
                        warn!(date = %date, doctors = ?s.night_doctors, "医生组合无匹配规则（夜诊）");
                        demand.warnings.push(EngineWarning::UnresolvedDoctorCombination {
                            date: *date,
                            doctors: s.night_doctors.iter().cloned().collect(),
                            night_shift: true,
                        });
                    }
                }
            }

            demand.days.insert(*date, day_demand);
        }

        debug!(
            clinic_id = %ctx.clinic_id,
            days = demand.days.len(),
            unresolved = demand.warnings.len(),
            "岗位需求计算完成"
        );
        demand
    }

    /// 选出最具体的匹配规则；同等具体度取输入顺序中的第一条
    pub fn resolve<'a>(
        rules: &'a [DoctorCombination],
        doctors: &BTreeSet<String>,
        weekday: Weekday,
        night_shift: bool,
    ) -> Option<&'a DoctorCombination> {
        let mut best: Option<&DoctorCombination> = None;
        for rule in rules.iter().filter(|r| r.matches(doctors, weekday, night_shift)) {
            match best {
                Some(b) if b.specificity() >= rule.specificity() => {}
                _ => best = Some(rule),
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::doctor_rule::DoctorSet;
    use crate::engine::calendar::CalendarContextBuilder;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, day).unwrap()
    }

    fn set(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn rule(doctors: DoctorSet, dow: Option<Weekday>, night: bool, nurse_min: u32) -> DoctorCombination {
        let mut requirements = BTreeMap::new();
        requirements.insert(
            "NURSE".to_string(),
            StaffRange {
                min: nurse_min,
                max: nurse_min + 1,
            },
        );
        DoctorCombination {
            doctors,
            day_of_week: dow,
            night_shift: night,
            requirements,
        }
    }

    fn schedule(date: NaiveDate, day: &[&str], night: &[&str]) -> DoctorDaySchedule {
        DoctorDaySchedule {
            work_date: date,
            day_doctors: set(day),
            night_doctors: set(night),
        }
    }

    #[test]
    fn test_most_specific_rule_wins() {
        let rules = vec![
            rule(DoctorSet::Any, None, false, 1),
            rule(DoctorSet::Any, Some(Weekday::Mon), false, 2),
            rule(DoctorSet::Exact(set(&["D1", "D2"])), None, false, 3),
            rule(DoctorSet::Exact(set(&["D1", "D2"])), Some(Weekday::Mon), false, 4),
        ];
        let pick = |doctors: &[&str], wd| {
            WeeklySlotCalculator::resolve(&rules, &set(doctors), wd, false)
                .map(|r| r.requirements["NURSE"].min)
        };
        assert_eq!(pick(&["D1", "D2"], Weekday::Mon), Some(4));
        assert_eq!(pick(&["D1", "D2"], Weekday::Tue), Some(3));
        assert_eq!(pick(&["D1"], Weekday::Mon), Some(2));
        assert_eq!(pick(&["D1"], Weekday::Tue), Some(1));
    }

    #[test]
    fn test_unmatched_day_warns_and_is_excluded_from_totals() {
        let ctx = CalendarContextBuilder::build("C1", 2025, 6, &[]).unwrap();
        let rules = vec![rule(DoctorSet::Exact(set(&["D1"])), None, false, 2)];
        let mut schedules = BTreeMap::new();
        for day in 2..=7 {
            schedules.insert(d(day), schedule(d(day), &["D1"], &[]));
        }
        // 06-05 出诊组合没有规则
        schedules.insert(d(5), schedule(d(5), &["D1", "D3"], &[]));

        let demand = WeeklySlotCalculator::new().calculate(&ctx, &rules, &schedules);
        assert!(demand.warnings.iter().any(|w| matches!(
            w,
            EngineWarning::UnresolvedDoctorCombination { date, night_shift: false, .. } if *date == d(5)
        )));
        assert!(!demand.day(d(5)).unwrap().resolved);

        let totals = demand.week_totals(&ctx.weeks[0]);
        assert_eq!(totals.business_days, 6);
        assert_eq!(totals.resolved_days, 5);
        assert_eq!(totals.required_min["NURSE"], 10);
    }

    #[test]
    fn test_night_session_adds_night_requirements() {
        let ctx = CalendarContextBuilder::build("C1", 2025, 6, &[]).unwrap();
        let rules = vec![
            rule(DoctorSet::Any, None, false, 2),
            rule(DoctorSet::Exact(set(&["D2"])), None, true, 1),
        ];
        let mut schedules = BTreeMap::new();
        schedules.insert(d(3), schedule(d(3), &["D1", "D2"], &["D2"]));

        let demand = WeeklySlotCalculator::new().calculate(&ctx, &rules, &schedules);
        assert_eq!(demand.range(d(3), ShiftType::Night, "NURSE").map(|r| r.min), Some(1));
        assert_eq!(demand.range(d(3), ShiftType::Day, "NURSE").map(|r| r.min), Some(2));
        assert_eq!(demand.range(d(4), ShiftType::Night, "NURSE"), None);
        assert!(demand.warnings.is_empty());
    }

    #[test]
    fn test_night_requirements_dropped_when_day_unresolved() {
        let ctx = CalendarContextBuilder::build("C1", 2025, 6, &[]).unwrap();
        let rules = vec![
            rule(DoctorSet::Exact(set(&["D1"])), None, false, 2),
            rule(DoctorSet::Exact(set(&["D2"])), None, true, 1),
        ];
        let mut schedules = BTreeMap::new();
        schedules.insert(d(3), schedule(d(3), &["D1", "D3"], &["D2"]));

        let demand = WeeklySlotCalculator::new().calculate(&ctx, &rules, &schedules);
        let day = demand.day(d(3)).unwrap();
        assert!(!day.resolved);
        assert!(day.night.is_empty());
        assert_eq!(demand.range(d(3), ShiftType::Night, "NURSE"), None);
        // 当天只报白班未匹配，夜诊规则本身能匹配
        let on_day: Vec<bool> = demand
            .warnings
            .iter()
            .filter_map(|w| match w {
                EngineWarning::UnresolvedDoctorCombination { date, night_shift, .. } if *date == d(3) => {
                    Some(*night_shift)
                }
                _ => None,
            })
            .collect();
        assert_eq!(on_day, vec![false]);
    }
}
