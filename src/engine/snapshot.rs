// ==========================================
// 诊所排班系统 - 统计期输入快照
// ==========================================
// 职责: 运行开始时一次性读取员工、规则、出诊表、节假日、请假、上期评分
// 约束: 运行期间只读快照，不再回库读取输入数据
// 约束: 公平性结转只读上期 fairness_score 表，不读员工表镜像
// ==========================================

use crate::domain::calendar::{previous_period, BusinessWeek, CalendarContext};
use crate::domain::staff::Staff;
use crate::engine::calendar::CalendarContextBuilder;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::fairness::CarriedDeviations;
use crate::engine::reconciler::WeekTargets;
use crate::engine::repositories::ScheduleRepositories;
use crate::engine::slot_calculator::{SlotDemand, WeeklySlotCalculator};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct PeriodSnapshot {
    pub ctx: CalendarContext,
    /// 可排班员工（在职且全职），按 staff_id 排序
    pub staff: Vec<Staff>,
    pub demand: SlotDemand,
    /// 员工 → 已确认请假日期（仅营业日）
    pub leave_dates: BTreeMap<String, BTreeSet<NaiveDate>>,
    pub carried: CarriedDeviations,
}

impl PeriodSnapshot {
    pub fn load(repos: &ScheduleRepositories, clinic_id: &str, year: i32, month: u32) -> EngineResult<Self> {
        let (query_start, query_end) = CalendarContextBuilder::holiday_query_range(year, month)?;
        let holidays = repos.holiday_repo.find_in_range(clinic_id, query_start, query_end)?;
        let ctx = CalendarContextBuilder::build(clinic_id, year, month, &holidays)?;
        let (first, last) = ctx
            .month_range()
            .ok_or(EngineError::InvalidPeriod { year, month })?;

        let staff: Vec<Staff> = repos
            .staff_repo
            .find_by_clinic(clinic_id)?
            .into_iter()
            .filter(|s| s.is_schedulable())
            .collect();
        let staff_ids: BTreeSet<&str> = staff.iter().map(|s| s.staff_id.as_str()).collect();

        let rules = repos.doctor_rule_repo.find_rules(clinic_id)?;
        let schedules = repos.doctor_rule_repo.find_schedules(clinic_id, first, last)?;
        let demand = WeeklySlotCalculator::new().calculate(&ctx, &rules, &schedules);

        let mut leave_dates: BTreeMap<String, BTreeSet<NaiveDate>> = BTreeMap::new();
        for leave in repos.leave_repo.find_confirmed_in_range(clinic_id, first, last)? {
            if staff_ids.contains(leave.staff_id.as_str()) && ctx.is_business_day(leave.leave_date) {
                leave_dates.entry(leave.staff_id).or_default().insert(leave.leave_date);
            }
        }

        let (prev_year, prev_month) = previous_period(year, month);
        let carried = CarriedDeviations::from_scores(
            &repos.fairness_repo.find_by_period(clinic_id, prev_year, prev_month)?,
        );

        debug!(
            clinic_id = %clinic_id,
            year,
            month,
            staff = staff.len(),
            rules = rules.len(),
            leave_staff = leave_dates.len(),
            "统计期快照读取完成"
        );

        Ok(Self {
            ctx,
            staff,
            demand,
            leave_dates,
            carried,
        })
    }

    pub fn week_targets(&self, week: &BusinessWeek, full_week_days: u32) -> WeekTargets {
        WeekTargets::compute(week, &self.staff, &self.leave_dates, full_week_days)
    }
}
