// ==========================================
// 诊所排班系统 - Phase2 周配额对账
// ==========================================
// 目标: 每个营业周独立地在 OFF ↔ 出勤之间翻转，使每人出勤天数等于周目标
// 红线: 周聚合状态 (WeekLedger) 每周重新计算、显式传入，不跨周共享
// 校验: 翻转结束后从网格重新数 OFF，与预算比对，不一致即致命
// ==========================================
// 周目标:
//   base(s,w)     = min(round(quota × 周内日历天数 / 完整周天数), 营业日数)
//   required(s,w) = max(base, 请假天数)
//   target(s,w)   = max(base − 请假天数, 0)
//   OFF 预算(w)   = 营业日数 × 人数 − Σ required
// ==========================================

use crate::domain::assignment::{GridCell, ScheduleGrid};
use crate::domain::calendar::BusinessWeek;
use crate::domain::staff::Staff;
use crate::domain::types::ShiftType;
use crate::engine::error::{EngineError, EngineResult, EngineWarning};
use crate::engine::slot_calculator::SlotDemand;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

// ==========================================
// WeekTargets - 周目标
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaffWeekTarget {
    pub base_quota: u32,
    pub leave_days: u32,
    pub work_target: u32,
    pub required_slots: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekTargets {
    pub week_start: NaiveDate,
    pub business_days: u32,
    targets: BTreeMap<String, StaffWeekTarget>,
}

impl WeekTargets {
    /// 计算周目标
    ///
    /// # 参数
    /// - staff: 参与排班的员工（调用方已过滤）
    /// - leave_dates: 员工 → 已确认请假日期
    /// - full_week_days: 完整营业周天数（周一至周六为 6）
    pub fn compute(
        week: &BusinessWeek,
        staff: &[Staff],
        leave_dates: &BTreeMap<String, BTreeSet<NaiveDate>>,
        full_week_days: u32,
    ) -> Self {
        let business_days = week.business_day_count() as u32;
        let calendar_days = week.calendar_days.len() as u32;
        let full = full_week_days.max(1);

        let targets = staff
            .iter()
            .map(|s| {
                // 四舍五入到整数天
                let prorated = (s.weekly_quota * calendar_days * 2 + full) / (2 * full);
                let base_quota = prorated.min(business_days);
                let leave_days = leave_dates
                    .get(&s.staff_id)
                    .map(|dates| dates.iter().filter(|d| week.contains(**d)).count() as u32)
                    .unwrap_or(0);
                (
                    s.staff_id.clone(),
                    StaffWeekTarget {
                        base_quota,
                        leave_days,
                        work_target: base_quota.saturating_sub(leave_days),
                        required_slots: base_quota.max(leave_days),
                    },
                )
            })
            .collect();

        Self {
            week_start: week.week_start,
            business_days,
            targets,
        }
    }

    pub fn get(&self, staff_id: &str) -> Option<&StaffWeekTarget> {
        self.targets.get(staff_id)
    }

    pub fn work_target(&self, staff_id: &str) -> u32 {
        self.targets.get(staff_id).map(|t| t.work_target).unwrap_or(0)
    }

    pub fn staff_ids(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(|k| k.as_str())
    }

    pub fn staff_count(&self) -> u32 {
        self.targets.len() as u32
    }

    /// Σ 周出勤目标（本周可提供的出勤人次）
    pub fn total_work_target(&self) -> u32 {
        self.targets.values().map(|t| t.work_target).sum()
    }

    pub fn total_required_slots(&self) -> i64 {
        self.targets.values().map(|t| t.required_slots as i64).sum()
    }

    /// 本周 OFF 总预算
    pub fn off_budget(&self) -> i64 {
        self.business_days as i64 * self.staff_count() as i64 - self.total_required_slots()
    }
}

// ==========================================
// WeekLedger - 单周聚合状态
// ==========================================
// 只能由 fresh() 从本周营业日的网格单元构造
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekLedger {
    week_start: NaiveDate,
    work: BTreeMap<String, u32>,
    off_total: i64,
}

impl WeekLedger {
    pub fn fresh(week: &BusinessWeek, grid: &ScheduleGrid, targets: &WeekTargets) -> Self {
        let mut work = BTreeMap::new();
        let mut off_total = 0;
        for staff_id in targets.staff_ids() {
            let shifts = grid.shifts_of(staff_id, &week.business_days);
            let worked = shifts.iter().filter(|(_, s)| s.is_work()).count() as u32;
            off_total += shifts.iter().filter(|(_, s)| *s == ShiftType::Off).count() as i64;
            work.insert(staff_id.to_string(), worked);
        }
        Self {
            week_start: week.week_start,
            work,
            off_total,
        }
    }

    pub fn week_start(&self) -> NaiveDate {
        self.week_start
    }

    pub fn work_days(&self, staff_id: &str) -> u32 {
        self.work.get(staff_id).copied().unwrap_or(0)
    }

    pub fn off_total(&self) -> i64 {
        self.off_total
    }

    fn record_to_work(&mut self, staff_id: &str) {
        *self.work.entry(staff_id.to_string()).or_insert(0) += 1;
        self.off_total -= 1;
    }

    fn record_to_off(&mut self, staff_id: &str) {
        if let Some(w) = self.work.get_mut(staff_id) {
            *w = w.saturating_sub(1);
        }
        self.off_total += 1;
    }
}

// ==========================================
// 对账输入 / 输出
// ==========================================
pub struct WeekReconcileRequest<'a> {
    pub week: &'a BusinessWeek,
    pub staff: &'a [Staff],
    pub targets: &'a WeekTargets,
    pub demand: &'a SlotDemand,
    /// 员工 → 总天数维度相对同岗位均值的偏差（负值: 欠出勤）
    pub priority: &'a BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmetQuota {
    pub staff_id: String,
    pub expected: u32,
    pub actual: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeekOutcome {
    pub flips: usize,
    pub passes: usize,
    pub unmet: Vec<UnmetQuota>,
}

impl WeekOutcome {
    pub fn warnings(&self, week_start: NaiveDate) -> Vec<EngineWarning> {
        self.unmet
            .iter()
            .map(|u| EngineWarning::QuotaUnmet {
                week_start,
                staff_id: u.staff_id.clone(),
                expected: u.expected,
                actual: u.actual,
            })
            .collect()
    }
}

// ==========================================
// Trait: WeekReconciler
// ==========================================
// 编排器只依赖此接口；OFF 预算校验在接口之外完成
pub trait WeekReconciler: Send + Sync {
    fn reconcile(
        &self,
        request: &WeekReconcileRequest<'_>,
        grid: &mut ScheduleGrid,
        ledger: WeekLedger,
    ) -> EngineResult<WeekOutcome>;
}

// ==========================================
// Phase2Reconciler - 默认实现
// ==========================================
pub struct Phase2Reconciler {
    max_passes: usize,
}

impl Phase2Reconciler {
    pub fn new(max_passes: usize) -> Self {
        Self {
            max_passes: max_passes.max(1),
        }
    }

    /// 缺勤方向: 偏差升序（最欠出勤者先拿名额），再按 staff_id
    fn owed_first<'a>(ids: &[&'a str], priority: &BTreeMap<String, f64>) -> Vec<&'a str> {
        let mut ids = ids.to_vec();
        ids.sort_by(|a, b| {
            let pa = priority.get(*a).copied().unwrap_or(0.0);
            let pb = priority.get(*b).copied().unwrap_or(0.0);
            pa.total_cmp(&pb).then_with(|| a.cmp(b))
        });
        ids
    }

    /// 超勤方向: 偏差降序（出勤最多者先让出），再按 staff_id
    fn surplus_first<'a>(ids: &[&'a str], priority: &BTreeMap<String, f64>) -> Vec<&'a str> {
        let mut ids = ids.to_vec();
        ids.sort_by(|a, b| {
            let pa = priority.get(*a).copied().unwrap_or(0.0);
            let pb = priority.get(*b).copied().unwrap_or(0.0);
            pb.total_cmp(&pa).then_with(|| a.cmp(b))
        });
        ids
    }

    /// 尝试为一名缺勤员工做一次 OFF → DAY
    ///
    /// 候选日: 本人为 OFF 且本岗位白班未达上限；余量最大者优先，同余量取最早日期
    pub fn try_flip_to_work(
        request: &WeekReconcileRequest<'_>,
        grid: &mut ScheduleGrid,
        staff: &Staff,
    ) -> Option<NaiveDate> {
        let mut best: Option<(u32, NaiveDate)> = None;
        for date in &request.week.business_days {
            let is_off = grid
                .get(*date, &staff.staff_id)
                .map(|c| c.shift_type == ShiftType::Off)
                .unwrap_or(false);
            if !is_off {
                continue;
            }
            let room = match request.demand.range(*date, ShiftType::Day, &staff.category_id) {
                Some(range) => range
                    .max
                    .saturating_sub(grid.headcount(*date, &staff.category_id, ShiftType::Day)),
                None => u32::MAX,
            };
            if room == 0 {
                continue;
            }
            if best.map(|(r, _)| room > r).unwrap_or(true) {
                best = Some((room, *date));
            }
        }

        let (_, date) = best?;
        grid.set(
            date,
            &staff.staff_id,
            GridCell::work(ShiftType::Day, &staff.category_id, false, false),
        );
        Some(date)
    }

    /// 尝试为一名超勤员工做一次 出勤 → OFF
    ///
    /// 候选日: 本人出勤且移除后该岗位该班次仍满足最低人数；富余最多者优先，同富余取最早日期
    pub fn try_flip_to_off(
        request: &WeekReconcileRequest<'_>,
        grid: &mut ScheduleGrid,
        staff: &Staff,
    ) -> Option<NaiveDate> {
        let mut best: Option<(u32, NaiveDate)> = None;
        for date in &request.week.business_days {
            let Some(cell) = grid.get(*date, &staff.staff_id) else {
                continue;
            };
            if !cell.shift_type.is_work() {
                continue;
            }
            let headcount = grid.headcount(*date, &cell.category_id, cell.shift_type);
            let slack = match request.demand.range(*date, cell.shift_type, &cell.category_id) {
                Some(range) => headcount.saturating_sub(range.min),
                None => u32::MAX,
            };
            if slack == 0 {
                continue;
            }
            if best.map(|(s, _)| slack > s).unwrap_or(true) {
                best = Some((slack, *date));
            }
        }

        let (_, date) = best?;
        grid.set(date, &staff.staff_id, GridCell::off(&staff.category_id));
        Some(date)
    }
}

impl WeekReconciler for Phase2Reconciler {
    fn reconcile(
        &self,
        request: &WeekReconcileRequest<'_>,
        grid: &mut ScheduleGrid,
        ledger: WeekLedger,
    ) -> EngineResult<WeekOutcome> {
        let mut ledger = ledger;
        let roster: BTreeMap<&str, &Staff> = request
            .staff
            .iter()
            .map(|s| (s.staff_id.as_str(), s))
            .collect();
        let staff_ids: Vec<&str> = request
            .targets
            .staff_ids()
            .filter(|id| roster.contains_key(id))
            .collect();
        let owed = Self::owed_first(&staff_ids, request.priority);
        let surplus = Self::surplus_first(&staff_ids, request.priority);

        let mut outcome = WeekOutcome::default();
        while outcome.passes < self.max_passes {
            outcome.passes += 1;
            let mut progressed = false;

            for staff_id in &owed {
                let target = request.targets.work_target(staff_id);
                let staff = roster[staff_id];
                while ledger.work_days(staff_id) < target {
                    match Self::try_flip_to_work(request, grid, staff) {
                        Some(_) => {
                            ledger.record_to_work(staff_id);
                            outcome.flips += 1;
                            progressed = true;
                        }
                        None => break,
                    }
                }
            }

            for staff_id in &surplus {
                let target = request.targets.work_target(staff_id);
                let staff = roster[staff_id];
                while ledger.work_days(staff_id) > target {
                    match Self::try_flip_to_off(request, grid, staff) {
                        Some(_) => {
                            ledger.record_to_off(staff_id);
                            outcome.flips += 1;
                            progressed = true;
                        }
                        None => break,
                    }
                }
            }

            if !progressed {
                break;
            }
        }

        for staff_id in &staff_ids {
            let expected = request.targets.work_target(staff_id);
            let actual = ledger.work_days(staff_id);
            if actual != expected {
                warn!(
                    week_start = %request.week.week_start,
                    staff_id = %staff_id,
                    expected,
                    actual,
                    "穷尽合法翻转后仍未满足周配额"
                );
                outcome.unmet.push(UnmetQuota {
                    staff_id: staff_id.to_string(),
                    expected,
                    actual,
                });
            }
        }

        debug!(
            week_start = %ledger.week_start(),
            flips = outcome.flips,
            passes = outcome.passes,
            unmet = outcome.unmet.len(),
            off_total = ledger.off_total(),
            "Phase2 周对账完成"
        );
        Ok(outcome)
    }
}

/// Phase2 之后的 OFF 预算校验（独立于对账实现）
///
/// 期望 OFF = 预算 + Σ 未达标员工 (目标 − 实际)；同时要求每人单元数等于营业日数、
/// 未上报的员工必须恰好达标
pub fn verify_off_budget(
    week: &BusinessWeek,
    grid: &ScheduleGrid,
    targets: &WeekTargets,
    outcome: &WeekOutcome,
) -> EngineResult<()> {
    let unmet: BTreeMap<&str, &UnmetQuota> =
        outcome.unmet.iter().map(|u| (u.staff_id.as_str(), u)).collect();

    let mut actual_off: i64 = 0;
    let mut adjustment: i64 = 0;
    let mut first_defect: Option<String> = None;
    for staff_id in targets.staff_ids() {
        let shifts = grid.shifts_of(staff_id, &week.business_days);
        let work = shifts.iter().filter(|(_, s)| s.is_work()).count() as u32;
        actual_off += shifts.iter().filter(|(_, s)| *s == ShiftType::Off).count() as i64;
        let target = targets.work_target(staff_id);

        let defect = if shifts.len() as u32 != targets.business_days {
            Some(format!(
                "staff={} cells={} business_days={}",
                staff_id,
                shifts.len(),
                targets.business_days
            ))
        } else {
            match unmet.get(staff_id) {
                Some(u) if u.actual == work => {
                    adjustment += target as i64 - work as i64;
                    None
                }
                Some(u) => Some(format!(
                    "staff={} reported_work={} actual_work={}",
                    staff_id, u.actual, work
                )),
                None if work != target => Some(format!(
                    "staff={} expected_work={} actual_work={} (未上报)",
                    staff_id, target, work
                )),
                None => None,
            }
        };
        if first_defect.is_none() {
            first_defect = defect;
        }
    }

    let expected_off = targets.off_budget() + adjustment;
    if let Some(detail) = first_defect {
        return Err(EngineError::ReconciliationInvariantViolation {
            week_start: week.week_start,
            expected: expected_off,
            actual: actual_off,
            detail,
        });
    }
    if actual_off != expected_off {
        return Err(EngineError::ReconciliationInvariantViolation {
            week_start: week.week_start,
            expected: expected_off,
            actual: actual_off,
            detail: format!("off_budget={} unmet_adjustment={}", targets.off_budget(), adjustment),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests;
