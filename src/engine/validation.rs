// ==========================================
// 诊所排班系统 - 周排班校验服务
// ==========================================
// 检查项（单周、只看本月内的日期）:
//   - CellCountMismatch: 可排班员工每个营业日恰好一格；非排班员工不应有格
//   - LeaveConflict / OrphanLeave: 已确认请假与 LEAVE 格一一对应
//   - NonBusinessDayAssignment: 休诊日不应有任何排班行
//   - QuotaMismatch: 出勤天数等于周目标
//   - OffBudgetMismatch: 全周 OFF 总数等于预算
// 模式:
//   - PERIODIC_CHECK: 只报告
//   - AUTO_FIX: 仅修复孤立的单格问题，修复后完整复检；
//     复检干净才落库（先做 PERIODIC 备份），否则 AutoFixFailed 且不写库
// ==========================================

use crate::domain::assignment::{GridCell, ScheduleGrid};
use crate::domain::calendar::{monday_of, BusinessWeek};
use crate::domain::staff::Staff;
use crate::domain::types::{BackupReason, ShiftType, ValidationMode};
use crate::engine::backup::BackupService;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::reconciler::{Phase2Reconciler, WeekReconcileRequest, WeekTargets};
use crate::engine::repositories::ScheduleRepositories;
use crate::engine::snapshot::PeriodSnapshot;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, instrument, warn};

// ==========================================
// 校验问题
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationIssueType {
    CellCountMismatch,
    OffBudgetMismatch,
    QuotaMismatch,
    LeaveConflict,
    OrphanLeave,
    NonBusinessDayAssignment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub issue_type: ValidationIssueType,
    pub week_start: NaiveDate,
    pub staff_id: Option<String>,
    pub work_date: Option<NaiveDate>,
    pub expected: i64,
    pub actual: i64,
    pub message: String,
}

impl ValidationIssue {
    fn cell(
        issue_type: ValidationIssueType,
        week_start: NaiveDate,
        staff_id: &str,
        work_date: NaiveDate,
        expected: i64,
        actual: i64,
        message: String,
    ) -> Self {
        Self {
            issue_type,
            week_start,
            staff_id: Some(staff_id.to_string()),
            work_date: Some(work_date),
            expected,
            actual,
            message,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeekValidationReport {
    pub clinic_id: String,
    pub week_start: NaiveDate,
    pub mode: ValidationMode,
    pub issues: Vec<ValidationIssue>,
    /// 自动修复的单格数
    pub fixed: usize,
    /// 修复落库前创建的备份
    pub backup_id: Option<String>,
}

impl WeekValidationReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

// ==========================================
// ValidationService
// ==========================================
pub struct ValidationService {
    repos: ScheduleRepositories,
    backups: BackupService,
}

impl ValidationService {
    pub fn new(repos: ScheduleRepositories) -> Self {
        let backups = BackupService::new(repos.clone());
        Self { repos, backups }
    }

    /// 纯检查：不读库、不写库
    pub fn check_week(
        snapshot: &PeriodSnapshot,
        week: &BusinessWeek,
        targets: &WeekTargets,
        grid: &ScheduleGrid,
    ) -> Vec<ValidationIssue> {
        let ws = week.week_start;
        let mut issues = Vec::new();
        let roster: BTreeSet<&str> = snapshot.staff.iter().map(|s| s.staff_id.as_str()).collect();

        for ((date, staff_id), cell) in grid.iter() {
            if !week.calendar_days.contains(date) {
                continue;
            }
            if !week.contains(*date) {
                issues.push(ValidationIssue::cell(
                    ValidationIssueType::NonBusinessDayAssignment,
                    ws,
                    staff_id,
                    *date,
                    0,
                    1,
                    format!("休诊日存在排班: staff={}, date={}, shift={}", staff_id, date, cell.shift_type),
                ));
            } else if !roster.contains(staff_id.as_str()) {
                issues.push(ValidationIssue::cell(
                    ValidationIssueType::CellCountMismatch,
                    ws,
                    staff_id,
                    *date,
                    0,
                    1,
                    format!("非排班员工存在排班: staff={}, date={}", staff_id, date),
                ));
            }
        }

        let mut off_total: i64 = 0;
        for s in &snapshot.staff {
            let leave = snapshot.leave_dates.get(&s.staff_id);
            let mut work = 0u32;
            for date in &week.business_days {
                let on_leave = leave.map(|l| l.contains(date)).unwrap_or(false);
                match grid.get(*date, &s.staff_id) {
                    None => issues.push(ValidationIssue::cell(
                        ValidationIssueType::CellCountMismatch,
                        ws,
                        &s.staff_id,
                        *date,
                        1,
                        0,
                        format!("缺少排班格: staff={}, date={}", s.staff_id, date),
                    )),
                    Some(cell) => {
                        if cell.shift_type.is_work() {
                            work += 1;
                        }
                        if cell.shift_type == ShiftType::Off {
                            off_total += 1;
                        }
                        if on_leave && cell.shift_type != ShiftType::Leave {
                            issues.push(ValidationIssue::cell(
                                ValidationIssueType::LeaveConflict,
                                ws,
                                &s.staff_id,
                                *date,
                                1,
                                0,
                                format!(
                                    "已确认请假日被排为 {}: staff={}, date={}",
                                    cell.shift_type, s.staff_id, date
                                ),
                            ));
                        } else if !on_leave && cell.shift_type == ShiftType::Leave {
                            issues.push(ValidationIssue::cell(
                                ValidationIssueType::OrphanLeave,
                                ws,
                                &s.staff_id,
                                *date,
                                0,
                                1,
                                format!("LEAVE 格没有对应的已确认请假: staff={}, date={}", s.staff_id, date),
                            ));
                        }
                    }
                }
            }

            let target = targets.work_target(&s.staff_id);
            if work != target {
                issues.push(ValidationIssue {
                    issue_type: ValidationIssueType::QuotaMismatch,
                    week_start: ws,
                    staff_id: Some(s.staff_id.clone()),
                    work_date: None,
                    expected: target as i64,
                    actual: work as i64,
                    message: format!("周出勤天数不符: staff={}, target={}, actual={}", s.staff_id, target, work),
                });
            }
        }

        let budget = targets.off_budget();
        if off_total != budget {
            issues.push(ValidationIssue {
                issue_type: ValidationIssueType::OffBudgetMismatch,
                week_start: ws,
                staff_id: None,
                work_date: None,
                expected: budget,
                actual: off_total,
                message: format!("周 OFF 总数不符: budget={}, actual={}", budget, off_total),
            });
        }

        issues
    }

    /// 校验指定营业周（按需调用入口）
    #[instrument(skip(self, full_week_days))]
    pub fn validate_week(
        &self,
        clinic_id: &str,
        year: i32,
        month: u32,
        week_start: NaiveDate,
        mode: ValidationMode,
        full_week_days: u32,
    ) -> EngineResult<WeekValidationReport> {
        let snapshot = PeriodSnapshot::load(&self.repos, clinic_id, year, month)?;
        self.validate_loaded(&snapshot, week_start, mode, full_week_days)
    }

    /// 基于已读取的快照校验（编排器运行后复用同一快照）
    pub fn validate_loaded(
        &self,
        snapshot: &PeriodSnapshot,
        week_start: NaiveDate,
        mode: ValidationMode,
        full_week_days: u32,
    ) -> EngineResult<WeekValidationReport> {
        let ctx = &snapshot.ctx;
        let week = ctx
            .week_by_start(monday_of(week_start))
            .ok_or(EngineError::WeekNotInPeriod {
                week_start,
                year: ctx.year,
                month: ctx.month,
            })?;
        let Some((start, end)) = week.calendar_range() else {
            return Err(EngineError::WeekNotInPeriod {
                week_start,
                year: ctx.year,
                month: ctx.month,
            });
        };

        let targets = snapshot.week_targets(week, full_week_days);
        let rows = self.repos.assignment_repo.find_in_range(&ctx.clinic_id, start, end)?;
        let mut grid = ScheduleGrid::from_assignments(&rows);
        let issues = Self::check_week(snapshot, week, &targets, &grid);

        let mut report = WeekValidationReport {
            clinic_id: ctx.clinic_id.clone(),
            week_start: week.week_start,
            mode,
            issues,
            fixed: 0,
            backup_id: None,
        };
        if report.is_clean() || mode == ValidationMode::PeriodicCheck {
            info!(
                clinic_id = %ctx.clinic_id,
                week_start = %week.week_start,
                issues = report.issues.len(),
                "周排班校验完成"
            );
            return Ok(report);
        }

        // ===== AUTO_FIX =====
        let found = report.issues.len();
        let mut fixed = Self::fix_cells(snapshot, week, &mut grid, &report.issues);
        let issues = Self::check_week(snapshot, week, &targets, &grid);
        fixed += Self::fix_quota(snapshot, week, &targets, &mut grid, &issues);

        let remaining = Self::check_week(snapshot, week, &targets, &grid);
        if !remaining.is_empty() {
            warn!(
                clinic_id = %ctx.clinic_id,
                week_start = %week.week_start,
                found,
                remaining = remaining.len(),
                "自动修复后仍有问题，不写库"
            );
            return Err(EngineError::AutoFixFailed {
                week_start: week.week_start,
                remaining,
            });
        }

        let backup = self
            .backups
            .create(&ctx.clinic_id, week.week_start, BackupReason::Periodic, "auto-fix")?;
        let rows = grid.to_assignments(&ctx.clinic_id, ctx.year, ctx.month);
        self.repos
            .assignment_repo
            .replace_range(&ctx.clinic_id, start, end, &rows)?;

        info!(
            clinic_id = %ctx.clinic_id,
            week_start = %week.week_start,
            found,
            fixed,
            backup_id = %backup.backup_id,
            "自动修复完成并落库"
        );
        report.fixed = fixed;
        report.backup_id = Some(backup.backup_id);
        Ok(report)
    }

    /// 单格修复；缺格仅在该员工本周只缺一格时补齐
    fn fix_cells(
        snapshot: &PeriodSnapshot,
        week: &BusinessWeek,
        grid: &mut ScheduleGrid,
        issues: &[ValidationIssue],
    ) -> usize {
        let roster: BTreeMap<&str, &Staff> = snapshot.staff.iter().map(|s| (s.staff_id.as_str(), s)).collect();
        let mut missing: BTreeMap<&str, usize> = BTreeMap::new();
        for issue in issues {
            if issue.issue_type == ValidationIssueType::CellCountMismatch && issue.expected == 1 {
                if let Some(staff_id) = issue.staff_id.as_deref() {
                    *missing.entry(staff_id).or_insert(0) += 1;
                }
            }
        }

        let mut fixed = 0;
        for issue in issues {
            let (Some(staff_id), Some(date)) = (issue.staff_id.as_deref(), issue.work_date) else {
                continue;
            };
            let on_leave = snapshot
                .leave_dates
                .get(staff_id)
                .map(|l| l.contains(&date))
                .unwrap_or(false);
            match issue.issue_type {
                ValidationIssueType::NonBusinessDayAssignment => {
                    grid.remove(date, staff_id);
                    fixed += 1;
                }
                ValidationIssueType::CellCountMismatch if issue.expected == 0 => {
                    grid.remove(date, staff_id);
                    fixed += 1;
                }
                ValidationIssueType::CellCountMismatch => {
                    let Some(staff) = roster.get(staff_id) else {
                        continue;
                    };
                    if missing.get(staff_id).copied() != Some(1) || !week.contains(date) {
                        continue;
                    }
                    let cell = if on_leave {
                        GridCell::leave(&staff.category_id)
                    } else {
                        GridCell::off(&staff.category_id)
                    };
                    grid.set(date, staff_id, cell);
                    fixed += 1;
                }
                ValidationIssueType::LeaveConflict => {
                    if let Some(staff) = roster.get(staff_id) {
                        grid.set(date, staff_id, GridCell::leave(&staff.category_id));
                        fixed += 1;
                    }
                }
                ValidationIssueType::OrphanLeave => {
                    if let Some(staff) = roster.get(staff_id) {
                        grid.set(date, staff_id, GridCell::off(&staff.category_id));
                        fixed += 1;
                    }
                }
                _ => {}
            }
        }
        fixed
    }

    /// 差一天的周配额：做一次 Phase2 翻转
    fn fix_quota(
        snapshot: &PeriodSnapshot,
        week: &BusinessWeek,
        targets: &WeekTargets,
        grid: &mut ScheduleGrid,
        issues: &[ValidationIssue],
    ) -> usize {
        let priority = BTreeMap::new();
        let request = WeekReconcileRequest {
            week,
            staff: &snapshot.staff,
            targets,
            demand: &snapshot.demand,
            priority: &priority,
        };

        let mut fixed = 0;
        for issue in issues {
            if issue.issue_type != ValidationIssueType::QuotaMismatch {
                continue;
            }
            let Some(staff) = issue
                .staff_id
                .as_deref()
                .and_then(|id| snapshot.staff.iter().find(|s| s.staff_id == id))
            else {
                continue;
            };
            let flipped = match issue.actual - issue.expected {
                -1 => Phase2Reconciler::try_flip_to_work(&request, grid, staff),
                1 => Phase2Reconciler::try_flip_to_off(&request, grid, staff),
                _ => None,
            };
            if flipped.is_some() {
                fixed += 1;
            }
        }
        fixed
    }
}
