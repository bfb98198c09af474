// ==========================================
// 诊所排班系统 - 自动排班编排器
// ==========================================
// 主流程（单诊所、单统计期）:
//   配置 → 统计期锁 → 输入快照 → 逐周 [Phase1 → Phase2 → OFF 预算校验 → 落库]
//   → 公平性重算与镜像 → 周校验
// 提交边界: 每个营业周单事务落库；致命错误只丢弃当前周，已提交周保留
// 续跑: 不强制重排时，已满足单元数不变量的周直接跳过
// 取消: 只在周与周之间检查
// ==========================================

use crate::config::ScheduleConfigReader;
use crate::domain::assignment::ScheduleGrid;
use crate::domain::calendar::{month_bounds, BusinessWeek};
use crate::domain::types::{BackupReason, FairnessDimension, RunMode, ValidationMode};
use crate::engine::allocator::Phase1Allocator;
use crate::engine::backup::BackupService;
use crate::engine::error::{EngineError, EngineResult, EngineWarning};
use crate::engine::fairness::{FairnessScorer, FairnessSettings, RankingLedger};
use crate::engine::period_lock::PeriodLockGuard;
use crate::engine::reconciler::{
    verify_off_budget, Phase2Reconciler, WeekLedger, WeekReconcileRequest, WeekReconciler,
};
use crate::engine::repositories::ScheduleRepositories;
use crate::engine::snapshot::PeriodSnapshot;
use crate::engine::validation::{ValidationIssue, ValidationIssueType, ValidationService};
use chrono::NaiveDate;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

// ==========================================
// CancelFlag - 协作式取消
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ==========================================
// RunOptions / RunReport
// ==========================================
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// true: 已有完整排班的周也重新计算并覆盖
    pub force_redeploy: bool,
    pub mode: RunMode,
    pub validation_mode: ValidationMode,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub success: bool,
    pub total_assignments: usize,
    pub average_fairness: f64,
    pub warnings: Vec<EngineWarning>,
    pub errors: Vec<String>,
    pub committed_weeks: Vec<NaiveDate>,
    pub skipped_weeks: Vec<NaiveDate>,
    pub flips: usize,
    pub validation_issues: Vec<ValidationIssue>,
}

/// 单次运行的生效参数
struct RunSettings {
    fairness: FairnessSettings,
    max_passes: usize,
    stale_secs: i64,
    full_week_days: u32,
}

// ==========================================
// AutoAssignOrchestrator
// ==========================================
pub struct AutoAssignOrchestrator<C>
where
    C: ScheduleConfigReader,
{
    config: Arc<C>,
    repos: ScheduleRepositories,
    reconciler: Option<Arc<dyn WeekReconciler>>,
}

impl<C> AutoAssignOrchestrator<C>
where
    C: ScheduleConfigReader,
{
    pub fn new(config: Arc<C>, repos: ScheduleRepositories) -> Self {
        Self {
            config,
            repos,
            reconciler: None,
        }
    }

    /// 替换 Phase2 实现（默认每次运行按配置的轮次上限构造 Phase2Reconciler）
    pub fn with_reconciler(mut self, reconciler: Arc<dyn WeekReconciler>) -> Self {
        self.reconciler = Some(reconciler);
        self
    }

    async fn load_settings(&self, clinic_id: &str) -> EngineResult<RunSettings> {
        let to_engine = |e: Box<dyn std::error::Error + Send + Sync>| EngineError::Config(e.to_string());
        Ok(RunSettings {
            fairness: FairnessSettings {
                carry_over_weight: self.config.get_carry_over_weight(clinic_id).await.map_err(to_engine)?,
                weights: self.config.get_dimension_weights(clinic_id).await.map_err(to_engine)?,
            },
            max_passes: self.config.get_phase2_max_passes(clinic_id).await.map_err(to_engine)?,
            stale_secs: self.config.get_run_lock_stale_secs(clinic_id).await.map_err(to_engine)?,
            full_week_days: self.config.get_full_week_days(clinic_id).await.map_err(to_engine)?,
        })
    }

    /// 自动排班
    ///
    /// # 返回
    /// - Ok(RunReport): 运行结束（周失败与取消记录在 errors 中，success=false）
    /// - Err: 运行开始前即失败（配置、统计期、并发、读库），未做任何写入
    #[instrument(skip(self, options, cancel), fields(mode = ?options.mode, force = options.force_redeploy))]
    pub async fn run(
        &self,
        clinic_id: &str,
        year: i32,
        month: u32,
        options: RunOptions,
        cancel: &CancelFlag,
    ) -> EngineResult<RunReport> {
        let settings = self.load_settings(clinic_id).await?;
        match self.config.get_effective_config(clinic_id).await {
            Ok(config) => debug!(clinic_id, config = %config, "本次运行生效配置"),
            Err(e) => warn!(clinic_id, error = %e, "生效配置快照读取失败"),
        }
        month_bounds(year, month).ok_or(EngineError::InvalidPeriod { year, month })?;

        let holder = format!("run-{}", Uuid::new_v4());
        let lock = match options.mode {
            RunMode::Commit => Some(PeriodLockGuard::acquire(
                self.repos.run_lock_repo.clone(),
                clinic_id,
                year,
                month,
                &holder,
                settings.stale_secs,
            )?),
            RunMode::DryRun => None,
        };

        let snapshot = PeriodSnapshot::load(&self.repos, clinic_id, year, month)?;
        info!(
            clinic_id,
            year,
            month,
            weeks = snapshot.ctx.weeks.len(),
            staff = snapshot.staff.len(),
            "开始自动排班"
        );

        let mut report = RunReport {
            warnings: snapshot.demand.warnings.clone(),
            ..Default::default()
        };
        let reconciler: Arc<dyn WeekReconciler> = match &self.reconciler {
            Some(r) => r.clone(),
            None => Arc::new(Phase2Reconciler::new(settings.max_passes)),
        };
        let mut ranking = RankingLedger::new(
            snapshot.staff.iter().map(|s| s.staff_id.as_str()),
            &snapshot.carried,
            settings.fairness.carry_over_weight,
        );
        let mut period_grid = ScheduleGrid::new();

        for week in &snapshot.ctx.weeks {
            if cancel.is_cancelled() {
                let err = EngineError::Cancelled {
                    committed_weeks: report.committed_weeks.len(),
                };
                warn!(clinic_id, week_start = %week.week_start, "{}", err);
                report.errors.push(err.to_string());
                break;
            }

            match self.process_week(
                &snapshot,
                week,
                &settings,
                options,
                &holder,
                reconciler.as_ref(),
                &mut ranking,
                &mut report,
            ) {
                Ok(grid) => period_grid.merge(&grid),
                Err(e) => {
                    error!(clinic_id, week_start = %week.week_start, error = %e, "营业周处理失败，运行终止");
                    report.errors.push(e.to_string());
                    break;
                }
            }
        }

        report.total_assignments = period_grid.len();
        let completed = report.errors.is_empty();

        let scores = FairnessScorer::new(settings.fairness).score(
            &snapshot.ctx,
            &snapshot.staff,
            &period_grid,
            &snapshot.carried,
        );
        report.average_fairness = FairnessScorer::average_fairness(&scores);

        if options.mode == RunMode::Commit {
            // 只有整个统计期完成时才更新公平性
            if completed {
                self.repos.fairness_repo.upsert_batch(&scores)?;
                self.repos.staff_repo.overwrite_fairness_mirror(&snapshot.ctx.clinic_id, &scores)?;
            }
            self.validate_weeks(&snapshot, &settings, options.validation_mode, &mut report);
        }

        if let Some(lock) = lock {
            lock.release()?;
        }

        report.success = report.errors.is_empty();
        info!(
            clinic_id,
            year,
            month,
            success = report.success,
            total_assignments = report.total_assignments,
            committed = report.committed_weeks.len(),
            skipped = report.skipped_weeks.len(),
            flips = report.flips,
            warnings = report.warnings.len(),
            average_fairness = report.average_fairness,
            "自动排班结束"
        );
        Ok(report)
    }

    /// 处理单个营业周，返回本周最终网格
    #[allow(clippy::too_many_arguments)]
    fn process_week(
        &self,
        snapshot: &PeriodSnapshot,
        week: &BusinessWeek,
        settings: &RunSettings,
        options: RunOptions,
        holder: &str,
        reconciler: &dyn WeekReconciler,
        ranking: &mut RankingLedger,
        report: &mut RunReport,
    ) -> EngineResult<ScheduleGrid> {
        let ctx = &snapshot.ctx;
        let Some((start, end)) = week.calendar_range() else {
            return Ok(ScheduleGrid::new());
        };
        let targets = snapshot.week_targets(week, settings.full_week_days);

        let existing = self
            .repos
            .assignment_repo
            .find_in_range(&ctx.clinic_id, start, end)?;
        if !options.force_redeploy && !existing.is_empty() {
            let grid = ScheduleGrid::from_assignments(&existing);
            let complete = !ValidationService::check_week(snapshot, week, &targets, &grid)
                .iter()
                .any(|i| i.issue_type == ValidationIssueType::CellCountMismatch);
            if complete {
                debug!(week_start = %week.week_start, rows = existing.len(), "本周已有完整排班，跳过");
                ranking.absorb(ctx, &grid);
                report.skipped_weeks.push(week.week_start);
                return Ok(grid);
            }
        }

        // ===== 周需求汇总 =====
        let totals = snapshot.demand.week_totals(week);
        let work_capacity = targets.total_work_target();
        let mut week_warnings = Vec::new();
        if totals.total_required_min > work_capacity {
            warn!(
                week_start = %week.week_start,
                required_min = totals.total_required_min,
                work_capacity,
                resolved_days = totals.resolved_days,
                "本周最低需求超过全员出勤目标"
            );
            week_warnings.push(EngineWarning::WeekUnderstaffed {
                week_start: week.week_start,
                required_min: totals.total_required_min,
                work_capacity,
            });
        }

        // ===== Phase1 =====
        let phase1 = Phase1Allocator::new().allocate_week(
            ctx,
            week,
            &snapshot.demand,
            &snapshot.staff,
            &snapshot.leave_dates,
            &targets,
            ranking,
        );
        let mut grid = phase1.grid;

        // ===== Phase2（台账每周重新计算） =====
        let ledger = WeekLedger::fresh(week, &grid, &targets);
        let priority = ranking.deviations(&snapshot.staff, FairnessDimension::TotalDays);
        let request = WeekReconcileRequest {
            week,
            staff: &snapshot.staff,
            targets: &targets,
            demand: &snapshot.demand,
            priority: &priority,
        };
        let outcome = reconciler.reconcile(&request, &mut grid, ledger)?;
        verify_off_budget(week, &grid, &targets, &outcome)?;

        // ===== 落库 =====
        if options.mode == RunMode::Commit {
            if !existing.is_empty() {
                BackupService::new(self.repos.clone()).create(
                    &ctx.clinic_id,
                    week.week_start,
                    BackupReason::PreReassign,
                    holder,
                )?;
            }
            let rows = grid.to_assignments(&ctx.clinic_id, ctx.year, ctx.month);
            self.repos
                .assignment_repo
                .replace_range(&ctx.clinic_id, start, end, &rows)?;
            report.committed_weeks.push(week.week_start);
        }

        report.warnings.extend(week_warnings);
        report.warnings.extend(phase1.warnings);
        report.warnings.extend(outcome.warnings(week.week_start));
        report.flips += outcome.flips;
        ranking.absorb(ctx, &grid);

        info!(
            week_start = %week.week_start,
            business_days = week.business_day_count(),
            required_min = totals.total_required_min,
            off_budget = targets.off_budget(),
            flips = outcome.flips,
            unmet = outcome.unmet.len(),
            "营业周排班完成"
        );
        Ok(grid)
    }

    /// 对已落库（提交或跳过）的周做校验
    fn validate_weeks(
        &self,
        snapshot: &PeriodSnapshot,
        settings: &RunSettings,
        mode: ValidationMode,
        report: &mut RunReport,
    ) {
        let service = ValidationService::new(self.repos.clone());
        let mut weeks: Vec<NaiveDate> = report
            .committed_weeks
            .iter()
            .chain(report.skipped_weeks.iter())
            .copied()
            .collect();
        weeks.sort();

        for week_start in weeks {
            match service.validate_loaded(snapshot, week_start, mode, settings.full_week_days) {
                Ok(r) => report.validation_issues.extend(r.issues),
                Err(EngineError::AutoFixFailed { week_start, remaining }) => {
                    report.errors.push(
                        EngineError::AutoFixFailed {
                            week_start,
                            remaining: remaining.clone(),
                        }
                        .to_string(),
                    );
                    report.validation_issues.extend(remaining);
                }
                Err(e) => report.errors.push(e.to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigManager;
    use crate::domain::doctor_rule::{DoctorCombination, DoctorSet, StaffRange};
    use crate::domain::staff::{Capability, Staff};
    use crate::domain::types::EmploymentType;
    use rusqlite::Connection;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    fn setup() -> (AutoAssignOrchestrator<ConfigManager>, ScheduleRepositories) {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::ensure_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        let repos = ScheduleRepositories::from_connection(conn.clone());
        for i in 1..=4 {
            repos
                .staff_repo
                .upsert(&Staff {
                    staff_id: format!("N{}", i),
                    clinic_id: "C1".to_string(),
                    name: format!("N{}", i),
                    category_id: "NURSE".to_string(),
                    weekly_quota: 4,
                    capability: Capability::Fixed,
                    employment: EmploymentType::FullTime,
                    active: true,
                })
                .unwrap();
        }
        repos
            .doctor_rule_repo
            .insert_rule(
                "C1",
                &DoctorCombination {
                    doctors: DoctorSet::Any,
                    day_of_week: None,
                    night_shift: false,
                    requirements: BTreeMap::from([("NURSE".to_string(), StaffRange { min: 2, max: 4 })]),
                },
            )
            .unwrap();
        let config = Arc::new(ConfigManager::from_connection(conn));
        (AutoAssignOrchestrator::new(config, repos.clone()), repos)
    }

    #[test]
    fn test_cancel_flag_is_shared_between_clones() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        assert!(!other.is_cancelled());
        flag.cancel();
        assert!(other.is_cancelled());
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let (orchestrator, repos) = setup();
        let options = RunOptions {
            mode: RunMode::DryRun,
            ..Default::default()
        };
        let report = orchestrator
            .run("C1", 2025, 6, options, &CancelFlag::new())
            .await
            .unwrap();

        assert!(report.success, "{:?}", report.errors);
        assert!(report.committed_weeks.is_empty());
        // 6 月: 25 个营业日 × 4 人
        assert_eq!(report.total_assignments, 100);
        assert_eq!(repos.assignment_repo.count_by_period("C1", 2025, 6).unwrap(), 0);
        assert!(repos.fairness_repo.find_by_period("C1", 2025, 6).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_commit_writes_every_week_and_scores() {
        let (orchestrator, repos) = setup();
        let report = orchestrator
            .run("C1", 2025, 6, RunOptions::default(), &CancelFlag::new())
            .await
            .unwrap();

        assert!(report.success, "{:?}", report.errors);
        assert_eq!(report.committed_weeks.len(), 5);
        assert_eq!(repos.assignment_repo.count_by_period("C1", 2025, 6).unwrap(), 100);
        assert_eq!(repos.fairness_repo.find_by_period("C1", 2025, 6).unwrap().len(), 4);
        assert!(report.validation_issues.is_empty(), "{:?}", report.validation_issues);
        // 锁已释放
        assert!(repos.run_lock_repo.current_holder("C1", 2025, 6).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_period_is_rejected_before_any_work() {
        let (orchestrator, _) = setup();
        assert!(matches!(
            orchestrator
                .run("C1", 2025, 13, RunOptions::default(), &CancelFlag::new())
                .await,
            Err(EngineError::InvalidPeriod { year: 2025, month: 13 })
        ));
    }
}
