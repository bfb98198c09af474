// ==========================================
// 运行安全性测试
// ==========================================
// 职责: 部分失败隔离、续跑、统计期锁、遗留锁接管、取消
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

use chrono::{Duration, Local, NaiveDate};
use clinic_shift_scheduler::domain::assignment::{GridCell, ScheduleGrid};
use clinic_shift_scheduler::domain::types::{RunMode, ShiftType};
use clinic_shift_scheduler::engine::{
    AutoAssignOrchestrator, CancelFlag, EngineError, EngineResult, PeriodLockGuard, Phase2Reconciler,
    RunOptions, WeekLedger, WeekOutcome, WeekReconcileRequest, WeekReconciler,
};
use std::sync::Arc;
use test_helpers::*;

/// 在指定周对账后偷偷把一个 OFF 改成白班且不上报
struct CorruptingReconciler {
    inner: Phase2Reconciler,
    corrupt_week: NaiveDate,
}

impl WeekReconciler for CorruptingReconciler {
    fn reconcile(
        &self,
        request: &WeekReconcileRequest<'_>,
        grid: &mut ScheduleGrid,
        ledger: WeekLedger,
    ) -> EngineResult<WeekOutcome> {
        let outcome = self.inner.reconcile(request, grid, ledger)?;
        if request.week.week_start == self.corrupt_week {
            let victim = grid
                .iter()
                .find(|(_, c)| c.shift_type == ShiftType::Off)
                .map(|((date, staff_id), c)| (*date, staff_id.clone(), c.category_id.clone()));
            if let Some((date, staff_id, category_id)) = victim {
                grid.set(date, &staff_id, GridCell::work(ShiftType::Day, &category_id, false, false));
            }
        }
        Ok(outcome)
    }
}

fn seed_default(env: &TestEnv) {
    seed_staff(&env.repos, "N", "NURSE", 4, 4);
    seed_wildcard_rule(&env.repos, false, &[("NURSE", 1, 4)]);
}

#[tokio::test]
async fn test_fatal_week_keeps_earlier_weeks_and_rerun_resumes() {
    let env = setup_env();
    seed_default(&env);

    let faulty = AutoAssignOrchestrator::new(env.config.clone(), env.repos.clone()).with_reconciler(Arc::new(
        CorruptingReconciler {
            inner: Phase2Reconciler::new(64),
            corrupt_week: d(2025, 6, 16),
        },
    ));
    let report = faulty
        .run(CLINIC, 2025, 6, RunOptions::default(), &CancelFlag::new())
        .await
        .unwrap();

    assert!(!report.success);
    assert_eq!(report.committed_weeks, vec![d(2025, 6, 2), d(2025, 6, 9)]);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("2025-06-16"), "{}", report.errors[0]);

    // 第 3 周及之后未写入，公平性未更新，锁已释放
    let rows = env.repos.assignment_repo.find_by_period(CLINIC, 2025, 6).unwrap();
    assert_eq!(rows.len(), 12 * 4);
    assert!(rows.iter().all(|a| a.work_date < d(2025, 6, 16)));
    assert!(env.repos.fairness_repo.find_by_period(CLINIC, 2025, 6).unwrap().is_empty());
    assert!(env.repos.run_lock_repo.current_holder(CLINIC, 2025, 6).unwrap().is_none());

    // 正常续跑: 跳过已提交的两周
    let healthy = AutoAssignOrchestrator::new(env.config.clone(), env.repos.clone());
    let resumed = healthy
        .run(CLINIC, 2025, 6, RunOptions::default(), &CancelFlag::new())
        .await
        .unwrap();
    assert!(resumed.success, "{:?}", resumed.errors);
    assert_eq!(resumed.skipped_weeks, vec![d(2025, 6, 2), d(2025, 6, 9)]);
    assert_eq!(resumed.committed_weeks, vec![d(2025, 6, 16), d(2025, 6, 23), d(2025, 6, 30)]);
    assert_eq!(env.repos.assignment_repo.count_by_period(CLINIC, 2025, 6).unwrap(), 100);
    assert_eq!(env.repos.fairness_repo.find_by_period(CLINIC, 2025, 6).unwrap().len(), 4);
}

#[tokio::test]
async fn test_second_run_on_locked_period_is_rejected() {
    let env = setup_env();
    seed_default(&env);

    let _held = PeriodLockGuard::acquire(env.repos.run_lock_repo.clone(), CLINIC, 2025, 6, "other-run", 1800).unwrap();
    let orchestrator = AutoAssignOrchestrator::new(env.config.clone(), env.repos.clone());
    match orchestrator
        .run(CLINIC, 2025, 6, RunOptions::default(), &CancelFlag::new())
        .await
    {
        Err(EngineError::ConcurrentRunRejected { holder, month, .. }) => {
            assert_eq!(holder, "other-run");
            assert_eq!(month, 6);
        }
        other => panic!("expected ConcurrentRunRejected, got {:?}", other.map(|r| r.success)),
    }
    assert_eq!(env.repos.assignment_repo.count_by_period(CLINIC, 2025, 6).unwrap(), 0);

    // 其他统计期不受影响；试算不取锁
    let july = orchestrator
        .run(CLINIC, 2025, 7, RunOptions::default(), &CancelFlag::new())
        .await
        .unwrap();
    assert!(july.success);
    let dry = RunOptions {
        mode: RunMode::DryRun,
        ..Default::default()
    };
    assert!(orchestrator.run(CLINIC, 2025, 6, dry, &CancelFlag::new()).await.unwrap().success);
}

#[tokio::test]
async fn test_stale_lock_is_taken_over() {
    let env = setup_env();
    seed_default(&env);

    let long_ago = Local::now().naive_local() - Duration::hours(2);
    assert!(env
        .repos
        .run_lock_repo
        .try_acquire(CLINIC, 2025, 6, "crashed-run", long_ago, 1800)
        .unwrap());

    let orchestrator = AutoAssignOrchestrator::new(env.config.clone(), env.repos.clone());
    let report = orchestrator
        .run(CLINIC, 2025, 6, RunOptions::default(), &CancelFlag::new())
        .await
        .unwrap();
    assert!(report.success, "{:?}", report.errors);
    assert!(env.repos.run_lock_repo.current_holder(CLINIC, 2025, 6).unwrap().is_none());
}

#[tokio::test]
async fn test_cancelled_run_commits_nothing_further() {
    let env = setup_env();
    seed_default(&env);

    let cancel = CancelFlag::new();
    cancel.cancel();
    let orchestrator = AutoAssignOrchestrator::new(env.config.clone(), env.repos.clone());
    let report = orchestrator
        .run(CLINIC, 2025, 6, RunOptions::default(), &cancel)
        .await
        .unwrap();

    assert!(!report.success);
    assert!(report.committed_weeks.is_empty());
    assert_eq!(report.errors.len(), 1);
    assert_eq!(env.repos.assignment_repo.count_by_period(CLINIC, 2025, 6).unwrap(), 0);
    assert!(env.repos.run_lock_repo.current_holder(CLINIC, 2025, 6).unwrap().is_none());
}
