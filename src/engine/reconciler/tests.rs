use super::*;
use crate::domain::calendar::CalendarContext;
use crate::domain::doctor_rule::{DoctorCombination, DoctorSet, StaffRange};
use crate::domain::staff::Capability;
use crate::domain::types::EmploymentType;
use crate::engine::calendar::CalendarContextBuilder;
use crate::engine::slot_calculator::WeeklySlotCalculator;

fn d(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, day).unwrap()
}

fn make_staff(id: &str, quota: u32) -> Staff {
    Staff {
        staff_id: id.to_string(),
        clinic_id: "C1".to_string(),
        name: id.to_string(),
        category_id: "NURSE".to_string(),
        weekly_quota: quota,
        capability: Capability::Fixed,
        employment: EmploymentType::FullTime,
        active: true,
    }
}

fn nurse_rule(min: u32, max: u32) -> DoctorCombination {
    let mut requirements = BTreeMap::new();
    requirements.insert("NURSE".to_string(), StaffRange { min, max });
    DoctorCombination {
        doctors: DoctorSet::Any,
        day_of_week: None,
        night_shift: false,
        requirements,
    }
}

/// 2025-06 第一周（06-02 至 06-07，6 个营业日）
fn june_context() -> CalendarContext {
    CalendarContextBuilder::build("C1", 2025, 6, &[]).unwrap()
}

fn all_off(staff: &[Staff], week: &BusinessWeek) -> ScheduleGrid {
    let mut grid = ScheduleGrid::new();
    for s in staff {
        for date in &week.business_days {
            grid.set(*date, &s.staff_id, GridCell::off(&s.category_id));
        }
    }
    grid
}

fn run_phase2(
    staff: &[Staff],
    week: &BusinessWeek,
    demand: &SlotDemand,
    targets: &WeekTargets,
    grid: &mut ScheduleGrid,
) -> WeekOutcome {
    let priority = BTreeMap::new();
    let request = WeekReconcileRequest {
        week,
        staff,
        targets,
        demand,
        priority: &priority,
    };
    let ledger = WeekLedger::fresh(week, grid, targets);
    Phase2Reconciler::new(64).reconcile(&request, grid, ledger).unwrap()
}

fn count(grid: &ScheduleGrid, staff_id: &str, week: &BusinessWeek, pred: impl Fn(ShiftType) -> bool) -> usize {
    grid.shifts_of(staff_id, &week.business_days)
        .into_iter()
        .filter(|(_, s)| pred(*s))
        .count()
}

#[test]
fn test_scenario_a_leave_reduces_work_and_keeps_two_off() {
    let ctx = june_context();
    let week = &ctx.weeks[0];
    let staff = vec![make_staff("S1", 4)];
    let demand = WeeklySlotCalculator::new().calculate(&ctx, &[nurse_rule(0, 5)], &BTreeMap::new());

    let mut leave = BTreeMap::new();
    leave.insert("S1".to_string(), BTreeSet::from([d(4)]));
    let targets = WeekTargets::compute(week, &staff, &leave, 6);
    assert_eq!(targets.work_target("S1"), 3);
    assert_eq!(targets.off_budget(), 2);

    let mut grid = all_off(&staff, week);
    grid.set(d(4), "S1", GridCell::leave("NURSE"));
    let outcome = run_phase2(&staff, week, &demand, &targets, &mut grid);

    assert!(outcome.unmet.is_empty());
    assert_eq!(count(&grid, "S1", week, |s| s.is_work()), 3);
    assert_eq!(count(&grid, "S1", week, |s| s == ShiftType::Leave), 1);
    assert_eq!(count(&grid, "S1", week, |s| s == ShiftType::Off), 2);
    verify_off_budget(week, &grid, &targets, &outcome).unwrap();
}

#[test]
fn test_scenario_b_off_budget_is_exactly_forty() {
    let ctx = june_context();
    let week = &ctx.weeks[0];
    let staff: Vec<Staff> = (1..=20).map(|i| make_staff(&format!("S{:02}", i), 4)).collect();
    // 每天最多 14 人：80 个出勤名额需要摊到 6 天
    let demand = WeeklySlotCalculator::new().calculate(&ctx, &[nurse_rule(10, 14)], &BTreeMap::new());
    let targets = WeekTargets::compute(week, &staff, &BTreeMap::new(), 6);
    assert_eq!(targets.off_budget(), 40);

    // Phase1 已按最低人数排好每天 10 人（轮转），其余 OFF
    let mut grid = all_off(&staff, week);
    for (i, date) in week.business_days.iter().enumerate() {
        for k in 0..10 {
            let s = &staff[(i * 10 + k) % 20];
            grid.set(*date, &s.staff_id, GridCell::work(ShiftType::Day, "NURSE", false, false));
        }
    }

    let outcome = run_phase2(&staff, week, &demand, &targets, &mut grid);
    assert!(outcome.unmet.is_empty(), "unmet: {:?}", outcome.unmet);

    let total_off: usize = staff
        .iter()
        .map(|s| count(&grid, &s.staff_id, week, |t| t == ShiftType::Off))
        .sum();
    assert_eq!(total_off, 40);
    for s in &staff {
        assert_eq!(count(&grid, &s.staff_id, week, |t| t.is_work()), 4);
    }
    for date in &week.business_days {
        let heads = grid.headcount(*date, "NURSE", ShiftType::Day);
        assert!((10..=14).contains(&heads), "date={} heads={}", date, heads);
    }
    verify_off_budget(week, &grid, &targets, &outcome).unwrap();
}

#[test]
fn test_scenario_c_second_pass_is_a_no_op() {
    let ctx = june_context();
    let week = &ctx.weeks[0];
    let staff: Vec<Staff> = (1..=6).map(|i| make_staff(&format!("S{}", i), if i % 2 == 0 { 5 } else { 4 })).collect();
    let demand = WeeklySlotCalculator::new().calculate(&ctx, &[nurse_rule(2, 5)], &BTreeMap::new());
    let targets = WeekTargets::compute(week, &staff, &BTreeMap::new(), 6);

    let mut grid = all_off(&staff, week);
    let first = run_phase2(&staff, week, &demand, &targets, &mut grid);
    assert!(first.flips > 0);
    let after_first = grid.clone();

    let second = run_phase2(&staff, week, &demand, &targets, &mut grid);
    assert_eq!(second.flips, 0);
    assert_eq!(grid, after_first);
}

#[test]
fn test_over_quota_staff_is_trimmed_only_where_minimum_holds() {
    let ctx = june_context();
    let week = &ctx.weeks[0];
    let staff = vec![make_staff("S1", 4), make_staff("S2", 4)];
    let demand = WeeklySlotCalculator::new().calculate(&ctx, &[nurse_rule(1, 2)], &BTreeMap::new());
    let targets = WeekTargets::compute(week, &staff, &BTreeMap::new(), 6);

    // 两人都排满 6 天
    let mut grid = ScheduleGrid::new();
    for s in &staff {
        for date in &week.business_days {
            grid.set(*date, &s.staff_id, GridCell::work(ShiftType::Day, "NURSE", false, false));
        }
    }
    let outcome = run_phase2(&staff, week, &demand, &targets, &mut grid);
    assert!(outcome.unmet.is_empty());
    for date in &week.business_days {
        assert!(grid.headcount(*date, "NURSE", ShiftType::Day) >= 1);
    }
    verify_off_budget(week, &grid, &targets, &outcome).unwrap();
}

#[test]
fn test_capacity_limit_reports_quota_unmet_instead_of_dropping() {
    let ctx = june_context();
    let week = &ctx.weeks[0];
    let staff = vec![make_staff("S1", 4), make_staff("S2", 4)];
    // 每天最多 1 人，6 天只能给出 6 个出勤，需要 8 个
    let demand = WeeklySlotCalculator::new().calculate(&ctx, &[nurse_rule(0, 1)], &BTreeMap::new());
    let targets = WeekTargets::compute(week, &staff, &BTreeMap::new(), 6);

    let mut grid = all_off(&staff, week);
    let outcome = run_phase2(&staff, week, &demand, &targets, &mut grid);

    let short: u32 = outcome.unmet.iter().map(|u| u.expected - u.actual).sum();
    assert_eq!(short, 2);
    assert_eq!(outcome.warnings(week.week_start).len(), outcome.unmet.len());
    // 未达标部分计入期望 OFF，校验仍然通过
    verify_off_budget(week, &grid, &targets, &outcome).unwrap();
}

#[test]
fn test_verification_rejects_unreported_drift() {
    let ctx = june_context();
    let week = &ctx.weeks[0];
    let staff: Vec<Staff> = (1..=3).map(|i| make_staff(&format!("S{}", i), 4)).collect();
    let demand = WeeklySlotCalculator::new().calculate(&ctx, &[nurse_rule(0, 3)], &BTreeMap::new());
    let targets = WeekTargets::compute(week, &staff, &BTreeMap::new(), 6);

    let mut grid = all_off(&staff, week);
    let outcome = run_phase2(&staff, week, &demand, &targets, &mut grid);
    verify_off_budget(week, &grid, &targets, &outcome).unwrap();

    // 多出一个 OFF（41 vs 40 类缺陷）
    let date = grid
        .shifts_of("S2", &week.business_days)
        .into_iter()
        .find(|(_, s)| s.is_work())
        .map(|(d, _)| d)
        .unwrap();
    grid.set(date, "S2", GridCell::off("NURSE"));

    match verify_off_budget(week, &grid, &targets, &outcome) {
        Err(EngineError::ReconciliationInvariantViolation {
            week_start,
            expected,
            actual,
            detail,
        }) => {
            assert_eq!(week_start, d(2));
            assert_eq!(expected, 6);
            assert_eq!(actual, 7);
            assert!(detail.contains("S2"));
        }
        other => panic!("expected violation, got {:?}", other),
    }
}

#[test]
fn test_ledger_is_scoped_to_week_business_days() {
    let ctx = june_context();
    let staff = vec![make_staff("S1", 4)];
    let mut grid = ScheduleGrid::new();
    // 第一周 5 个出勤，第二周 1 个出勤
    for day in 2..=6 {
        grid.set(d(day), "S1", GridCell::work(ShiftType::Day, "NURSE", false, false));
    }
    grid.set(d(9), "S1", GridCell::work(ShiftType::Day, "NURSE", false, false));

    let w2 = &ctx.weeks[1];
    let targets = WeekTargets::compute(w2, &staff, &BTreeMap::new(), 6);
    let ledger = WeekLedger::fresh(w2, &grid, &targets);
    assert_eq!(ledger.week_start(), d(9));
    assert_eq!(ledger.work_days("S1"), 1);
    assert_eq!(ledger.off_total(), 0);
}

#[test]
fn test_partial_week_prorates_quota() {
    let ctx = june_context();
    // 06-30 单独成周：1 个日历日
    let last = ctx.weeks.last().unwrap();
    let staff = vec![make_staff("S4", 4), make_staff("S5", 5)];
    let targets = WeekTargets::compute(last, &staff, &BTreeMap::new(), 6);
    // round(4/6)=1, round(5/6)=1
    assert_eq!(targets.work_target("S4"), 1);
    assert_eq!(targets.work_target("S5"), 1);

    let oct = CalendarContextBuilder::build("C1", 2025, 10, &[]).unwrap();
    let targets = WeekTargets::compute(&oct.weeks[0], &staff, &BTreeMap::new(), 6);
    // 4 个日历日: round(16/6)=3, round(20/6)=3
    assert_eq!(targets.work_target("S4"), 3);
    assert_eq!(targets.work_target("S5"), 3);
    assert_eq!(targets.off_budget(), 2);
}

fn run_phase2_with_priority(
    staff: &[Staff],
    week: &BusinessWeek,
    demand: &SlotDemand,
    targets: &WeekTargets,
    grid: &mut ScheduleGrid,
    priority: &BTreeMap<String, f64>,
) -> WeekOutcome {
    let request = WeekReconcileRequest {
        week,
        staff,
        targets,
        demand,
        priority,
    };
    let ledger = WeekLedger::fresh(week, grid, targets);
    Phase2Reconciler::new(64).reconcile(&request, grid, ledger).unwrap()
}

#[test]
fn test_scarce_work_slot_goes_to_most_owed_staff() {
    let ctx = june_context();
    let week = &ctx.weeks[0];
    let staff = vec![make_staff("A", 4), make_staff("B", 4), make_staff("C", 4)];
    // 周一至周五最多 2 人，周六最多 1 人
    let mut saturday = nurse_rule(0, 1);
    saturday.day_of_week = Some(chrono::Weekday::Sat);
    let demand = WeeklySlotCalculator::new().calculate(&ctx, &[nurse_rule(0, 2), saturday], &BTreeMap::new());
    let targets = WeekTargets::compute(week, &staff, &BTreeMap::new(), 6);

    let seeded = || {
        let mut grid = all_off(&staff, week);
        let work = |grid: &mut ScheduleGrid, id: &str, days: &[u32]| {
            for day in days {
                grid.set(d(*day), id, GridCell::work(ShiftType::Day, "NURSE", false, false));
            }
        };
        work(&mut grid, "C", &[2, 3, 4, 5]);
        work(&mut grid, "A", &[2, 3, 6]);
        work(&mut grid, "B", &[4, 5, 6]);
        grid
    };
    let saturday_worker = |grid: &ScheduleGrid| {
        ["A", "B"]
            .into_iter()
            .find(|id| grid.get(d(7), id).map(|c| c.shift_type.is_work()).unwrap_or(false))
    };

    // A 欠班（负偏差），B 已多排（正偏差且绝对值更大）
    let priority = BTreeMap::from([("A".to_string(), -0.5), ("B".to_string(), 2.0), ("C".to_string(), 0.0)]);
    let mut grid = seeded();
    let outcome = run_phase2_with_priority(&staff, week, &demand, &targets, &mut grid, &priority);
    assert_eq!(saturday_worker(&grid), Some("A"));
    assert_eq!(outcome.unmet.len(), 1);
    assert_eq!(outcome.unmet[0].staff_id, "B");
    verify_off_budget(week, &grid, &targets, &outcome).unwrap();

    // 偏差互换后名额随之转移
    let swapped = BTreeMap::from([("A".to_string(), 2.0), ("B".to_string(), -0.5), ("C".to_string(), 0.0)]);
    let mut grid = seeded();
    run_phase2_with_priority(&staff, week, &demand, &targets, &mut grid, &swapped);
    assert_eq!(saturday_worker(&grid), Some("B"));
}

#[test]
fn test_flip_order_follows_signed_deviation() {
    let priority = BTreeMap::from([
        ("A".to_string(), -1.8),
        ("B".to_string(), 0.9),
        ("C".to_string(), 0.9),
        ("D".to_string(), -0.2),
    ]);
    let ids = ["C", "B", "A", "D", "E"];
    assert_eq!(Phase2Reconciler::owed_first(&ids, &priority), vec!["A", "D", "E", "B", "C"]);
    assert_eq!(Phase2Reconciler::surplus_first(&ids, &priority), vec!["B", "C", "E", "D", "A"]);
}
