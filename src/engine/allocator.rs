// ==========================================
// 诊所排班系统 - Phase1 初始分配
// ==========================================
// 输入: 需求表、员工、已确认请假、周目标、排序台账
// 流程（逐日、逐班次、逐岗位）:
//   1. 先落请假（此后不可改）
//   2. 本岗位未达周目标的空闲员工，按公平排序补到最低人数
//   3. 仍不足: 跨岗员工（能力集合包含该岗位）补位，标记 isFlexible
//   4. 仍不足: 本岗位已达周目标的员工顶班，标记 isSubstitute
//   5. 其余空闲员工 OFF
// 输出: 一周的内存网格（未落库）
// ==========================================

use crate::domain::assignment::{GridCell, ScheduleGrid};
use crate::domain::calendar::{BusinessWeek, CalendarContext};
use crate::domain::staff::{FillCapability, Staff};
use crate::domain::types::{FairnessDimension, ShiftType};
use crate::engine::error::EngineWarning;
use crate::engine::fairness::{dimensions_of, primary_dimension, RankingLedger};
use crate::engine::reconciler::WeekTargets;
use crate::engine::slot_calculator::SlotDemand;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

// ==========================================
// Phase1Result - 单周分配结果
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct Phase1Result {
    pub grid: ScheduleGrid,
    pub warnings: Vec<EngineWarning>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FillPass {
    HomeUnderTarget,
    Flexible,
    Substitute,
}

// ==========================================
// Phase1Allocator - 初始分配器
// ==========================================
pub struct Phase1Allocator;

impl Default for Phase1Allocator {
    fn default() -> Self {
        Self::new()
    }
}

impl Phase1Allocator {
    pub fn new() -> Self {
        Self
    }

    /// 分配一个营业周
    ///
    /// # 参数
    /// - staff: 可排班员工（调用方已过滤）
    /// - leave_dates: 员工 → 已确认请假日期
    /// - ranking: 本期排序台账（只读；周内临时计数在副本上累加）
    pub fn allocate_week(
        &self,
        ctx: &CalendarContext,
        week: &BusinessWeek,
        demand: &SlotDemand,
        staff: &[Staff],
        leave_dates: &BTreeMap<String, BTreeSet<NaiveDate>>,
        targets: &WeekTargets,
        ranking: &RankingLedger,
    ) -> Phase1Result {
        let mut result = Phase1Result::default();
        let mut live = ranking.clone();
        let mut week_work: BTreeMap<&str, u32> = BTreeMap::new();

        // 1. 请假
        for s in staff {
            if let Some(dates) = leave_dates.get(&s.staff_id) {
                for date in dates.iter().filter(|d| week.contains(**d)) {
                    result.grid.set(*date, &s.staff_id, GridCell::leave(&s.category_id));
                }
            }
        }

        for date in &week.business_days {
            let Some(day) = demand.day(*date) else {
                continue;
            };

            // 夜诊更稀缺，先排
            for shift_type in [ShiftType::Night, ShiftType::Day] {
                for (category_id, range) in day.requirements(shift_type) {
                    let mut assigned = 0;
                    for pass in [FillPass::HomeUnderTarget, FillPass::Flexible, FillPass::Substitute] {
                        if assigned >= range.min {
                            break;
                        }
                        let dim = primary_dimension(ctx, *date, shift_type);
                        let mut candidates: Vec<&Staff> = staff
                            .iter()
                            .filter(|s| result.grid.get(*date, &s.staff_id).is_none())
                            .filter(|s| {
                                let worked = week_work.get(s.staff_id.as_str()).copied().unwrap_or(0);
                                let under = worked < targets.work_target(&s.staff_id);
                                match pass {
                                    FillPass::HomeUnderTarget => s.category_id == *category_id && under,
                                    FillPass::Flexible => s.is_cross_category(category_id) && under,
                                    FillPass::Substitute => s.category_id == *category_id && !under,
                                }
                            })
                            .collect();
                        Self::rank(&mut candidates, &live, staff, dim);

                        for s in candidates {
                            if assigned >= range.min {
                                break;
                            }
                            let cell = GridCell::work(
                                shift_type,
                                category_id,
                                pass == FillPass::Flexible,
                                pass == FillPass::Substitute,
                            );
                            result.grid.set(*date, &s.staff_id, cell);
                            live.record(&s.staff_id, &dimensions_of(ctx, *date, shift_type));
                            *week_work.entry(s.staff_id.as_str()).or_insert(0) += 1;
                            assigned += 1;
                        }
                    }

                    if assigned < range.min {
                        debug!(
                            date = %date,
                            category_id = %category_id,
                            shift_type = %shift_type,
                            required = range.min,
                            assigned,
                            "Phase1 无法凑够最低人数"
                        );
                        result.warnings.push(EngineWarning::CoverageShortfall {
                            date: *date,
                            category_id: category_id.clone(),
                            shift_type,
                            required: range.min,
                            assigned,
                        });
                    }
                }
            }

            // 5. 其余 OFF
            for s in staff {
                if result.grid.get(*date, &s.staff_id).is_none() {
                    result.grid.set(*date, &s.staff_id, GridCell::off(&s.category_id));
                }
            }
        }

        debug!(
            week_start = %week.week_start,
            cells = result.grid.len(),
            shortfalls = result.warnings.len(),
            "Phase1 周分配完成"
        );
        result
    }

    /// 排序: 相关维度偏差升序（最欠班者优先）→ 总天数偏差升序 → staff_id
    ///
    /// 偏差相对各自岗位均值，跨岗位补位的候选人也可直接比较
    fn rank(candidates: &mut [&Staff], ledger: &RankingLedger, staff: &[Staff], dim: FairnessDimension) {
        let primary = ledger.deviations(staff, dim);
        let total = ledger.deviations(staff, FairnessDimension::TotalDays);
        let get = |map: &BTreeMap<String, f64>, id: &str| map.get(id).copied().unwrap_or(0.0);
        candidates.sort_by(|a, b| {
            get(&primary, &a.staff_id)
                .total_cmp(&get(&primary, &b.staff_id))
                .then_with(|| get(&total, &a.staff_id).total_cmp(&get(&total, &b.staff_id)))
                .then_with(|| a.staff_id.cmp(&b.staff_id))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::doctor_rule::{DoctorCombination, DoctorSet, StaffRange};
    use crate::domain::fairness::{DimensionValues, FairnessScore};
    use crate::domain::staff::Capability;
    use crate::domain::types::EmploymentType;
    use crate::engine::calendar::CalendarContextBuilder;
    use crate::engine::fairness::CarriedDeviations;
    use crate::engine::slot_calculator::WeeklySlotCalculator;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, day).unwrap()
    }

    fn make_staff(id: &str, category: &str, capability: Capability) -> Staff {
        Staff {
            staff_id: id.to_string(),
            clinic_id: "C1".to_string(),
            name: id.to_string(),
            category_id: category.to_string(),
            weekly_quota: 4,
            capability,
            employment: EmploymentType::FullTime,
            active: true,
        }
    }

    fn rule(reqs: &[(&str, u32, u32)]) -> DoctorCombination {
        DoctorCombination {
            doctors: DoctorSet::Any,
            day_of_week: None,
            night_shift: false,
            requirements: reqs
                .iter()
                .map(|(c, min, max)| (c.to_string(), StaffRange { min: *min, max: *max }))
                .collect(),
        }
    }

    fn ledger_for(staff: &[Staff], scores: &[FairnessScore]) -> RankingLedger {
        RankingLedger::new(
            staff.iter().map(|s| s.staff_id.as_str()),
            &CarriedDeviations::from_scores(scores),
            0.9,
        )
    }

    #[test]
    fn test_every_staff_gets_exactly_one_cell_per_business_day() {
        let ctx = CalendarContextBuilder::build("C1", 2025, 6, &[]).unwrap();
        let week = &ctx.weeks[0];
        let staff: Vec<Staff> = (1..=4)
            .map(|i| make_staff(&format!("N{}", i), "NURSE", Capability::Fixed))
            .collect();
        let demand = WeeklySlotCalculator::new().calculate(&ctx, &[rule(&[("NURSE", 2, 3)])], &BTreeMap::new());
        let mut leave = BTreeMap::new();
        leave.insert("N1".to_string(), BTreeSet::from([d(3)]));
        let targets = WeekTargets::compute(week, &staff, &leave, 6);

        let result = Phase1Allocator::new().allocate_week(
            &ctx,
            week,
            &demand,
            &staff,
            &leave,
            &targets,
            &ledger_for(&staff, &[]),
        );

        assert_eq!(result.grid.len(), 4 * 6);
        assert_eq!(result.grid.get(d(3), "N1").unwrap().shift_type, ShiftType::Leave);
        for date in &week.business_days {
            assert_eq!(result.grid.headcount(*date, "NURSE", ShiftType::Day), 2);
        }
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_staff_owed_work_is_ranked_first() {
        let ctx = CalendarContextBuilder::build("C1", 2025, 6, &[]).unwrap();
        let week = &ctx.weeks[0];
        let staff = vec![
            make_staff("A", "NURSE", Capability::Fixed),
            make_staff("B", "NURSE", Capability::Fixed),
        ];
        let demand = WeeklySlotCalculator::new().calculate(&ctx, &[rule(&[("NURSE", 1, 2)])], &BTreeMap::new());
        let targets = WeekTargets::compute(week, &staff, &BTreeMap::new(), 6);

        // B 上期少排了 3 天
        let prev_b = FairnessScore {
            clinic_id: "C1".to_string(),
            staff_id: "B".to_string(),
            year: 2025,
            month: 5,
            counts: DimensionValues::default(),
            deviations: DimensionValues {
                total_days: -3.0,
                ..Default::default()
            },
            overall: 3.0,
        };
        let result = Phase1Allocator::new().allocate_week(
            &ctx,
            week,
            &demand,
            &staff,
            &BTreeMap::new(),
            &targets,
            &ledger_for(&staff, &[prev_b]),
        );

        let b_days = result
            .grid
            .shifts_of("B", &week.business_days)
            .iter()
            .filter(|(_, s)| s.is_work())
            .count();
        assert_eq!(result.grid.get(d(2), "B").unwrap().shift_type, ShiftType::Day);
        assert!(b_days >= 3);
    }

    #[test]
    fn test_cross_category_fill_is_flagged_flexible_and_substitute_last() {
        let ctx = CalendarContextBuilder::build("C1", 2025, 6, &[]).unwrap();
        let week = &ctx.weeks[0];
        let staff = vec![
            make_staff("N1", "NURSE", Capability::Fixed),
            make_staff(
                "R1",
                "RECEPTION",
                Capability::Flexible(BTreeSet::from(["NURSE".to_string()])),
            ),
        ];
        // NURSE 每天需要 2 人，只有 1 名护士
        let demand = WeeklySlotCalculator::new().calculate(
            &ctx,
            &[rule(&[("NURSE", 2, 2), ("RECEPTION", 0, 1)])],
            &BTreeMap::new(),
        );
        let targets = WeekTargets::compute(week, &staff, &BTreeMap::new(), 6);
        let result = Phase1Allocator::new().allocate_week(
            &ctx,
            week,
            &demand,
            &staff,
            &BTreeMap::new(),
            &targets,
            &ledger_for(&staff, &[]),
        );

        let monday_r1 = result.grid.get(d(2), "R1").unwrap();
        assert_eq!(monday_r1.category_id, "NURSE");
        assert!(monday_r1.is_flexible);
        // 护士达到周目标（4 天）后顶班
        let n1_sat = result.grid.get(d(7), "N1").unwrap();
        assert!(n1_sat.shift_type.is_work());
        assert!(n1_sat.is_substitute);
        // 跨岗员工达到目标后不再补位，留下缺口告警
        assert!(result
            .warnings
            .iter()
            .any(|w| matches!(w, EngineWarning::CoverageShortfall { category_id, .. } if category_id == "NURSE")));
    }
}
