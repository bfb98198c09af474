// ==========================================
// 诊所排班系统 - 公平性评分
// ==========================================
// 偏差(员工, 维度) = 结转系数 × 上期偏差 + (本期次数 − 同岗位可排班员工均值)
// 读: Phase1/Phase2 排序只读上期评分（结转值），不读员工表镜像
// 写: 本期所有周落定后统一重算、持久化并覆写镜像
// ==========================================

use crate::domain::assignment::ScheduleGrid;
use crate::domain::calendar::CalendarContext;
use crate::domain::fairness::{DimensionValues, FairnessScore};
use crate::domain::staff::Staff;
use crate::domain::types::{FairnessDimension, ShiftType};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::debug;

// ==========================================
// FairnessSettings - 评分参数
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FairnessSettings {
    pub carry_over_weight: f64,
    pub weights: DimensionValues,
}

impl Default for FairnessSettings {
    fn default() -> Self {
        Self {
            carry_over_weight: 0.9,
            weights: DimensionValues {
                total_days: 1.0,
                night: 1.5,
                weekend: 1.2,
                holiday: 2.0,
                holiday_adjacent: 1.0,
            },
        }
    }
}

/// 一个出勤单元计入的维度
pub fn dimensions_of(ctx: &CalendarContext, date: NaiveDate, shift_type: ShiftType) -> Vec<FairnessDimension> {
    if !shift_type.is_work() {
        return Vec::new();
    }
    let mut dims = vec![FairnessDimension::TotalDays];
    if shift_type == ShiftType::Night {
        dims.push(FairnessDimension::Night);
    }
    if ctx.is_weekend(date) {
        dims.push(FairnessDimension::Weekend);
    }
    if ctx.is_open_holiday(date) {
        dims.push(FairnessDimension::Holiday);
    }
    if ctx.is_holiday_adjacent(date) {
        dims.push(FairnessDimension::HolidayAdjacent);
    }
    dims
}

/// Phase1 排序依据的维度（最“不受欢迎”的那一个）
pub fn primary_dimension(ctx: &CalendarContext, date: NaiveDate, shift_type: ShiftType) -> FairnessDimension {
    if ctx.is_open_holiday(date) {
        FairnessDimension::Holiday
    } else if shift_type == ShiftType::Night {
        FairnessDimension::Night
    } else if ctx.is_weekend(date) {
        FairnessDimension::Weekend
    } else if ctx.is_holiday_adjacent(date) {
        FairnessDimension::HolidayAdjacent
    } else {
        FairnessDimension::TotalDays
    }
}

/// 统计网格内各员工的五维次数（只计营业日）
pub fn count_dimensions(ctx: &CalendarContext, grid: &ScheduleGrid) -> BTreeMap<String, DimensionValues> {
    let mut counts: BTreeMap<String, DimensionValues> = BTreeMap::new();
    for ((date, staff_id), cell) in grid.iter() {
        if !ctx.is_business_day(*date) {
            continue;
        }
        let entry = counts.entry(staff_id.clone()).or_default();
        for dim in dimensions_of(ctx, *date, cell.shift_type) {
            *entry.get_mut(dim) += 1.0;
        }
    }
    counts
}

// ==========================================
// CarriedDeviations - 上期结转偏差（只读）
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct CarriedDeviations {
    by_staff: BTreeMap<String, DimensionValues>,
}

impl CarriedDeviations {
    pub fn from_scores(scores: &[FairnessScore]) -> Self {
        Self {
            by_staff: scores
                .iter()
                .map(|s| (s.staff_id.clone(), s.deviations))
                .collect(),
        }
    }

    /// 无上期记录的员工视为 0
    pub fn get(&self, staff_id: &str) -> DimensionValues {
        self.by_staff.get(staff_id).copied().unwrap_or_default()
    }
}

// ==========================================
// RankingLedger - 本期排序台账
// ==========================================
// 排序键 = 结转系数 × 上期偏差 + 本期已排次数
// 偏差 = 排序键 − 同岗位可排班员工的排序键均值（负值: 欠班）
#[derive(Debug, Clone)]
pub struct RankingLedger {
    base: BTreeMap<String, DimensionValues>,
    counts: BTreeMap<String, DimensionValues>,
}

impl RankingLedger {
    pub fn new<'a>(
        staff_ids: impl IntoIterator<Item = &'a str>,
        carried: &CarriedDeviations,
        carry_over_weight: f64,
    ) -> Self {
        let base = staff_ids
            .into_iter()
            .map(|id| {
                let prev = carried.get(id);
                let mut weighted = DimensionValues::default();
                for dim in FairnessDimension::ALL {
                    *weighted.get_mut(dim) = carry_over_weight * prev.get(dim);
                }
                (id.to_string(), weighted)
            })
            .collect();
        Self {
            base,
            counts: BTreeMap::new(),
        }
    }

    pub fn key(&self, staff_id: &str, dim: FairnessDimension) -> f64 {
        let base = self.base.get(staff_id).map(|v| v.get(dim)).unwrap_or(0.0);
        let count = self.counts.get(staff_id).map(|v| v.get(dim)).unwrap_or(0.0);
        base + count
    }

    /// 各可排班员工在某维度上相对本岗位均值的偏差
    pub fn deviations(&self, staff: &[Staff], dim: FairnessDimension) -> BTreeMap<String, f64> {
        let schedulable: Vec<&Staff> = staff.iter().filter(|s| s.is_schedulable()).collect();
        let mut sums: BTreeMap<&str, (f64, f64)> = BTreeMap::new();
        for s in &schedulable {
            let entry = sums.entry(s.category_id.as_str()).or_insert((0.0, 0.0));
            entry.0 += self.key(&s.staff_id, dim);
            entry.1 += 1.0;
        }
        schedulable
            .iter()
            .map(|s| {
                let mean = sums
                    .get(s.category_id.as_str())
                    .map(|(sum, n)| sum / n)
                    .unwrap_or(0.0);
                (s.staff_id.clone(), self.key(&s.staff_id, dim) - mean)
            })
            .collect()
    }

    pub fn record(&mut self, staff_id: &str, dims: &[FairnessDimension]) {
        let entry = self.counts.entry(staff_id.to_string()).or_default();
        for dim in dims {
            *entry.get_mut(*dim) += 1.0;
        }
    }

    /// 并入一周落定后的网格
    pub fn absorb(&mut self, ctx: &CalendarContext, grid: &ScheduleGrid) {
        for (staff_id, values) in count_dimensions(ctx, grid) {
            let entry = self.counts.entry(staff_id).or_default();
            for dim in FairnessDimension::ALL {
                *entry.get_mut(dim) += values.get(dim);
            }
        }
    }
}

// ==========================================
// FairnessScorer - 公平性评分器
// ==========================================
pub struct FairnessScorer {
    settings: FairnessSettings,
}

impl FairnessScorer {
    pub fn new(settings: FairnessSettings) -> Self {
        Self { settings }
    }

    /// 基于本期最终网格重算评分
    ///
    /// 只对可排班员工（在职且全职）评分，均值按本岗位计算
    pub fn score(
        &self,
        ctx: &CalendarContext,
        staff: &[Staff],
        grid: &ScheduleGrid,
        carried: &CarriedDeviations,
    ) -> Vec<FairnessScore> {
        let counts = count_dimensions(ctx, grid);
        let schedulable: Vec<&Staff> = staff.iter().filter(|s| s.is_schedulable()).collect();

        let mut category_sums: BTreeMap<&str, (DimensionValues, f64)> = BTreeMap::new();
        for s in &schedulable {
            let c = counts.get(&s.staff_id).copied().unwrap_or_default();
            let entry = category_sums.entry(s.category_id.as_str()).or_default();
            for dim in FairnessDimension::ALL {
                *entry.0.get_mut(dim) += c.get(dim);
            }
            entry.1 += 1.0;
        }

        let mut scores = Vec::with_capacity(schedulable.len());
        for s in &schedulable {
            let c = counts.get(&s.staff_id).copied().unwrap_or_default();
            let prev = carried.get(&s.staff_id);
            let (sums, n) = category_sums
                .get(s.category_id.as_str())
                .copied()
                .unwrap_or((DimensionValues::default(), 1.0));

            let mut deviations = DimensionValues::default();
            let mut overall = 0.0;
            for dim in FairnessDimension::ALL {
                let mean = sums.get(dim) / n;
                let dev = self.settings.carry_over_weight * prev.get(dim) + (c.get(dim) - mean);
                *deviations.get_mut(dim) = dev;
                overall += self.settings.weights.get(dim) * dev.abs();
            }

            scores.push(FairnessScore {
                clinic_id: ctx.clinic_id.clone(),
                staff_id: s.staff_id.clone(),
                year: ctx.year,
                month: ctx.month,
                counts: c,
                deviations,
                overall,
            });
        }

        debug!(
            clinic_id = %ctx.clinic_id,
            scored = scores.len(),
            categories = category_sums.len(),
            "公平性评分重算完成"
        );
        scores
    }

    /// 平均公平分（越低越公平）；无评分时为 0
    pub fn average_fairness(scores: &[FairnessScore]) -> f64 {
        if scores.is_empty() {
            return 0.0;
        }
        scores.iter().map(|s| s.overall).sum::<f64>() / scores.len() as f64
    }
}
