// ==========================================
// 诊所排班系统 - 排班结果领域模型
// ==========================================
// 职责: Assignment（落库行）与 ScheduleGrid（内存日×人网格）
// 主键: (clinic_id, staff_id, work_date)，重跑时 upsert，不重复
// ==========================================

use crate::domain::types::{CategoryId, ShiftType};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ==========================================
// Assignment - 排班记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub clinic_id: String,
    pub year: i32,
    pub month: u32,
    pub staff_id: String,
    pub work_date: NaiveDate,
    pub shift_type: ShiftType,
    pub category_id: CategoryId, // 实际填补的岗位（跨岗时与本岗位不同）
    pub is_flexible: bool,
    pub is_substitute: bool,
}

// ==========================================
// GridCell - 网格单元
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridCell {
    pub shift_type: ShiftType,
    pub category_id: CategoryId,
    pub is_flexible: bool,
    pub is_substitute: bool,
}

impl GridCell {
    pub fn off(category_id: &str) -> Self {
        Self {
            shift_type: ShiftType::Off,
            category_id: category_id.to_string(),
            is_flexible: false,
            is_substitute: false,
        }
    }

    pub fn leave(category_id: &str) -> Self {
        Self {
            shift_type: ShiftType::Leave,
            category_id: category_id.to_string(),
            is_flexible: false,
            is_substitute: false,
        }
    }

    pub fn work(shift_type: ShiftType, category_id: &str, is_flexible: bool, is_substitute: bool) -> Self {
        Self {
            shift_type,
            category_id: category_id.to_string(),
            is_flexible,
            is_substitute,
        }
    }
}

// ==========================================
// ScheduleGrid - 日 × 员工网格（尚未落库）
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleGrid {
    cells: BTreeMap<(NaiveDate, String), GridCell>,
}

impl ScheduleGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, date: NaiveDate, staff_id: &str) -> Option<&GridCell> {
        self.cells.get(&(date, staff_id.to_string()))
    }

    pub fn set(&mut self, date: NaiveDate, staff_id: &str, cell: GridCell) {
        self.cells.insert((date, staff_id.to_string()), cell);
    }

    pub fn remove(&mut self, date: NaiveDate, staff_id: &str) -> Option<GridCell> {
        self.cells.remove(&(date, staff_id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&(NaiveDate, String), &GridCell)> {
        self.cells.iter()
    }

    /// 某员工在指定日期集合内的班次
    pub fn shifts_of(&self, staff_id: &str, dates: &[NaiveDate]) -> Vec<(NaiveDate, ShiftType)> {
        dates
            .iter()
            .filter_map(|d| self.get(*d, staff_id).map(|c| (*d, c.shift_type)))
            .collect()
    }

    /// 指定日期、岗位、班次的在岗人数
    pub fn headcount(&self, date: NaiveDate, category_id: &str, shift_type: ShiftType) -> u32 {
        self.cells
            .range((date, String::new())..)
            .take_while(|((d, _), _)| *d == date)
            .filter(|(_, c)| c.shift_type == shift_type && c.category_id == category_id)
            .count() as u32
    }

    /// 截取指定日期集合的子网格
    pub fn slice(&self, dates: &[NaiveDate]) -> ScheduleGrid {
        let cells = self
            .cells
            .iter()
            .filter(|((d, _), _)| dates.contains(d))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        ScheduleGrid { cells }
    }

    /// 用另一网格覆盖同键单元
    pub fn merge(&mut self, other: &ScheduleGrid) {
        for (k, v) in other.cells.iter() {
            self.cells.insert(k.clone(), v.clone());
        }
    }

    pub fn to_assignments(&self, clinic_id: &str, year: i32, month: u32) -> Vec<Assignment> {
        self.cells
            .iter()
            .map(|((date, staff_id), cell)| Assignment {
                clinic_id: clinic_id.to_string(),
                year,
                month,
                staff_id: staff_id.clone(),
                work_date: *date,
                shift_type: cell.shift_type,
                category_id: cell.category_id.clone(),
                is_flexible: cell.is_flexible,
                is_substitute: cell.is_substitute,
            })
            .collect()
    }

    pub fn from_assignments(assignments: &[Assignment]) -> Self {
        let mut grid = ScheduleGrid::new();
        for a in assignments {
            grid.set(
                a.work_date,
                &a.staff_id,
                GridCell {
                    shift_type: a.shift_type,
                    category_id: a.category_id.clone(),
                    is_flexible: a.is_flexible,
                    is_substitute: a.is_substitute,
                },
            );
        }
        grid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, day).unwrap()
    }

    #[test]
    fn test_headcount_is_scoped_to_date() {
        let mut grid = ScheduleGrid::new();
        grid.set(d(3), "S1", GridCell::work(ShiftType::Day, "NURSE", false, false));
        grid.set(d(3), "S2", GridCell::work(ShiftType::Day, "NURSE", true, false));
        grid.set(d(3), "S3", GridCell::off("NURSE"));
        grid.set(d(4), "S1", GridCell::work(ShiftType::Day, "NURSE", false, false));

        assert_eq!(grid.headcount(d(3), "NURSE", ShiftType::Day), 2);
        assert_eq!(grid.headcount(d(4), "NURSE", ShiftType::Day), 1);
        assert_eq!(grid.headcount(d(3), "NURSE", ShiftType::Night), 0);
    }

    #[test]
    fn test_slice_and_assignment_conversion() {
        let mut grid = ScheduleGrid::new();
        grid.set(d(3), "S1", GridCell::leave("NURSE"));
        grid.set(d(10), "S1", GridCell::off("NURSE"));

        let week = grid.slice(&[d(3)]);
        assert_eq!(week.len(), 1);

        let rows = week.to_assignments("C1", 2025, 3);
        assert_eq!(rows[0].shift_type, ShiftType::Leave);
        assert_eq!(ScheduleGrid::from_assignments(&rows), week);
    }
}
