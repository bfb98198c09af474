// ==========================================
// 诊所排班系统 - 领域类型定义
// ==========================================
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

/// 岗位类别ID（如 NURSE / RECEPTION / RADIOLOGY）
pub type CategoryId = String;

// ==========================================
// 班次类型 (Shift Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShiftType {
    Day,   // 白班
    Night, // 夜诊
    Off,   // 休息
    Leave, // 请假（已确认）
}

impl ShiftType {
    /// 是否计入出勤天数
    pub fn is_work(&self) -> bool {
        matches!(self, ShiftType::Day | ShiftType::Night)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ShiftType::Day => "DAY",
            ShiftType::Night => "NIGHT",
            ShiftType::Off => "OFF",
            ShiftType::Leave => "LEAVE",
        }
    }

    pub fn parse(s: &str) -> Option<ShiftType> {
        match s.trim().to_uppercase().as_str() {
            "DAY" => Some(ShiftType::Day),
            "NIGHT" => Some(ShiftType::Night),
            "OFF" => Some(ShiftType::Off),
            "LEAVE" => Some(ShiftType::Leave),
            _ => None,
        }
    }
}

impl fmt::Display for ShiftType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 请假状态 / 类型
// ==========================================
// 红线: 仅 CONFIRMED 参与排班
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeaveStatus {
    Pending,
    Confirmed,
    Rejected,
    Cancelled,
}

impl LeaveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaveStatus::Pending => "PENDING",
            LeaveStatus::Confirmed => "CONFIRMED",
            LeaveStatus::Rejected => "REJECTED",
            LeaveStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> LeaveStatus {
        match s.trim().to_uppercase().as_str() {
            "CONFIRMED" => LeaveStatus::Confirmed,
            "REJECTED" => LeaveStatus::Rejected,
            "CANCELLED" => LeaveStatus::Cancelled,
            _ => LeaveStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeaveType {
    Annual,  // 年假
    Sick,    // 病假
    Special, // 特别假
    Other,
}

impl LeaveType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaveType::Annual => "ANNUAL",
            LeaveType::Sick => "SICK",
            LeaveType::Special => "SPECIAL",
            LeaveType::Other => "OTHER",
        }
    }

    pub fn parse(s: &str) -> LeaveType {
        match s.trim().to_uppercase().as_str() {
            "ANNUAL" => LeaveType::Annual,
            "SICK" => LeaveType::Sick,
            "SPECIAL" => LeaveType::Special,
            _ => LeaveType::Other,
        }
    }
}

// ==========================================
// 雇佣类型
// ==========================================
// 兼职人员不参与自动排班，也不计入公平性均值
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmploymentType {
    FullTime,
    PartTime,
}

impl EmploymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmploymentType::FullTime => "FULL_TIME",
            EmploymentType::PartTime => "PART_TIME",
        }
    }

    pub fn parse(s: &str) -> EmploymentType {
        match s.trim().to_uppercase().as_str() {
            "PART_TIME" => EmploymentType::PartTime,
            _ => EmploymentType::FullTime,
        }
    }
}

// ==========================================
// 备份原因
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackupReason {
    Manual,      // 人工备份
    PreReassign, // 重排前自动备份
    Periodic,    // 定期/校验修复前备份
}

impl BackupReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupReason::Manual => "MANUAL",
            BackupReason::PreReassign => "PRE_REASSIGN",
            BackupReason::Periodic => "PERIODIC",
        }
    }

    pub fn parse(s: &str) -> Option<BackupReason> {
        match s.trim().to_uppercase().as_str() {
            "MANUAL" => Some(BackupReason::Manual),
            "PRE_REASSIGN" => Some(BackupReason::PreReassign),
            "PERIODIC" => Some(BackupReason::Periodic),
            _ => None,
        }
    }
}

impl fmt::Display for BackupReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 校验模式
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationMode {
    #[default]
    PeriodicCheck, // 只读巡检
    AutoFix,       // 单格修复后复检
}

// ==========================================
// 运行模式
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunMode {
    #[default]
    Commit, // 正常落库
    DryRun, // 只计算不写库
}

// ==========================================
// 公平性维度
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FairnessDimension {
    TotalDays,
    Night,
    Weekend,
    Holiday,
    HolidayAdjacent,
}

impl FairnessDimension {
    pub const ALL: [FairnessDimension; 5] = [
        FairnessDimension::TotalDays,
        FairnessDimension::Night,
        FairnessDimension::Weekend,
        FairnessDimension::Holiday,
        FairnessDimension::HolidayAdjacent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FairnessDimension::TotalDays => "TOTAL_DAYS",
            FairnessDimension::Night => "NIGHT",
            FairnessDimension::Weekend => "WEEKEND",
            FairnessDimension::Holiday => "HOLIDAY",
            FairnessDimension::HolidayAdjacent => "HOLIDAY_ADJACENT",
        }
    }
}

impl fmt::Display for FairnessDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
