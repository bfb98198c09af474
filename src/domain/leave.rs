// ==========================================
// 诊所排班系统 - 请假领域模型
// ==========================================
// 红线: CONFIRMED 请假对两个阶段均不可变
// ==========================================

use crate::domain::types::{LeaveStatus, LeaveType};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveRequest {
    pub request_id: String,
    pub clinic_id: String,
    pub staff_id: String,
    pub leave_date: NaiveDate,
    pub leave_type: LeaveType,
    pub status: LeaveStatus,
}

impl LeaveRequest {
    pub fn is_confirmed(&self) -> bool {
        self.status == LeaveStatus::Confirmed
    }
}
