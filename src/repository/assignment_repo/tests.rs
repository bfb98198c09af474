use super::AssignmentRepository;
use crate::domain::assignment::Assignment;
use crate::domain::types::ShiftType;
use chrono::NaiveDate;
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

fn setup_test_db() -> Arc<Mutex<Connection>> {
    let conn = Connection::open_in_memory().unwrap();
    crate::db::configure_sqlite_connection(&conn).unwrap();
    crate::db::ensure_schema(&conn).unwrap();
    Arc::new(Mutex::new(conn))
}

fn d(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, day).unwrap()
}

fn make_row(staff_id: &str, day: u32, shift_type: ShiftType) -> Assignment {
    Assignment {
        clinic_id: "C1".to_string(),
        year: 2025,
        month: 6,
        staff_id: staff_id.to_string(),
        work_date: d(day),
        shift_type,
        category_id: "NURSE".to_string(),
        is_flexible: false,
        is_substitute: false,
    }
}

#[test]
fn test_replace_range_overwrites_without_duplicates() {
    let repo = AssignmentRepository::new(setup_test_db());

    let first = vec![make_row("S1", 2, ShiftType::Day), make_row("S2", 2, ShiftType::Off)];
    assert_eq!(repo.replace_range("C1", d(2), d(7), &first).unwrap(), 2);

    let second = vec![make_row("S1", 2, ShiftType::Off), make_row("S2", 2, ShiftType::Day)];
    repo.replace_range("C1", d(2), d(7), &second).unwrap();

    let rows = repo.find_in_range("C1", d(2), d(7)).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].shift_type, ShiftType::Off);
    assert_eq!(rows[1].shift_type, ShiftType::Day);
    assert_eq!(repo.count_by_period("C1", 2025, 6).unwrap(), 2);
}

#[test]
fn test_replace_range_rejects_out_of_range_row_and_rolls_back() {
    let repo = AssignmentRepository::new(setup_test_db());
    repo.replace_range("C1", d(2), d(7), &[make_row("S1", 3, ShiftType::Day)])
        .unwrap();

    let bad = vec![make_row("S1", 3, ShiftType::Off), make_row("S1", 10, ShiftType::Day)];
    assert!(repo.replace_range("C1", d(2), d(7), &bad).is_err());

    // 原数据保持不变
    let rows = repo.find_in_range("C1", d(1), d(30)).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].shift_type, ShiftType::Day);
}

#[test]
fn test_delete_period() {
    let repo = AssignmentRepository::new(setup_test_db());
    repo.replace_range(
        "C1",
        d(2),
        d(7),
        &[make_row("S1", 2, ShiftType::Day), make_row("S1", 3, ShiftType::Leave)],
    )
    .unwrap();
    assert_eq!(repo.delete_period("C1", 2025, 6).unwrap(), 2);
    assert!(repo.find_by_period("C1", 2025, 6).unwrap().is_empty());
}

#[test]
fn test_replace_range_exact_rolls_back_on_count_mismatch() {
    use super::ReplaceOutcome;

    let repo = AssignmentRepository::new(setup_test_db());
    repo.replace_range("C1", d(2), d(7), &[make_row("S1", 3, ShiftType::Day)])
        .unwrap();

    // 两行同键，upsert 后只剩一行
    let dup = vec![make_row("S2", 4, ShiftType::Day), make_row("S2", 4, ShiftType::Off)];
    let outcome = repo.replace_range_exact("C1", d(2), d(7), &dup, 2).unwrap();
    assert_eq!(outcome, ReplaceOutcome::CountMismatch { expected: 2, actual: 1 });

    let rows = repo.find_in_range("C1", d(2), d(7)).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].staff_id, "S1");

    let ok = vec![make_row("S2", 4, ShiftType::Day)];
    assert_eq!(
        repo.replace_range_exact("C1", d(2), d(7), &ok, 1).unwrap(),
        ReplaceOutcome::Written(1)
    );
}
