use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime, Utc};
use uuid::Uuid;

use crate::error::LedgerError;
use crate::models::{AttendanceMark, CourseMeta, Ledger, RosterRow, Snapshot, StudentEntry};

/// Cryptographically random 32-hex-char session token.
pub fn new_session_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// The original check-in time is not recoverable from a snapshot, so
/// reconciled marks get a synthetic timestamp at noon of their date.
fn noon(date: NaiveDate) -> NaiveDateTime {
    date.and_hms_opt(12, 0, 0).expect("noon is a valid time")
}

/// Build a ledger from a parsed snapshot. Returns the ledger together with
/// whether `selected_date` was already among the snapshot's dates, so the
/// caller can report a resumed session rather than a new one.
pub fn from_snapshot(
    snapshot: Snapshot,
    selected_date: Option<NaiveDate>,
    generate_id: impl FnOnce() -> String,
) -> (Ledger, bool) {
    let Snapshot {
        meta,
        students,
        dates,
    } = snapshot;
    let current_date = selected_date.unwrap_or_else(|| Utc::now().date_naive());
    let date_existed = dates.contains(&current_date);

    let students = students
        .into_iter()
        .map(|student| {
            let mut attendance = BTreeMap::new();
            for &date in &dates {
                if let Some(&attended) = student.attendance.get(&date) {
                    attendance.insert(
                        date,
                        AttendanceMark {
                            attended,
                            attended_at: Some(noon(date)),
                        },
                    );
                }
            }
            StudentEntry {
                id: student.id,
                name: student.name,
                attendance,
            }
        })
        .collect();

    let ledger = Ledger {
        session_id: generate_id(),
        course_name: meta.course_name,
        course_id: meta.course_id,
        semester: meta.semester,
        section: meta.section,
        students,
        current_date,
        created_at: Utc::now().naive_utc(),
        active: true,
    };
    (ledger, date_existed)
}

/// Build a fresh ledger from an `id,name` roster; every student starts with
/// an empty attendance map.
pub fn from_roster(
    rows: &[RosterRow],
    meta: CourseMeta,
    selected_date: Option<NaiveDate>,
    generate_id: impl FnOnce() -> String,
) -> Result<Ledger, LedgerError> {
    if rows.is_empty() {
        return Err(LedgerError::NoStudents);
    }
    let students = rows
        .iter()
        .map(|row| StudentEntry {
            id: row.id.clone(),
            name: row.name.clone(),
            attendance: BTreeMap::new(),
        })
        .collect();
    Ok(Ledger {
        session_id: generate_id(),
        course_name: meta.course_name,
        course_id: meta.course_id,
        semester: meta.semester,
        section: meta.section,
        students,
        current_date: selected_date.unwrap_or_else(|| Utc::now().date_naive()),
        created_at: Utc::now().naive_utc(),
        active: true,
    })
}

/// Live check-in path. Guards against duplicate submissions: a student who
/// already has `attended: true` for the date is rejected and the ledger is
/// left untouched.
pub fn mark_attendance(
    ledger: &mut Ledger,
    student_id: &str,
    date: NaiveDate,
) -> Result<AttendanceMark, LedgerError> {
    let student = ledger
        .find_student_mut(student_id)
        .ok_or_else(|| LedgerError::StudentNotFound(student_id.to_string()))?;
    if student.attended_on(date) {
        return Err(LedgerError::AlreadyMarked {
            student_id: student_id.to_string(),
            date,
        });
    }
    let mark = AttendanceMark {
        attended: true,
        attended_at: Some(Utc::now().naive_utc()),
    };
    student.attendance.insert(date, mark.clone());
    Ok(mark)
}

/// Manual override path; no duplicate guard. Setting `attended = false`
/// removes the date key entirely, so a cleared mark becomes
/// indistinguishable from one that was never recorded.
pub fn set_attendance(
    ledger: &mut Ledger,
    student_id: &str,
    date: NaiveDate,
    attended: bool,
) -> Result<(), LedgerError> {
    let student = ledger
        .find_student_mut(student_id)
        .ok_or_else(|| LedgerError::StudentNotFound(student_id.to_string()))?;
    if attended {
        student.attendance.insert(
            date,
            AttendanceMark {
                attended: true,
                attended_at: Some(Utc::now().naive_utc()),
            },
        );
    } else {
        student.attendance.remove(&date);
    }
    Ok(())
}
