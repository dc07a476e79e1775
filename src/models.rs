use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// One recorded observation for a single student on a single date.
///
/// A date with no mark at all means "no data", which is not the same
/// thing as an explicit `attended: false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceMark {
    pub attended: bool,
    pub attended_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentEntry {
    pub id: String,
    pub name: String,
    /// Keyed by canonical date; the map keeps dates sorted.
    pub attendance: BTreeMap<NaiveDate, AttendanceMark>,
}

impl StudentEntry {
    pub fn attended_on(&self, date: NaiveDate) -> bool {
        self.attendance.get(&date).is_some_and(|mark| mark.attended)
    }
}

/// The in-memory per-session attendance record for one course roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ledger {
    pub session_id: String,
    pub course_name: String,
    pub course_id: String,
    pub semester: String,
    pub section: String,
    /// Original roster order, preserved across reconciliation.
    pub students: Vec<StudentEntry>,
    pub current_date: NaiveDate,
    pub created_at: NaiveDateTime,
    pub active: bool,
}

impl Ledger {
    pub fn find_student(&self, student_id: &str) -> Option<&StudentEntry> {
        self.students.iter().find(|s| s.id == student_id)
    }

    pub fn find_student_mut(&mut self, student_id: &str) -> Option<&mut StudentEntry> {
        self.students.iter_mut().find(|s| s.id == student_id)
    }

    /// Sorted union of every date any student has a record for.
    pub fn all_dates(&self) -> Vec<NaiveDate> {
        let mut dates = BTreeSet::new();
        for student in &self.students {
            dates.extend(student.attendance.keys().copied());
        }
        dates.into_iter().collect()
    }
}

#[derive(Debug, Clone)]
pub struct CourseMeta {
    pub course_name: String,
    pub course_id: String,
    pub semester: String,
    pub section: String,
}

/// Parsed form of an imported snapshot, consumed once by the ledger builder.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub meta: CourseMeta,
    pub students: Vec<SnapshotStudent>,
    /// Distinct canonical dates in column order.
    pub dates: Vec<NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct SnapshotStudent {
    pub id: String,
    pub name: String,
    pub attendance: BTreeMap<NaiveDate, bool>,
}

/// One `id,name` row from a fresh roster file.
#[derive(Debug, Clone)]
pub struct RosterRow {
    pub id: String,
    pub name: String,
}

/// Review output for one student over the ledger's full date range.
#[derive(Debug, Clone)]
pub struct AbsenceReport {
    pub student_id: String,
    pub student_name: String,
    pub all_dates: Vec<NaiveDate>,
    pub present_days: Vec<NaiveDate>,
    pub absent_days: Vec<NaiveDate>,
    pub absent_count: usize,
}
