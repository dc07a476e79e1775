use chrono::NaiveDate;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::LedgerError;
use crate::ledger;
use crate::models::{AbsenceReport, Ledger, StudentEntry};

/// Students with strictly more than this many absences get flagged.
pub const DEFAULT_ABSENCE_THRESHOLD: usize = 6;

fn build_report(student: &StudentEntry, all_dates: &[NaiveDate]) -> AbsenceReport {
    let mut present_days = Vec::new();
    let mut absent_days = Vec::new();
    for &date in all_dates {
        // A date with no record at all counts as absent for review
        // purposes, same as an explicit absence.
        if student.attended_on(date) {
            present_days.push(date);
        } else {
            absent_days.push(date);
        }
    }
    let absent_count = absent_days.len();
    AbsenceReport {
        student_id: student.id.clone(),
        student_name: student.name.clone(),
        all_dates: all_dates.to_vec(),
        present_days,
        absent_days,
        absent_count,
    }
}

/// Scan the ledger's full date range and report every student whose absence
/// count exceeds `threshold`. The date range is the union of every date any
/// student has a record for, not just the session's current date.
pub fn review(ledger: &Ledger, threshold: usize) -> Vec<AbsenceReport> {
    let all_dates = ledger.all_dates();
    ledger
        .students
        .iter()
        .map(|student| build_report(student, &all_dates))
        .filter(|report| report.absent_count > threshold)
        .collect()
}

/// Full-range report for a single student, regardless of threshold.
pub fn report_for(ledger: &Ledger, student_id: &str) -> Result<AbsenceReport, LedgerError> {
    let student = ledger
        .find_student(student_id)
        .ok_or_else(|| LedgerError::StudentNotFound(student_id.to_string()))?;
    Ok(build_report(student, &ledger.all_dates()))
}

/// Retroactively convert `sample_size` of the student's absent days to
/// presences, chosen uniformly at random without replacement. Returns the
/// converted dates, sorted, so the caller can report exactly which days
/// changed. The RNG is injected so tests can seed it.
pub fn approve_leave(
    ledger: &mut Ledger,
    report: &AbsenceReport,
    sample_size: usize,
    rng: &mut impl Rng,
) -> Result<Vec<NaiveDate>, LedgerError> {
    if report.absent_days.len() < sample_size {
        return Err(LedgerError::InsufficientAbsences {
            available: report.absent_days.len(),
            requested: sample_size,
        });
    }
    let mut selected: Vec<NaiveDate> = report
        .absent_days
        .choose_multiple(rng, sample_size)
        .copied()
        .collect();
    selected.sort();
    for &date in &selected {
        ledger::set_attendance(ledger, &report.student_id, date, true)?;
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CourseMeta, RosterRow};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::BTreeSet;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, d).unwrap()
    }

    /// Ledger with ten recorded dates where Alice attended only the given
    /// days and Bob attended every day (so all ten dates are known).
    fn ledger_with_alice_present_on(days: &[u32]) -> Ledger {
        let rows = vec![
            RosterRow {
                id: "S1".to_string(),
                name: "Alice".to_string(),
            },
            RosterRow {
                id: "S2".to_string(),
                name: "Bob".to_string(),
            },
        ];
        let meta = CourseMeta {
            course_name: "Systems".to_string(),
            course_id: "CS301".to_string(),
            semester: "Fall25".to_string(),
            section: "B".to_string(),
        };
        let mut ledger =
            ledger::from_roster(&rows, meta, Some(date(1)), ledger::new_session_id).unwrap();
        for d in 1..=10 {
            ledger::set_attendance(&mut ledger, "S2", date(d), true).unwrap();
        }
        for &d in days {
            ledger::set_attendance(&mut ledger, "S1", date(d), true).unwrap();
        }
        ledger
    }

    #[test]
    fn seven_absences_exceed_the_default_threshold() {
        // Alice attended d4, d6, d8 of ten days: seven absences.
        let ledger = ledger_with_alice_present_on(&[4, 6, 8]);
        let reports = review(&ledger, DEFAULT_ABSENCE_THRESHOLD);
        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert_eq!(report.student_id, "S1");
        assert_eq!(report.absent_count, 7);
        assert_eq!(report.all_dates.len(), 10);
        assert_eq!(
            report.absent_days,
            [1, 2, 3, 5, 7, 9, 10].map(date).to_vec()
        );
        assert_eq!(report.present_days, [4, 6, 8].map(date).to_vec());
    }

    #[test]
    fn exactly_six_absences_is_not_flagged() {
        // Threshold is exclusive: > 6, not >= 6.
        let ledger = ledger_with_alice_present_on(&[4, 5, 6, 8]);
        assert!(review(&ledger, DEFAULT_ABSENCE_THRESHOLD).is_empty());
    }

    #[test]
    fn dates_with_no_record_count_as_absent() {
        // Alice has no records at all; the dates are known only through Bob.
        let ledger = ledger_with_alice_present_on(&[]);
        let reports = review(&ledger, DEFAULT_ABSENCE_THRESHOLD);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].absent_count, 10);
    }

    #[test]
    fn approve_leave_converts_a_sample_of_absences() {
        let mut ledger = ledger_with_alice_present_on(&[4, 6, 8]);
        let report = report_for(&ledger, "S1").unwrap();
        let original: BTreeSet<NaiveDate> = report.absent_days.iter().copied().collect();

        let mut rng = StdRng::seed_from_u64(17);
        let selected = approve_leave(&mut ledger, &report, 6, &mut rng).unwrap();

        assert_eq!(selected.len(), 6);
        let distinct: BTreeSet<NaiveDate> = selected.iter().copied().collect();
        assert_eq!(distinct.len(), 6);
        assert!(distinct.is_subset(&original));

        let after = report_for(&ledger, "S1").unwrap();
        assert_eq!(after.absent_count, report.absent_count - 6);
        for date in &selected {
            assert!(ledger.find_student("S1").unwrap().attended_on(*date));
        }
    }

    #[test]
    fn approve_leave_requires_enough_absences() {
        let mut ledger = ledger_with_alice_present_on(&[2, 3, 4, 5, 6, 7, 8, 9]);
        let report = report_for(&ledger, "S1").unwrap();
        assert_eq!(report.absent_count, 2);
        let mut rng = StdRng::seed_from_u64(17);
        assert!(matches!(
            approve_leave(&mut ledger, &report, 6, &mut rng),
            Err(LedgerError::InsufficientAbsences {
                available: 2,
                requested: 6,
            })
        ));
    }

    #[test]
    fn report_for_unknown_student_fails() {
        let ledger = ledger_with_alice_present_on(&[]);
        assert!(matches!(
            report_for(&ledger, "S9"),
            Err(LedgerError::StudentNotFound(_))
        ));
    }
}
