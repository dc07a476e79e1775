use std::collections::BTreeMap;

use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, WriterBuilder};

use crate::dates;
use crate::error::LedgerError;
use crate::models::{CourseMeta, Ledger, RosterRow, Snapshot, SnapshotStudent};

/// Headers that are never date columns, matched case-insensitively.
const METADATA_HEADERS: [&str; 10] = [
    "student id",
    "student name",
    "course name",
    "course id",
    "semester",
    "section",
    "id",
    "name",
    "email",
    "phone",
];

/// Cell values that count as attended; any other non-empty cell means
/// an explicit absence. An empty cell means "no entry for that date".
fn is_truthy(cell: &str) -> bool {
    matches!(
        cell.trim().to_ascii_lowercase().as_str(),
        "present" | "yes" | "1" | "true"
    )
}

fn column(headers: &StringRecord, name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|header| header.trim().eq_ignore_ascii_case(name))
}

/// Parse a previously exported attendance CSV back into a snapshot.
///
/// The column set varies: date columns may appear in any order, in any of
/// the formats `dates::normalize` accepts, mixed with the fixed metadata
/// columns. Columns that are neither denylisted metadata nor normalizable
/// dates are silently ignored. If two raw headers normalize to the same
/// canonical date, the later column overwrites the earlier one's cells.
pub fn parse(text: &str) -> Result<Snapshot, LedgerError> {
    let mut reader = ReaderBuilder::new().from_reader(text.trim().as_bytes());
    let headers = reader.headers()?.clone();

    // Classify columns once, by header position.
    let mut date_columns: Vec<(usize, NaiveDate)> = Vec::new();
    for (index, raw) in headers.iter().enumerate() {
        let lowered = raw.trim().to_ascii_lowercase();
        if METADATA_HEADERS.contains(&lowered.as_str()) {
            continue;
        }
        if let Some(date) = dates::normalize(raw) {
            date_columns.push((index, date));
        }
    }
    let mut dates: Vec<NaiveDate> = Vec::new();
    for &(_, date) in &date_columns {
        if !dates.contains(&date) {
            dates.push(date);
        }
    }

    let records = reader
        .records()
        .collect::<Result<Vec<StringRecord>, _>>()?;
    if records.is_empty() {
        return Err(LedgerError::Malformed(
            "no data rows after header".to_string(),
        ));
    }

    // Course metadata is read from the first data row only; every row is
    // expected to repeat it identically.
    let first = &records[0];
    let field = |name: &str| -> String {
        column(&headers, name)
            .and_then(|index| first.get(index))
            .unwrap_or("")
            .trim()
            .to_string()
    };
    let meta = CourseMeta {
        course_name: field("Course Name"),
        course_id: field("Course ID"),
        semester: field("Semester"),
        section: field("Section"),
    };
    if meta.course_name.is_empty() {
        return Err(LedgerError::MissingField("Course Name"));
    }
    if meta.course_id.is_empty() {
        return Err(LedgerError::MissingField("Course ID"));
    }
    if meta.semester.is_empty() {
        return Err(LedgerError::MissingField("Semester"));
    }
    if meta.section.is_empty() {
        return Err(LedgerError::MissingField("Section"));
    }

    let id_column = column(&headers, "Student ID");
    let name_column = column(&headers, "Student Name");
    let mut students = Vec::new();
    for record in &records {
        let cell = |index: Option<usize>| -> String {
            index
                .and_then(|i| record.get(i))
                .unwrap_or("")
                .trim()
                .to_string()
        };
        let mut attendance = BTreeMap::new();
        for &(index, date) in &date_columns {
            let Some(value) = record.get(index) else {
                continue;
            };
            if value.trim().is_empty() {
                // No entry at all, distinct from a recorded absence.
                continue;
            }
            attendance.insert(date, is_truthy(value));
        }
        students.push(SnapshotStudent {
            id: cell(id_column),
            name: cell(name_column),
            attendance,
        });
    }
    if students.is_empty() {
        return Err(LedgerError::NoStudents);
    }

    Ok(Snapshot {
        meta,
        students,
        dates,
    })
}

/// Parse a headerless two-column `id,name` roster file.
pub fn parse_roster(text: &str) -> Result<Vec<RosterRow>, LedgerError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.trim().as_bytes());
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let id = record.get(0).unwrap_or("").trim().to_string();
        let name = record.get(1).unwrap_or("").trim().to_string();
        if id.is_empty() && name.is_empty() {
            continue;
        }
        rows.push(RosterRow { id, name });
    }
    Ok(rows)
}

/// Validate a roster before a session is created from it. Returns the
/// student count on success.
pub fn validate_roster(rows: &[RosterRow]) -> Result<usize, LedgerError> {
    if rows.is_empty() {
        return Err(LedgerError::NoStudents);
    }
    let incomplete = rows
        .iter()
        .filter(|row| row.id.is_empty() || row.name.is_empty())
        .count();
    if incomplete > 0 {
        return Err(LedgerError::Malformed(format!(
            "{incomplete} student row(s) missing ID or name"
        )));
    }
    Ok(rows.len())
}

/// Render a ledger back into the exported CSV shape: the six fixed columns
/// followed by one column per date in the sorted union of all recorded
/// dates, each cell `Present` or `Absent`.
///
/// A missing mark renders as `Absent`; the export cannot represent
/// "no data", so re-importing collapses unrecorded dates into explicit
/// absences. Known round-trip caveat.
pub fn to_csv(ledger: &Ledger) -> Result<String, LedgerError> {
    let dates = ledger.all_dates();
    let mut writer = WriterBuilder::new().from_writer(Vec::new());

    let mut header = vec![
        "Student ID".to_string(),
        "Student Name".to_string(),
        "Course Name".to_string(),
        "Course ID".to_string(),
        "Semester".to_string(),
        "Section".to_string(),
    ];
    header.extend(dates.iter().map(|date| date.to_string()));
    writer.write_record(&header)?;

    for student in &ledger.students {
        let mut row = vec![
            student.id.clone(),
            student.name.clone(),
            ledger.course_name.clone(),
            ledger.course_id.clone(),
            ledger.semester.clone(),
            ledger.section.clone(),
        ];
        for &date in &dates {
            row.push(if student.attended_on(date) { "Present" } else { "Absent" }.to_string());
        }
        writer.write_record(&row)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|error| LedgerError::Malformed(error.to_string()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn empty_cells_produce_no_entry() {
        let csv = "Student ID,Student Name,Course Name,Course ID,Semester,Section,10/1/2025,10/2/2025\n\
                   S1,Alice,CS1,CS101,Fall25,A,Present,\n";
        let snapshot = parse(csv).unwrap();
        assert_eq!(snapshot.dates, vec![date(2025, 10, 1), date(2025, 10, 2)]);
        let alice = &snapshot.students[0];
        assert_eq!(alice.id, "S1");
        assert_eq!(alice.name, "Alice");
        assert_eq!(alice.attendance.len(), 1);
        assert_eq!(alice.attendance.get(&date(2025, 10, 1)), Some(&true));
        assert_eq!(alice.attendance.get(&date(2025, 10, 2)), None);
    }

    #[test]
    fn date_headers_in_mixed_formats_are_all_detected() {
        let csv = "Student ID,Student Name,Course Name,Course ID,Semester,Section,10/27/2025,28.10.2025,October 29 2025\n\
                   S1,Alice,CS1,CS101,Fall25,A,Present,Absent,yes\n";
        let snapshot = parse(csv).unwrap();
        assert_eq!(
            snapshot.dates,
            vec![date(2025, 10, 27), date(2025, 10, 28), date(2025, 10, 29)]
        );
        let alice = &snapshot.students[0];
        assert_eq!(alice.attendance.get(&date(2025, 10, 27)), Some(&true));
        assert_eq!(alice.attendance.get(&date(2025, 10, 28)), Some(&false));
        assert_eq!(alice.attendance.get(&date(2025, 10, 29)), Some(&true));
    }

    #[test]
    fn any_unrecognized_non_empty_cell_means_absent() {
        let csv = "Student ID,Student Name,Course Name,Course ID,Semester,Section,2025-10-01\n\
                   S1,Alice,CS1,CS101,Fall25,A,maybe\n\
                   S2,Bob,CS1,CS101,Fall25,A,0\n\
                   S3,Cara,CS1,CS101,Fall25,A,TRUE\n";
        let snapshot = parse(csv).unwrap();
        let on = date(2025, 10, 1);
        assert_eq!(snapshot.students[0].attendance.get(&on), Some(&false));
        assert_eq!(snapshot.students[1].attendance.get(&on), Some(&false));
        assert_eq!(snapshot.students[2].attendance.get(&on), Some(&true));
    }

    #[test]
    fn unknown_non_date_columns_are_ignored() {
        let csv = "Student ID,Student Name,Course Name,Course ID,Semester,Section,Notes,2025-10-01\n\
                   S1,Alice,CS1,CS101,Fall25,A,left early,Present\n";
        let snapshot = parse(csv).unwrap();
        assert_eq!(snapshot.dates, vec![date(2025, 10, 1)]);
        assert_eq!(snapshot.students[0].attendance.len(), 1);
    }

    #[test]
    fn missing_metadata_is_rejected() {
        let csv = "Student ID,Student Name,Course Name,Course ID,Semester,Section\n\
                   S1,Alice,,CS101,Fall25,A\n";
        assert!(matches!(
            parse(csv),
            Err(LedgerError::MissingField("Course Name"))
        ));
    }

    #[test]
    fn header_only_input_is_malformed() {
        let csv = "Student ID,Student Name,Course Name,Course ID,Semester,Section,2025-10-01";
        assert!(matches!(parse(csv), Err(LedgerError::Malformed(_))));
    }

    #[test]
    fn broken_quoting_surfaces_the_csv_diagnostic() {
        let csv = "Student ID,Student Name,Course Name,Course ID,Semester,Section\n\
                   S1,\"Alice,CS1,CS101,Fall25,A\nS2,Bob,CS1,CS101,Fall25";
        assert!(matches!(parse(csv), Err(LedgerError::Parse(_))));
    }

    #[test]
    fn export_round_trips_through_the_parser() {
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
        let mut before = ledger::from_roster(&rows, meta, Some(date(2025, 10, 1)), || {
            "session-a".to_string()
        })
        .unwrap();
        ledger::set_attendance(&mut before, "S1", date(2025, 10, 1), true).unwrap();
        ledger::set_attendance(&mut before, "S2", date(2025, 10, 1), true).unwrap();
        ledger::set_attendance(&mut before, "S1", date(2025, 10, 2), true).unwrap();
        ledger::mark_attendance(&mut before, "S2", date(2025, 10, 2)).unwrap();

        let text = to_csv(&before).unwrap();
        let snapshot = parse(&text).unwrap();
        assert_eq!(snapshot.meta.course_name, "Systems");
        assert_eq!(snapshot.dates, vec![date(2025, 10, 1), date(2025, 10, 2)]);
        for (original, reparsed) in before.students.iter().zip(&snapshot.students) {
            assert_eq!(original.id, reparsed.id);
            assert_eq!(original.name, reparsed.name);
            for (date, mark) in &original.attendance {
                assert_eq!(reparsed.attendance.get(date), Some(&mark.attended));
            }
        }
    }

    #[test]
    fn missing_marks_export_as_absent() {
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
        let mut ledger = ledger::from_roster(&rows, meta, Some(date(2025, 10, 1)), || {
            "session-b".to_string()
        })
        .unwrap();
        // Only S1 has any record; S2's missing mark must still render.
        ledger::set_attendance(&mut ledger, "S1", date(2025, 10, 2), true).unwrap();

        let text = to_csv(&ledger).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].ends_with("2025-10-02"));
        assert!(lines[1].ends_with("Present"));
        assert!(lines[2].ends_with("Absent"));
    }

    #[test]
    fn roster_parsing_trims_and_skips_blank_lines() {
        let rows = parse_roster("S1, Alice \n\nS2,Bob\n").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, "S1");
        assert_eq!(rows[0].name, "Alice");
    }

    #[test]
    fn roster_validation_flags_incomplete_rows() {
        assert!(matches!(
            validate_roster(&[]),
            Err(LedgerError::NoStudents)
        ));
        let rows = parse_roster("S1,Alice\nS2,\n").unwrap();
        assert!(matches!(
            validate_roster(&rows),
            Err(LedgerError::Malformed(_))
        ));
        let rows = parse_roster("S1,Alice\nS2,Bob\n").unwrap();
        assert_eq!(validate_roster(&rows).unwrap(), 2);
    }
}
