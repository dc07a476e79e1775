use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// The tabular structure itself is broken; carries the csv crate's
    /// diagnostic verbatim.
    #[error("csv parse error: {0}")]
    Parse(#[from] csv::Error),
    #[error("malformed input: {0}")]
    Malformed(String),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("no students found")]
    NoStudents,
    #[error("student {0} not found in this course")]
    StudentNotFound(String),
    #[error("course not found for session {0}")]
    CourseNotFound(String),
    #[error("attendance already marked for student {student_id} on {date}")]
    AlreadyMarked {
        student_id: String,
        date: NaiveDate,
    },
    #[error("student has only {available} absent day(s), cannot approve leave for {requested}")]
    InsufficientAbsences { available: usize, requested: usize },
}
