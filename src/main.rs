use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{ArgGroup, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

mod dates;
mod db;
mod error;
mod ledger;
mod models;
mod review;
mod snapshot;

use error::LedgerError;
use models::{CourseMeta, Ledger};

#[derive(Parser)]
#[command(name = "attendance-ledger")]
#[command(about = "Per-session attendance ledger with CSV snapshot reconciliation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Start a fresh session from a two-column id,name roster CSV
    Create {
        #[arg(long)]
        roster: PathBuf,
        #[arg(long)]
        course_name: String,
        #[arg(long)]
        course_id: String,
        #[arg(long)]
        semester: String,
        #[arg(long)]
        section: String,
        /// Attendance date for the session; defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Reconcile a previously exported attendance CSV into a new session
    Load {
        #[arg(long)]
        csv: PathBuf,
        /// Attendance date for the session; defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Live check-in for one student on the session's current date
    CheckIn {
        #[arg(long)]
        session: String,
        #[arg(long)]
        student: String,
    },
    /// Manually override one student's mark for one date
    #[command(group(
        ArgGroup::new("state")
            .args(["present", "absent"])
            .required(true)
    ))]
    Set {
        #[arg(long)]
        session: String,
        #[arg(long)]
        student: String,
        /// Defaults to the session's current date
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        present: bool,
        #[arg(long)]
        absent: bool,
    },
    /// Flag students over the absence threshold across all recorded dates
    Review {
        #[arg(long)]
        session: String,
        #[arg(long, default_value_t = review::DEFAULT_ABSENCE_THRESHOLD)]
        threshold: usize,
    },
    /// Convert a random sample of a student's absences to presences
    ApproveLeave {
        #[arg(long)]
        session: String,
        #[arg(long)]
        student: String,
        #[arg(long, default_value_t = 6)]
        days: usize,
    },
    /// Export the session as CSV, then end it and clear its stored data
    Export {
        #[arg(long)]
        session: String,
        #[arg(long, default_value = "attendance.csv")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Create {
            roster,
            course_name,
            course_id,
            semester,
            section,
            date,
        } => {
            let text = std::fs::read_to_string(&roster)
                .with_context(|| format!("failed to read {}", roster.display()))?;
            let rows = snapshot::parse_roster(&text)?;
            let count = snapshot::validate_roster(&rows)?;
            let meta = CourseMeta {
                course_name,
                course_id,
                semester,
                section,
            };
            let ledger = ledger::from_roster(&rows, meta, date, ledger::new_session_id)?;
            db::insert_ledger(&pool, &ledger).await?;
            println!(
                "Session {} created with {count} students for {}.",
                ledger.session_id, ledger.current_date
            );
        }
        Commands::Load { csv, date } => {
            let text = std::fs::read_to_string(&csv)
                .with_context(|| format!("failed to read {}", csv.display()))?;
            let parsed = snapshot::parse(&text)?;
            let (ledger, date_existed) =
                ledger::from_snapshot(parsed, date, ledger::new_session_id);
            db::insert_ledger(&pool, &ledger).await?;
            if date_existed {
                println!(
                    "Session {} resumed with existing attendance for {}.",
                    ledger.session_id, ledger.current_date
                );
            } else {
                println!(
                    "New session {} created for {}.",
                    ledger.session_id, ledger.current_date
                );
            }
            println!(
                "{} students reconciled across {} recorded dates.",
                ledger.students.len(),
                ledger.all_dates().len()
            );
        }
        Commands::CheckIn { session, student } => {
            let mut ledger = require_session(&pool, &session).await?;
            if !ledger.active {
                return Err(LedgerError::CourseNotFound(session).into());
            }
            let date = ledger.current_date;
            ledger::mark_attendance(&mut ledger, &student, date)?;
            // Audit append is fire-and-forget; a failure must not block
            // the check-in itself.
            if let Err(error) = db::insert_attendance_record(&pool, &session, &student, date).await
            {
                eprintln!("warning: audit record not written: {error:#}");
            }
            db::replace_ledger(&pool, &ledger).await?;
            println!("Attendance marked for {student} on {date}.");
        }
        Commands::Set {
            session,
            student,
            date,
            present,
            absent,
        } => {
            let mut ledger = require_session(&pool, &session).await?;
            let date = date.unwrap_or(ledger.current_date);
            let attended = present && !absent;
            ledger::set_attendance(&mut ledger, &student, date, attended)?;
            db::replace_ledger(&pool, &ledger).await?;
            if attended {
                println!("Attendance marked for {student} on {date}.");
            } else {
                println!("Attendance removed for {student} on {date}.");
            }
        }
        Commands::Review { session, threshold } => {
            let ledger = require_session(&pool, &session).await?;
            let reports = review::review(&ledger, threshold);
            if reports.is_empty() {
                println!("No students have more than {threshold} absences.");
                return Ok(());
            }
            println!("Students over the {threshold}-absence threshold:");
            for report in &reports {
                println!(
                    "- {} ({}) absent {} of {} days",
                    report.student_name,
                    report.student_id,
                    report.absent_count,
                    report.all_dates.len()
                );
                println!("  absent on: {}", join_dates(&report.absent_days));
            }
        }
        Commands::ApproveLeave {
            session,
            student,
            days,
        } => {
            let mut ledger = require_session(&pool, &session).await?;
            let report = review::report_for(&ledger, &student)?;
            let converted =
                review::approve_leave(&mut ledger, &report, days, &mut rand::thread_rng())?;
            db::replace_ledger(&pool, &ledger).await?;
            println!(
                "Leave approved for {}. {} absences converted to present on: {}",
                report.student_name,
                converted.len(),
                join_dates(&converted)
            );
        }
        Commands::Export { session, out } => {
            let mut ledger = require_session(&pool, &session).await?;
            let text = snapshot::to_csv(&ledger)?;
            std::fs::write(&out, text)
                .with_context(|| format!("failed to write {}", out.display()))?;
            ledger.active = false;
            db::delete_ledger(&pool, &ledger.session_id).await?;
            println!(
                "Attendance exported to {}. Session ended and stored data cleared.",
                out.display()
            );
        }
    }

    Ok(())
}

async fn require_session(pool: &PgPool, session_id: &str) -> anyhow::Result<Ledger> {
    db::find_by_session_id(pool, session_id)
        .await?
        .ok_or_else(|| LedgerError::CourseNotFound(session_id.to_string()).into())
}

fn join_dates(dates: &[NaiveDate]) -> String {
    dates
        .iter()
        .map(|date| date.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
