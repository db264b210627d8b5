use clap::Subcommand;
use marksync_core::marks::MarkFilter;

use crate::common::{block_on, print_json, App, CliResult, Connectivity, ExamArgs};

#[derive(Subcommand)]
pub enum MarkAction {
    /// Record a mark (stored locally and queued for sync)
    Record {
        /// Student id
        #[arg(long)]
        student: String,
        /// Subject id
        #[arg(long)]
        subject: String,
        #[command(flatten)]
        exam: ExamArgs,
        /// Mark obtained, 0-100
        value: f64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List marks, merged with the server when reachable
    List {
        #[arg(long)]
        student: Option<String>,
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        exam: Option<String>,
        #[arg(long)]
        year: Option<String>,
        #[arg(long)]
        term: Option<String>,
        #[arg(long = "class")]
        class: Option<String>,
        /// Skip the server and show local marks only
        #[arg(long)]
        local: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(action: MarkAction) -> CliResult {
    match action {
        MarkAction::Record {
            student,
            subject,
            exam,
            value,
            json,
        } => block_on(record(student, subject, exam, value, json))?,
        MarkAction::List {
            student,
            subject,
            exam,
            year,
            term,
            class,
            local,
            json,
        } => {
            let filter = MarkFilter {
                student_id: student,
                subject_id: subject,
                exam_id: exam,
                academic_year_id: year,
                term_id: term,
                class_id: class,
            };
            block_on(list(filter, local, json))?
        }
    }
}

async fn record(student: String, subject: String, exam: ExamArgs, value: f64, json: bool) -> CliResult {
    let app = App::open(Connectivity::Offline).await?;
    let mark = app
        .service
        .record_mark(&student, &subject, &exam.context(), value)
        .await?;
    if json {
        print_json(&mark)?;
    } else {
        println!(
            "recorded {}: {} -> {} ({} pts), queued for sync",
            mark.id, mark.marks_obtained, mark.grade, mark.points
        );
    }
    Ok(())
}

async fn list(filter: MarkFilter, local: bool, json: bool) -> CliResult {
    let connectivity = if local {
        Connectivity::Offline
    } else {
        Connectivity::Probe
    };
    let app = App::open(connectivity).await?;
    let marks = app.service.list_marks(&filter).await?;
    if json {
        return print_json(&marks);
    }
    if marks.is_empty() {
        println!("no marks");
    }
    for mark in &marks {
        println!(
            "{}  {} {} {}  {:>5.1} {} ({} pts){}",
            mark.id,
            mark.student_id,
            mark.subject_id,
            mark.exam_id,
            mark.marks_obtained,
            mark.grade,
            mark.points,
            if mark.synced { "" } else { "  [unsynced]" }
        );
    }
    Ok(())
}
