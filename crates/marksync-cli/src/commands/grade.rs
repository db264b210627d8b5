use clap::Subcommand;
use marksync_core::grading::{calculate_grade, Tier, WeightClass, GRADING_POLICY_VERSION};

use crate::common::{block_on, print_json, App, CliResult, Connectivity, ExamArgs};

#[derive(Subcommand)]
pub enum GradeAction {
    /// Grade a single mark
    Calc {
        /// Mark, 0-100
        mark: f64,
        /// lower | upper (defaults to grading.default_tier)
        #[arg(long)]
        tier: Option<Tier>,
        /// primary | subsidiary
        #[arg(long, default_value = "primary")]
        weight: WeightClass,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Compute a student's division from recorded upper-tier marks
    Division {
        #[arg(long)]
        student: String,
        #[command(flatten)]
        exam: ExamArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(action: GradeAction) -> CliResult {
    match action {
        GradeAction::Calc {
            mark,
            tier,
            weight,
            json,
        } => {
            let tier = match tier {
                Some(tier) => tier,
                None => marksync_core::Config::load()?.grading.default_tier,
            };
            let result = calculate_grade(mark, tier, weight)?;
            if json {
                print_json(&serde_json::json!({
                    "mark": mark,
                    "tier": tier,
                    "weightClass": weight,
                    "grade": result.grade,
                    "points": result.points,
                    "policyVersion": GRADING_POLICY_VERSION,
                }))
            } else {
                println!("{} ({} pts)", result.grade, result.points);
                Ok(())
            }
        }
        GradeAction::Division {
            student,
            exam,
            json,
        } => block_on(division(student, exam, json))?,
    }
}

async fn division(student: String, exam: ExamArgs, json: bool) -> CliResult {
    let app = App::open(Connectivity::Probe).await?;
    let summary = app.service.division_for(&student, &exam.context()).await?;
    if json {
        return print_json(&summary);
    }
    println!(
        "division {} ({} pts from {})",
        summary.division,
        summary.best_three_points,
        summary.counted_subjects.join(", ")
    );
    Ok(())
}
