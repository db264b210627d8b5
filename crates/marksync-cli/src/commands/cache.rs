use std::path::PathBuf;

use clap::{Subcommand, ValueEnum};
use marksync_core::grading::Tier;
use marksync_core::marks::{SchoolClass, Student, Subject};

use crate::common::{block_on, print_json, App, CliResult, Connectivity};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Kind {
    Students,
    Classes,
    Subjects,
}

#[derive(Subcommand)]
pub enum CacheAction {
    /// Load reference data from a JSON array file
    Import {
        kind: Kind,
        file: PathBuf,
    },
    /// Students cached for a class
    Students {
        #[arg(long = "class")]
        class: String,
    },
    /// Classes cached for an academic year
    Classes {
        #[arg(long)]
        year: String,
    },
    /// Subjects cached for a tier
    Subjects {
        #[arg(long)]
        tier: Tier,
    },
}

pub fn run(action: CacheAction) -> CliResult {
    block_on(run_async(action))?
}

async fn run_async(action: CacheAction) -> CliResult {
    let app = App::open(Connectivity::Offline).await?;
    let service = &app.service;
    match action {
        CacheAction::Import { kind, file } => {
            let raw = std::fs::read_to_string(&file)?;
            let count = match kind {
                Kind::Students => {
                    service
                        .cache_students(&serde_json::from_str::<Vec<Student>>(&raw)?)
                        .await?
                }
                Kind::Classes => {
                    service
                        .cache_classes(&serde_json::from_str::<Vec<SchoolClass>>(&raw)?)
                        .await?
                }
                Kind::Subjects => {
                    service
                        .cache_subjects(&serde_json::from_str::<Vec<Subject>>(&raw)?)
                        .await?
                }
            };
            println!("cached {count} {kind:?}");
        }
        CacheAction::Students { class } => print_json(&service.students_in_class(&class).await?)?,
        CacheAction::Classes { year } => print_json(&service.classes_in_year(&year).await?)?,
        CacheAction::Subjects { tier } => print_json(&service.subjects_for_tier(tier).await?)?,
    }
    Ok(())
}
