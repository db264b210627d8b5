//! Grading policy: mark → (grade, points) per education tier, and division
//! computation for the upper tier.
//!
//! Every call site (mark capture, reports, CLI) goes through this module so
//! there is exactly one set of threshold tables.
//!
//! Point convention is lower-is-better throughout: grade A carries the
//! smallest point value, and the best three subjects are the three with the
//! lowest points. Division bands are expressed against that convention.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Version of the threshold tables below. Bump when any band changes.
pub const GRADING_POLICY_VERSION: u32 = 1;

/// Number of primary subjects that count toward a division.
pub const DIVISION_SUBJECT_COUNT: usize = 3;

/// Education tier, each with its own grading scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Lower-secondary (A/B/C/D/F).
    Lower,
    /// Upper-secondary (A/B/C/D/E/S/F, divisions).
    Upper,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Lower => "lower",
            Tier::Upper => "upper",
        }
    }
}

impl FromStr for Tier {
    type Err = GradingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lower" | "o_level" | "o-level" => Ok(Tier::Lower),
            "upper" | "a_level" | "a-level" => Ok(Tier::Upper),
            other => Err(GradingError::UnknownTier(other.to_string())),
        }
    }
}

/// Whether a subject counts toward the primary or subsidiary load.
/// Only meaningful for the upper tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightClass {
    #[default]
    Primary,
    Subsidiary,
}

impl FromStr for WeightClass {
    type Err = GradingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "primary" | "principal" => Ok(WeightClass::Primary),
            "subsidiary" => Ok(WeightClass::Subsidiary),
            other => Err(GradingError::UnknownWeightClass(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    E,
    /// Subsidiary pass.
    S,
    F,
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::E => "E",
            Grade::S => "S",
            Grade::F => "F",
        };
        f.write_str(s)
    }
}

/// Graded outcome for a single mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeResult {
    pub grade: Grade,
    pub points: u8,
}

/// Overall-performance band, I best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Division {
    I,
    II,
    III,
    IV,
    #[serde(rename = "0")]
    Zero,
}

impl fmt::Display for Division {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Division::I => "I",
            Division::II => "II",
            Division::III => "III",
            Division::IV => "IV",
            Division::Zero => "0",
        };
        f.write_str(s)
    }
}

/// Grading errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GradingError {
    #[error("mark {0} is outside 0..=100")]
    MarkOutOfRange(f64),

    #[error("unknown tier: {0}")]
    UnknownTier(String),

    #[error("unknown weight class: {0}")]
    UnknownWeightClass(String),

    #[error("division needs {needed} primary subjects, found {found}")]
    InsufficientSubjects { needed: usize, found: usize },

    #[error("points total {0} has no division band")]
    PointsOutOfRange(u32),
}

/// One row of a threshold table: marks at or above `min` earn `grade`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Band {
    pub min: u8,
    pub grade: Grade,
    pub points: u8,
}

const fn band(min: u8, grade: Grade, points: u8) -> Band {
    Band { min, grade, points }
}

/// A complete, versioned set of threshold tables. Bands are ordered by
/// descending `min` and the last band always starts at 0.
#[derive(Debug, Clone, Copy)]
pub struct GradingPolicy {
    pub version: u32,
    pub lower: &'static [Band],
    pub upper_primary: &'static [Band],
    pub upper_subsidiary: &'static [Band],
    /// `(max_points_inclusive, division)` ordered ascending.
    pub divisions: &'static [(u32, Division)],
}

impl GradingPolicy {
    pub const STANDARD: GradingPolicy = GradingPolicy {
        version: GRADING_POLICY_VERSION,
        lower: &[
            band(81, Grade::A, 1),
            band(61, Grade::B, 2),
            band(41, Grade::C, 3),
            band(21, Grade::D, 4),
            band(0, Grade::F, 5),
        ],
        upper_primary: &[
            band(80, Grade::A, 1),
            band(70, Grade::B, 2),
            band(60, Grade::C, 3),
            band(50, Grade::D, 4),
            band(40, Grade::E, 5),
            band(35, Grade::S, 6),
            band(0, Grade::F, 7),
        ],
        upper_subsidiary: &[band(35, Grade::S, 0), band(0, Grade::F, 0)],
        divisions: &[
            (9, Division::I),
            (12, Division::II),
            (17, Division::III),
            (19, Division::IV),
            (21, Division::Zero),
        ],
    };

    fn table(&self, tier: Tier, weight: WeightClass) -> &'static [Band] {
        match (tier, weight) {
            (Tier::Lower, _) => self.lower,
            (Tier::Upper, WeightClass::Primary) => self.upper_primary,
            (Tier::Upper, WeightClass::Subsidiary) => self.upper_subsidiary,
        }
    }

    /// Grade a mark in `0..=100`. Lower bounds are inclusive.
    pub fn grade(
        &self,
        mark: f64,
        tier: Tier,
        weight: WeightClass,
    ) -> Result<GradeResult, GradingError> {
        if !mark.is_finite() || !(0.0..=100.0).contains(&mark) {
            return Err(GradingError::MarkOutOfRange(mark));
        }

        let table = self.table(tier, weight);
        let band = table
            .iter()
            .find(|b| mark >= f64::from(b.min))
            .unwrap_or(&table[table.len() - 1]);

        Ok(GradeResult {
            grade: band.grade,
            points: band.points,
        })
    }

    /// Map a best-three points total onto a division band.
    pub fn division_for_points(&self, total: u32) -> Result<Division, GradingError> {
        let floor = DIVISION_SUBJECT_COUNT as u32;
        if total < floor {
            return Err(GradingError::PointsOutOfRange(total));
        }
        self.divisions
            .iter()
            .find(|(max, _)| total <= *max)
            .map(|(_, division)| *division)
            .ok_or(GradingError::PointsOutOfRange(total))
    }
}

/// Grade a mark with the standard policy.
pub fn calculate_grade(
    mark: f64,
    tier: Tier,
    weight: WeightClass,
) -> Result<GradeResult, GradingError> {
    GradingPolicy::STANDARD.grade(mark, tier, weight)
}

/// A graded upper-tier subject result, input to division computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectResult {
    pub subject_id: String,
    pub weight_class: WeightClass,
    pub result: GradeResult,
}

/// Outcome of a division computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DivisionSummary {
    pub division: Division,
    pub best_three_points: u32,
    /// Subject ids that made up the best three, best first.
    pub counted_subjects: Vec<String>,
    pub policy_version: u32,
}

/// Sum of the three lowest point values, or `None` with fewer than three.
pub fn best_three_points<I>(points: I) -> Option<u32>
where
    I: IntoIterator<Item = u8>,
{
    let mut all: Vec<u8> = points.into_iter().collect();
    if all.len() < DIVISION_SUBJECT_COUNT {
        return None;
    }
    all.sort_unstable();
    Some(all.iter().take(DIVISION_SUBJECT_COUNT).map(|p| u32::from(*p)).sum())
}

/// Compute a division from a student's upper-tier results. Subsidiary
/// subjects are ignored.
pub fn compute_division(results: &[SubjectResult]) -> Result<DivisionSummary, GradingError> {
    let mut primary: Vec<&SubjectResult> = results
        .iter()
        .filter(|r| r.weight_class == WeightClass::Primary)
        .collect();

    if primary.len() < DIVISION_SUBJECT_COUNT {
        return Err(GradingError::InsufficientSubjects {
            needed: DIVISION_SUBJECT_COUNT,
            found: primary.len(),
        });
    }

    // stable sort keeps input order among equal points
    primary.sort_by_key(|r| r.result.points);
    let counted: Vec<&SubjectResult> = primary.into_iter().take(DIVISION_SUBJECT_COUNT).collect();
    let total: u32 = counted.iter().map(|r| u32::from(r.result.points)).sum();
    let policy = GradingPolicy::STANDARD;

    Ok(DivisionSummary {
        division: policy.division_for_points(total)?,
        best_three_points: total,
        counted_subjects: counted.iter().map(|r| r.subject_id.clone()).collect(),
        policy_version: policy.version,
    })
}
