//! # marksync core library
//!
//! Offline-first capture and synchronization of student marks.
//! The CLI is a thin layer over this crate.
//!
//! ## Architecture
//!
//! - **Storage**: SQLite document store with versioned migrations, plus
//!   TOML configuration
//! - **Grading**: a pure, versioned grade/points/division policy
//! - **Network**: connectivity monitor fed by a reachability probe
//! - **Sync**: durable FIFO queue drained to the remote marks API
//! - **Marks**: the capture service UI collaborators call
//!
//! ## Key Components
//!
//! - [`MarkService`]: record, list and sync marks
//! - [`SyncEngine`]: one sync pass at a time, per-item failure isolation
//! - [`LocalStore`]: collections `marks`, `syncQueue`, `students`,
//!   `classes`, `subjects`
//! - [`Config`]: application configuration management

pub mod error;
pub mod grading;
pub mod marks;
pub mod network;
pub mod storage;
pub mod sync;

pub use error::{ConfigError, CoreError, StoreError, ValidationError};
pub use grading::{
    calculate_grade, compute_division, Division, DivisionSummary, Grade, GradeResult, GradingError,
    SubjectResult, Tier, WeightClass,
};
pub use marks::{ExamContext, MarkFilter, MarkRecord, MarkService, SchoolClass, Student, Subject};
pub use network::{ConnectivityProbe, HttpProbe, NetworkMonitor};
pub use storage::{Config, LocalStore, StoreCell, StoreLocation};
pub use sync::{HttpMarksApi, MarksApi, SyncEngine, SyncError, SyncReport, SyncStatus};
