//! Mark capture: records, reference data and the capture service.

pub mod repo;
pub mod service;
pub mod types;

pub use repo::{MarkRepo, ReferenceCache};
pub use service::MarkService;
pub use types::{
    is_local_id, new_local_id, ExamContext, MarkFilter, MarkKey, MarkRecord, SchoolClass, Student,
    Subject, LOCAL_ID_PREFIX,
};
