pub mod cache;
pub mod config;
pub mod grade;
pub mod mark;
pub mod sync;
