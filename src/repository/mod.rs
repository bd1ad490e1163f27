//! Typed CRUD over the store for `Job` and `JobExecution` entities.

mod execution_repository;
mod job_repository;

pub use execution_repository::ExecutionRepository;
pub use job_repository::{JobFilter, JobPatch, JobRepository};
