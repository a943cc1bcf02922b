mod submission_repository;

pub use submission_repository::*;
