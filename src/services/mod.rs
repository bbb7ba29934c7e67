pub mod extraction;
pub mod grading;
pub mod scoring;
