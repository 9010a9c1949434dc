pub mod capture;
pub mod orchestrator;
pub mod task;
