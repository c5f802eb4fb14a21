pub mod orchestrator;
pub mod workbench;
