pub mod accessor;
pub mod types;
