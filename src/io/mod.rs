pub mod label_table;
pub mod writer;
