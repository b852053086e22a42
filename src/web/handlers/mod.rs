pub mod records;
pub mod status;
