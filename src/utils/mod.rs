pub mod sanitize;
pub mod timestamp;
