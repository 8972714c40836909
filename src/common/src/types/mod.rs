pub mod identity;
pub mod process_record;
