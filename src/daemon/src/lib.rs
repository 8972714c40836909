pub mod daemon;
pub mod identity_set;
pub mod lifecycle;
pub mod log_store;
pub mod poll_loop;
pub mod process_table;
pub mod reconciler;
