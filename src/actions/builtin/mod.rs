pub mod approval;
pub mod filter_threshold;
pub mod notify;
pub mod schedule;
pub mod wait;
