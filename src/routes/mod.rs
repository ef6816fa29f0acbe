pub mod health;
pub mod scheduler;
pub mod summaries;
