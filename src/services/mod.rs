pub mod cleaning;
pub mod export;
pub mod ingest;
pub mod report;
pub mod scheduler;
pub mod summary;
pub mod validator;
pub mod wttr;
