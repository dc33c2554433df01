pub mod health;
pub mod job_requests;
pub mod orders;
