pub mod validator;

pub use validator::SchedulingValidator;
