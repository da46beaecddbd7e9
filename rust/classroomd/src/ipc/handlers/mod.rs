pub mod attendance;
pub mod backup;
pub mod behaviors;
pub mod classes;
pub mod core;
pub mod grades;
pub mod import;
pub mod reports;
pub mod setup;
pub mod students;
pub mod tools;
