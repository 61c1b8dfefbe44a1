pub mod attendance;
pub mod core;
pub mod import;
pub mod marks;
pub mod notifications;
pub mod quizzes;
pub mod reports;
pub mod students;
pub mod subjects;
