pub mod admin;
pub mod analytics;
pub mod conversation;
pub mod submission;
