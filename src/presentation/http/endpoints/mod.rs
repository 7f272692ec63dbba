pub mod health;
pub mod jobs;
pub mod messages;
pub mod root;
