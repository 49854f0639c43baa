pub mod crawlers;
pub mod health;
pub mod logs;
pub mod tasks;
