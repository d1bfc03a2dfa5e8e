pub mod health;
pub mod releases;
