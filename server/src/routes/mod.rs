pub mod diagnose;
pub mod health;
