pub mod app;
pub mod availability;
pub mod booking;
pub mod clock;
pub mod config;
pub mod dialogue;
pub mod engine;
pub mod error;
pub mod extract;
pub mod intent;
pub mod persistence;
pub mod prompting;
pub mod schedule;
pub mod session;
pub mod support;
pub mod types;
