// ABOUTME: Library root for cutover - blue/green deployment orchestration.
// ABOUTME: The main binary is in main.rs.

pub mod audit;
pub mod config;
pub mod deploy;
pub mod diagnostics;
pub mod error;
pub mod health;
pub mod hooks;
pub mod output;
pub mod policy;
pub mod provision;
pub mod routing;
pub mod store;
pub mod types;
