pub mod config;
pub mod error;
pub mod identity;
pub mod mapping;
pub mod notice;
pub mod outcome;
pub mod session;
pub mod store;
pub mod termplan;
