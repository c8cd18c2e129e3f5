pub mod agent;
pub mod claims;
pub mod config;
pub mod decision;
pub mod error;
pub mod grid;
pub mod layout;
pub mod message;
pub mod path;
pub mod perception;
pub mod record;
pub mod report;
pub mod sim;
