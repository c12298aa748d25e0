#![deny(warnings)]

pub mod capture;
pub mod config;
pub mod emotion;
pub mod features;
pub mod inference;
pub mod report;
pub mod session;
