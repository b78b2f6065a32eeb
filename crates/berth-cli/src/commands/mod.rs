//! Command implementations for the berth CLI

pub mod models;
pub mod port;
pub mod service;
pub mod status;
pub mod tunnel;
