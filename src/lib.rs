pub mod config;
pub mod error;
pub mod gateway;
pub mod reply;
pub mod rest;
pub mod throttle;
