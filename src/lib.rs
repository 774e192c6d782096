pub mod calendar;
pub mod config;
pub mod contact;
pub mod engine;
pub mod limits;
pub mod model;
pub mod observability;
pub mod store;
