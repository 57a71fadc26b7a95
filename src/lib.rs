//! Client for a steel supply-chain logistics backend: paginated resource
//! lists, dashboard aggregates, training job control and spreadsheet upload.
pub mod api;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod model;
pub mod paginate;
pub mod schedule;
pub mod session;
pub mod storage;
pub mod training;
pub mod upload;
pub mod views;
