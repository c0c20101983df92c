pub mod config;
pub mod error;
pub mod excel_writer;
pub mod models;
pub mod presenter;
pub mod transport;
pub mod workflow;
