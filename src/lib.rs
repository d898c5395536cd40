pub mod automation;
pub mod config;
pub mod generator;
pub mod history;
pub mod models;
pub mod storage;
