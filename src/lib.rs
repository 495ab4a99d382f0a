// Library for tests to access modules

pub mod aggregation;
pub mod checks;
pub mod cli;
pub mod classifier;
pub mod collector_worker;
pub mod config;
pub mod error;
pub mod history_repo;
pub mod models;
pub mod prom_client;
pub mod routes;
pub mod summary;
pub mod units;
pub mod version;
pub mod window;
