// Library for tests to access modules

pub mod aggregator;
pub mod auditor;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod models;
pub mod orchestrator;
pub mod partition;
pub mod queue;
pub mod routes;
pub mod shutdown;
pub mod stats_repo;
pub mod task;
pub mod worker;
