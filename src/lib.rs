pub mod cli;
pub mod config;
pub mod ingest;
pub mod monitor;
pub mod shipper;
pub mod storage;
