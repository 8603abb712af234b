pub mod ports;
pub mod telemetry;
pub mod dedup_writer;
pub mod pagination_crawler;
pub mod staleness_gate;
pub mod handler;
