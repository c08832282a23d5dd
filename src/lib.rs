pub mod api;
pub mod config;
pub mod email;
pub mod entities;
pub mod fetcher;
pub mod fingerprint;
pub mod normalizer;
pub mod poller;
pub mod storage;
pub mod telemetry;
