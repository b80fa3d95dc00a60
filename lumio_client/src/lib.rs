pub mod address;
pub mod cli;
pub mod client;
pub mod config;
pub mod contract;
pub mod database;
pub mod error;
pub mod ledger;
pub mod media;
pub mod profiles;
pub mod telemetry;
pub mod threading;
pub mod utils;

pub use client::LumioClient;
pub use error::{ClientError, ClientResult};
