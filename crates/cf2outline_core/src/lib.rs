pub mod clean;
pub mod config;
pub mod confluence;
pub mod http;
pub mod migrate;
pub mod outline;
pub mod report;
pub mod rewrite;
pub mod runtime;
pub mod staging;
pub mod urlmap;
pub mod walker;
