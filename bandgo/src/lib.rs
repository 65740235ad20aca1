pub mod client;
pub mod config;
pub mod counters;
pub mod dialer;
pub mod headers;
pub mod sampler;
pub mod supervisor;
pub mod terminal;
pub mod tls;
pub mod worker;
