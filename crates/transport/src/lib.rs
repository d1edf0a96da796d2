// Network transport for streaming audio

pub mod client;
pub mod connection;

pub use client::HttpTransport;
pub use connection::{Connection, Transport};
