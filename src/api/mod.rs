//! Camera server API

pub mod client;

pub use client::ServerClient;
