//! Core library for the campus client: configuration, identity provider,
//! session store and the course backend client.

pub mod api;
pub mod config;
pub mod identity;
pub mod interrupt;
pub mod logging;
pub mod session;
