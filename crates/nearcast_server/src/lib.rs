//! The nearcast gateway server: the HTTP/WebSocket surface over
//! `nearcast_core`, the Redis-backed broker and token store, the SQLite
//! location archive, the binary TCP demo surface and the simulator mode.

pub mod archive;
pub mod config;
pub mod handlers;
pub mod redis;
pub mod sim;
pub mod tcp;
