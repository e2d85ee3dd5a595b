//! wabridge: WhatsApp over HTTP.
//!
//! Exposes a WhatsApp Web session (hosted by a sidecar process) through a
//! small HTTP API, answers a few chat commands, and serves a dashboard that
//! shows the login QR code and live session status.
//!
//! See `DESIGN.md` for architecture notes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod commands;
pub mod config;
pub mod logging;
pub mod phone;
pub mod qr;
pub mod server;
pub mod status;
pub mod whatsapp;
