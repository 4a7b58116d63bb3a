//! # chat-term — terminal client for the chat server
//!
//! Loads a TOML configuration, sends one-shot requests through the
//! request/response bridge, and runs a persistent chat session that
//! prints pushed frames and relays stdin lines to the server.

pub mod chat;
pub mod config;
