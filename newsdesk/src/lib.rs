// Library interface for newsdesk modules
// This allows tests and the server binary to import modules

pub mod conversation;
pub mod error;
pub mod feed;
pub mod llm;
pub mod ratelimit;
pub mod server;
pub mod sessions;
pub mod storage;
