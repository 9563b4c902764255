#![allow(dead_code)]

pub mod config;
pub mod mock_llm;
pub mod server;
pub mod store;
