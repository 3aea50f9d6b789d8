// src/lib.rs
pub mod native_api;
pub mod runtime_core;
pub mod prompt_template;
pub mod chat_session;
pub mod runtime_interface;
