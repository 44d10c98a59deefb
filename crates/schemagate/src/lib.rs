//! HTTP gateway that turns YAML extraction configs into structured-output
//! endpoints backed by a language model.

pub mod app_state;
pub mod compiler;
pub mod handlers;
pub mod server;
pub mod settings;
pub mod utils;
