// scoutchat — chat engine for OpenAI- and Gemini-style models with web
// search, URL reading and instant answers fetched through rotating proxies.
//
//   atoms/   pure types, errors, constants and collaborator traits
//   engine/  controller, tools, providers, parsers, config

pub mod atoms;
pub mod engine;

pub use atoms::error::{EngineError, EngineResult};
pub use atoms::traits::{ChatView, HttpFetch, HttpResponse, ModelProvider};
pub use atoms::types::*;
pub use engine::build_controller;
pub use engine::chat::{ChatController, ChatOptions};
pub use engine::config::AppConfig;
