// scoutchat Engine — chat orchestration, tools and model providers.
//
// Leaves first: text / http / proxy → tools, providers, tool_call,
// reasoning, prompts → state → chat (the controller) → config, transcript.

pub mod chat;
pub mod config;
pub mod http;
pub mod prompts;
pub mod providers;
pub mod proxy;
pub mod reasoning;
pub mod state;
pub mod text;
pub mod tool_call;
pub mod tools;
pub mod transcript;

use crate::atoms::error::EngineResult;
use crate::atoms::traits::ChatView;
use chat::ChatController;
use config::AppConfig;
use http::ReqwestFetch;
use log::info;
use providers::AnyProvider;
use std::sync::Arc;
use tools::ToolsService;

/// Wire the production stack from a loaded config: reqwest transport,
/// configured proxy pool, routing model provider.
pub fn build_controller(
    config: &AppConfig,
    view: Arc<dyn ChatView>,
) -> EngineResult<ChatController> {
    let fetcher = ReqwestFetch::new(config.tools.user_agent.as_deref(), config.request_timeout())?;
    let tools = ToolsService::new(
        Arc::new(fetcher),
        config.proxy_pool(),
        config.search_timeout(),
        config.request_timeout(),
    );
    let provider = AnyProvider::from_configs(
        config.providers.openai.as_ref(),
        config.providers.google.as_ref(),
        config.model_timeout(),
    )?;
    info!(
        "[engine] ready: model={} proxies={} openai={} google={}",
        config.settings.selected_model,
        tools.proxies().len(),
        config.providers.openai.is_some(),
        config.providers.google.is_some()
    );
    Ok(ChatController::new(
        Arc::new(provider),
        Arc::new(tools),
        view,
        config.settings.clone(),
        config.chat_options(),
    ))
}
