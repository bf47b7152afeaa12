// Chat widget: knowledge-base answers, optional LLM generation, human handoff.
// All LLM calls go through llm_client.

pub mod handlers;
pub mod handoff;
pub mod knowledge;
pub mod prompts;
pub mod responder;
pub mod store;
