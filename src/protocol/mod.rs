pub mod canonical;
pub mod classify;
pub mod event_types;
pub mod mapping;
pub mod openai_chat;
pub mod openai_responses;
