//! Travel Assist — email automation for a travel agency.

pub mod analysis;
pub mod api;
pub mod channels;
pub mod config;
pub mod error;
pub mod llm;
pub mod notify;
pub mod pipeline;
pub mod responder;
pub mod store;
