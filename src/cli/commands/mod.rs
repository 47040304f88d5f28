//! CLI command implementations.

mod ask;
mod calendar;
mod chat;
mod config;
mod doctor;
mod search;
mod serve;
mod tool;

pub use ask::run_ask;
pub use calendar::run_calendar;
pub use chat::run_chat;
pub use config::run_config;
pub use doctor::run_doctor;
pub use search::run_search;
pub use serve::run_serve;
pub use tool::run_tool;
