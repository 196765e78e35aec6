pub mod api_connection;
pub mod cli;
pub mod config;
pub mod literal;
pub mod logging;
pub mod nutritional_matcher;
pub mod pipeline;
pub mod prompts;
pub mod recipe_parser;
pub mod search;
pub mod server;
