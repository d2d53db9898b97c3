pub mod config;
pub mod request;
pub mod token;

pub use config::handle_config_command;
pub use request::handle_request_command;
pub use token::handle_token_command;
