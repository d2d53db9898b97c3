pub mod handler;

use clap::{Args, ValueEnum};
use std::path::PathBuf;

pub use handler::handle_request_command;

#[derive(Args)]
pub struct RequestCommands {
    /// HTTP method
    #[arg(value_enum)]
    pub method: HttpMethod,

    /// Resource path relative to the versioned endpoint (e.g. "customers/{0}/orders")
    pub path: String,

    /// Arguments substituted into {0}, {1}, ... placeholders of the path
    #[arg(short, long = "arg")]
    pub args: Vec<String>,

    /// Query parameter as key=value (repeatable)
    #[arg(short, long = "query", value_parser = parse_key_value)]
    pub query: Vec<(String, String)>,

    /// Request body (JSON string)
    #[arg(long, conflicts_with = "body_file")]
    pub body: Option<String>,

    /// Read the request body from a JSON file
    #[arg(long)]
    pub body_file: Option<PathBuf>,

    /// Print compact JSON instead of pretty-printed
    #[arg(long)]
    pub compact: bool,

    /// Save the response to a file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

impl HttpMethod {
    pub fn as_method(self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
        }
    }

    pub fn takes_body(self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }
}

pub fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    if key.is_empty() {
        return Err(format!("missing key in '{}'", raw));
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(parse_key_value("size=10"), Ok(("size".to_string(), "10".to_string())));
        assert_eq!(
            parse_key_value("filter=a=b"),
            Ok(("filter".to_string(), "a=b".to_string()))
        );
        assert_eq!(parse_key_value("empty="), Ok(("empty".to_string(), String::new())));
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }

    #[test]
    fn test_methods_with_body() {
        assert!(HttpMethod::Post.takes_body());
        assert!(HttpMethod::Patch.takes_body());
        assert!(!HttpMethod::Get.takes_body());
        assert!(!HttpMethod::Head.takes_body());
        assert_eq!(HttpMethod::Delete.as_method(), reqwest::Method::DELETE);
    }
}
