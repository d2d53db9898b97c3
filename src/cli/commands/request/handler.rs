//! Request command handler

use anyhow::{Context, Result};
use colored::*;
use partner_center::api::{PartnerError, PartnerServiceProxy, expand_path_template};
use serde_json::Value;
use std::fs;
use std::time::Instant;

use super::{HttpMethod, RequestCommands};
use crate::cli::Cli;
use crate::cli::session;

/// Handle the request command
pub async fn handle_request_command(cli: &Cli, args: &RequestCommands) -> Result<()> {
    if args.no_color {
        colored::control::set_override(false);
    }

    let arg_refs: Vec<&str> = args.args.iter().map(String::as_str).collect();
    let path = expand_path_template(&args.path, &arg_refs)?;
    let query: Vec<(&str, &str)> = args.query.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();

    let body = read_body(args)?;
    if body.is_some() && !args.method.takes_body() {
        anyhow::bail!("{:?} requests do not take a body", args.method);
    }

    let proxy = session::connect(cli).await?;
    let started = Instant::now();

    let result = match args.method {
        HttpMethod::Delete => {
            let target = path_with_query(&proxy, &path, &query)?;
            proxy.delete(&target).await.map(|()| Value::Null)
        }
        HttpMethod::Head => {
            let target = path_with_query(&proxy, &path, &query)?;
            proxy.head(&target).await.map(|exists| serde_json::json!({ "exists": exists }))
        }
        method => {
            proxy
                .send::<Value, Value>(method.as_method(), &path, &query, body.as_ref())
                .await
        }
    };

    let elapsed = started.elapsed();
    let response = match result {
        Ok(response) => response,
        Err(error) => {
            report_failure(&error);
            return Err(error).context(format!("{:?} {} failed", args.method, path));
        }
    };

    eprintln!(
        "{} {} {}",
        "✓".bright_green(),
        format!("{:?} {}", args.method, path).cyan(),
        format!("({:.2}ms)", elapsed.as_secs_f64() * 1000.0).dimmed()
    );

    let formatted = if args.compact {
        serde_json::to_string(&response).context("Failed to format JSON output")?
    } else {
        serde_json::to_string_pretty(&response).context("Failed to format JSON output")?
    };

    if let Some(output_path) = &args.output {
        fs::write(output_path, &formatted)
            .with_context(|| format!("Failed to write output to: {}", output_path.display()))?;
        eprintln!("Response saved to: {}", output_path.display().to_string().bright_green());
    } else {
        println!("{}", formatted);
    }

    Ok(())
}

/// `delete` and `head` take no query, so pairs are folded into an absolute URI
fn path_with_query(proxy: &PartnerServiceProxy, path: &str, query: &[(&str, &str)]) -> Result<String> {
    if query.is_empty() {
        return Ok(path.to_string());
    }
    Ok(proxy.uri(path, query)?.to_string())
}

fn read_body(args: &RequestCommands) -> Result<Option<Value>> {
    let raw = match (&args.body, &args.body_file) {
        (Some(body), _) => body.clone(),
        (None, Some(path)) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read body file: {}", path.display()))?,
        (None, None) => return Ok(None),
    };

    let body = serde_json::from_str(&raw).context("Request body is not valid JSON")?;
    Ok(Some(body))
}

fn report_failure(error: &PartnerError) {
    eprintln!("{} {}", "✗".bright_red(), error.category().to_string().bright_red().bold());

    if let PartnerError::Service {
        request_id,
        correlation_id,
        fault,
        ..
    } = error
    {
        eprintln!("  {}: {}", "Request id".dimmed(), request_id);
        eprintln!("  {}: {}", "Correlation id".dimmed(), correlation_id);
        if let Some(fault) = fault {
            if let Some(code) = &fault.code {
                eprintln!("  {}: {}", "Error code".dimmed(), code.bright_yellow());
            }
            for item in &fault.data {
                eprintln!("  {}: {}", "Data".dimmed(), item);
            }
        }
    }
}
