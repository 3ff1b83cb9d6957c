//! Application collection tasks
//!
//! Dedicated task sets for applications the service knows how to inspect,
//! looked up by name. An unknown name is not an error; the application
//! section of the report simply stays empty.

use anyhow::Context;
use regex::Regex;
use serde_json::{Value, json};

use crate::scheduler::{CollectMode, TaskError, TaskRegistry, TaskSpec};

/// Register the task set for `name`. Returns `false` when no dedicated
/// collector exists for that application.
pub fn register(registry: &mut TaskRegistry, name: &str) -> Result<bool, TaskError> {
    match name {
        "nginx" => register_nginx(registry).map(|_| true),
        "mysql" => register_mysql(registry).map(|_| true),
        _ => Ok(false),
    }
}

fn register_nginx(registry: &mut TaskRegistry) -> Result<(), TaskError> {
    // nginx prints its version banner on stderr
    registry.register_snapshot(
        TaskSpec::new("nginx", "nginx_version", "nginx -v 2>&1"),
        parse_nginx_version,
    )?;

    registry.register_snapshot(
        TaskSpec::new("nginx", "nginx_workers", "pgrep -c -f 'nginx: worker'")
            .mode(CollectMode::Async),
        parse_process_count,
    )?;

    Ok(())
}

fn register_mysql(registry: &mut TaskRegistry) -> Result<(), TaskError> {
    registry.register_snapshot(
        TaskSpec::new("mysql", "mysql_version", "mysqld --version 2>&1"),
        parse_mysql_version,
    )?;

    registry.register_snapshot(
        TaskSpec::new("mysql", "mysql_threads", "mysqladmin status").mode(CollectMode::Async),
        parse_mysql_threads,
    )?;

    Ok(())
}

fn parse_nginx_version(raw: &str) -> anyhow::Result<Value> {
    let pattern = Regex::new(r"nginx/([0-9][0-9.]*)")?;
    let version = pattern
        .captures(raw)
        .and_then(|captures| captures.get(1))
        .context("no nginx version banner in output")?;

    Ok(json!({ "version": version.as_str() }))
}

fn parse_mysql_version(raw: &str) -> anyhow::Result<Value> {
    let pattern = Regex::new(r"Ver\s+(\S+)")?;
    let version = pattern
        .captures(raw)
        .and_then(|captures| captures.get(1))
        .context("no mysqld version banner in output")?;

    Ok(json!({ "version": version.as_str() }))
}

fn parse_process_count(raw: &str) -> anyhow::Result<Value> {
    Ok(json!({
        "workers": raw.trim().parse::<u64>().context("malformed process count")?,
    }))
}

fn parse_mysql_threads(raw: &str) -> anyhow::Result<Value> {
    // "Uptime: 436  Threads: 3  Questions: 20 ..."
    let mut fields = raw.split_whitespace();
    while let Some(field) = fields.next() {
        if field == "Threads:" {
            let count = fields
                .next()
                .context("Threads field has no value")?
                .parse::<u64>()
                .context("malformed thread count")?;
            return Ok(json!({ "threads": count }));
        }
    }
    anyhow::bail!("no Threads field in mysqladmin output");
}
