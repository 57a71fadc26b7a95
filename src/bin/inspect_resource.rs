use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

use steelvis::api::{ApiClient, DataSource};
use steelvis::config;
use steelvis::model::{PageRequest, ResourceKind};

#[derive(Parser, Debug)]
#[command(about = "Print the fields and JSON types returned for one page of a resource")]
struct Args {
    /// Path to YAML config
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// plants, ports, trains, vessels or logistics
    resource: ResourceKind,

    #[arg(long, default_value = "1")]
    page: u32,
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    let client = ApiClient::new(cfg.base_url()?, cfg.app.request_timeout())?;

    let records = client
        .fetch_page(
            args.resource,
            PageRequest {
                page: args.page,
                limit: cfg.api.page_size,
            },
        )
        .await
        .with_context(|| format!("failed to fetch {}", args.resource))?;

    // field -> (type -> count)
    let mut fields: BTreeMap<String, BTreeMap<&'static str, usize>> = BTreeMap::new();
    for record in &records {
        for (name, value) in record {
            *fields
                .entry(name.clone())
                .or_default()
                .entry(type_name(value))
                .or_default() += 1;
        }
    }

    println!("Resource: {} (page {}, {} records)", args.resource, args.page, records.len());
    let key = args.resource.natural_key();
    println!("Natural key: {}", key.fields().join(", "));
    println!("Fields:");
    for (name, types) in fields {
        let types: Vec<String> = types
            .into_iter()
            .map(|(t, n)| format!("{} x{}", t, n))
            .collect();
        let missing = records.iter().filter(|r| !r.contains_key(&name)).count();
        println!("  {} -> {{ {} }}, missing in {}", name, types.join(", "), missing);
    }
    Ok(())
}
