mod request;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;
use log::debug;

use carina_core::provider::ProviderError;
use carina_core::resource::{Resource, Value};
use carina_core::schema::{AttributeSchema, ResourceSchema};
use carina_core::update_mask::check_names;
use carina_provider_gcp::config::{DEFAULT_OPERATION_TIMEOUT, DEFAULT_POLL_INTERVAL};
use carina_provider_gcp::{GcpClients, GcpIdentifier, GcpProvider, LocalCloud, ProviderConfig};

use request::{OperationKind, Request};

#[derive(Parser)]
#[command(name = "carina-gcp")]
#[command(about = "Google Cloud resource handlers for Carina", long_about = None)]
struct Cli {
    /// Give up on long-running operations after this many seconds
    #[arg(long, global = true, default_value_t = DEFAULT_OPERATION_TIMEOUT.as_secs())]
    operation_timeout_secs: u64,

    /// Delay between operation status polls, in milliseconds
    #[arg(long, global = true, default_value_t = DEFAULT_POLL_INTERVAL.as_millis() as u64)]
    poll_interval_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show resource schemas
    Schema {
        /// Resource type (all types when omitted)
        resource_type: Option<String>,
    },
    /// Check a request without executing it
    Validate {
        /// Path to request .json file
        request: PathBuf,
    },
    /// Execute a request
    Exec {
        /// Path to request .json file
        request: PathBuf,

        /// JSON file holding the local cloud state
        #[arg(long, default_value = "carina-gcp.cloud.json")]
        cloud_state: PathBuf,
    },
}

/// Exit status when the requested resource does not exist
const EXIT_NOT_FOUND: i32 = 2;

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let config = ProviderConfig::default()
        .with_operation_timeout(Duration::from_secs(cli.operation_timeout_secs))
        .with_poll_interval(Duration::from_millis(cli.poll_interval_ms));

    let result = match cli.command {
        Commands::Schema { resource_type } => run_schema(resource_type.as_deref()),
        Commands::Validate { request } => run_validate(&request),
        Commands::Exec {
            request,
            cloud_state,
        } => run_exec(&request, &cloud_state, config).await,
    };

    match result {
        Ok(()) => {}
        Err(CliError::NotFound(message)) => {
            eprintln!("{} {}", "Not found:".yellow().bold(), message);
            std::process::exit(EXIT_NOT_FOUND);
        }
        Err(CliError::Failed(message)) => {
            eprintln!("{} {}", "Error:".red().bold(), message);
            std::process::exit(1);
        }
    }
}

enum CliError {
    NotFound(String),
    Failed(String),
}

impl From<String> for CliError {
    fn from(message: String) -> Self {
        CliError::Failed(message)
    }
}

impl From<ProviderError> for CliError {
    fn from(e: ProviderError) -> Self {
        if e.is_not_found() {
            CliError::NotFound(e.to_string())
        } else {
            CliError::Failed(e.to_string())
        }
    }
}

/// Provider whose schemas are available without any cloud behind it
fn offline_provider() -> GcpProvider {
    GcpProvider::new(
        GcpClients::local(Arc::new(LocalCloud::new())),
        ProviderConfig::default(),
    )
}

fn run_schema(resource_type: Option<&str>) -> Result<(), CliError> {
    let provider = offline_provider();
    let schemas = match resource_type {
        Some(t) => vec![
            provider
                .schema(t)
                .ok_or_else(|| format!("Unknown resource type: {}", t))?,
        ],
        None => provider.schemas(),
    };

    for schema in schemas {
        print_schema(schema);
    }
    Ok(())
}

fn print_schema(schema: &ResourceSchema) {
    println!("{}", schema.resource_type.cyan().bold());
    if let Some(description) = &schema.description {
        println!("  {}", description.dimmed());
    }
    print_fields("identifier", &schema.identifier);
    print_fields("config", &schema.config);
    print_fields("attrs", &schema.attrs);
    println!();
}

fn print_fields(section: &str, fields: &[AttributeSchema]) {
    if fields.is_empty() {
        println!("  {} {}", format!("{}:", section).bold(), "(none)".dimmed());
        return;
    }
    println!("  {}", format!("{}:", section).bold());
    for field in fields {
        match &field.description {
            Some(description) => println!(
                "    {}: {}  {}",
                field.name,
                field.attr_type.to_string().green(),
                description.dimmed()
            ),
            None => println!("    {}: {}", field.name, field.attr_type.to_string().green()),
        }
    }
}

fn run_validate(path: &Path) -> Result<(), CliError> {
    let request = Request::load(path)?;
    let provider = offline_provider();

    println!("{}", "Validating...".cyan());

    let identifier = GcpIdentifier::resolve(&request.identifier)
        .map_err(|e| format!("Invalid identifier: {}", e))?;
    let resource_type = identifier.resource_type();
    let schema = provider
        .schema(resource_type)
        .ok_or_else(|| format!("Unknown resource type: {}", resource_type))?;

    if let Err(errors) = schema.validate_identifier(&request.identifier) {
        let details: Vec<String> = errors.iter().map(|e| format!("  {}", e)).collect();
        return Err(format!(
            "Invalid {} identifier:\n{}",
            resource_type,
            details.join("\n")
        )
        .into());
    }
    if let Some(config) = &request.config
        && let Err(errors) = schema.validate_config(config)
    {
        let details: Vec<String> = errors.iter().map(|e| format!("  {}", e)).collect();
        return Err(format!("Invalid {} config:\n{}", resource_type, details.join("\n")).into());
    }
    check_names(&schema.config, &request.mask)
        .map_err(|e| format!("Invalid update mask: {}", e))?;

    println!(
        "{}",
        format!("✓ {} {} request is valid.", request.operation, resource_type)
            .green()
            .bold()
    );
    Ok(())
}

async fn run_exec(
    path: &Path,
    cloud_state: &Path,
    config: ProviderConfig,
) -> Result<(), CliError> {
    let request = Request::load(path)?;
    let cloud = Arc::new(LocalCloud::load(cloud_state)?);
    debug!("cloud state: {}", cloud_state.display());
    let provider = GcpProvider::new(GcpClients::local(cloud.clone()), config);

    let result = execute(&provider, &request).await;
    cloud.save(cloud_state)?;

    match result? {
        Some(resource) => print_resource(&resource),
        None => println!(
            "{}",
            format!("✓ {} completed.", request.operation).green().bold()
        ),
    }
    Ok(())
}

async fn execute(
    provider: &GcpProvider,
    request: &Request,
) -> Result<Option<Resource>, ProviderError> {
    let empty = Value::map(Vec::<(String, Value)>::new());
    let config = request.config.as_ref().unwrap_or(&empty);

    match request.operation {
        OperationKind::Get => provider.get(&request.identifier).await.map(Some),
        OperationKind::Create => provider
            .create(&request.identifier, config)
            .await
            .map(Some),
        OperationKind::Update => provider
            .update(&request.identifier, config, &request.mask)
            .await
            .map(Some),
        OperationKind::Delete => provider.delete(&request.identifier).await.map(|()| None),
    }
}

fn print_resource(resource: &Resource) {
    let output = serde_json::json!({
        "identifier": Value::Identifier(resource.identifier.clone()).to_json(),
        "config": resource.config.to_json(),
        "attrs": resource.attrs.to_json(),
    });
    match serde_json::to_string_pretty(&output) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("{} {}", "Error:".red().bold(), e),
    }
}
