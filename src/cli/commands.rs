//! CLI command implementations
//!
//! Each command connects one client, performs one operation and prints one JSON line.
//! Empty results from the client (no URL, no lines, `false` downloads) become
//! `OSS_CLI_OPERATION_FAILED`; the reason is in the log.

use std::path::Path;

use serde_json::{json, Value};

use crate::client::{OssClient, TransferOptions};
use crate::config::OssConfig;
use crate::observability::{Event, Logger};
use crate::provider::{Credentials, LocalProvider};
use crate::source::ObjectSource;

use super::args::{Cli, Command};
use super::errors::{CliError, CliResult};
use super::io::{write_error, write_lines, write_response};

/// Parse arguments, run the command and report failures on stdout
pub fn run() -> CliResult<()> {
    init_tracing();
    let cli = Cli::parse_args();
    let result = run_cli(cli);
    if let Err(e) = &result {
        let _ = write_error(e.code_str(), e.message());
    }
    result
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Load configuration from the file, or from the environment without one
pub fn load_config(path: Option<&Path>) -> CliResult<OssConfig> {
    let config = match path {
        Some(path) => OssConfig::load(path),
        None => OssConfig::from_env(),
    };
    config.map_err(|e| CliError::config_error(e.to_string()))
}

/// Build a connected client, against `local` when given
pub fn connect(config: OssConfig, local: Option<&Path>, logger: Logger) -> CliResult<OssClient> {
    let credentials = Credentials::new(&config.access_key_id, &config.access_key_secret);
    let provider = match local {
        Some(root) => Some(LocalProvider::new(root.to_path_buf(), &config.endpoint, credentials)?),
        None => None,
    };

    let mut client = OssClient::new(config).with_logger(logger);
    match provider {
        Some(provider) => client.connect_with(provider)?,
        None => client.connect()?,
    }
    Ok(client)
}

/// Run parsed arguments
pub fn run_cli(cli: Cli) -> CliResult<()> {
    let config = load_config(cli.config.as_deref())?;
    let logger = Logger::tracing();
    let source = match &cli.config {
        Some(path) => path.display().to_string(),
        None => "environment".to_string(),
    };
    logger.info(Event::ConfigLoaded, &[("source", source.as_str())]);

    let client = connect(config, cli.local.as_deref(), logger)?;
    let data = run_command(&client, cli.command, cli.progress)?;
    write_response(data)
}

fn transfer_options(progress: bool) -> TransferOptions<'static> {
    if progress {
        TransferOptions::logged()
    } else {
        TransferOptions::none()
    }
}

fn uploaded(bucket: &str, key: &str, url: Option<String>) -> CliResult<Value> {
    match url {
        Some(url) => Ok(json!({ "bucket": bucket, "key": key, "url": url })),
        None => Err(CliError::operation_failed(format!(
            "{}/{} was not uploaded",
            bucket, key
        ))),
    }
}

/// Execute one command against a connected client
pub fn run_command(client: &OssClient, cmd: Command, progress: bool) -> CliResult<Value> {
    match cmd {
        Command::Put { bucket, key, content } => {
            let url = client.put(&bucket, &key, content, transfer_options(progress))?;
            uploaded(&bucket, &key, url)
        }
        Command::PutFile { bucket, key, path } => {
            let url = client.put(&bucket, &key, ObjectSource::file(path), transfer_options(progress))?;
            uploaded(&bucket, &key, url)
        }
        Command::PutUrl { bucket, key, url } => {
            let url = client.put(&bucket, &key, ObjectSource::url(url), transfer_options(progress))?;
            uploaded(&bucket, &key, url)
        }
        Command::Cat { bucket, key } => {
            match client.get_lines(&bucket, &key, transfer_options(progress))? {
                Some(lines) => {
                    write_lines(&lines)?;
                    Ok(json!({ "bucket": bucket, "key": key, "lines": lines.len() }))
                }
                None => Err(CliError::operation_failed(format!("{}/{} could not be read", bucket, key))),
            }
        }
        Command::Get { bucket, key, path } => {
            if client.get_to_file(&bucket, &key, &path, transfer_options(progress))? {
                Ok(json!({ "bucket": bucket, "key": key, "path": path.display().to_string() }))
            } else {
                Err(CliError::operation_failed(format!(
                    "{}/{} could not be downloaded",
                    bucket, key
                )))
            }
        }
        Command::Rm { bucket, key } => {
            client.delete(&bucket, &key)?;
            Ok(json!({ "bucket": bucket, "key": key }))
        }
        Command::Exists { bucket, key } => {
            let exists = client.exists(&bucket, &key)?;
            Ok(json!({ "bucket": bucket, "key": key, "exists": exists }))
        }
        Command::Url { bucket, key } => {
            let url = client.generate_url(&bucket, &key)?;
            Ok(json!({ "bucket": bucket, "key": key, "url": url }))
        }
        Command::Mb { bucket } => {
            client.create_bucket_if_absent(&bucket)?;
            Ok(json!({ "bucket": bucket }))
        }
        Command::Ls => Ok(serde_json::to_value(client.list_buckets()?)?),
        Command::Info { bucket } => match client.bucket_info(&bucket)? {
            Some(info) => Ok(serde_json::to_value(info)?),
            None => Err(CliError::operation_failed(format!("bucket {} could not be described", bucket))),
        },
        Command::Rb { bucket } => {
            client.delete_bucket(&bucket)?;
            Ok(json!({ "bucket": bucket }))
        }
    }
}
