//! Formkit storage inspector
//!
//! Read-only CLI for looking at a bucket laid out by `formkit-persistence`
//! on the local filesystem.
//!
//! # Usage
//!
//! ```bash
//! # Pages of a guild with their current versions
//! formkit-inspect --root ./bucket entities guild-001
//!
//! # Version history of one schema
//! formkit-inspect --root ./bucket --prefix prod versions guild-001 form-1 --family schemas
//!
//! # Pending responses, first 20
//! formkit-inspect --root ./bucket responses guild-001 form-1 --status pending --limit 20
//! ```
//!
//! # Environment Variables
//!
//! - `FORMKIT_BUCKET_ROOT` - Bucket root directory
//! - `FORMKIT_PATH_PREFIX` - Deployment path prefix (default: none)

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use formkit_persistence::responses::{ListOptions, ResponseStatus};
use formkit_persistence::{FormStorage, ObjectStoreBucket, ObjectStoreConfig, StorageConfig};

#[derive(Debug, Parser)]
#[command(name = "formkit-inspect", version, about = "Inspect form storage buckets")]
struct Cli {
    /// Bucket root directory.
    #[arg(long, env = "FORMKIT_BUCKET_ROOT")]
    root: PathBuf,

    /// Deployment path prefix.
    #[arg(long, env = "FORMKIT_PATH_PREFIX", default_value = "")]
    prefix: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Family {
    Content,
    Schemas,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List resources of a guild with their current versions.
    Entities {
        guild_id: String,
        #[arg(long, value_enum, default_value = "content")]
        family: Family,
    },
    /// List the versions of one resource.
    Versions {
        guild_id: String,
        resource_id: String,
        #[arg(long, value_enum, default_value = "content")]
        family: Family,
    },
    /// Print the current version of one resource.
    Current {
        guild_id: String,
        resource_id: String,
        #[arg(long, value_enum, default_value = "content")]
        family: Family,
    },
    /// List responses of a form.
    Responses {
        guild_id: String,
        form_id: String,
        #[arg(long)]
        status: Option<ResponseStatus>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Count responses of a form.
    Count {
        guild_id: String,
        form_id: String,
        #[arg(long)]
        status: Option<ResponseStatus>,
    },
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,formkit_persistence=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let bucket = ObjectStoreBucket::from_config(&ObjectStoreConfig::Local {
        root: cli.root.clone(),
    })
    .with_context(|| format!("failed to open bucket at {}", cli.root.display()))?;
    let storage = FormStorage::new(Arc::new(bucket), StorageConfig::new(&cli.prefix))?;

    tracing::debug!(root = %cli.root.display(), prefix = %cli.prefix, "inspecting");

    match cli.command {
        Command::Entities { guild_id, family } => {
            let entities = match family {
                Family::Content => storage.content().list_entities(&guild_id).await?,
                Family::Schemas => storage.schemas().list_entities(&guild_id).await?,
            };
            print_json(&entities)?;
        }
        Command::Versions {
            guild_id,
            resource_id,
            family,
        } => {
            let versions = match family {
                Family::Content => {
                    storage
                        .content()
                        .list_versions(&guild_id, &resource_id)
                        .await?
                }
                Family::Schemas => {
                    storage
                        .schemas()
                        .list_versions(&guild_id, &resource_id)
                        .await?
                }
            };
            print_json(&versions)?;
        }
        Command::Current {
            guild_id,
            resource_id,
            family,
        } => match family {
            Family::Content => {
                let record = storage
                    .content()
                    .get_current(&guild_id, &resource_id)
                    .await?;
                print_json(&json!({"metadata": record.metadata, "payload": record.payload}))?;
            }
            Family::Schemas => {
                let record = storage
                    .schemas()
                    .get_current(&guild_id, &resource_id)
                    .await?;
                print_json(&json!({"metadata": record.metadata, "payload": record.payload}))?;
            }
        },
        Command::Responses {
            guild_id,
            form_id,
            status,
            limit,
        } => {
            let page = storage
                .responses()
                .list(&guild_id, &form_id, ListOptions { status, limit })
                .await?;
            print_json(&page)?;
        }
        Command::Count {
            guild_id,
            form_id,
            status,
        } => {
            let count = storage.responses().count(&guild_id, &form_id, status).await?;
            println!("{count}");
        }
    }

    Ok(())
}
