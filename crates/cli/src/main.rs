use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::json;
use taskdb_db::{inspect, MongoStore};
use taskdb_kernel::settings::{ExistingPolicy, Settings};
use taskdb_kernel::ModuleRegistry;

/// Provision and check the task manager database.
#[derive(Debug, Parser)]
#[command(name = "taskdb", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create collections, validators, and indexes
    Init {
        /// Leave existing collections and indexes in place instead of failing
        #[arg(long)]
        skip_existing: bool,
        /// Insert the admin account (requires seed.admin_password)
        #[arg(long)]
        seed: bool,
    },
    /// Report declared collections and indexes missing from or differing in the database
    Verify,
    /// Print the declared validators and indexes as JSON
    Schema {
        /// Only print this collection
        #[arg(long)]
        collection: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load().with_context(|| "failed to load taskdb settings")?;
    taskdb_telemetry::init(&settings.telemetry)?;

    match cli.command {
        Command::Init {
            skip_existing,
            seed,
        } => {
            if skip_existing {
                settings.database.on_existing = ExistingPolicy::Skip;
            }
            if seed {
                settings.seed.enabled = true;
            }

            let report = taskdb_app::run(&settings).await?;
            println!("{}", report.completion_message());
        }
        Command::Verify => {
            let registry = taskdb_app::registry()?;
            let store = MongoStore::connect(&settings.database)
                .await
                .with_context(|| {
                    format!("failed to connect for database '{}'", settings.database.name)
                })?;
            let inspection = inspect(&store, &registry).await;
            store.shutdown().await;
            let inspection = inspection?;

            for collection in &inspection.missing_collections {
                println!("missing collection: {}", collection);
            }
            for collection in &inspection.unvalidated_collections {
                println!("collection without validator: {}", collection);
            }
            for index in &inspection.missing_indexes {
                println!("missing index: {}", index);
            }
            for index in &inspection.mismatched_indexes {
                println!("index definition differs: {}", index);
            }
            if !inspection.is_complete() {
                bail!("database '{}' is not fully provisioned", inspection.database);
            }
            println!("database '{}' is fully provisioned", inspection.database);
        }
        Command::Schema { collection } => {
            let registry = taskdb_app::registry()?;
            let document = render_schema(&registry, collection.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&document)?);
        }
    }

    Ok(())
}

fn render_schema(
    registry: &ModuleRegistry,
    only: Option<&str>,
) -> anyhow::Result<serde_json::Value> {
    if let Some(name) = only {
        if registry.get_module(name).is_none() {
            bail!(
                "unknown collection '{}'; expected one of {:?}",
                name,
                registry.collection_names()
            );
        }
    }

    let collections: Vec<serde_json::Value> = registry
        .modules()
        .iter()
        .filter(|module| only.map_or(true, |name| module.name() == name))
        .map(|module| {
            let indexes: Vec<serde_json::Value> = module
                .indexes()
                .iter()
                .map(|index| {
                    json!({
                        "name": index.name(),
                        "keys": index.to_keys_json(),
                        "unique": index.is_unique(),
                    })
                })
                .collect();

            json!({
                "name": module.name(),
                "validator": module.validator().map(|validator| validator.to_json_schema()),
                "indexes": indexes,
            })
        })
        .collect();

    Ok(json!({ "collections": collections }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn init_flags_parse() {
        let cli = Cli::try_parse_from(["taskdb", "init", "--skip-existing", "--seed"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Init {
                skip_existing: true,
                seed: true
            }
        ));
    }

    #[test]
    fn schema_for_single_collection() {
        let registry = taskdb_app::registry().unwrap();
        let document = render_schema(&registry, Some("categories")).unwrap();

        let collections = document["collections"].as_array().unwrap();
        assert_eq!(collections.len(), 1);
        assert_eq!(collections[0]["name"], "categories");
        assert!(collections[0]["validator"].is_null());
        assert_eq!(collections[0]["indexes"][0]["name"], "user_id_1");
    }

    #[test]
    fn schema_rejects_unknown_collection() {
        let registry = taskdb_app::registry().unwrap();
        let err = render_schema(&registry, Some("projects")).unwrap_err();
        assert!(err.to_string().contains("unknown collection 'projects'"));
    }
}
