use anyhow::Context;
use clap::{Parser, Subcommand};
use post_curator::{
    config::Config,
    models::{Item, Topic},
    pipeline::CuratorService,
    state::create_stores,
};
use reqwest::Client;
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Operator CLI: runs single passes against the persisted store.
///
/// The sled database is opened exclusively, so stop the daemon first.
#[derive(Parser)]
#[command(name = "post-curator-cli")]
#[command(about = "Post curator operator CLI", long_about = None)]
struct Cli {
    /// Daemon endpoint, used by `health`
    #[arg(short, long, default_value = "http://localhost:8080")]
    endpoint: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List topics with their patterns and action chains
    Topics,

    /// Store a topic read from a JSON file
    ImportTopic {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Store crawled items read from a JSON array file
    ImportItems {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Train a topic's enabled pattern, or a specific one
    Train {
        #[arg(value_name = "TOPIC_ID")]
        topic_id: Uuid,

        #[arg(short, long)]
        pattern: Option<Uuid>,
    },

    /// Classify unclassified items of a topic
    Classify {
        #[arg(value_name = "TOPIC_ID")]
        topic_id: Uuid,
    },

    /// Run one action pass for a topic
    RunActions {
        #[arg(value_name = "TOPIC_ID")]
        topic_id: Uuid,
    },

    /// Show an item's pipeline record
    ShowItem {
        #[arg(value_name = "TOPIC_ID")]
        topic_id: Uuid,

        #[arg(value_name = "ITEM_ID")]
        item_id: String,
    },

    /// Override an item's classification and keep it as a training label
    Correct {
        #[arg(value_name = "TOPIC_ID")]
        topic_id: Uuid,

        #[arg(value_name = "ITEM_ID")]
        item_id: String,

        /// Label the item as selected (accept); rejected otherwise
        #[arg(long)]
        selected: bool,
    },

    /// Print signed accept/reject links for an item at an action index
    Token {
        #[arg(value_name = "TOPIC_ID")]
        topic_id: Uuid,

        #[arg(value_name = "ITEM_ID")]
        item_id: String,

        #[arg(short, long, default_value = "0")]
        action_index: usize,
    },

    /// Check daemon health
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "post_curator=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Health = cli.command {
        let response = Client::new()
            .get(format!("{}/health", cli.endpoint))
            .send()
            .await?;
        let body: serde_json::Value = response.json().await?;
        return print_json(&body);
    }

    let config = Config::load_validated().context("Failed to load configuration")?;
    let stores = create_stores(&config.state)?;
    let service = CuratorService::new(stores, &config)?;

    match cli.command {
        Commands::Topics => print_json(&service.list_topics().await?),
        Commands::ImportTopic { file } => {
            let topic: Topic = read_json(&file)?;
            service.stores().topics.save_topic(&topic).await?;
            println!("Imported topic {} ({})", topic.name, topic.id);
            Ok(())
        }
        Commands::ImportItems { file } => {
            let items: Vec<Item> = read_json(&file)?;
            for item in &items {
                service.stores().items.save_item(item).await?;
            }
            println!("Imported {} items", items.len());
            Ok(())
        }
        Commands::Train { topic_id, pattern } => {
            let result = match pattern {
                Some(pattern_id) => service.train_pattern(&topic_id, &pattern_id).await?,
                None => service.train_topic(&topic_id).await?,
            };
            print_json(&result)
        }
        Commands::Classify { topic_id } => print_json(&service.classify_topic(&topic_id).await?),
        Commands::RunActions { topic_id } => print_json(&service.run_actions(&topic_id).await?),
        Commands::ShowItem { topic_id, item_id } => {
            print_json(&service.get_item(&topic_id, &item_id).await?)
        }
        Commands::Correct {
            topic_id,
            item_id,
            selected,
        } => print_json(
            &service
                .correct_classification(&topic_id, &item_id, selected)
                .await?,
        ),
        Commands::Token {
            topic_id,
            item_id,
            action_index,
        } => {
            let token = service.signer().sign(&topic_id, action_index, &item_id);
            let base = format!(
                "{}/topics/{}/tweets/{}",
                config.server.public_base_url.trim_end_matches('/'),
                topic_id,
                item_id
            );
            println!("token:  {}", token);
            println!("accept: {}/accept?token={}", base, token);
            println!("reject: {}/reject?token={}", base, token);
            Ok(())
        }
        Commands::Health => Ok(()),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &PathBuf) -> anyhow::Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
