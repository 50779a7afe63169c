//! `lacuna keys` - credential pool management

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use comfy_table::{presets::UTF8_FULL_CONDENSED, Table};

use lacuna_cache::CacheStore;
use lacuna_core::model::SourceTag;

use crate::config::Config;

#[derive(Args)]
pub struct KeysArgs {
    #[command(subcommand)]
    command: KeysCommand,
}

#[derive(Subcommand)]
enum KeysCommand {
    /// List registered API keys
    List,
    /// Register an API key and authorise an auth key to spend it
    Add {
        /// Source this key belongs to (SCOPUS, DIMENSIONS, WOS, PUBMED, S2)
        #[arg(long)]
        wrapper: String,

        /// The provider API key
        #[arg(long)]
        key: String,

        #[arg(long)]
        owner: Option<String>,

        /// Outbound proxy to use with this key
        #[arg(long)]
        proxy: Option<String>,

        /// Existing auth key to link; a new one is created when omitted
        #[arg(long)]
        auth_key: Option<String>,
    },
}

pub fn run(args: KeysArgs, config: &Config) -> Result<()> {
    let store = CacheStore::open(&config.cache.db_path)?;

    match args.command {
        KeysCommand::List => {
            let mut table = Table::new();
            table.load_preset(UTF8_FULL_CONDENSED);
            table.set_header(["Key id", "Source", "Owner", "Active", "Last used"]);
            for key in store.list_api_keys()? {
                table.add_row([
                    key.api_key_id,
                    key.wrapper.map(|w| w.to_string()).unwrap_or_default(),
                    key.owner.unwrap_or_default(),
                    key.active.to_string(),
                    key.last_used
                        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_else(|| "never".to_string()),
                ]);
            }
            println!("{table}");
        }
        KeysCommand::Add {
            wrapper,
            key,
            owner,
            proxy,
            auth_key,
        } => {
            let wrapper = SourceTag::from_name(&wrapper)
                .with_context(|| format!("unknown source: {wrapper}"))?;
            let api_key_id =
                store.insert_api_key(owner.as_deref(), wrapper, &key, proxy.as_deref())?;

            let auth_key_id = match auth_key {
                Some(id) => id,
                None => {
                    let id = store.insert_auth_key(&format!("created with {wrapper} key"))?;
                    println!("created auth key: {id}");
                    id
                }
            };
            store.link_keys(&auth_key_id, &api_key_id)?;
            println!("registered {wrapper} key: {api_key_id}");
        }
    }
    Ok(())
}
