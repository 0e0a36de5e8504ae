use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use hamt_container::{
    display_key, Container, ContainerBuilder, ContainerError, ContainerResult, EntryWriter,
    ExtraWrite, Storage, Value,
};
use hamt_store::FsStorage;
use hamt_types::ContentAddress;
use serde_json::json;
use tracing::debug;

use crate::cli::*;
use crate::config::CliConfig;

/// Open block store and settings shared by every subcommand.
struct Session {
    storage: Arc<dyn Storage>,
    config: CliConfig,
}

impl Session {
    fn open(config: CliConfig, store_flag: Option<PathBuf>) -> anyhow::Result<Self> {
        let dir = config.store_dir(store_flag);
        let storage = FsStorage::open(&dir)
            .with_context(|| format!("opening block store {}", dir.display()))?;
        debug!(store = %dir.display(), "block store opened");
        Ok(Self {
            storage: Arc::new(storage),
            config,
        })
    }

    fn load(&self, address: &str) -> anyhow::Result<Container> {
        let address = parse_address(address)?;
        ContainerBuilder::new()
            .storage(Arc::clone(&self.storage))
            .from_address(address)
            .build()
            .with_context(|| format!("loading container {address}"))
    }
}

/// A value rendered for output.
#[derive(Debug, PartialEq)]
enum Shown {
    Text(String),
    Bytes(Vec<u8>),
    Link(ContentAddress),
}

impl Shown {
    fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Link(_) => "link",
        }
    }

    fn render(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Bytes(b) => display_key(b),
            Self::Link(address) => address.to_hex(),
        }
    }
}

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = CliConfig::load(cli.config.as_deref())?;
    let format = cli.format;
    if let Command::Version = cli.command {
        return cmd_version(format);
    }
    let session = Session::open(config, cli.store)?;
    match cli.command {
        Command::Version => cmd_version(format),
        Command::New(args) => cmd_new(&session, args, format),
        Command::Set(args) => cmd_set(&session, args, format),
        Command::Get(args) => cmd_get(&session, args, format),
        Command::List(args) => cmd_list(&session, args, format),
        Command::Link(args) => cmd_link(&session, args, format),
    }
}

fn cmd_version(format: OutputFormat) -> anyhow::Result<()> {
    let version = env!("CARGO_PKG_VERSION");
    match format {
        OutputFormat::Text => println!("hamtcli {} -- HAMT container tool", version.bold()),
        OutputFormat::Json => println!("{}", json!({ "name": "hamtcli", "version": version })),
    }
    Ok(())
}

fn print_link(identity: &[u8], address: &ContentAddress, format: OutputFormat) {
    match format {
        OutputFormat::Text => println!(
            "{} HAMT {} link {}",
            "✓".green().bold(),
            display_key(identity).bold(),
            address.to_hex().cyan()
        ),
        OutputFormat::Json => println!(
            "{}",
            json!({ "identity": display_key(identity), "address": address.to_hex() })
        ),
    }
}

fn parse_address(s: &str) -> anyhow::Result<ContentAddress> {
    s.parse()
        .with_context(|| format!("invalid content address {s:?}"))
}

fn create(session: &Session, identity: Option<String>) -> anyhow::Result<Container> {
    let identity = identity.unwrap_or_else(|| session.config.default_identity.clone());
    let container = ContainerBuilder::new()
        .identity(identity)
        .storage(Arc::clone(&session.storage))
        .trie_params(session.config.trie)
        .build()?;
    container.commit()?;
    Ok(container)
}

fn cmd_new(session: &Session, args: NewArgs, format: OutputFormat) -> anyhow::Result<()> {
    let container = create(session, args.identity)?;
    print_link(&container.identity(), &container.content_address()?, format);
    Ok(())
}

fn set_pairs(session: &Session, address: &str, pairs: &[String]) -> anyhow::Result<Container> {
    if pairs.len() % 2 != 0 {
        bail!("keys and values must come in pairs, got {} arguments", pairs.len());
    }
    let container = session.load(address)?;
    let write: ExtraWrite<'_> = Box::new(|w: &mut EntryWriter<'_>| -> ContainerResult<()> {
        for pair in pairs.chunks_exact(2) {
            w.set(pair[0].as_bytes(), pair[1].as_bytes())?;
        }
        Ok(())
    });
    container.commit_with(vec![write])?;
    Ok(container)
}

fn cmd_set(session: &Session, args: SetArgs, format: OutputFormat) -> anyhow::Result<()> {
    let container = set_pairs(session, &args.address, &args.pairs)?;
    print_link(&container.identity(), &container.content_address()?, format);
    Ok(())
}

/// Text first, then bytes, then link: each fallback only on a kind mismatch.
fn lookup(container: &Container, key: &str) -> anyhow::Result<Shown> {
    let shown = match container.get_as_text(key) {
        Ok(s) => Shown::Text(s),
        Err(e) if e.is_kind_mismatch() => match container.get_as_bytes(key) {
            Ok(b) => Shown::Bytes(b),
            Err(e) if e.is_kind_mismatch() => Shown::Link(container.get_as_link(key)?),
            Err(e) => return Err(e.into()),
        },
        Err(e) => return Err(e).with_context(|| format!("key {key:?}")),
    };
    Ok(shown)
}

fn cmd_get(session: &Session, args: GetArgs, format: OutputFormat) -> anyhow::Result<()> {
    let container = session.load(&args.address)?;
    let shown = lookup(&container, &args.key)?;
    match format {
        OutputFormat::Text => println!(
            "HAMT {} result {}",
            display_key(&container.identity()).bold(),
            shown.render()
        ),
        OutputFormat::Json => println!(
            "{}",
            json!({ "key": args.key, "kind": shown.kind(), "value": shown.render() })
        ),
    }
    Ok(())
}

fn entries(container: &Container) -> anyhow::Result<Vec<(String, Shown)>> {
    let mut rows = Vec::new();
    container.view(|key, value| {
        let shown = match value {
            Value::Text(s) => Shown::Text(s),
            Value::Bytes(b) => Shown::Bytes(b),
            Value::Link(address) => Shown::Link(address),
            other => {
                return Err(ContainerError::UnsupportedValueKind(other.kind().to_string()))
            }
        };
        rows.push((display_key(key), shown));
        Ok(())
    })?;
    Ok(rows)
}

fn cmd_list(session: &Session, args: ListArgs, format: OutputFormat) -> anyhow::Result<()> {
    let container = session.load(&args.address)?;
    let rows = entries(&container)?;
    match format {
        OutputFormat::Text => {
            if rows.is_empty() {
                println!("No entries.");
            }
            for (key, shown) in &rows {
                let kind = match shown {
                    Shown::Link(_) => shown.kind().blue(),
                    _ => shown.kind().green(),
                };
                println!("key {} {} {}", key.yellow(), kind, shown.render());
            }
        }
        OutputFormat::Json => {
            let rows: Vec<_> = rows
                .iter()
                .map(|(key, shown)| json!({ "key": key, "kind": shown.kind(), "value": shown.render() }))
                .collect();
            println!("{}", serde_json::Value::Array(rows));
        }
    }
    Ok(())
}

fn link(session: &Session, parent: &str, child: &str) -> anyhow::Result<Container> {
    let parent = session.load(parent)?;
    let child = Arc::new(session.load(child)?);
    parent.stage(child.identity(), &child)?;
    parent.commit()?;
    Ok(parent)
}

fn cmd_link(session: &Session, args: LinkArgs, format: OutputFormat) -> anyhow::Result<()> {
    let parent = link(session, &args.parent, &args.child)?;
    print_link(&parent.identity(), &parent.content_address()?, format);
    Ok(())
}
