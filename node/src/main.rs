// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # sovid Node
//!
//! Entry point for the `sovid-node` binary. Parses CLI arguments,
//! initializes logging, opens the sled identity database and runs a single
//! contract call against it.
//!
//! Every state-changing call executes inside an [`Overlay`]: its writes reach
//! the database only when the call returns `Ok`, and the events it emitted are
//! printed to stdout as JSON lines.
//!
//! The binary supports these subcommands:
//!
//! - `keygen`        — generate an Ed25519 keypair
//! - `gen-did`       — mint a fresh DID
//! - `register`      — register an identity with its first key
//! - `add-attribute` — add one attribute signed by an owner key
//! - `invoke`        — run any contract method from a raw hex request
//! - `document`      — print an identity's DID document
//! - `version`       — print build version information

mod cli;
mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;

use sovid_contracts::{Attribute, IdentityConfig, IdentityRegistry, IdentityResult};
use sovid_protocol::crypto::Keypair;
use sovid_protocol::host::{Event, NativeContext, SignedAddresses};
use sovid_protocol::identity::Did;
use sovid_protocol::storage::{KvStore, Overlay, SledStore};

use cli::{Commands, SovidNodeCli};

fn main() -> Result<()> {
    let cli = SovidNodeCli::parse();
    logging::init_logging(logging::DEFAULT_FILTER, cli.log_format);

    let registry = IdentityRegistry::new(IdentityConfig {
        did_method: cli.did_method.clone(),
        ..IdentityConfig::default()
    });

    match cli.command {
        Commands::Keygen => keygen(),
        Commands::GenDid => {
            println!("{}", Did::generate(&cli.did_method));
            Ok(())
        }
        Commands::Register(args) => register(&registry, &cli.data_dir, args),
        Commands::AddAttribute(args) => add_attribute(&registry, &cli.data_dir, args),
        Commands::Invoke(args) => invoke(&registry, &cli.data_dir, args),
        Commands::Document(args) => document(&registry, &cli.data_dir, args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Generates a keypair and prints its public key, secret key and address.
fn keygen() -> Result<()> {
    let keypair = Keypair::generate();
    println!("public key : {}", keypair.public_key_hex());
    println!("secret key : {}", keypair.secret_key_hex());
    println!("address    : {}", keypair.address().to_hex());
    Ok(())
}

fn register(registry: &IdentityRegistry, data_dir: &Path, args: cli::RegisterArgs) -> Result<()> {
    let keypair = load_keypair(&args.secret_key)?;
    let did = match args.did {
        Some(did) => did,
        None => Did::generate(&registry.config().did_method).to_string(),
    };

    let mut store = open_store(data_dir)?;
    let witness = SignedAddresses::from_public_keys([keypair.public_key_bytes()]);
    let public_key = keypair.public_key_bytes();
    execute(&mut store, &witness, |ctx| {
        registry.register(ctx, did.as_bytes(), &public_key)
    })?;

    println!("{did}");
    Ok(())
}

fn add_attribute(
    registry: &IdentityRegistry,
    data_dir: &Path,
    args: cli::AddAttributeArgs,
) -> Result<()> {
    let keypair = load_keypair(&args.secret_key)?;
    let attribute = Attribute::new(args.key, args.value_type, args.value);

    let mut store = open_store(data_dir)?;
    let witness = SignedAddresses::from_public_keys([keypair.public_key_bytes()]);
    execute(&mut store, &witness, |ctx| {
        registry.add_attributes(ctx, args.did.as_bytes(), &[attribute], args.index)
    })?;
    Ok(())
}

/// Runs a raw dispatcher call. JSON results are pretty-printed; anything
/// else is printed as hex.
fn invoke(registry: &IdentityRegistry, data_dir: &Path, args: cli::InvokeArgs) -> Result<()> {
    let input = hex::decode(args.input.trim()).context("request is not valid hex")?;
    let keys = args
        .signers
        .iter()
        .map(|s| load_keypair(s))
        .collect::<Result<Vec<_>>>()?;

    let mut store = open_store(data_dir)?;
    let witness = SignedAddresses::from_public_keys(keys.iter().map(Keypair::public_key_bytes));
    let output = execute(&mut store, &witness, |ctx| {
        registry.invoke(ctx, &args.method, &input)
    })?;

    match serde_json::from_slice::<serde_json::Value>(&output) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", hex::encode(&output)),
    }
    Ok(())
}

fn document(registry: &IdentityRegistry, data_dir: &Path, args: cli::DocumentArgs) -> Result<()> {
    let mut store = open_store(data_dir)?;
    let witness = SignedAddresses::new();
    let mut events: Vec<Event> = Vec::new();
    let ctx = NativeContext::new(&mut store, &witness, &mut events);

    let doc = registry
        .get_document(&ctx, args.did.as_bytes())
        .with_context(|| format!("failed to load document for {}", args.did))?;
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}

/// Runs one contract call in an overlay over `store`. Writes are committed
/// and flushed only when the call succeeds; emitted events are printed.
fn execute<T>(
    store: &mut SledStore,
    witness: &SignedAddresses,
    call: impl FnOnce(&mut NativeContext<'_>) -> IdentityResult<T>,
) -> Result<T> {
    let mut events: Vec<Event> = Vec::new();
    let mut overlay = Overlay::new(&*store);
    let result = {
        let mut ctx = NativeContext::new(&mut overlay, witness, &mut events);
        call(&mut ctx)
    };

    let value = match result {
        Ok(value) => value,
        Err(e) => {
            overlay.discard();
            tracing::warn!(error = %e, "call rejected, nothing committed");
            return Err(e.into());
        }
    };

    let changes = overlay.into_changes();
    let written = changes.len();
    store.apply(changes).context("failed to commit call")?;
    store.flush().context("failed to flush database")?;
    tracing::info!(writes = written, events = events.len(), "call committed");

    for event in &events {
        println!("{}", serde_json::to_string(event)?);
    }
    Ok(value)
}

fn open_store(data_dir: &Path) -> Result<SledStore> {
    let db_path = data_dir.join("db");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create database directory: {}", db_path.display()))?;
    let store = SledStore::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    tracing::debug!(path = %db_path.display(), "database opened");
    Ok(store)
}

fn load_keypair(secret_hex: &str) -> Result<Keypair> {
    Keypair::from_hex(secret_hex).context("invalid secret key")
}

/// Prints version information to stdout.
fn print_version() {
    println!("sovid-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol   {}", sovid_protocol::config::PROTOCOL_VERSION);
}
