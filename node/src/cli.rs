//! # CLI Interface
//!
//! Defines the command-line argument structure for `sovid-node` using
//! `clap` derive. Global options select the data directory, log format and
//! DID method; subcommands each run at most one contract call.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::logging::LogFormat;

/// sovid identity node.
///
/// A reference host for the sovid identity contract. Keeps identity state
/// in a local sled database and runs one contract call per invocation,
/// committing its writes only when the call succeeds.
#[derive(Parser, Debug)]
#[command(
    name = "sovid-node",
    about = "sovid identity contract host",
    version,
    propagate_version = true
)]
pub struct SovidNodeCli {
    /// Path to the node data directory holding the identity database.
    #[arg(
        long,
        short = 'd',
        env = "SOVID_DATA_DIR",
        default_value = ".sovid",
        global = true
    )]
    pub data_dir: PathBuf,

    /// Log output format: `pretty` or `json`.
    #[arg(
        long,
        env = "SOVID_LOG_FORMAT",
        value_enum,
        default_value_t = LogFormat::Pretty,
        global = true
    )]
    pub log_format: LogFormat,

    /// DID method accepted by the contract.
    #[arg(
        long,
        env = "SOVID_DID_METHOD",
        default_value = sovid_protocol::config::DID_METHOD,
        global = true
    )]
    pub did_method: String,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the sovid node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate an Ed25519 keypair and print it.
    Keygen,
    /// Mint a fresh DID from a random nonce.
    GenDid,
    /// Register an identity owned by the given key.
    Register(RegisterArgs),
    /// Add or replace one attribute, signed by an owner key.
    AddAttribute(AddAttributeArgs),
    /// Run any contract method with a raw hex-encoded request.
    Invoke(InvokeArgs),
    /// Print the DID document of an identity.
    Document(DocumentArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `register` subcommand.
#[derive(Args, Debug)]
pub struct RegisterArgs {
    /// Identity to register. A fresh DID is minted when omitted.
    #[arg(long)]
    pub did: Option<String>,

    /// Hex-encoded Ed25519 secret key of the first public key. The call is
    /// signed with it.
    #[arg(long, env = "SOVID_SECRET_KEY")]
    pub secret_key: String,
}

/// Arguments for the `add-attribute` subcommand.
#[derive(Args, Debug)]
pub struct AddAttributeArgs {
    /// Identity to update.
    #[arg(long)]
    pub did: String,

    /// Hex-encoded secret key of the signing owner key.
    #[arg(long, env = "SOVID_SECRET_KEY")]
    pub secret_key: String,

    /// Index of the signing key on the identity.
    #[arg(long, default_value_t = 1)]
    pub index: u32,

    /// Attribute key.
    #[arg(long)]
    pub key: String,

    /// Attribute value type, e.g. `string`.
    #[arg(long = "type", default_value = "string")]
    pub value_type: String,

    /// Attribute value.
    #[arg(long)]
    pub value: String,
}

/// Arguments for the `invoke` subcommand.
#[derive(Args, Debug)]
pub struct InvokeArgs {
    /// Contract method name, e.g. `addKey` or `getDocument`.
    pub method: String,

    /// Hex-encoded request bytes.
    #[arg(default_value = "")]
    pub input: String,

    /// Hex-encoded secret key that signs the call. Repeat for several
    /// signers.
    #[arg(long = "signer")]
    pub signers: Vec<String>,
}

/// Arguments for the `document` subcommand.
#[derive(Args, Debug)]
pub struct DocumentArgs {
    /// Identity to render.
    pub did: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        SovidNodeCli::command().debug_assert();
    }

    #[test]
    fn parses_invoke_with_signers() {
        let cli = SovidNodeCli::try_parse_from([
            "sovid-node",
            "--log-format",
            "json",
            "invoke",
            "getDocument",
            "0a",
            "--signer",
            "aa",
            "--signer",
            "bb",
        ])
        .unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
        match cli.command {
            Commands::Invoke(args) => {
                assert_eq!(args.method, "getDocument");
                assert_eq!(args.input, "0a");
                assert_eq!(args.signers, vec!["aa", "bb"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
