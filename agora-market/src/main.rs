//! Command-line client for the agora marketplace.
//!
//! # Usage
//!
//! ```bash
//! # Encode a registration call without sending it
//! agora calldata register --uri ipfs://QmAgent
//!
//! # Register an agent with the configured wallet
//! AGORA_PRIVATE_KEY=0x... agora register --name "Harbor Plumbing" --service plumbing
//!
//! # Fetch a resource, paying if the server asks for it
//! agora fetch https://api.agora.example/api/premium
//!
//! # Configure logging level
//! RUST_LOG=debug agora agents
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` - Path to the TOML configuration file (default: `agora.toml`)
//! - `AGORA_BACKEND_URL` - Overrides the configured backend URL
//! - `RUST_LOG` - Log level filter (default: `info`)

#![allow(clippy::print_stdout)]

use std::error::Error;
use std::str::FromStr;
use std::sync::Arc;

use agora::abi::{Calldata, Selector, parse_signature};
use agora::chain::parse_caip2;
use agora::eip712::TypedDataSigner;
use agora::wallet::{TransactionResult, WalletTransport};
use agora_evm::calls::{FeedbackCall, register_call};
use agora_evm::{LocalWallet, evm_registry};
use agora_http::backend::{AgentMetadata, BackendClient, FeedbackMetadata};
use agora_http::registry::{RegistryClient, RegistryRead};
use agora_http::transport::{ReqwestTransport, ResourceRequest};
use agora_http::wallet::JsonRpcWallet;
use agora_http::PaymentClient;
use agora_market::config::MarketConfig;
use agora_market::flows::{BookingFlow, FeedbackFlow, OrderRequest, RegistrationFlow};
use alloy_primitives::{Address, B256, Bytes, U256};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use url::Url;

type SharedWallet = Arc<dyn WalletTransport>;
type CliPaymentClient = PaymentClient<ReqwestTransport, TypedDataSigner<SharedWallet>>;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Configuration file.
    #[arg(long, env = "CONFIG", default_value = "agora.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Encode a registry call and print it.
    #[command(subcommand)]
    Calldata(CalldataCommand),
    /// Decode calldata against a signature.
    Decode {
        /// Canonical signature, e.g. `register(string)`.
        #[arg(long)]
        signature: String,
        /// Hex calldata including the selector.
        data: String,
    },
    /// Fetch a resource, paying if required.
    Fetch {
        url: Url,
        /// JSON body; sends a POST when given.
        #[arg(long)]
        data: Option<String>,
    },
    /// Register an agent on the identity registry.
    Register {
        #[command(flatten)]
        agent: AgentArgs,
    },
    /// Leave feedback on the reputation registry.
    Feedback {
        #[command(flatten)]
        feedback: FeedbackArgs,
        /// Reviewer's comment.
        #[arg(long)]
        comment: Option<String>,
    },
    /// Book a service.
    Book {
        #[arg(long)]
        service_id: String,
        #[arg(long)]
        demand_id: Option<String>,
        #[arg(long)]
        scheduled_for: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// List agents, or show one.
    Agents {
        /// Show this agent only.
        #[arg(long)]
        id: Option<u64>,
        /// Include the reputation summary. Requires `--id`.
        #[arg(long, requires = "id")]
        reputation: bool,
    },
}

#[derive(Subcommand, Debug)]
enum CalldataCommand {
    /// `register(agentURI)`.
    Register {
        #[arg(long)]
        uri: String,
        /// Identity registry; defaults to the configured one.
        #[arg(long)]
        registry: Option<Address>,
    },
    /// `giveFeedback(...)`.
    Feedback {
        #[command(flatten)]
        feedback: FeedbackArgs,
        #[arg(long)]
        uri: String,
        /// 32-byte hex content hash.
        #[arg(long)]
        hash: String,
        /// Reputation registry; defaults to the configured one.
        #[arg(long)]
        registry: Option<Address>,
    },
}

#[derive(clap::Args, Debug)]
struct AgentArgs {
    #[arg(long)]
    name: String,
    #[arg(long, default_value = "")]
    description: String,
    /// Service category; repeatable.
    #[arg(long = "service")]
    services: Vec<String>,
    #[arg(long)]
    endpoint: Option<String>,
    #[arg(long)]
    image: Option<String>,
}

#[derive(clap::Args, Debug)]
struct FeedbackArgs {
    #[arg(long)]
    agent_id: u64,
    /// Signed fixed-point score.
    #[arg(long, allow_hyphen_values = true)]
    value: i128,
    #[arg(long, default_value_t = 0)]
    decimals: u8,
    #[arg(long, default_value = "")]
    tag1: String,
    #[arg(long, default_value = "")]
    tag2: String,
    #[arg(long, default_value = "")]
    endpoint: String,
}

impl FeedbackArgs {
    fn into_metadata(self, comment: Option<String>) -> FeedbackMetadata {
        FeedbackMetadata {
            agent_id: U256::from(self.agent_id),
            value: self.value,
            value_decimals: self.decimals,
            tag1: self.tag1,
            tag2: self.tag2,
            endpoint: self.endpoint,
            comment,
        }
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run(Cli::parse()).await {
        tracing::error!("agora failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = MarketConfig::load_from(&cli.config)?;
    tracing::debug!(
        backend_url = %config.backend_url,
        identity_chain = config.identity.chain_id,
        "Loaded configuration"
    );

    match cli.command {
        Command::Calldata(command) => encode_calldata(&config, command)?,
        Command::Decode { signature, data } => decode_calldata(&signature, &data)?,
        Command::Fetch { url, data } => {
            let client = payment_client(&config, build_wallet(&config)?).await?;
            let request = match data {
                Some(body) => {
                    let body: serde_json::Value = serde_json::from_str(&body)?;
                    ResourceRequest::post_json(url, &body)?
                }
                None => ResourceRequest::get(url),
            };
            let paid = client.fetch(request).await?;
            println!("status: {} ({})", paid.response.status, paid.state);
            if let Some(settlement) = &paid.settlement {
                println!("settlement: {}", serde_json::to_string(settlement)?);
            }
            println!("{}", paid.response.text());
        }
        Command::Register { agent } => {
            let metadata = AgentMetadata {
                name: agent.name,
                description: agent.description,
                services: agent.services,
                endpoint: agent.endpoint,
                image: agent.image,
            };
            let flow = RegistrationFlow::new(
                build_wallet(&config)?,
                backend(&config)?,
                config.identity.chain_id,
                config.identity.identity_registry,
            );
            print_transaction(&flow.register(&metadata).await?);
        }
        Command::Feedback { feedback, comment } => {
            let flow = FeedbackFlow::new(
                build_wallet(&config)?,
                backend(&config)?,
                config.identity.chain_id,
                config.identity.reputation_registry,
            );
            print_transaction(&flow.submit(&feedback.into_metadata(comment)).await?);
        }
        Command::Book {
            service_id,
            demand_id,
            scheduled_for,
            notes,
        } => {
            let orders_url = backend(&config)?.orders_url().clone();
            let payments = payment_client(&config, build_wallet(&config)?).await?;
            let flow = BookingFlow::new(payments, orders_url);
            let order = OrderRequest {
                service_id,
                demand_id,
                scheduled_for,
                notes,
            };
            let booking = flow.book(&order).await?;
            println!("paid: {}", booking.paid);
            if let Some(settlement) = &booking.settlement {
                println!("settlement: {}", serde_json::to_string(settlement)?);
            }
            println!("{}", serde_json::to_string_pretty(&booking.order)?);
        }
        Command::Agents { id, reputation } => {
            let registry = RegistryClient::try_from(config.backend_url.as_str())?
                .with_cache_ttl(config.registry_cache_ttl());
            match id {
                None => print_read(&registry.agents().await)?,
                Some(id) => {
                    print_read(&registry.agent(id).await)?;
                    if reputation {
                        print_read(&registry.reputation(id).await)?;
                    }
                }
            }
        }
    }
    Ok(())
}

fn encode_calldata(config: &MarketConfig, command: CalldataCommand) -> Result<(), Box<dyn Error>> {
    let call = match command {
        CalldataCommand::Register { uri, registry } => register_call(
            registry.unwrap_or(config.identity.identity_registry),
            &uri,
        )?,
        CalldataCommand::Feedback {
            feedback,
            uri,
            hash,
            registry,
        } => FeedbackCall {
            agent_id: U256::from(feedback.agent_id),
            value: feedback.value,
            value_decimals: feedback.decimals,
            tag1: feedback.tag1,
            tag2: feedback.tag2,
            endpoint: feedback.endpoint,
            feedback_uri: uri,
            feedback_hash: B256::from_str(&hash)?,
        }
        .into_call(registry.unwrap_or(config.identity.reputation_registry))?,
    };
    println!("to: {}", call.target());
    println!("signature: {}", call.signature());
    println!("data: {}", call.encode()?);
    Ok(())
}

fn decode_calldata(signature: &str, data: &str) -> Result<(), Box<dyn Error>> {
    let calldata = Calldata::try_from(Bytes::from_str(data)?)?;
    let expected = Selector::from_signature(signature);
    if calldata.selector() != expected {
        return Err(format!(
            "selector {} does not match {signature} ({expected})",
            calldata.selector()
        )
        .into());
    }
    let types = parse_signature(signature)?;
    for (ty, value) in types.iter().zip(calldata.decode_params(&types)?) {
        println!("{ty}: {value}");
    }
    Ok(())
}

fn build_wallet(config: &MarketConfig) -> Result<SharedWallet, Box<dyn Error>> {
    if let Some(proxy_url) = &config.wallet.proxy_url {
        tracing::info!(%proxy_url, "Using JSON-RPC wallet");
        return Ok(Arc::new(JsonRpcWallet::new(Url::parse(proxy_url)?)));
    }
    let Some(private_key) = &config.wallet.private_key else {
        return Err("no wallet configured: set wallet.private_key or wallet.proxy_url".into());
    };

    let chain_id = config.wallet.chain_id.unwrap_or(config.identity.chain_id);
    let mut wallet = LocalWallet::from_private_key(private_key, chain_id)?;
    for (network, rpc_url) in &config.wallet.rpc_urls {
        let Some(id) = parse_caip2(network) else {
            tracing::warn!(%network, "Skipping RPC URL for a non-EVM network");
            continue;
        };
        wallet = wallet.with_rpc_url(id, Url::parse(rpc_url)?);
    }
    tracing::info!(address = %wallet.address(), chain_id, "Using local wallet");
    Ok(Arc::new(wallet))
}

fn backend(config: &MarketConfig) -> Result<Arc<BackendClient>, Box<dyn Error>> {
    Ok(Arc::new(BackendClient::try_from(config.backend_url.as_str())?))
}

async fn payment_client(
    config: &MarketConfig,
    wallet: SharedWallet,
) -> Result<CliPaymentClient, Box<dyn Error>> {
    let signer = TypedDataSigner::connect(wallet).await?;
    let client = PaymentClient::new(ReqwestTransport::new(), signer, evm_registry())
        .with_timeout(config.payment_timeout());
    Ok(match config.payment.max_amount {
        Some(max_amount) => client.with_max_amount(max_amount),
        None => client,
    })
}

fn print_transaction(result: &TransactionResult) {
    println!("transaction: {}", result.hash);
    println!("chain: {}", agora::chain::caip2(result.chain_id));
    println!("contract: {}", result.to);
}

fn print_read<T: Serialize>(read: &RegistryRead<T>) -> Result<(), Box<dyn Error>> {
    if read.is_fallback() {
        println!("(registry unavailable; showing sample data)");
    }
    println!("{}", serde_json::to_string_pretty(read.get())?);
    Ok(())
}
