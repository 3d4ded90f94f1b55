//! swap-wallet service
//!
//! Runs the HTTP wallet service over the in-process development ledger, and
//! offers a few offline helpers.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use swap_wallet::api::{create_router, spawn_balance_feed, ApiState};
use swap_wallet::config::ServiceConfig;
use swap_wallet::crypto::KeyPair;
use swap_wallet::ledger::MemoryLedger;
use swap_wallet::mediator::{HttpMediator, MediatorClient, SwapService};
use swap_wallet::proposal::PartialTx;

#[derive(Parser)]
#[command(name = "swap-wallet")]
#[command(version)]
#[command(about = "Wallet service with atomic-swap proposals", long_about = None)]
struct Cli {
    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP service
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Network name embedded in partial transactions
        #[arg(short, long)]
        network: Option<String>,

        /// Base URL of the proposal mediator
        #[arg(long)]
        mediator_url: Option<String>,

        /// Enable the mediator endpoints
        #[arg(long)]
        swap_service: bool,

        /// Seconds a built transaction keeps its inputs reserved
        #[arg(long)]
        lock_ttl: Option<u64>,
    },

    /// Generate a key pair for a development wallet
    Keygen,

    /// Print the effective configuration
    Config,

    /// Summarize a serialized partial transaction
    Inspect {
        /// The `PartialTx|...` text
        partial_tx: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = ServiceConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve {
            port,
            network,
            mediator_url,
            swap_service,
            lock_ttl,
        } => {
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(network) = network {
                config.network = network;
            }
            if mediator_url.is_some() {
                config.mediator_url = mediator_url;
            }
            if swap_service {
                config.swap_service_enabled = true;
            }
            if lock_ttl.is_some() {
                config.utxo_lock_ttl_secs = lock_ttl;
            }
            config.validate()?;
            run_server(config)
        }
        Commands::Keygen => {
            let keys = KeyPair::generate();
            println!("Private key: {}", keys.private_key_hex());
            println!("Address:     {}", keys.address());
            Ok(())
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::Inspect { partial_tx } => {
            let partial = PartialTx::deserialize(&partial_tx)?;
            println!("Network:  {}", partial.network());
            println!("Inputs:   {}", partial.inputs().len());
            println!("Outputs:  {}", partial.outputs().len());
            println!("Complete: {}", partial.is_complete());
            for (token, balance) in partial.balances() {
                println!(
                    "  {:<16} in {:>12}  out {:>12}",
                    token, balance.inputs, balance.outputs
                );
            }
            Ok(())
        }
    }
}

fn run_server(config: ServiceConfig) -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let ledger = Arc::new(MemoryLedger::new(config.network_params()));
        for allocation in &config.genesis {
            ledger
                .mint(
                    &allocation.token,
                    &[(allocation.address.as_str(), allocation.amount)],
                )
                .await;
        }
        log::info!(
            "Development ledger on {} with {} genesis allocations",
            config.network,
            config.genesis.len()
        );

        let client: Option<Arc<dyn MediatorClient>> = match &config.mediator_url {
            Some(url) => Some(Arc::new(HttpMediator::new(url)?)),
            None => None,
        };
        let swap_service = SwapService::new(config.swap_service_enabled, client);
        if config.swap_service_enabled && !swap_service.is_enabled() {
            log::warn!("Swap service enabled without a mediator URL, endpoints will answer 405");
        }

        let port = config.port;
        let state = ApiState::new(config, ledger.clone(), swap_service);
        let feed = spawn_balance_feed(
            state.registry.clone(),
            ledger.subscribe(),
            state.ws_broadcaster.clone(),
        );

        let app = create_router(state);
        let addr = format!("0.0.0.0:{}", port);
        println!("swap-wallet listening on http://localhost:{}", port);
        println!();
        println!("Available endpoints:");
        println!("   GET    /health                                     - Health check");
        println!("   GET    /ws                                         - Balance updates");
        println!("   POST   /start                                      - Start wallet");
        println!("   POST   /wallet/stop                                - Stop wallet");
        println!("   POST   /wallet/tx-proposal                         - Build transaction");
        println!("   POST   /wallet/send-tx                             - Send transaction");
        println!("   PUT    /wallet/utxos-selected-as-input             - Mark outputs");
        println!("   POST   /wallet/decode                              - Decode");
        println!("   POST   /wallet/tx-inputs                           - Wallet inputs of a tx");
        println!("   POST   /wallet/atomic-swap/tx-proposal             - Swap proposal");
        println!("   POST   /wallet/atomic-swap/tx-proposal/sign        - Assemble signatures");
        println!("   ...    /wallet/atomic-swap/tx-proposal/{{fetch,register,update,list,delete}}");
        println!();

        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            println!("\nShutting down...");
            feed.abort();
            std::process::exit(0);
        });

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    })
}
