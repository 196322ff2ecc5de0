//! # Intellihouse CLI Entry Point
//!
//! Runs the coordinator, runs a node behind NAT, or makes a one-shot echo call.
//!
//! ## Usage
//!
//! ```bash
//! # Start the coordinator
//! intellihouse coordinator -b 0.0.0.0:8080
//!
//! # Start a node that the coordinator reaches through inverse requests
//! intellihouse node -c http://192.168.1.10:8080 --host-id pi-kitchen
//!
//! # Check connectivity (outputs raw JSON)
//! intellihouse echo http://192.168.1.10:8080 hello
//! ```
//!
//! Set `INTELLIHOUSE_HOST_ID` to override the host id derived from the
//! machine's hostname. Pass the same `--secret` to every process to protect
//! payloads with an integrity hash.

use anyhow::{Context, Result};
use argh::FromArgs;
use intellihouse_common::{HostId, IntegrityHash, PayloadTransform, Request};
use intellihouse_rpc::transport::{HttpServer, HttpTransportProvider};
use intellihouse_rpc::{EchoRequest, InMemoryPresence, RpcConfig, RpcContext, RpcMode};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

const HOST_ID_ENV: &str = "INTELLIHOUSE_HOST_ID";

#[derive(FromArgs)]
/// Intellihouse - home automation RPC
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Coordinator(CoordinatorArgs),
    Node(NodeArgs),
    Echo(EchoArgs),
}

/// Arguments for the coordinator.
///
/// The coordinator serves RPC over HTTP, queues inverse requests for nodes
/// and tracks which nodes are still polling.
#[derive(FromArgs)]
#[argh(subcommand, name = "coordinator")]
/// run the coordinator HTTP server
struct CoordinatorArgs {
    /// address to bind the HTTP server to
    #[argh(option, short = 'b', default = "\"0.0.0.0:8080\".into()")]
    bind: String,

    /// host id of this coordinator (default: "coordinator")
    #[argh(option, long = "host-id")]
    host_id: Option<String>,

    /// shared secret for payload integrity hashing
    #[argh(option, long = "secret")]
    secret: Option<String>,

    /// low-level transport timeout in milliseconds
    #[argh(option, long = "transport-timeout-ms", default = "60000")]
    transport_timeout_ms: u64,

    /// seconds of silence after which a node is reported offline
    #[argh(option, long = "offline-after-secs", default = "180")]
    offline_after_secs: u64,
}

/// Arguments for a node.
///
/// A node calls the coordinator directly and keeps a long-poll open so the
/// coordinator can call back into it.
#[derive(FromArgs)]
#[argh(subcommand, name = "node")]
/// run a node that polls the coordinator
struct NodeArgs {
    /// coordinator base URL, e.g. http://192.168.1.10:8080
    #[argh(option, short = 'c')]
    coordinator: String,

    /// host id of the coordinator
    #[argh(option, long = "coordinator-host-id", default = "\"coordinator\".into()")]
    coordinator_host_id: String,

    /// host id of this node (default: $INTELLIHOUSE_HOST_ID or the hostname)
    #[argh(option, long = "host-id")]
    host_id: Option<String>,

    /// shared secret for payload integrity hashing
    #[argh(option, long = "secret")]
    secret: Option<String>,

    /// low-level transport timeout in milliseconds
    #[argh(option, long = "transport-timeout-ms", default = "60000")]
    transport_timeout_ms: u64,
}

/// Arguments for a one-shot echo call.
///
/// Prints the echoed response as JSON to stdout so the output can be piped.
#[derive(FromArgs)]
#[argh(subcommand, name = "echo")]
/// call the echo service of a server
struct EchoArgs {
    /// server base URL
    #[argh(positional)]
    server: String,

    /// payload to echo
    #[argh(positional)]
    payload: String,

    /// milliseconds the server sleeps before answering
    #[argh(option, long = "sleep-ms", default = "0")]
    sleep_ms: u64,

    /// request timeout in milliseconds (0 uses the default)
    #[argh(option, long = "timeout-ms", default = "0")]
    timeout_ms: u64,

    /// host id of the server
    #[argh(option, long = "server-host-id", default = "\"coordinator\".into()")]
    server_host_id: String,

    /// shared secret for payload integrity hashing
    #[argh(option, long = "secret")]
    secret: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // echo keeps stdout clean for piping
    if !matches!(cli.command, Commands::Echo(_)) {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    match cli.command {
        Commands::Coordinator(args) => run_coordinator(args).await,
        Commands::Node(args) => run_node(args).await,
        Commands::Echo(args) => run_echo(args).await,
    }
}

fn resolve_host_id(flag: Option<String>) -> Option<HostId> {
    flag.or_else(|| std::env::var(HOST_ID_ENV).ok())
        .filter(|id| !id.is_empty())
        .map(HostId::new)
}

fn payload_transform(secret: Option<&str>) -> Option<Arc<dyn PayloadTransform>> {
    secret.map(|secret| {
        let hash = IntegrityHash::new(secret);
        tracing::info!("Payload integrity hashing enabled ({})", hash.fingerprint());
        Arc::new(hash) as Arc<dyn PayloadTransform>
    })
}

async fn run_coordinator(args: CoordinatorArgs) -> Result<()> {
    let addr: SocketAddr = args
        .bind
        .parse()
        .with_context(|| format!("Invalid bind address '{}'", args.bind))?;
    let host_id = resolve_host_id(args.host_id).unwrap_or_else(|| HostId::new("coordinator"));
    let config =
        RpcConfig::default().with_transport_timeout(Duration::from_millis(args.transport_timeout_ms));

    let context = RpcContext::builder(RpcMode::Server)
        .host_id(host_id.clone())
        .config(config)
        .build();
    tracing::info!("Starting coordinator {} on {}", host_id, addr);

    let presence = Arc::new(InMemoryPresence::new());
    let mut server = HttpServer::new(context.clone()).with_presence(presence.clone());
    if let Some(transform) = payload_transform(args.secret.as_deref()) {
        server = server.with_transform(transform);
    }

    let silence = Duration::from_secs(args.offline_after_secs);
    let sweeper = tokio::spawn(async move {
        let mut interval = tokio::time::interval((silence / 2).max(Duration::from_secs(1)));
        loop {
            interval.tick().await;
            presence.sweep(silence);
        }
    });

    let result = tokio::select! {
        result = server.run(addr) => result.context("HTTP server failed"),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
            Ok(())
        }
    };

    sweeper.abort();
    context.close();
    result
}

async fn run_node(args: NodeArgs) -> Result<()> {
    let config =
        RpcConfig::default().with_transport_timeout(Duration::from_millis(args.transport_timeout_ms));
    let coordinator = HostId::new(args.coordinator_host_id);

    let mut provider = HttpTransportProvider::new(config.transport_timeout)
        .with_endpoint(coordinator.clone(), &args.coordinator)
        .with_context(|| format!("Invalid coordinator URL '{}'", args.coordinator))?;
    if let Some(transform) = payload_transform(args.secret.as_deref()) {
        provider = provider.with_transform(transform);
    }

    let mut builder = RpcContext::builder(RpcMode::Client)
        .config(config)
        .transport_provider(Arc::new(provider));
    if let Some(host_id) = resolve_host_id(args.host_id) {
        builder = builder.host_id(host_id);
    }
    let context = builder.build();
    tracing::info!("Starting node {} for coordinator {}", context.host_id(), args.coordinator);

    context.start_inverse_polling(coordinator)?;
    tokio::signal::ctrl_c()
        .await
        .context("Failed to wait for shutdown signal")?;

    tracing::info!("Shutting down");
    context.close();
    Ok(())
}

async fn run_echo(args: EchoArgs) -> Result<()> {
    let server = HostId::new(args.server_host_id);
    let mut provider = HttpTransportProvider::default()
        .with_endpoint(server.clone(), &args.server)
        .with_context(|| format!("Invalid server URL '{}'", args.server))?;
    if let Some(secret) = args.secret.as_deref() {
        provider = provider.with_transform(Arc::new(IntegrityHash::new(secret)));
    }

    let context = RpcContext::builder(RpcMode::Client)
        .transport_provider(Arc::new(provider))
        .build();

    let request = Request::new(
        server,
        EchoRequest::new(args.payload).sleeping(Duration::from_millis(args.sleep_ms)),
    )
    .with_timeout(args.timeout_ms);
    let result = context.create_rpc_client().invoke(request).await;
    context.close();

    println!("{}", serde_json::to_string(&result?)?);
    Ok(())
}
