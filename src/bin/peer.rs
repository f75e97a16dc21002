use clap::Parser;
use rtun::forwarder::Forwarder;
use tonic::transport::Channel;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

/// Reverse HTTP tunnel peer: registers with a gateway and forwards the
/// requests it receives to a local HTTP handler.
#[derive(Parser)]
#[command(name = "rtun-peer")]
struct Args {
    /// gRPC address of the gateway to register with.
    #[arg(long, default_value = "127.0.0.1:9095")]
    server_addr: String,

    /// Identifier this peer registers under. Must be non-empty.
    #[arg(long)]
    peer_id: String,

    /// Local address to forward tunneled requests to.
    #[arg(long, default_value = "127.0.0.1:8081")]
    forward_addr: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing();

    if args.peer_id.trim().is_empty() {
        anyhow::bail!("--peer-id is required and cannot be empty");
    }

    let channel = Channel::from_shared(format!("http://{}", args.server_addr))?
        .connect()
        .await?;

    let forwarder = Forwarder::new(args.forward_addr.clone());
    tracing::info!(
        "peer: connecting to gateway, peer_id={}, server_addr={}, forward_addr={}",
        args.peer_id,
        args.server_addr,
        args.forward_addr
    );

    forwarder.run(&args.peer_id, channel).await?;
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
