use std::path::PathBuf;

use clap::Parser;
use rtun::server::bootstrap::{self, BootstrapArgs};
use rtun::server::runtime::get_container_cpu_limit;

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

/// Reverse HTTP tunnel gateway: accepts peer registrations over gRPC and
/// proxies inbound HTTP requests to the matching peer.
#[derive(Parser)]
#[command(name = "rtun-gateway")]
struct Args {
    /// Path to a TOML or JSON config file. Missing file falls back to defaults.
    #[arg(long, default_value = "rtun.toml")]
    config: PathBuf,

    /// Address the public HTTP front-door listens on.
    #[arg(long, default_value = "0.0.0.0:8080")]
    http_listen_addr: String,

    /// Address the gRPC `Register` endpoint listens on.
    #[arg(long, default_value = "0.0.0.0:9095")]
    grpc_listen_addr: String,

    /// Address for health/ready/metrics endpoints. Pass an empty string to disable.
    #[arg(long, default_value = "0.0.0.0:8081")]
    admin_listen_addr: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let worker_threads = get_container_cpu_limit();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()?;

    runtime.block_on(bootstrap::run(BootstrapArgs {
        config_path: args.config,
        http_listen: args.http_listen_addr,
        grpc_listen: args.grpc_listen_addr,
        admin_listen: (!args.admin_listen_addr.is_empty()).then_some(args.admin_listen_addr),
    }))
}
