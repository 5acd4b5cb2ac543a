use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "shardctl",
    about = "Shardgrid — partitioned control plane tooling",
    version,
    propagate_version = true,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the L7 router config for the tenant and resource partitions.
    ///
    /// Partition addresses are read from TENANT_PARTITION_IP (comma
    /// separated, at most 26) and RESOURCE_PARTITION_IP.
    Haproxy(commands::haproxy::HaproxyArgs),
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("shardctl=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Haproxy(args) => commands::haproxy::haproxy(&args),
    }
}
