use clap::Parser;
use std::net::{IpAddr, Ipv4Addr};
use tokio::sync::watch;

use udpburst::{
    sender::{BurstConfig, run_burst},
    server::Server,
    types::{Args, Command, LogSink, parse_addr},
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_io()
        .enable_time()
        .build()?;
    runtime.block_on(run(args.command))
}

async fn run(command: Command) -> Result<(), Box<dyn std::error::Error>> {
    let log = LogSink::stdout();

    match command {
        Command::Send {
            dest,
            data_len,
            delay_ms,
            count,
        } => {
            let dest = parse_addr(&dest, IpAddr::V4(Ipv4Addr::LOCALHOST))
                .map_err(|e| format!("<dest> {e}"))?;
            let config = BurstConfig {
                dest,
                data_len,
                delay_ms,
                count,
            };

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    let _ = shutdown_tx.send(true);
                }
            });

            eprintln!("Sending {count} packets to {dest}");
            run_burst(config, log, shutdown_rx).await?;
        }
        Command::Server { bind } => {
            let bind = parse_addr(&bind, IpAddr::V4(Ipv4Addr::UNSPECIFIED))
                .map_err(|e| format!("<bind> {e}"))?;

            let server = Server::new();
            let local = server.start(bind, log).await?;
            eprintln!("Started UDP server on port {}", local.port());

            tokio::signal::ctrl_c().await?;
            server.stop().await?;
            eprintln!("Stopped UDP server");
        }
    }

    Ok(())
}
