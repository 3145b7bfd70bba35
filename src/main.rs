use anyhow::Result;
use clap::Parser;

use cc_glm::cli::{handle_config, Cli, Commands};
use cc_glm::config::Config;
use cc_glm::lifecycle::{has_peer, Singleton, StartOutcome};
use cc_glm::{logging, proxy, startup};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Some(Commands::Config { show, path, reset }) = &cli.command {
        handle_config(*show, *path, *reset);
        return;
    }

    Config::ensure_config_exists();
    let config = Config::from_env();

    let result = match cli.command {
        // No subcommand behaves like `serve` so the detached child and a
        // bare foreground run look the same.
        None | Some(Commands::Serve) => run_serve(config).await,
        Some(Commands::Start) => run_start(config).await,
        Some(Commands::Stop {
            if_no_peers,
            peer_name,
        }) => run_stop(config, if_no_peers, &peer_name).await,
        Some(Commands::Status) => run_status(config),
        Some(Commands::Config { .. }) => unreachable!("handled above"),
    };

    if let Err(e) = result {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run_serve(config: Config) -> Result<()> {
    logging::init_logging(&config)?;
    startup::print_startup(&config);
    startup::log_startup(&config);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        tracing::info!(component = "server", "Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    proxy::start_proxy(config, shutdown_rx).await
}

async fn run_start(config: Config) -> Result<()> {
    logging::init_logging(&config)?;
    let singleton = Singleton::new(&config);
    match singleton.start().await? {
        StartOutcome::Started { pid } => {
            println!(
                "proxy started on {}:{} (pid {})",
                config.proxy.host, config.proxy.port, pid
            );
        }
        StartOutcome::AlreadyRunning { pid } => match pid {
            Some(pid) => println!("proxy already running (pid {})", pid),
            None => println!("proxy already running"),
        },
    }
    Ok(())
}

async fn run_stop(config: Config, if_no_peers: bool, peer_name: &str) -> Result<()> {
    logging::init_logging(&config)?;
    let singleton = Singleton::new(&config);
    if if_no_peers {
        let peer_name = peer_name.to_string();
        let stopped = singleton
            .stop_if_no_peers(|| has_peer(&peer_name))
            .await?;
        if stopped {
            println!("proxy stopped");
        } else {
            println!("peer process still running; proxy left up");
        }
    } else {
        singleton.stop().await?;
        println!("proxy stopped");
    }
    Ok(())
}

fn run_status(config: Config) -> Result<()> {
    let singleton = Singleton::new(&config);
    let status = singleton.status();
    match (status.listening, status.pid, status.owns_port) {
        (true, Some(pid), true) => println!("running (pid {})", pid),
        (true, _, false) => println!(
            "port {} is in use, but not by the recorded proxy",
            config.proxy.port
        ),
        (true, None, true) => unreachable!("owns_port is only true when pid is Some"),
        (false, _, _) => println!("not running"),
    }
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(_) => {
            // Fall back to ctrl-c only.
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
