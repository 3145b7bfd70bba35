// CLI module - command-line argument parsing
//
// Subcommands:
// - serve:  run the proxy server in the foreground (what the detached
//           child runs)
// - start:  ensure a detached proxy is running (singleton protocol)
// - stop:   stop the detached proxy; --if-no-peers waits out the grace
//           window first and aborts if a client process is still alive
// - status: report singleton state
// - config: show the effective configuration or the config file path

use crate::config::VERSION;
use clap::{Parser, Subcommand};

/// cc-glm - routing proxy between Claude Code and GLM-family upstreams
#[derive(Parser)]
#[command(name = "cc-glm")]
#[command(version = VERSION)]
#[command(about = "Routing proxy between Claude Code and GLM-family upstreams", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the proxy server in the foreground
    Serve,

    /// Start a detached proxy server (no-op if one is already running)
    Start,

    /// Stop the detached proxy server
    Stop {
        /// Only stop after a full grace window with no client process alive
        #[arg(long)]
        if_no_peers: bool,

        /// Client process name to look for during the grace window
        #[arg(long, default_value = crate::lifecycle::DEFAULT_PEER_PROCESS)]
        peer_name: String,
    },

    /// Report whether the proxy is running
    Status,

    /// Manage configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,

        /// Reset config file to defaults
        #[arg(long)]
        reset: bool,
    },
}

pub fn handle_config(show: bool, path: bool, reset: bool) {
    use crate::config::Config;
    use std::io::Write;

    if path {
        match Config::config_path() {
            Some(p) => println!("{}", p.display()),
            None => {
                eprintln!("Error: could not determine config path");
                std::process::exit(1);
            }
        }
        return;
    }

    if reset {
        let Some(p) = Config::config_path() else {
            eprintln!("Error: could not determine config path");
            std::process::exit(1);
        };

        // Confirm if file exists
        if p.exists() {
            eprint!("Config file exists at {}. Overwrite? [y/N] ", p.display());
            let _ = std::io::stderr().flush();
            let mut input = String::new();
            let _ = std::io::stdin().read_line(&mut input);
            if !input.trim().eq_ignore_ascii_case("y") {
                println!("Aborted.");
                return;
            }
        }

        if let Some(parent) = p.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                eprintln!("Error creating directory: {}", e);
                std::process::exit(1);
            }
        }
        if let Err(e) = std::fs::write(&p, Config::default().to_toml()) {
            eprintln!("Error writing config: {}", e);
            std::process::exit(1);
        }
        println!("Config reset to defaults: {}", p.display());
        return;
    }

    if show {
        let config = Config::from_env();
        println!("# Effective configuration (env > file > defaults)");
        println!();
        println!("[proxy]");
        println!("host = {:?}", config.proxy.host);
        println!("port = {}", config.proxy.port);
        println!();
        println!("[upstream.anthropic]");
        println!("url = {:?}", config.upstreams.anthropic.url);
        println!();
        println!("[upstream.zai]");
        println!("url = {:?}", config.upstreams.zai.url);
        println!(
            "api_key = {}",
            if config.upstreams.zai.api_key.is_some() {
                "(configured)"
            } else {
                "(not set)"
            }
        );
        println!();
        println!("[routing]");
        println!("default = {:?}", config.routing.default_upstream);
        for rule in &config.routing.rules {
            println!();
            println!("[[routing.rules]]");
            println!("match = {:?}", rule.pattern);
            println!("upstream = {:?}", rule.upstream);
            if let Some(model) = &rule.model {
                println!("model = {:?}", model);
            }
        }
        println!();
        println!("[lifecycle]");
        println!("stop_grace_seconds = {}", config.lifecycle.stop_grace_seconds);
        println!("start_wait_seconds = {}", config.lifecycle.start_wait_seconds);
        println!("state_dir = {:?}", config.lifecycle.state_dir.display().to_string());
        println!();
        println!("[signature_store]");
        println!("max_size = {}", config.signature_store.max_size);
        println!();
        println!("[logging]");
        println!("level = {:?}", config.logging.level.as_str());

        println!();
        if let Some(p) = Config::config_path() {
            if p.exists() {
                println!("# Source: {}", p.display());
            } else {
                println!("# Source: defaults (no config file)");
            }
        }
        return;
    }

    println!("Usage: cc-glm config [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --show    Display effective configuration");
    println!("  --path    Show config file path");
    println!("  --reset   Reset config file to defaults");
}
