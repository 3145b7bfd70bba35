// Startup module - banner and configuration summary
//
// Printed by `serve` before the accept loop starts, and mirrored into the
// log so a detached server's proxy.log opens with the same summary.

use crate::config::{Config, VERSION};

/// ANSI color codes for terminal output
mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GREEN: &str = "\x1b[32m";
    pub const MAGENTA: &str = "\x1b[35m";
}

/// Print the startup banner and configuration summary to stdout.
pub fn print_startup(config: &Config) {
    use colors::*;

    println!();
    println!("  {BOLD}{CYAN}cc-glm{RESET} {DIM}v{VERSION}{RESET}");
    println!("  {DIM}Routing proxy for Claude Code{RESET}");
    println!();

    if let Some(path) = Config::config_path() {
        if path.exists() {
            println!("  {DIM}Config:{RESET} {GREEN}ok{RESET} {}", path.display());
        } else {
            println!("  {DIM}Config:{RESET} {DIM}(using defaults){RESET}");
        }
    }
    println!();

    println!(
        "  {DIM}anthropic:{RESET} {}",
        config.upstreams.anthropic.url
    );
    println!("  {DIM}zai:{RESET}       {}", config.upstreams.zai.url);
    println!(
        "  {DIM}routing:{RESET}   {} rule(s), default {}",
        config.routing.rules.len(),
        config.routing.default_upstream
    );
    println!();

    println!(
        "  {MAGENTA}>{RESET} Proxy listening on {BOLD}{}:{}{RESET}",
        config.proxy.host, config.proxy.port
    );
    println!();
}

/// Mirror the startup summary into the structured log.
pub fn log_startup(config: &Config) {
    tracing::info!(component = "startup", "cc-glm v{}", VERSION);
    tracing::info!(
        component = "startup",
        "State dir: {}",
        config.lifecycle.state_dir.display()
    );
    tracing::info!(
        component = "startup",
        "Ready. Waiting for Claude Code on {}:{}",
        config.proxy.host,
        config.proxy.port
    );
}
