use clap::{Parser, Subcommand};
use talky_gateway::config::GatewayConfig;
use tracing_subscriber::EnvFilter;

/// Talky Gateway — authenticating WebSocket gateway for the chat backend
#[derive(Parser)]
#[command(name = "talky-gateway", version, about)]
struct Cli {
    /// Path to configuration file (.hcl)
    #[arg(short, long, default_value = "gateway.hcl")]
    config: String,

    /// Override listen address (e.g., 0.0.0.0:8080)
    #[arg(short, long)]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration file without starting the gateway
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long, default_value = "gateway.hcl")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> talky_gateway::Result<()> {
    let cli = Cli::parse();

    if let Some(Commands::Validate { config: config_path }) = &cli.command {
        return validate_config(config_path).await;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    tracing::info!("Talky Gateway v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(config = cli.config, "Loading configuration");

    let mut config = GatewayConfig::from_file(&cli.config).await?;
    if let Some(listen) = &cli.listen {
        config.server.address = listen.clone();
    }

    let gateway = match talky_gateway::Gateway::new(config, vec![]) {
        Ok(gateway) => gateway,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return Err(e);
        }
    };
    gateway.start().await?;

    tracing::info!("Gateway ready — press Ctrl+C to stop");
    gateway.wait_for_shutdown().await;

    Ok(())
}

/// Validate a configuration file and print diagnostics
async fn validate_config(path: &str) -> talky_gateway::Result<()> {
    let config = match GatewayConfig::from_file(path).await {
        Ok(c) => {
            println!("✓ Config parsed successfully ({})", path);
            c
        }
        Err(e) => {
            eprintln!("✗ Parse error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("✗ Validation error: {}", e);
        std::process::exit(1);
    }

    // Certificate and key must load, not just be named
    if let Some(tls) = &config.server.tls {
        if let Err(e) = talky_gateway::proxy::tls::build_tls_acceptor(tls) {
            eprintln!("✗ TLS error: {}", e);
            std::process::exit(1);
        }
    }

    let domains = config.domain_set()?;
    let target = config.backend.target(&domains)?;

    println!("✓ Configuration is valid");
    println!();
    println!("  Listen:      {}", config.server.address);
    println!("  TLS:         {}", if config.server.tls.is_some() { "on" } else { "off" });
    println!("  Domains:");
    for (role, domain) in domains.iter() {
        println!("    - {:<8} {}", role, domain);
    }
    println!("  Backend:     {} ({:?})", target, config.backend.mode);
    match &config.identity {
        Some(identity) => println!("  Identity:    {}", identity.url),
        None => println!(
            "  Identity:    static ({} accounts)",
            config.static_accounts()?.len()
        ),
    }
    println!("  Strategies:");
    for name in talky_gateway::auth::StrategyRegistry::standard_names() {
        println!("    - {}", name);
    }
    println!("  Routes:      {}", config.routes.len());
    let mut names: Vec<_> = config.routes.keys().collect();
    names.sort();
    for name in names {
        let route = &config.routes[name];
        println!(
            "    - {} → {} {} [{}] ({:?})",
            name,
            route.method,
            route.path,
            route.strategy.as_deref().unwrap_or("public"),
            route.handler
        );
    }

    Ok(())
}
