use std::{path::Path, process::ExitCode};

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use mcpbridge::{
    cli::{Cli, Commands, parse_args},
    config::{Config, load_config, resolve_config_path},
    environment::{self, PathConvention},
    error::{ConfigError, SupervisorError},
    inspect,
    signal::ShutdownSignal,
    supervisor::Supervisor,
    translate::PathTranslator,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = parse_args();
    init_logging(&args);

    let result = match args.command {
        Commands::Start { config } => start(config.as_deref()).await,
        Commands::List { config } => list(config.as_deref()),
        Commands::Check { config } => check(config.as_deref()),
        Commands::Translate {
            convention,
            mount_root,
            distro,
            args,
        } => {
            translate(convention, &mount_root, distro, &args);
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(args: &Cli) {
    let filter = if let Some(level) = args.log_level {
        EnvFilter::new(level.to_string())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn start(config_path: Option<&Path>) -> Result<(), SupervisorError> {
    info!("mcpbridge starting...");
    let shutdown = ShutdownSignal::install()?;

    let config = load(config_path)?;
    let mut supervisor = Supervisor::new(config);
    let signalled = supervisor.run(shutdown.recv()).await?;

    info!("Sent terminate request to {signalled} server(s), exiting");
    Ok(())
}

fn list(config_path: Option<&Path>) -> Result<(), SupervisorError> {
    let config = load(config_path)?;
    let translator = config.bridge.translator();

    if config.servers.is_empty() {
        println!("No servers configured.");
    }
    for line in inspect::describe_servers(&config, &translator) {
        println!("{line}");
    }
    Ok(())
}

fn check(config_path: Option<&Path>) -> Result<(), SupervisorError> {
    let config = load(config_path)?;
    let translator = config.bridge.translator();
    println!("Path convention: {}", translator.convention());

    let mut problems = 0;
    for server in inspect::check_config(&config, &translator) {
        println!("{}:", server.name);
        for finding in &server.findings {
            println!("  {finding}");
        }
        problems += server.problems();
    }

    if problems > 0 {
        warn!("{problems} potential problem(s) found");
    }
    Ok(())
}

fn translate(
    convention: Option<PathConvention>,
    mount_root: &str,
    distro: Option<String>,
    args: &[String],
) {
    let convention = convention.unwrap_or_else(environment::detect);
    let distro = distro.or_else(|| std::env::var("WSL_DISTRO_NAME").ok());
    let translator =
        PathTranslator::new(convention, mount_root, dirs::home_dir()).with_distro(distro);
    for arg in translator.translate_args(args) {
        println!("{arg}");
    }
}

fn load(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    let path = resolve_config_path(explicit).inspect_err(|err| {
        if let ConfigError::NotFound { searched } = err {
            error!("Configuration not found. Searched in:");
            for candidate in searched {
                error!("  - {}", candidate.display());
            }
        }
    })?;
    load_config(&path)
}

