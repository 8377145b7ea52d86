//! Certificate authentication proxy - server binary

use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use cert_auth_proxy::{
    assertion::Signer,
    cli::{Cli, Command, KeyCommand},
    config::Config,
    keystore::KeyStore,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    match cli.command {
        Some(Command::Key(key_cmd)) => run_key_command(&key_cmd, &config),
        Some(Command::Serve) | None => run_server(&config).await,
    }
}

/// Ensure the key exists and serve the proxy endpoints.
async fn run_server(config: &Config) -> ExitCode {
    let store = KeyStore::new(&config.proxy.key_path);
    let key = match store.ensure_key() {
        Ok(key) => key,
        Err(e) => {
            error!("Cannot obtain signing key: {e}");
            return ExitCode::FAILURE;
        }
    };
    let signer = Signer::new(key, config.proxy.digest);

    match cert_auth_proxy::server::serve(config, signer).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Server error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Run a signing-key management subcommand.
fn run_key_command(command: &KeyCommand, config: &Config) -> ExitCode {
    let store = KeyStore::new(&config.proxy.key_path);

    match command {
        KeyCommand::Show => match store
            .ensure_key()
            .map(|key| Signer::new(key, config.proxy.digest))
            .and_then(|signer| signer.public_key_pem())
        {
            Ok(pem) => {
                print!("{pem}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("Cannot read signing key: {e}");
                ExitCode::FAILURE
            }
        },
        KeyCommand::Rotate => {
            if let Err(e) = store.remove_key() {
                error!("Cannot remove signing key: {e}");
                return ExitCode::FAILURE;
            }
            match store.ensure_key() {
                Ok(_) => {
                    println!("Signing key rotated: {}", store.path().display());
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    error!("Cannot generate replacement key: {e}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}
