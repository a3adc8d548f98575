use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use log::{error, info};

use ollama_relay::{relay, RelayCaller, RelayConfig};

#[derive(Parser)]
#[command(name = "ollama-relay")]
#[command(author, version, about, long_about = None)]
struct Cli
{   #[command(subcommand)]
    command: Option<Commands>
}

#[derive(Subcommand)]
enum Commands
{   /// Run the relay (default)
    Serve
    {   /// JSON config file; env vars still override it
        #[arg(short, long)]
        config: Option<PathBuf>
      , /// Listen address, overrides config and env
        #[arg(short, long)]
        bind: Option<String>
    }
  , /// Send one prompt to a running relay and print the answer
    Ask
    {   prompt: String
      , #[arg(long, default_value = ollama_relay::DEFAULT_RELAY_URL)]
        relay: String
      , /// Seconds to wait for the answer
        #[arg(long, default_value_t = ollama_relay::DEFAULT_GENERATE_TIMEOUT_SECS)]
        timeout_secs: u64
    }
  , /// Check that a running relay answers on its root route
    Health
    {   #[arg(long, default_value = ollama_relay::DEFAULT_RELAY_URL)]
        relay: String
    }
}

fn load_config(
  path: Option<PathBuf>
, bind: Option<String>
) -> Result<RelayConfig, ollama_relay::Error>
{   let mut config = match path
    {   Some(path) => {
          let mut config = RelayConfig::from_json_file(path)?;
          config.apply_overrides(|key| std::env::var(key).ok())?;
          config
        }
      , None => RelayConfig::from_env()?
    };
    if let Some(bind) = bind
    {   config.bind_addr = bind;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode
{   env_logger::Builder::from_env(
      env_logger::Env::default().default_filter_or("info")
    ).init();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Serve
    {   config: None
      , bind: None
    });

    match command
    {   Commands::Serve { config, bind } => {
          let config = match load_config(config, bind)
          {   Ok(config) => config
            , Err(e) => {
                error!("{}", e);
                return ExitCode::FAILURE;
              }
          };
          info!(
            "Starting relay for {} (model {})",
            config.backend.base_url, config.backend.model
          );
          if let Err(e) = relay::run(config).await
          {   error!("{}", e);
              return ExitCode::FAILURE;
          }
          ExitCode::SUCCESS
        }
      , Commands::Ask { prompt, relay, timeout_secs } => {
          match RelayCaller::new(relay)
          {   Ok(caller) => {
                let caller = caller
                  .with_ask_timeout(Duration::from_secs(timeout_secs));
                println!("{}", caller.ask(&prompt).await);
                ExitCode::SUCCESS
              }
            , Err(e) => {
                error!("{}", e);
                ExitCode::FAILURE
              }
          }
        }
      , Commands::Health { relay } => {
          let caller = match RelayCaller::new(relay)
          {   Ok(caller) => caller
            , Err(e) => {
                error!("{}", e);
                return ExitCode::FAILURE;
              }
          };
          if caller.is_relay_up().await
          {   println!("Relay is running and healthy");
              ExitCode::SUCCESS
          } else
          {   println!("Relay is not responding");
              ExitCode::FAILURE
          }
        }
    }
}
