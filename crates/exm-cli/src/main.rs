mod config;
#[cfg(feature = "credential-gate")]
mod prompt;
#[cfg(test)]
mod test_util;

use std::io::IsTerminal;
use std::path::PathBuf;

use clap::{CommandFactory, Parser};

use exm_core::arguments::EXPECTED_ARGUMENT_COUNT;
use exm_core::platform::ExecutionManagement;
use exm_core::shutdown::{ConsoleStopSource, SignalStopSource};
use exm_core::{ArgumentCountError, FAILURE_EXIT_CODE, Supervisor};

use config::{ExmConfig, StopSourceKind};

#[derive(Parser)]
#[command(
    name = "exm",
    version,
    about = "Execution Management lifecycle supervisor",
    override_usage = "exm <config> <evconf> <dmconf> <phmcfg>",
    after_help = "Arguments, in order:\n  \
                  <config>   general configuration\n             \
                  (default configuration/execution_manifest.arxml)\n  \
                  <evconf>   extended vehicle configuration\n             \
                  (default configuration/extended_vehicle_manifest.arxml)\n  \
                  <dmconf>   diagnostic manager configuration\n             \
                  (default configuration/diagnostic_manager_manifest.arxml)\n  \
                  <phmcfg>   health monitoring configuration\n             \
                  (default configuration/health_monitoring_manifest.arxml)\n\n\
                  An empty path (\"\") selects the default manifest for that slot.\n\n\
                  Before the platform starts, exm asks for the VCC API key and then \
                  for the OAuth 2.0 bearer token, unless both are set in the \
                  environment.\n\n\
                  Environment:\n  \
                  EXM_CONFIG                  config file path\n  \
                  EXM_STOP_SOURCE             signal | console\n  \
                  EXM_STOP_POLL_INTERVAL_MS   stop-flag check interval\n  \
                  EXM_CYCLE_DELAY_MS          poll cycle delay\n  \
                  EXM_VCC_API_KEY             skip the API key prompt\n  \
                  EXM_BEARER_TOKEN            skip the bearer token prompt"
)]
struct Cli {
    /// General, extended vehicle, diagnostic manager and health monitoring
    /// configuration files, in that order
    #[arg(value_name = "PATH", num_args = 0.., allow_hyphen_values = true)]
    paths: Vec<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if cli.paths.len() != EXPECTED_ARGUMENT_COUNT {
        let err = ArgumentCountError {
            received: cli.paths.len(),
        };
        eprintln!("[ERROR]: Incorrect number of arguments provided!");
        eprintln!("{err}");
        eprintln!("{}", Cli::command().render_long_help());
        std::process::exit(FAILURE_EXIT_CODE);
    }

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("[ERROR]: {e:#}");
            std::process::exit(FAILURE_EXIT_CODE);
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    let config = ExmConfig::resolve()?;
    tracing::debug!(?config, "configuration resolved");

    let cycle_delay = config.cycle_delay;
    let controller = move || Ok(ExecutionManagement::with_cycle_delay(cycle_delay));

    #[cfg(target_os = "linux")]
    let poller = exm_core::platform::EpollPoller::new;
    #[cfg(not(target_os = "linux"))]
    let poller = || Ok(exm_core::platform::IdlePoller);

    let mut supervisor = Supervisor::from_factories(config.supervisor_config(), controller, poller)
        .with_stop_source(SignalStopSource::new());
    if config.stop_source == StopSourceKind::Console {
        supervisor = supervisor.with_stop_source(ConsoleStopSource::stdin());
    }

    #[cfg(feature = "credential-gate")]
    let supervisor = supervisor.with_credential_gate(prompt::TerminalCredentialGate::new());

    let result = supervisor.run(cli.paths);
    tracing::info!(
        exit_code = result.exit_code(),
        stop_cause = ?result.stop_cause(),
        "execution management exited"
    );
    Ok(result.exit_code())
}
