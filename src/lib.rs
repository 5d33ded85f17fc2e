mod commands;
mod core;

use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

pub use crate::commands::Launcher;
pub use crate::core::error::{LauncherError, LauncherResult};
pub use crate::core::state::{AppState, LauncherPaths};

const USAGE: &str = "usage: angelauncher <command>

commands:
  profiles        list stored profiles
  launch <id>     launch the game for a profile and wait for it to exit
  install         install the Fabric loader
  mods            download the configured mod release
  updates         check the mod release for a newer version
  players         show players on the server
  status          show whether the game is running
  output          show the latest game output lines
  ram             show installed memory in GB";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Profiles,
    Launch(String),
    Install,
    Mods,
    Updates,
    Players,
    Status,
    Output,
    Ram,
}

fn parse_args(args: &[String]) -> Option<Command> {
    let command = match args {
        [cmd] if cmd == "profiles" => Command::Profiles,
        [cmd, id] if cmd == "launch" => Command::Launch(id.clone()),
        [cmd] if cmd == "install" => Command::Install,
        [cmd] if cmd == "mods" => Command::Mods,
        [cmd] if cmd == "updates" => Command::Updates,
        [cmd] if cmd == "players" => Command::Players,
        [cmd] if cmd == "status" => Command::Status,
        [cmd] if cmd == "output" => Command::Output,
        [cmd] if cmd == "ram" => Command::Ram,
        _ => return None,
    };
    Some(command)
}

fn print_json<T: Serialize>(value: &T) -> LauncherResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn execute(launcher: &Launcher, command: Command) -> LauncherResult<()> {
    match command {
        Command::Profiles => print_json(&launcher.get_profiles().await?),
        Command::Launch(id) => {
            match launcher.launch_game(&id, None).await? {
                crate::core::launch::LaunchVerdict::Running(handle) => {
                    print_json(&handle)?;
                    launcher.wait_for_game().await;
                    info!("game exited");
                }
                crate::core::launch::LaunchVerdict::ExitedCleanly => {
                    info!("game exited cleanly during startup");
                }
            }
            Ok(())
        }
        Command::Install => print_json(&launcher.install_loader().await?),
        Command::Mods => print_json(&launcher.sync_mods().await?),
        Command::Updates => print_json(&launcher.check_mod_updates().await?),
        Command::Players => print_json(&launcher.online_players().await),
        Command::Status => print_json(&launcher.game_status().await),
        Command::Output => print_json(&launcher.game_output().await),
        Command::Ram => print_json(&launcher.system_memory_gb().await?),
    }
}

pub fn run() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,angelauncher_lib=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = parse_args(&args) else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "failed to start async runtime");
            std::process::exit(1);
        }
    };

    let result = runtime.block_on(async move {
        let data_dir = LauncherPaths::default_data_dir();
        let state = AppState::load(data_dir).await?;
        let launcher = Launcher::new(state);
        execute(&launcher, command).await
    });

    if let Err(e) = result {
        error!(error = %e, "command failed");
        std::process::exit(1);
    }
}
