use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::broadcast::error::RecvError;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use bravia_api::{
    CallOptions, Config, FileStore, ProfileSet, ProfileStore, RpcClient, ServicePath, Session,
    StatusSnapshot,
};

/// bravia-ctl – drive a Sony Bravia TV from the command line.
#[derive(Parser, Debug)]
#[command(name = "bravia-ctl", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Poll the TV once and print its status.
    Status {
        /// Print the snapshot as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Poll continuously and print every status snapshot.
    Watch {
        /// Print snapshots as JSON lines.
        #[arg(long)]
        json: bool,
    },
    /// Probe the device and report the connection outcome.
    Test,
    /// Toggle the panel's power state.
    Power,
    /// Set the speaker volume (0-100).
    Volume { level: i32 },
    /// Toggle speaker mute.
    Mute,
    /// Send a named infrared command.
    Ir {
        /// Command name, e.g. Home, VolumeUp, Confirm.
        name: Option<String>,
        /// List the known command names instead of sending.
        #[arg(long)]
        list: bool,
    },
    /// List installed applications, or launch one.
    Apps {
        /// Application uri to launch.
        #[arg(long)]
        launch: Option<String>,
    },
    /// List external inputs, or switch to one.
    Inputs {
        /// Input uri to switch to.
        #[arg(long)]
        switch: Option<String>,
    },
    /// Manage stored TV profiles.
    Profile {
        #[command(subcommand)]
        cmd: ProfileCmd,
    },
    /// Send a raw JSON-RPC call to one of the services.
    Raw {
        #[arg(value_enum)]
        service: ServiceOpt,
        method: String,
        /// Params as a JSON array, e.g. '[{"status":true}]'.
        #[arg(default_value = "[]")]
        params: String,
        /// Override the service protocol version.
        #[arg(long)]
        version: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum ProfileCmd {
    /// List profiles; the active one is marked with '*'.
    List,
    /// Add a blank profile and make it active.
    Add,
    /// Switch the active profile.
    Select { id: String },
    /// Update the active profile. Omitted fields keep their value.
    Save {
        #[arg(long, default_value = "")]
        name: String,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        psk: Option<String>,
    },
    /// Remove a profile (the active one if no id is given).
    Remove { id: Option<String> },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ServiceOpt {
    System,
    Audio,
    AppControl,
    AvContent,
}

impl From<ServiceOpt> for ServicePath {
    fn from(opt: ServiceOpt) -> Self {
        match opt {
            ServiceOpt::System => ServicePath::System,
            ServiceOpt::Audio => ServicePath::Audio,
            ServiceOpt::AppControl => ServicePath::AppControl,
            ServiceOpt::AvContent => ServicePath::AvContent,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // logs go to stderr so command output stays pipeable
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());
    info!("Profile store: {:?}", config.paths.store_file);

    let store = Arc::new(FileStore::new(config.paths.store_file.clone()));
    let profiles = ProfileStore::new(store);
    let client = RpcClient::with_timeout(profiles.clone(), config.rpc.timeout_ms)?;
    let session = Session::with_poll_interval(profiles, client, config.poll.interval_ms);
    session.profiles().ensure_default().await?;

    match cli.cmd {
        Cmd::Status { json } => {
            session.refresh_once().await;
            if let Some(snap) = session.last_snapshot().await {
                print_snapshot(&snap, json)?;
            }
        }

        Cmd::Watch { json } => {
            let mut rx = session.subscribe();
            session.start().await?;
            loop {
                match rx.recv().await {
                    Ok(snap) => print_snapshot(&snap, json)?,
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        }

        Cmd::Test => {
            let state = session.test_connection().await?;
            println!("OK, power status: {}", state.label());
        }

        Cmd::Power => {
            let turn_on = session.toggle_power().await?;
            println!(
                "{}",
                if turn_on {
                    "power on requested"
                } else {
                    "standby requested"
                }
            );
        }

        Cmd::Volume { level } => {
            session.set_volume(level).await?;
            println!("volume set to {}", level.clamp(0, 100));
        }

        Cmd::Mute => {
            let muted = session.toggle_mute().await?;
            println!("{}", if muted { "muted" } else { "unmuted" });
        }

        Cmd::Ir { name, list } => {
            // one-shot runs never called start(), so load capabilities here
            session.reload_capabilities().await;
            if list {
                for name in session.ir_command_names().await {
                    println!("{name}");
                }
            } else {
                let name = name.context("command name required (or use --list)")?;
                session.send_named_ir(&name).await?;
                println!("sent {name}");
            }
        }

        Cmd::Apps { launch } => match launch {
            Some(uri) => {
                session.launch_app(&uri).await?;
                println!("app launched");
            }
            None => {
                let apps = session.load_apps().await?;
                if apps.is_empty() {
                    println!("no applications reported");
                }
                for app in &apps {
                    println!("{}\t{}", app.display_name(), app.uri);
                }
            }
        },

        Cmd::Inputs { switch } => match switch {
            Some(uri) => {
                session.switch_input(&uri).await?;
                println!("input switched");
            }
            None => {
                let inputs = session.load_inputs().await?;
                if inputs.is_empty() {
                    println!("no inputs reported");
                }
                for input in &inputs {
                    let connected = match input.connection {
                        Some(true) => " (connected)",
                        _ => "",
                    };
                    println!("{}\t{}{}", input.display_name(), input.uri, connected);
                }
            }
        },

        Cmd::Profile { cmd } => run_profile_cmd(&session, cmd).await?,

        Cmd::Raw {
            service,
            method,
            params,
            version,
        } => {
            let params: Vec<serde_json::Value> =
                serde_json::from_str(&params).context("params must be a JSON array")?;
            let options = CallOptions {
                version,
                timeout_ms: None,
            };
            let response = session
                .client()
                .call(service.into(), &method, params, options)
                .await?;
            let result = serde_json::Value::Array(response.into_result());
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}

async fn run_profile_cmd(session: &Session, cmd: ProfileCmd) -> Result<()> {
    match cmd {
        ProfileCmd::List => {
            let set = session.list_profiles().await?;
            print_profiles(&set);
        }

        ProfileCmd::Add => {
            let profile = session.add_profile().await?;
            println!("added {} ({})", profile.name, profile.id);
        }

        ProfileCmd::Select { id } => {
            if !session.select_profile(&id).await? {
                bail!("no profile with id {id}");
            }
            println!("active profile: {id}");
        }

        ProfileCmd::Save { name, url, psk } => {
            let set = session.list_profiles().await?;
            let active = set.active.context("no active profile")?;
            let url = url.unwrap_or(active.url);
            let psk = psk.unwrap_or(active.psk);
            let saved = session.save_profile(&name, &url, &psk).await?;
            println!("saved {} ({})", saved.name, saved.id);
        }

        ProfileCmd::Remove { id } => {
            let set = session.list_profiles().await?;
            let active = set.active.context("no active profile")?;
            match id {
                Some(id) if id != active.id => {
                    session.profiles().remove(&id).await?;
                    println!("removed {id}");
                }
                _ => {
                    session.remove_active_profile().await?;
                    println!("removed {}", active.id);
                }
            }
        }
    }
    Ok(())
}

fn print_profiles(set: &ProfileSet) {
    let active_id = set.active.as_ref().map(|p| p.id.as_str());
    for profile in &set.profiles {
        let marker = if Some(profile.id.as_str()) == active_id {
            '*'
        } else {
            ' '
        };
        let endpoint = if profile.is_configured() {
            profile.url.as_str()
        } else {
            "(not configured)"
        };
        println!("{marker} {}\t{}\t{endpoint}", profile.id, profile.name);
    }
}

fn print_snapshot(snap: &StatusSnapshot, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(snap)?);
        return Ok(());
    }
    if !snap.reachable {
        match &snap.endpoint {
            Some(endpoint) => println!("no connection ({endpoint})"),
            None => println!("not configured"),
        }
        return Ok(());
    }
    let volume = match snap.volume {
        Some(v) if snap.volume_busy => format!("{v} (busy)"),
        Some(v) => v.to_string(),
        None => "-".to_string(),
    };
    let muted = match snap.muted {
        Some(true) => "yes",
        Some(false) => "no",
        None => "-",
    };
    let endpoint = snap.endpoint.as_deref().unwrap_or("-");
    println!(
        "power {}  volume {}  muted {}  {}",
        snap.power.label(),
        volume,
        muted,
        endpoint
    );
    Ok(())
}
