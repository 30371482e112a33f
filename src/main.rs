use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use volume_hud_engine::config::ConfigLoader;
use volume_hud_engine::logging::{LoggingConfig, cleanup_old_logs, initialize_logging};

const LOG_RETENTION_DAYS: u64 = 14;

#[derive(Parser)]
#[command(name = "volume-hud-engine")]
#[command(about = "macOS media-key interception and volume state engine for a volume HUD")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine (default)
    Run,
    /// Show the default output device and its volume state
    Status,
    /// Accessibility permission management
    Permission {
        #[command(subcommand)]
        action: PermissionAction,
    },
    /// Validate configuration file
    CheckConfig,
}

#[derive(Subcommand)]
enum PermissionAction {
    /// Report whether media keys can be intercepted
    Check,
    /// Prompt for access and open the Accessibility settings pane
    Request,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loader = ConfigLoader::from_optional_path(cli.config.clone())?;

    match cli.command {
        Some(Commands::CheckConfig) => check_config(&loader),
        Some(Commands::Status) => {
            init_console_logging(cli.verbose)?;
            show_status()
        }
        Some(Commands::Permission { action }) => {
            init_console_logging(cli.verbose)?;
            permission(action)
        }
        Some(Commands::Run) | None => {
            let config = loader.load_config()?;
            let (_guard, log_dir) =
                initialize_logging(LoggingConfig::from_general(&config.general, cli.verbose))?;
            if let Some(dir) = log_dir {
                cleanup_old_logs(&dir, LOG_RETENTION_DAYS)?;
            }
            info!(
                "Configuration loaded from {}",
                loader.get_config_path().display()
            );
            run(config, &loader).await
        }
    }
}

fn init_console_logging(verbose: bool) -> Result<()> {
    let config = LoggingConfig {
        level: if verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        },
        file_output: false,
        ..LoggingConfig::default()
    };
    initialize_logging(config)?;
    Ok(())
}

fn check_config<F: volume_hud_engine::system::FileSystemInterface>(
    loader: &ConfigLoader<F>,
) -> Result<()> {
    println!("Configuration validation:");
    println!("  File: {}", loader.get_config_path().display());

    match loader.load_config() {
        Ok(config) => {
            println!("  ✓ Configuration file parsed successfully");
            println!(
                "  ✓ Steps: {} coarse, {} fine (unmute fallback {:.2})",
                config.volume.coarse_steps, config.volume.fine_steps, config.volume.unmute_fallback
            );
            println!(
                "  ✓ Debounce: {}ms, device liveness watching: {}",
                config.monitor.debounce_ms, config.monitor.watch_device_liveness
            );
            Ok(())
        }
        Err(e) => {
            println!("  ✗ {:#}", e);
            Err(e)
        }
    }
}

#[cfg(target_os = "macos")]
async fn run<F: volume_hud_engine::system::FileSystemInterface>(
    config: volume_hud_engine::Config,
    loader: &ConfigLoader<F>,
) -> Result<()> {
    use volume_hud_engine::HudService;
    use volume_hud_engine::audio::levels::render_bar;
    use volume_hud_engine::system::{
        AccessibilityPermissions, CGEventTapBackend, CoreAudioHardware,
    };

    let mut service = HudService::new(
        CoreAudioHardware::new(),
        CGEventTapBackend::new(),
        AccessibilityPermissions::new(),
        config,
    );

    service.subscribe(|change| {
        info!(
            "{} [{}] {} ({})",
            change.state,
            render_bar(change.state.volume(), change.state.is_muted()),
            change.state.level(),
            change.reason
        );
    });

    println!("Volume HUD engine started");
    println!("  Press Ctrl+C to stop, send SIGHUP to reload configuration");

    service.run(loader).await?;

    println!("Volume HUD engine stopped");
    Ok(())
}

#[cfg(target_os = "macos")]
fn show_status() -> Result<()> {
    use volume_hud_engine::audio::levels::{nearest_standard_level, render_bar, render_ticks};
    use volume_hud_engine::audio::{VolumeLevel, VolumeState};
    use volume_hud_engine::system::{AudioHardware, CoreAudioHardware};

    let audio = CoreAudioHardware::new();

    let Some(device) = audio.default_output_device() else {
        println!("No default output device");
        return Ok(());
    };
    let bindings = audio.resolve_bindings(device);

    let volume = bindings
        .volume
        .and_then(|control| audio.get_volume(device, control));
    let muted = bindings
        .mute
        .and_then(|control| audio.get_mute(device, control))
        .unwrap_or(false);

    println!("Default output: {}", bindings);
    match volume {
        Some(volume) => {
            let state = VolumeState::new(volume, muted, Some(device));
            println!("  Volume: {:.4}{}", state.volume(), if muted { " (muted)" } else { "" });
            println!("  Level:  {}", VolumeLevel::classify(state.volume(), muted));
            println!("  {}", render_bar(state.volume(), muted));
            println!("   {}", render_ticks(state.volume(), muted));
            println!(
                "  Nearest standard step: {}/16",
                nearest_standard_level(state.volume())
            );
        }
        None => println!("  Volume: not adjustable"),
    }

    Ok(())
}

#[cfg(target_os = "macos")]
fn permission(action: PermissionAction) -> Result<()> {
    use volume_hud_engine::system::{AccessibilityPermissions, PermissionChecker};

    let permissions = AccessibilityPermissions::new();
    match action {
        PermissionAction::Check => {
            if permissions.is_trusted() {
                println!("✓ Accessibility access granted, media keys can be intercepted");
            } else {
                println!("✗ Accessibility access not granted");
                println!("  Run `volume-hud-engine permission request` to grant it");
            }
        }
        PermissionAction::Request => {
            if permissions.is_trusted() {
                println!("✓ Accessibility access already granted");
            } else {
                permissions.request()?;
                println!("Opened System Settings > Privacy & Security > Accessibility");
            }
        }
    }
    Ok(())
}

#[cfg(not(target_os = "macos"))]
async fn run<F: volume_hud_engine::system::FileSystemInterface>(
    _config: volume_hud_engine::Config,
    _loader: &ConfigLoader<F>,
) -> Result<()> {
    anyhow::bail!("volume-hud-engine requires macOS")
}

#[cfg(not(target_os = "macos"))]
fn show_status() -> Result<()> {
    anyhow::bail!("volume-hud-engine requires macOS")
}

#[cfg(not(target_os = "macos"))]
fn permission(_action: PermissionAction) -> Result<()> {
    anyhow::bail!("volume-hud-engine requires macOS")
}
