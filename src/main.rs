//! Recovery UI
//!
//! Session binary: brings up the console on the framebuffer, starts the
//! pollers and runs the root menu until the device reboots or powers off.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use recovery_ui::input::{evdev_handler, keys};
use recovery_ui::platform::sysfs::{BoardPaths, SysfsBoard};
use recovery_ui::platform::{self, Board};
use recovery_ui::{ui, Console, Icon, KeyWait, UiConfig};

const ROOT_ITEMS: [&str; 4] = ["reboot system now", "power off", "toggle log", "show log tail"];
const DEFAULT_LOG: &str = "/tmp/recovery.log";
const LOG_TAIL_LINES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RootAction {
    Reboot,
    PowerOff,
    ToggleLog,
    ShowLogTail,
}

impl RootAction {
    fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(RootAction::Reboot),
            1 => Some(RootAction::PowerOff),
            2 => Some(RootAction::ToggleLog),
            3 => Some(RootAction::ShowLogTail),
            _ => None,
        }
    }
}

fn main() {
    tracing_subscriber::fmt::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .init();

    info!("Recovery UI starting...");

    match run() {
        Ok(()) => {
            info!("Recovery UI exiting cleanly");
            process::exit(0);
        }
        Err(e) => {
            error!("Fatal error: {:#}", e);
            eprintln!("\nFATAL ERROR: {:#}", e);
            process::exit(1);
        }
    }
}

fn run() -> Result<()> {
    let config = UiConfig::from_env().context("Failed to load UI configuration")?;
    let board: Arc<dyn Board> = Arc::new(SysfsBoard::new(BoardPaths::from_env()));

    platform::enforce_integrity(board.as_ref()).context("Board integrity check failed")?;

    let provider = ui::create_provider(&config.res_dir).context("Failed to create surface provider")?;
    let console = Console::new(provider, board.clone(), config);
    console
        .start(evdev_handler::create_source())
        .context("Failed to start console")?;

    console.set_background(Icon::Clockwork);
    console.set_root_menu(true);

    let log_path = std::env::var_os("RECOVERY_LOG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG));

    root_menu(&console, board.as_ref(), &log_path)
}

/// Run the root menu until the key queue is cancelled or the board goes down.
fn root_menu(console: &Console, board: &dyn Board, log_path: &Path) -> Result<()> {
    let headers = ["Recovery", "Use volume keys to move, power to select", ""];
    console.start_menu(&headers, &ROOT_ITEMS, 0);

    loop {
        let code = match console.wait_for_key() {
            KeyWait::Key(code) => code,
            KeyWait::Refresh => {
                info!("Storage changed");
                continue;
            }
            KeyWait::TimedOut => continue,
            KeyWait::Cancelled => {
                info!("Key wait cancelled; leaving root menu");
                console.end_menu();
                return Ok(());
            }
        };

        // Any key means someone is at the device.
        console.cancel_countdown();

        match code {
            keys::KEY_UP | keys::KEY_VOLUMEUP => {
                console.move_selection(-1);
            }
            keys::KEY_DOWN | keys::KEY_VOLUMEDOWN => {
                console.move_selection(1);
            }
            keys::KEY_ENTER | keys::KEY_POWER => {
                let Some(action) = RootAction::from_index(console.selected_item()) else {
                    continue;
                };
                dispatch(console, board, action, log_path)?;
            }
            _ => {}
        }
    }
}

fn dispatch(console: &Console, board: &dyn Board, action: RootAction, log_path: &Path) -> Result<()> {
    info!("Root menu: {:?}", action);
    match action {
        RootAction::Reboot => {
            console.print("Rebooting...\n");
            board.restart().context("Reboot failed")?;
        }
        RootAction::PowerOff => {
            console.print("Shutting down...\n");
            board.power_off().context("Power off failed")?;
        }
        RootAction::ToggleLog => {
            console.set_log_visible(!console.is_log_visible());
        }
        RootAction::ShowLogTail => {
            console.set_log_visible(true);
            if let Err(e) = console.print_log_tail(log_path, LOG_TAIL_LINES) {
                warn!("{:#}", e);
                console.print(&format!("Cannot read {}\n", log_path.display()));
            }
        }
    }
    Ok(())
}
