use std::path::PathBuf;
use std::sync::Arc;

use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio::runtime::Handle;

use crate::api::ApiClient;
use crate::dispatch::{Dispatcher, Notifier};
use crate::models::{Capability, DeviceSnapshot, Role};
use crate::poll::{
    spawn_device_poll, spawn_heartbeat_poll, PollHandle, DEVICE_POLL_PERIOD, HEARTBEAT_POLL_PERIOD,
};
use crate::session::{AuthError, SessionStore};
use crate::state::{refresh_fleet, DeviceCache, FleetCache, HeartbeatLog};
use crate::view::{select_view, ConsoleView};

/// Prints operator notifications as colored terminal lines.
pub struct TermNotifier;

impl Notifier for TermNotifier {
    fn success(&self, message: &str) {
        println!("{} {}", "Success:".green(), message);
    }

    fn error(&self, message: &str) {
        println!("{} {}", "Error:".red(), message);
    }
}

/// Terminal console for operating the device-management backend.
///
/// Owns the main thread with a readline loop; poll loops run on the tokio
/// runtime behind the given handle. Which commands are live depends on the
/// view selected from the session's role claim.
pub struct Console {
    api: ApiClient,
    session: SessionStore,
    dispatcher: Dispatcher,
    rt: Handle,
    editor: DefaultEditor,
    history_path: PathBuf,
    bound_device: String,

    device_cache: DeviceCache,
    fleet_cache: FleetCache,
    heartbeat_log: HeartbeatLog,

    view: Option<ConsoleView>,
    device_poll: Option<PollHandle>,
    heartbeat_poll: Option<PollHandle>,
}

impl Console {
    pub fn new(
        api: ApiClient,
        session: SessionStore,
        rt: Handle,
        bound_device: String,
    ) -> anyhow::Result<Self> {
        let mut editor = DefaultEditor::new()?;
        let history_path = dirs::home_dir()
            .unwrap_or_default()
            .join(".mdm_console_history");

        // Load history if it exists
        if editor.load_history(&history_path).is_err() {
            println!("{}", "No previous history.".yellow());
        }

        let dispatcher = Dispatcher::new(api.clone(), Arc::new(TermNotifier));

        Ok(Self {
            api,
            session,
            dispatcher,
            rt,
            editor,
            history_path,
            bound_device,
            device_cache: DeviceCache::new(),
            fleet_cache: FleetCache::new(),
            heartbeat_log: HeartbeatLog::new(),
            view: None,
            device_poll: None,
            heartbeat_poll: None,
        })
    }

    /// Print available commands
    fn print_help(&self) {
        println!("\n{}", "Commands:".green().bold());
        println!("  {} - log in as an operator", "login <username> <password>".cyan());
        println!("  {} - end the session", "logout".cyan());
        println!("  {} - who is logged in", "whoami".cyan());
        println!("  {} - list all devices (admin)", "devices".cyan());
        println!("  {} - re-fetch the device list (admin)", "refresh".cyan());
        println!("  {} - show the bound device", "status".cyan());
        println!(
            "  {} - flip a capability (camera|microphone|bluetooth)",
            "toggle [device_id] <capability>".cyan()
        );
        println!("  {} - show observed heartbeats", "heartbeats".cyan());
        println!("  {} - show this help message", "help".cyan());
        println!("  {} - clear the screen", "clear".cyan());
        println!("  {} - exit the console", "exit".cyan());
        println!();
    }

    /// Process a command entered by the operator.
    fn handle_command(&mut self, command: &str) -> bool {
        let parts: Vec<&str> = command.trim().split_whitespace().collect();
        match parts.first().copied() {
            Some("exit") | Some("quit") => {
                println!("{}", "Goodbye!".green());
                false
            }
            Some("help") => {
                self.print_help();
                true
            }
            Some("clear") => {
                print!("\x1B[2J\x1B[1;1H");
                true
            }
            Some("login") => {
                if parts.len() != 3 {
                    println!("{}", "Usage: login <username> <password>".red());
                } else {
                    self.handle_login(parts[1], parts[2]);
                }
                true
            }
            Some("logout") => {
                self.handle_logout();
                true
            }
            Some("whoami") => {
                self.handle_whoami();
                true
            }
            Some("devices") => {
                self.handle_devices();
                true
            }
            Some("refresh") => {
                self.handle_refresh();
                true
            }
            Some("status") => {
                self.handle_status();
                true
            }
            Some("toggle") => {
                self.handle_toggle(&parts[1..]);
                true
            }
            Some("heartbeats") => {
                self.handle_heartbeats();
                true
            }
            Some(cmd) => {
                println!("{} {}", "Unknown command:".red(), cmd);
                true
            }
            None => true,
        }
    }

    fn handle_login(&mut self, username: &str, password: &str) {
        if self.session.context().is_authenticated() {
            println!("{}", "Already logged in; logout first.".yellow());
            return;
        }

        let result = self
            .rt
            .block_on(self.session.login(&self.api, username, password));
        match result {
            Ok(()) => {
                println!("{} logged in as {}", "Success:".green(), username.cyan());
                self.mount_view();
            }
            Err(AuthError::Rejected { .. }) => {
                println!("{}", "Login failed: invalid credentials".red());
            }
            Err(e) => {
                println!("{} {}", "Login failed:".red(), e);
            }
        }
    }

    fn handle_logout(&mut self) {
        self.unmount_view();
        self.session.logout();
        println!("{}", "Logged out.".green());
    }

    fn handle_whoami(&self) {
        match self.session.current_claims() {
            Some(claims) => {
                let expiry = chrono::DateTime::from_timestamp(claims.exp, 0)
                    .map(|ts| ts.to_rfc3339())
                    .unwrap_or_else(|| "unknown".to_string());
                println!(
                    "{} (role: {}, session expires {})",
                    claims.username.cyan(),
                    match claims.role {
                        Role::Admin => "admin".yellow(),
                        Role::User => "user".blue(),
                    },
                    expiry
                );
            }
            None => println!("{}", "Not logged in.".yellow()),
        }
    }

    fn handle_devices(&self) {
        if self.view != Some(ConsoleView::Fleet) {
            println!("{}", "The device list is for admin sessions.".red());
            return;
        }
        match self.fleet_cache.get() {
            Some(fleet) if !fleet.is_empty() => {
                println!("\n{}", "All devices:".green().bold());
                for device in &fleet {
                    Self::print_device_row(device);
                }
                println!();
            }
            Some(_) => println!("{}", "No devices registered.".yellow()),
            None => println!("{}", "Device list not loaded yet; try refresh.".yellow()),
        }
    }

    fn handle_refresh(&self) {
        if self.view != Some(ConsoleView::Fleet) {
            println!("{}", "The device list is for admin sessions.".red());
            return;
        }
        self.fetch_fleet_visible();
        self.handle_devices();
    }

    fn handle_status(&self) {
        if self.view != Some(ConsoleView::BoundDevice) {
            println!("{}", "status shows the bound device; use devices instead.".red());
            return;
        }
        match self.device_cache.get() {
            Some(device) => Self::print_device_card(&device),
            None => println!("{}", "No snapshot yet; the poller is on it.".yellow()),
        }
    }

    fn handle_toggle(&mut self, args: &[&str]) {
        match self.view {
            Some(ConsoleView::Fleet) => {
                if args.len() != 2 {
                    println!("{}", "Usage: toggle <device_id> <capability>".red());
                    return;
                }
                let Some(capability) = Self::parse_capability(args[1]) else {
                    return;
                };
                let device_id = args[0].to_string();
                // Outcome and notifications are the dispatcher's business.
                let _ = self.rt.block_on(self.dispatcher.toggle_in_fleet(
                    &self.fleet_cache,
                    &device_id,
                    capability,
                ));
            }
            Some(ConsoleView::BoundDevice) => {
                if args.len() != 1 {
                    println!("{}", "Usage: toggle <capability>".red());
                    return;
                }
                let Some(capability) = Self::parse_capability(args[0]) else {
                    return;
                };
                let device_id = self.bound_device.clone();
                let _ = self.rt.block_on(self.dispatcher.toggle_device(
                    &self.device_cache,
                    &device_id,
                    capability,
                ));
            }
            None => println!("{}", "Log in first.".red()),
        }
    }

    fn handle_heartbeats(&self) {
        if self.view != Some(ConsoleView::BoundDevice) {
            println!("{}", "The heartbeat log follows the bound device view.".red());
            return;
        }
        let entries = self.heartbeat_log.entries();
        if entries.is_empty() {
            println!("{}", "No heartbeats observed yet.".yellow());
            return;
        }
        println!("\n{}", "Heartbeat log (newest first):".green().bold());
        for entry in entries {
            println!("  {}", entry);
        }
        println!();
    }

    fn parse_capability(raw: &str) -> Option<Capability> {
        match raw.parse::<Capability>() {
            Ok(capability) => Some(capability),
            Err(e) => {
                println!("{} {}", "Error:".red(), e);
                None
            }
        }
    }

    /// Select the view from the role claim and start its poll loops. The
    /// fleet view gets one on-mount fetch (re-triggered by dispatch or
    /// `refresh`); the bound-device view gets the status and heartbeat
    /// loops.
    fn mount_view(&mut self) {
        let role = self.session.current_role();
        let view = select_view(role);
        self.view = Some(view);

        match view {
            ConsoleView::Fleet => {
                println!("Role {} -> fleet view.", "admin".yellow());
                self.fetch_fleet_visible();
            }
            ConsoleView::BoundDevice => {
                println!(
                    "Role {} -> bound device {}.",
                    "user".blue(),
                    self.bound_device.cyan()
                );
                self.device_poll = Some(spawn_device_poll(
                    &self.rt,
                    self.api.clone(),
                    self.device_cache.clone(),
                    self.bound_device.clone(),
                    DEVICE_POLL_PERIOD,
                ));
                self.heartbeat_poll = Some(spawn_heartbeat_poll(
                    &self.rt,
                    self.api.clone(),
                    self.heartbeat_log.clone(),
                    self.bound_device.clone(),
                    HEARTBEAT_POLL_PERIOD,
                ));
            }
        }
    }

    /// Stop this view's loops and drop its cached state. Each loop is
    /// cancelled on its own; there is nothing to coordinate across views.
    fn unmount_view(&mut self) {
        self.device_poll = None;
        self.heartbeat_poll = None;
        self.device_cache.clear();
        self.fleet_cache.clear();
        self.heartbeat_log.clear();
        self.view = None;
    }

    /// Fleet fetch with operator-visible failure. A missing fleet breaks
    /// navigation, unlike a stale single card.
    fn fetch_fleet_visible(&self) {
        if let Err(e) = self
            .rt
            .block_on(refresh_fleet(&self.api, &self.fleet_cache))
        {
            println!("{} {}", "Failed to fetch device list:".red(), e);
        }
    }

    fn enabled_label(enabled: bool) -> ColoredString {
        if enabled {
            "Enabled".green()
        } else {
            "Disabled".red()
        }
    }

    fn print_device_row(device: &DeviceSnapshot) {
        println!(
            "{} | camera: {} | microphone: {} | bluetooth: {} | os: {} | battery: {}% | heartbeat: {}",
            device.device_id.cyan(),
            Self::enabled_label(device.camera_enabled),
            Self::enabled_label(device.microphone_enabled),
            Self::enabled_label(device.bluetooth_enabled),
            if device.os_version.is_empty() {
                "N/A"
            } else {
                &device.os_version
            },
            device.battery_level,
            device.last_heartbeat.yellow(),
        );
    }

    fn print_device_card(device: &DeviceSnapshot) {
        println!("\n{} {}", "Device:".green().bold(), device.device_id.cyan());
        println!("  Camera:     {}", Self::enabled_label(device.camera_enabled));
        println!(
            "  Microphone: {}",
            Self::enabled_label(device.microphone_enabled)
        );
        println!(
            "  Bluetooth:  {}",
            Self::enabled_label(device.bluetooth_enabled)
        );
        println!(
            "  OS version: {}",
            if device.os_version.is_empty() {
                "N/A"
            } else {
                &device.os_version
            }
        );
        println!("  Battery:    {}%", device.battery_level);
        println!("  Heartbeat:  {}", device.last_heartbeat.yellow());
        println!();
    }

    /// Run the console loop.
    pub fn run(&mut self) -> anyhow::Result<()> {
        println!("\n{}", "MDM operator console".green().bold());

        // A persisted session resumes before the first prompt, so the first
        // outbound call is already authenticated.
        if self.session.restore() {
            println!("{}", "Resumed persisted session.".green());
            self.mount_view();
        } else {
            println!("{}", "Not logged in; use login <username> <password>.".yellow());
        }
        self.print_help();

        loop {
            let prompt = format!("{} ", ">>".cyan().bold());
            match self.editor.readline(&prompt) {
                Ok(line) => {
                    self.editor.add_history_entry(line.as_str())?;
                    if !self.handle_command(&line) {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("{}", "CTRL-C".yellow());
                    break;
                }
                Err(ReadlineError::Eof) => {
                    println!("{}", "CTRL-D".yellow());
                    break;
                }
                Err(err) => {
                    println!("{} {:?}", "Error:".red(), err);
                    break;
                }
            }
        }

        self.unmount_view();

        // Save history
        if let Err(e) = self.editor.save_history(&self.history_path) {
            println!("{} {}", "Failed to save history:".red(), e);
        }

        Ok(())
    }
}
