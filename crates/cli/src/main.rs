// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 SSH Proxy Manager Contributors

// SSH Proxy Manager - CLI Client
// Command-line interface for managing proxy profiles and the proxy session

mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};
use tracing_subscriber::EnvFilter;

use ssh_proxy_common::{Error, JumpHost, LogEntry, LogLevel, Profile, ProxySession, Theme};
use ssh_proxy_gui_core::logs::{default_export_file_name, format_entry, matches_search};
use ssh_proxy_gui_core::{
    AppCore, ClientConfig, LevelFilter, ProfileDraft, ProfileViewModel, SessionViewModel,
    SettingsPatch, StatusColor,
};

#[derive(Parser)]
#[command(name = "ssh-proxy")]
#[command(about = "SSH Proxy Manager CLI", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to client.toml (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage saved profiles
    Profile {
        #[command(subcommand)]
        action: ProfileCommands,
    },

    /// Start the proxy (uses the last selected profile if none is given)
    Start {
        /// Profile ID
        profile_id: Option<String>,
    },

    /// Stop the proxy
    Stop,

    /// Test the SSH connection of a profile without starting the proxy
    Test {
        /// Profile ID
        profile_id: Option<String>,
    },

    /// Show proxy status
    Status {
        /// Keep polling until Ctrl-C
        #[arg(short, long)]
        watch: bool,
    },

    /// Show backend logs
    Logs {
        #[command(subcommand)]
        action: Option<LogsCommands>,

        /// Level filter: all, DEBUG, INFO, WARN or ERROR
        #[arg(short, long, default_value = "all")]
        level: LevelFilter,

        /// Only show lines containing this text (case-insensitive)
        #[arg(short, long)]
        search: Option<String>,

        /// Keep printing new lines until Ctrl-C
        #[arg(short, long)]
        follow: bool,
    },

    /// Show or change application settings
    Settings {
        #[command(subcommand)]
        action: SettingsCommands,
    },

    /// Show or change how this client reaches the backend (client.toml)
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// List all profiles
    List {
        /// Output as JSON for scripting
        #[arg(short, long)]
        json: bool,
    },

    /// Show detailed information about a profile
    Show {
        /// Profile ID
        id: String,
    },

    /// Add a new profile
    Add {
        /// Profile name
        name: String,

        /// SSH server host
        #[arg(short = 'H', long)]
        host: String,

        /// SSH username
        #[arg(short, long)]
        user: String,

        /// SSH server port
        #[arg(short = 'P', long, default_value = "22")]
        port: String,

        /// SSH password (omit to use a key file or interactive auth)
        #[arg(long)]
        password: Option<String>,

        /// Path to SSH private key
        #[arg(short, long)]
        key_file: Option<String>,

        /// Local HTTP proxy listen address
        #[arg(long, default_value = ":8080")]
        http_addr: String,

        /// Local SOCKS5 listen address
        #[arg(long)]
        socks_addr: Option<String>,

        /// Do not configure the system proxy when started
        #[arg(long)]
        no_system_proxy: bool,

        /// Routing rule file
        #[arg(long)]
        rule_file: Option<String>,

        /// Jump host as user@host[:port], in connection order (repeatable)
        #[arg(short, long = "jump")]
        jump: Vec<JumpHost>,
    },

    /// Delete a profile
    Delete {
        /// Profile ID
        id: String,
    },
}

#[derive(Subcommand)]
enum LogsCommands {
    /// Clear the backend log history
    Clear,

    /// Write the full backend log history to a file
    Export {
        /// Destination file (defaults to ssh-proxy-logs-<date>.txt)
        path: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum SettingsCommands {
    /// Show current settings
    Show,

    /// Change settings
    Set {
        /// light, dark or system
        #[arg(long)]
        theme: Option<Theme>,

        /// UI language, e.g. en-US
        #[arg(long)]
        language: Option<String>,

        /// Verbose backend logging
        #[arg(long)]
        verbose: Option<bool>,

        /// Backend log file path (empty to disable)
        #[arg(long)]
        log_file: Option<String>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the resolved client configuration
    Show,

    /// Change backend connection settings and save them
    Set {
        /// Backend host
        #[arg(long)]
        host: Option<String>,

        /// Backend port
        #[arg(long)]
        port: Option<u16>,

        /// Token sent as X-Proxy-Token (empty to disable)
        #[arg(long)]
        token: Option<String>,

        /// Use HTTPS instead of plain HTTP
        #[arg(long)]
        https: Option<bool>,

        /// Request timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let client_config = config::load(cli.config.as_deref())?;

    // client.toml edits must work even when the stored backend settings do not
    let command = match cli.command {
        Commands::Config { action } => {
            if let Err(err) = configure(action, cli.config.as_deref(), &client_config) {
                report_error(&err);
                std::process::exit(1);
            }
            return Ok(());
        }
        command => command,
    };

    let core = config::build_core(&client_config, config::default_state_path())?;

    if let Err(err) = run(command, &core, &client_config).await {
        report_error(&err);
        std::process::exit(1);
    }

    Ok(())
}

async fn run(command: Commands, core: &AppCore, client_config: &ClientConfig) -> Result<()> {
    match command {
        Commands::Profile { action } => match action {
            ProfileCommands::List { json } => list_profiles(core, json).await?,
            ProfileCommands::Show { id } => show_profile(core, &id).await?,
            ProfileCommands::Add {
                name,
                host,
                user,
                port,
                password,
                key_file,
                http_addr,
                socks_addr,
                no_system_proxy,
                rule_file,
                jump,
            } => {
                let mut draft = ProfileDraft::new();
                draft.name = name;
                draft.host = host;
                draft.port = port;
                draft.user = user;
                draft.password = password.unwrap_or_default();
                draft.key_file = key_file.unwrap_or_default();
                draft.http_addr = http_addr;
                draft.socks_addr = socks_addr.unwrap_or_default();
                draft.system_proxy = !no_system_proxy;
                draft.rule_file = rule_file.unwrap_or_default();
                for hop in jump {
                    draft.add_jump_host(hop);
                }
                draft.set_jump_hosts_enabled(!draft.jump_hosts().is_empty());
                add_profile(core, &draft).await?;
            }
            ProfileCommands::Delete { id } => delete_profile(core, &id).await?,
        },
        Commands::Start { profile_id } => start_proxy(core, profile_id).await?,
        Commands::Stop => stop_proxy(core).await?,
        Commands::Test { profile_id } => test_connection(core, profile_id).await?,
        Commands::Status { watch } => {
            if watch {
                watch_status(core, client_config).await?;
            } else {
                let session = core.session.poll().await?;
                print_session(&session, core);
            }
        }
        Commands::Logs {
            action,
            level,
            search,
            follow,
        } => match action {
            Some(LogsCommands::Clear) => {
                core.logs.clear().await?;
                println!("{}", "Logs cleared".green());
            }
            Some(LogsCommands::Export { path }) => export_logs(core, path).await?,
            None => show_logs(core, level, search.unwrap_or_default(), follow).await?,
        },
        Commands::Settings { action } => match action {
            SettingsCommands::Show => show_settings(core).await?,
            SettingsCommands::Set {
                theme,
                language,
                verbose,
                log_file,
            } => {
                let patch = SettingsPatch {
                    theme,
                    language,
                    verbose,
                    log_file,
                };
                if patch.is_empty() {
                    anyhow::bail!("Nothing to change; pass at least one setting");
                }
                core.settings.update(&patch).await?;
                println!("{}", "Settings saved".green());
                show_settings(core).await?;
            }
        },
        // Runs in main before the core is built
        Commands::Config { .. } => {}
    }

    Ok(())
}

fn configure(action: ConfigCommands, config_path: Option<&Path>, client_config: &ClientConfig) -> Result<()> {
    match action {
        ConfigCommands::Show => show_client_config(client_config, config_path),
        ConfigCommands::Set {
            host,
            port,
            token,
            https,
            timeout,
        } => {
            let changes = config::ConnectionUpdate {
                host,
                port,
                token,
                https,
                timeout_secs: timeout,
            };
            if changes.is_empty() {
                anyhow::bail!("Nothing to change; pass at least one option");
            }
            let path = config::update(config_path, changes)?;
            println!(
                "{}",
                format!("Configuration saved to {}", path.display()).green()
            );
            let saved = config::load(Some(&path))?;
            show_client_config(&saved, Some(&path))
        }
    }
}

fn show_client_config(client_config: &ClientConfig, config_path: Option<&Path>) -> Result<()> {
    let path = config::resolve_path(config_path)?;
    let backend = &client_config.backend;

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Option").add_attribute(Attribute::Bold).fg(Color::Cyan),
        Cell::new("Value").add_attribute(Attribute::Bold).fg(Color::Cyan),
    ]);

    let token = if backend.auth_token.is_empty() {
        "(none)"
    } else {
        "(set)"
    };
    let rows = [
        ("file", path.display().to_string()),
        ("backend", backend.backend_base_url()),
        ("auth token", token.to_string()),
        ("request timeout", format!("{}s", backend.request_timeout_secs)),
        ("control poll", format!("{}ms", client_config.control_poll_interval_ms)),
        ("indicator poll", format!("{}ms", client_config.indicator_poll_interval_ms)),
    ];
    for (key, value) in rows {
        table.add_row(vec![Cell::new(key), Cell::new(value)]);
    }

    println!("{}", table);
    Ok(())
}

/// Print validation problems per field and backend failures as notices
fn report_error(err: &anyhow::Error) {
    match err.downcast_ref::<Error>() {
        Some(Error::Validation(errors)) => {
            eprintln!("{}", "Validation failed:".red().bold());
            for e in errors.iter() {
                eprintln!("  {} {}: {}", "✗".red(), e.field.to_string().bold(), e.message);
            }
        }
        Some(e) if e.is_transient() => {
            eprintln!("{} {}", "Backend:".yellow().bold(), e);
        }
        _ => eprintln!("{} {:#}", "Error:".red().bold(), err),
    }
}

async fn list_profiles(core: &AppCore, json: bool) -> Result<()> {
    let mut profiles = core.profiles.list().await?;

    if json {
        // JSON output for scripting
        println!("{}", serde_json::to_string_pretty(&profiles)?);
        return Ok(());
    }

    if profiles.is_empty() {
        println!("{}", "No profiles found.".yellow());
        println!(
            "Create one with: {}",
            "ssh-proxy profile add <name> --host <host> --user <user>".cyan()
        );
        return Ok(());
    }

    let selected = core.selected_profile().map(|p| p.id);
    profiles.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
    print_profiles_table(&profiles, selected.as_deref());
    Ok(())
}

fn print_profiles_table(profiles: &[Profile], selected: Option<&str>) {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);

    let header = ["", "Name", "ID", "Server", "Auth", "Via", "HTTP"];
    table.set_header(
        header
            .iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold).fg(Color::Cyan))
            .collect::<Vec<_>>(),
    );

    for profile in profiles {
        let vm = ProfileViewModel::from_profile(profile);
        let marker = if selected == Some(vm.id.as_str()) { "*" } else { "" };
        let via = if vm.jump_chain.is_empty() {
            "-".to_string()
        } else {
            vm.jump_chain
        };

        table.add_row(vec![
            Cell::new(marker).fg(Color::Yellow),
            Cell::new(&vm.name).fg(Color::Green),
            Cell::new(&vm.id).fg(Color::DarkGrey),
            Cell::new(vm.connection_summary),
            Cell::new(vm.auth_type_display),
            Cell::new(via),
            Cell::new(vm.http_addr),
        ]);
    }

    println!();
    println!("{}", table);
    println!();
    println!("{} profile(s) found", profiles.len().to_string().cyan());
    println!();
}

/// Show detailed information about a profile
async fn show_profile(core: &AppCore, id: &str) -> Result<()> {
    let profile = core
        .profiles
        .get(id)
        .await?
        .ok_or_else(|| Error::ProfileNotFound(id.to_string()))?;
    let vm = ProfileViewModel::from_profile(&profile);

    println!();
    println!("{}", format!("Profile: {}", profile.name).bold().green());
    println!("  ID: {}", profile.id.dimmed());

    println!();
    println!("{}", "  Connection:".bold());
    println!("    Host: {}", profile.host);
    println!("    Port: {}", profile.port);
    println!("    User: {}", profile.user);
    println!("    Auth: {}", vm.auth_type_display);

    if !profile.jump_hosts.is_empty() {
        println!();
        println!("{}", "  Jump Hosts:".bold());
        for (i, hop) in profile.jump_hosts.iter().enumerate() {
            let auth = if hop.password.is_some() { "password" } else { "key" };
            println!("    {}. {} ({})", i + 1, hop, auth.dimmed());
        }
        println!("    Route: {}", vm.jump_chain.cyan());
    }

    println!();
    println!("{}", "  Proxy:".bold());
    println!("    HTTP:         {}", profile.http_addr);
    if let Some(socks) = &profile.socks_addr {
        println!("    SOCKS5:       {}", socks);
    }
    println!("    System proxy: {}", profile.system_proxy);
    if let Some(rules) = &profile.rule_file {
        println!("    Rule file:    {}", rules);
    }

    for (label, at) in [
        ("Created", profile.created_at),
        ("Modified", profile.updated_at),
        ("Last used", profile.last_used_at),
    ] {
        if let Some(at) = at {
            println!(
                "  {}: {}",
                label,
                at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
            );
        }
    }
    println!();

    Ok(())
}

async fn add_profile(core: &AppCore, draft: &ProfileDraft) -> Result<()> {
    core.profiles.list().await?;
    if core.profiles.name_exists(&draft.name, None) {
        anyhow::bail!("Profile '{}' already exists", draft.name.yellow());
    }

    let profile = core.profiles.create(draft).await?;

    println!();
    println!(
        "{}",
        format!("Profile '{}' created successfully", profile.name).green()
    );
    println!("  ID: {}", profile.id.dimmed());
    if !profile.jump_hosts.is_empty() {
        println!("  Via: {}", profile.legacy_jump_hosts().join(" → "));
    }
    println!();

    Ok(())
}

async fn delete_profile(core: &AppCore, id: &str) -> Result<()> {
    core.profiles.delete(id).await?;
    println!("{}", format!("Profile '{}' deleted successfully", id).green());
    Ok(())
}

async fn select_if_given(core: &AppCore, profile_id: Option<String>) -> Result<()> {
    if let Some(id) = profile_id {
        core.profiles.list().await?;
        core.select_profile(&id)?;
    }
    Ok(())
}

async fn start_proxy(core: &AppCore, profile_id: Option<String>) -> Result<()> {
    select_if_given(core, profile_id).await?;

    let id = core.start_selected().await?;
    let name = core
        .selected_profile()
        .map(|p| p.name)
        .unwrap_or_else(|| id.clone());
    println!(
        "{}",
        format!("Start request sent for '{}'", name).green().bold()
    );

    // Status below is whatever the backend reported right after the command
    print_session(&core.session.status(), core);
    Ok(())
}

async fn stop_proxy(core: &AppCore) -> Result<()> {
    core.session.stop().await?;
    println!("{}", "Stop request sent".green().bold());
    print_session(&core.session.status(), core);
    Ok(())
}

async fn test_connection(core: &AppCore, profile_id: Option<String>) -> Result<()> {
    select_if_given(core, profile_id).await?;

    // The running check uses the latest snapshot
    core.session.poll().await?;
    let id = core.test_selected().await?;
    println!(
        "{}",
        format!("Connection test for '{}' succeeded", id).green().bold()
    );
    Ok(())
}

fn print_session(session: &ProxySession, core: &AppCore) {
    let vm = SessionViewModel::from_session(session, core.session.is_action_loading(), false);

    let status = match vm.status_color {
        StatusColor::Green => vm.status_text.green().bold(),
        StatusColor::Orange => vm.status_text.yellow().bold(),
        StatusColor::Red => vm.status_text.red().bold(),
        StatusColor::Gray => vm.status_text.dimmed(),
    };

    print!("{}", status);
    if !vm.connection_summary.is_empty() {
        print!("  {}", vm.connection_summary);
    }
    if let Some(uptime) = &vm.uptime {
        print!("  up {}", uptime);
    }
    if vm.status == ssh_proxy_common::ProxyStatus::Running {
        print!("  http {}", vm.http_addr);
        if let Some(socks) = &vm.socks_addr {
            print!("  socks5 {}", socks);
        }
        print!("  {} requests", vm.total_requests);
    }
    println!();

    if let Some(message) = &vm.error_message {
        println!("  {}", message.red());
    }
}

async fn watch_status(core: &AppCore, client_config: &ClientConfig) -> Result<()> {
    let mut snapshots = core.session.watch();
    let _poller = core.session.spawn_poller(client_config.control_poll_interval());
    let mut notice: Option<String> = None;
    let mut ticker = tokio::time::interval(client_config.control_poll_interval());

    println!("{}", "Watching proxy status (Ctrl-C to stop)...".dimmed());

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let session = snapshots.borrow_and_update().clone();
                print_session(&session, core);
            }
            _ = ticker.tick() => {
                let current = core.session.last_error();
                if current != notice {
                    if let Some(message) = &current {
                        eprintln!("{} {}", "Backend:".yellow().bold(), message);
                    }
                    notice = current;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    Ok(())
}

fn print_log_line(entry: &LogEntry) {
    let line = format_entry(entry);
    let line = match entry.level {
        LogLevel::Error => line.red(),
        LogLevel::Warn => line.yellow(),
        LogLevel::Info => line.normal(),
        LogLevel::Debug => line.dimmed(),
    };
    println!("{}", line);
}

async fn show_logs(core: &AppCore, level: LevelFilter, search: String, follow: bool) -> Result<()> {
    core.logs.load_initial().await?;
    for entry in core.logs.filter(level, &search) {
        print_log_line(&entry);
    }

    if !follow {
        return Ok(());
    }

    core.logs
        .subscribe(Arc::new(move |entry: &LogEntry| {
            if level.matches(entry.level) && matches_search(&entry.message, &search) {
                print_log_line(entry);
            }
        }))
        .await?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    core.logs.unsubscribe();
    Ok(())
}

async fn export_logs(core: &AppCore, path: Option<PathBuf>) -> Result<()> {
    let path = path.unwrap_or_else(|| {
        PathBuf::from(default_export_file_name(chrono::Local::now().date_naive()))
    });

    // The backend writes the file, so hand it an absolute path
    let path = if path.is_absolute() {
        path
    } else {
        std::env::current_dir()
            .context("Failed to resolve current directory")?
            .join(path)
    };

    if core.logs.export(Some(&path)).await? {
        println!(
            "{}",
            format!("Logs exported to {}", path.display()).green()
        );
    }
    Ok(())
}

async fn show_settings(core: &AppCore) -> Result<()> {
    let settings = match core.settings.get() {
        Some(settings) => settings,
        None => core.settings.load().await?,
    };

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Setting").add_attribute(Attribute::Bold).fg(Color::Cyan),
        Cell::new("Value").add_attribute(Attribute::Bold).fg(Color::Cyan),
    ]);

    let log_file = if settings.log_file.is_empty() {
        "(disabled)".to_string()
    } else {
        settings.log_file.clone()
    };
    let rows = [
        ("theme", settings.theme.to_string()),
        ("language", settings.language.clone()),
        ("verbose", settings.verbose.to_string()),
        ("log file", log_file),
        ("auto start", settings.auto_start.to_string()),
        ("minimize to tray", settings.minimize_to_tray.to_string()),
        ("auto connect", settings.auto_connect.to_string()),
        ("default profile", settings.default_profile.clone()),
    ];
    for (key, value) in rows {
        table.add_row(vec![Cell::new(key), Cell::new(value)]);
    }

    println!("{}", table);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_profile_add_with_jumps() {
        let cli = Cli::try_parse_from([
            "ssh-proxy", "profile", "add", "office", "--host", "10.0.0.5", "--user", "deploy",
            "--jump", "ops@bastion", "--jump", "v@b:2200",
        ])
        .unwrap();

        match cli.command {
            Commands::Profile {
                action: ProfileCommands::Add { jump, port, http_addr, .. },
            } => {
                assert_eq!(jump, vec![JumpHost::new("bastion", "22", "ops"), JumpHost::new("b", "2200", "v")]);
                assert_eq!(port, "22");
                assert_eq!(http_addr, ":8080");
            }
            _ => panic!("expected profile add"),
        }
    }

    #[test]
    fn test_parse_logs_filters() {
        let cli = Cli::try_parse_from(["ssh-proxy", "logs", "--level", "ERROR", "-s", "timeout"]).unwrap();
        match cli.command {
            Commands::Logs { level, search, follow, action } => {
                assert_eq!(level, LevelFilter::Only(LogLevel::Error));
                assert_eq!(search.as_deref(), Some("timeout"));
                assert!(!follow);
                assert!(action.is_none());
            }
            _ => panic!("expected logs"),
        }

        assert!(Cli::try_parse_from(["ssh-proxy", "logs", "--level", "loud"]).is_err());
    }

    #[test]
    fn test_parse_settings_set() {
        let cli = Cli::try_parse_from(["ssh-proxy", "settings", "set", "--theme", "dark", "--verbose", "true"]).unwrap();
        match cli.command {
            Commands::Settings {
                action: SettingsCommands::Set { theme, verbose, language, .. },
            } => {
                assert_eq!(theme, Some(Theme::Dark));
                assert_eq!(verbose, Some(true));
                assert!(language.is_none());
            }
            _ => panic!("expected settings set"),
        }
    }

    #[test]
    fn test_parse_config_set() {
        let cli = Cli::try_parse_from([
            "ssh-proxy", "--config", "/tmp/client.toml", "config", "set", "--host", "proxy.lan", "--https", "true",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/client.toml")));
        match cli.command {
            Commands::Config {
                action: ConfigCommands::Set { host, https, port, .. },
            } => {
                assert_eq!(host.as_deref(), Some("proxy.lan"));
                assert_eq!(https, Some(true));
                assert!(port.is_none());
            }
            _ => panic!("expected config set"),
        }
    }
}
