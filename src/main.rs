use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use devterm_plugin::plugins::builtin::builtin_plugins;
use devterm_plugin::plugins::{install_panic_hook, PluginInput, PluginManager, PluginResult};
use devterm_plugin::Config;

#[derive(Parser)]
#[command(name = "devterm-plugin")]
#[command(about = "DevTerm tool plugin host", version, long_about = None)]
struct Cli {
    /// Path to a config file (default: ~/.devterm/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Plugin discovery directory (overrides config and DEVTERM_PLUGIN_DIR)
    #[arg(long, global = true)]
    plugin_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover plugins, list them and run two sample invocations
    Demo,
    /// Discover and load every plugin, then list them
    List,
    /// Run one plugin and print its result as JSON
    Run {
        /// Plugin name
        name: String,
        /// Value for the `text` input
        #[arg(short, long)]
        text: Option<String>,
        /// Full input as a JSON object
        #[arg(short, long)]
        input: Option<String>,
    },
    /// Print a plugin's schema as JSON
    Schema {
        /// Plugin name
        name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);
    install_panic_hook();

    let mut config = match &cli.config {
        Some(path) => {
            let mut config = Config::load_from_path(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            config.apply_env_overrides();
            config
        }
        None => Config::load().context("Failed to load config")?,
    };
    if let Some(dir) = cli.plugin_dir {
        config.plugins.plugin_dir = dir;
    }

    match cli.command.unwrap_or(Commands::Demo) {
        Commands::Demo => demo(&config).await,
        Commands::List => list(&config),
        Commands::Run { name, text, input } => {
            let input = build_input(text, input.as_deref())?;
            let (manager, _) = start_host(&config)?;
            let timeout = config.plugins.execute_timeout();
            let Some(result) = execute(&manager, &name, input, timeout).await else {
                bail!("Plugin '{}' not found or failed to load", name);
            };
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Commands::Schema { name } => {
            let (manager, _) = start_host(&config)?;
            let schema = manager
                .get_plugin_schema(&name)
                .with_context(|| format!("Plugin '{}' failed to describe its schema", name))?;
            let Some(schema) = schema else {
                bail!("Plugin '{}' not found or failed to load", name);
            };
            println!("{}", serde_json::to_string_pretty(&schema)?);
            Ok(())
        }
    }
}

fn init_logging(verbose: bool, json: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    // Logs go to stderr so command output on stdout stays machine-readable.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Discover external plugins and register built-ins.
///
/// Returns the manager and the discovered plugin names.
fn start_host(config: &Config) -> anyhow::Result<(PluginManager, Vec<String>)> {
    let manager = PluginManager::from_config(&config.plugins);
    let discovered = manager.discover().with_context(|| {
        format!(
            "Failed to scan plugin directory {}",
            manager.plugin_dir().display()
        )
    })?;

    if config.plugins.load_builtins {
        for plugin in builtin_plugins() {
            manager.register_instance(plugin.into());
        }
    }

    Ok((manager, discovered))
}

async fn execute(
    manager: &PluginManager,
    name: &str,
    input: PluginInput,
    timeout: Option<Duration>,
) -> Option<PluginResult> {
    match timeout {
        Some(timeout) => manager.execute_with_timeout(name, input, timeout).await,
        None => manager.execute(name, &input),
    }
}

fn build_input(text: Option<String>, json: Option<&str>) -> anyhow::Result<PluginInput> {
    let mut input = match json {
        Some(raw) => match serde_json::from_str::<Value>(raw).context("Invalid --input JSON")? {
            Value::Object(map) => map,
            _ => bail!("--input must be a JSON object"),
        },
        None => PluginInput::new(),
    };
    if let Some(text) = text {
        input.insert("text".to_string(), Value::String(text));
    }
    Ok(input)
}

async fn demo(config: &Config) -> anyhow::Result<()> {
    println!("DevTerm Plugin System");
    println!("{}", "=".repeat(40));

    println!("\nDiscovering plugins...");
    let (manager, discovered) = start_host(config)?;
    println!("Found {} external plugins", discovered.len());
    println!("Total plugins: {}", manager.plugin_count());

    println!("\nAvailable plugins:");
    for info in manager.list_plugins() {
        println!("  - {}: {}", info.name, info.description);
    }

    println!("\nDemo - Running plugins:");
    let timeout = config.plugins.execute_timeout();
    for (name, text) in [
        ("uppercase", "hello world"),
        ("wordcount", "Hello world from DevTerm"),
    ] {
        let input = build_input(Some(text.to_string()), None)?;
        match execute(&manager, name, input, timeout).await {
            Some(result) => println!("  {}: {}", name, result),
            None => println!("  {}: unavailable", name),
        }
    }

    Ok(())
}

fn list(config: &Config) -> anyhow::Result<()> {
    let (manager, discovered) = start_host(config)?;
    for name in &discovered {
        manager.load(name);
    }

    let plugins = manager.list_plugins();
    if plugins.is_empty() {
        println!("No plugins available");
        return Ok(());
    }

    let width = plugins.iter().map(|p| p.name.len()).max().unwrap_or(0);
    for info in plugins {
        println!(
            "{:width$}  [{}]  {}",
            info.name,
            info.category,
            info.description,
            width = width
        );
    }
    Ok(())
}
