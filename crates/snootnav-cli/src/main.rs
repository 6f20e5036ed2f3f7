//! snootnav — drive fragment navigation from the command line.

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use snootnav::InterceptorConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "snootnav",
    about = "snootnav — follow links by swapping the page's main region",
    version
)]
struct Cli {
    /// Output results as JSON (machine-readable).
    #[arg(long, global = true)]
    json: bool,

    /// Container selector (default: SNOOTNAV_CONTAINER or "main").
    #[arg(long, global = true)]
    container: Option<String>,

    /// Request timeout in milliseconds.
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a page, click a link on it and print the swapped-in content.
    Follow {
        /// Page to start from.
        page_url: String,
        /// The href of the link to click, exactly as written on the page.
        href: String,
        /// Print the whole page instead of just the container.
        #[arg(long)]
        full: bool,
    },

    /// Load a page, then replace its container from a "<url> [selector]"
    /// instruction. Without a selector the whole body of the response is used.
    ///
    /// Examples:
    ///   snootnav load https://forge.test/ "/pricing main"
    ///   snootnav load https://forge.test/ /about
    Load {
        /// Page to start from.
        page_url: String,
        /// What to load, e.g. "/pricing main".
        instruction: String,
        /// Print the whole page instead of just the container.
        #[arg(long)]
        full: bool,
    },

    /// List the links on a page and whether clicks on them are intercepted.
    Links {
        /// Page to inspect.
        page_url: String,
    },

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   snootnav completions bash > ~/.local/share/bash-completion/completions/snootnav
    ///   snootnav completions zsh > ~/.zfunc/_snootnav
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = InterceptorConfig::from_env();
    if let Some(container) = cli.container {
        config.container_selector = container;
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.timeout_ms = timeout_ms;
    }

    match cli.command {
        Commands::Follow {
            page_url,
            href,
            full,
        } => commands::follow(config, &page_url, &href, full, cli.json).await,
        Commands::Load {
            page_url,
            instruction,
            full,
        } => commands::load(config, &page_url, &instruction, full, cli.json).await,
        Commands::Links { page_url } => commands::links(config, &page_url, cli.json).await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "snootnav", &mut std::io::stdout());
            Ok(())
        }
    }
}
