mod config;
mod follow;
mod load;
mod render;
mod session_ref;
mod tail;

use clap::{Parser, Subcommand, ValueEnum};
use sessionlens_runtime_config::OutputFormat;

#[derive(Parser)]
#[command(
    name = "sessionlens",
    about = "Rebuild readable conversations from Claude Code session logs"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a session as conversation turns
    View {
        /// Session file path, session id, HEAD (latest) or HEAD^N
        session: String,

        /// Output format (defaults to `view.format` from the config)
        #[arg(long, value_enum)]
        format: Option<FormatArg>,

        /// Also show progress / bookkeeping records
        #[arg(long)]
        include_noise: bool,

        /// Keep watching the session and print new turns as they complete
        #[arg(long, short = 'f')]
        follow: bool,
    },

    /// Show the task board after every task-tool call
    Tasks {
        session: String,
        #[arg(long, value_enum)]
        format: Option<FormatArg>,
    },

    /// Show which subagent each Task call spawned
    Agents {
        session: String,
        #[arg(long, value_enum)]
        format: Option<FormatArg>,
    },

    /// Print every merged record of a session as JSONL
    Export { session: String },

    /// Show the effective configuration
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    Text,
    Json,
}

impl FormatArg {
    fn resolve(arg: Option<Self>, configured: OutputFormat) -> render::Format {
        match (arg, configured) {
            (Some(Self::Json), _) | (None, OutputFormat::Json) => render::Format::Json,
            _ => render::Format::Text,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli.command).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(command: Commands) -> anyhow::Result<()> {
    if let Commands::Config = command {
        return config::show_config();
    }

    let cfg = config::load_config()?;
    match command {
        Commands::View {
            session,
            format,
            include_noise,
            follow,
        } => {
            let files = load::SessionFiles::resolve(&session, &cfg.sources.projects_dir)?;
            let options = config::reconstruct_options(&cfg, include_noise);
            let format = FormatArg::resolve(format, cfg.view.format);
            if follow {
                follow::run_follow(&files, &options, &cfg.live).await
            } else {
                render::run_view(&files, &options, format)
            }
        }
        Commands::Tasks { session, format } => {
            let files = load::SessionFiles::resolve(&session, &cfg.sources.projects_dir)?;
            let options = config::reconstruct_options(&cfg, false);
            render::run_tasks(&files, &options, FormatArg::resolve(format, cfg.view.format))
        }
        Commands::Agents { session, format } => {
            let files = load::SessionFiles::resolve(&session, &cfg.sources.projects_dir)?;
            let options = config::reconstruct_options(&cfg, false);
            render::run_agents(&files, &options, FormatArg::resolve(format, cfg.view.format))
        }
        Commands::Export { session } => {
            let files = load::SessionFiles::resolve(&session, &cfg.sources.projects_dir)?;
            render::run_export(&files)
        }
        Commands::Config => config::show_config(),
    }
}
