use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "acct")]
#[command(about = "Incremental cloud accounting reconciliation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile and publish one window per subject, then advance watermarks
    Run {
        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Subjects to run (default: every configured project)
        #[arg(long = "subject")]
        subjects: Vec<String>,

        /// Window end (default: now, UTC)
        #[arg(long)]
        to: Option<String>,

        /// Print records as JSON lines; publish nothing, write no watermark
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },

    /// Inspect or correct a subject's watermark
    Watermark {
        #[command(subcommand)]
        cmd: WatermarkCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

#[derive(Subcommand)]
enum WatermarkCmd {
    /// Print the stored instant, or `none`
    Get {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        #[arg(long)]
        subject: String,
    },

    /// Overwrite the stored instant (operator correction)
    Set {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        #[arg(long)]
        subject: String,

        /// Date or datetime, UTC
        #[arg(long)]
        at: String,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Dev convenience only; absent file is fine.
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Run {
            config_paths,
            subjects,
            to,
            dry_run,
        } => {
            let (_, cfg) = commands::load_config(&config_paths)?;
            commands::run::run(cfg, subjects, to.as_deref(), dry_run).await?;
        }

        Commands::Watermark { cmd } => match cmd {
            WatermarkCmd::Get {
                config_paths,
                subject,
            } => {
                let (_, cfg) = commands::load_config(&config_paths)?;
                commands::watermark::get(&cfg, &subject).await?;
            }
            WatermarkCmd::Set {
                config_paths,
                subject,
                at,
            } => {
                let (_, cfg) = commands::load_config(&config_paths)?;
                commands::watermark::set(&cfg, &subject, &at).await?;
            }
        },

        Commands::ConfigHash { paths } => {
            let loaded = acct_config::load_layered_yaml(&paths)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }
    }

    Ok(())
}
