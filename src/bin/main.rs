use clap::{Parser, Subcommand};
use crossterm::style::Stylize;
use std::fs::File;
use std::io::{stdout, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use toponym_matcher::sources::KnowledgeBase;
use toponym_matcher::spi::KbGraph;
use toponym_matcher::{persistence, Linker, LinkerConfig, Resolution};

#[derive(Parser)]
#[command(name = "toponym-matcher")]
#[command(version)]
#[command(about = "Links the place names of an annotated text to knowledge-base entities")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve every toponym of a document
    Link {
        /// Annotated document (JSON)
        #[arg(long)]
        document: PathBuf,

        /// Knowledge-base extract (JSON)
        #[arg(long)]
        kb: PathBuf,

        /// Configuration file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Write the resolutions as JSON here instead of printing them
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Write the shortest-path tree of every KB resource to disk
    Precompute {
        /// Knowledge-base extract (JSON)
        #[arg(long)]
        kb: PathBuf,

        /// Directory receiving the tree files
        #[arg(long)]
        directory: PathBuf,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Link { document, kb, config, output } => link(document, kb, config, output),
        Commands::Precompute { kb, directory } => precompute(kb, directory),
    };
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn link(
    document: PathBuf,
    kb: PathBuf,
    config: Option<PathBuf>,
    output: Option<PathBuf>,
) -> toponym_matcher::Result<()> {
    let config = config.map(|p| LinkerConfig::load(&p)).unwrap_or_default();
    let mut linker = Linker::from_paths(&document, &kb, config)?;
    let resolutions = linker.compute();

    match output {
        Some(path) => {
            let writer = BufWriter::new(File::create(&path)?);
            serde_json::to_writer_pretty(writer, &resolutions)?;
            println!("{} resolutions written to {}", resolutions.len(), path.display());
        }
        None => print_resolutions(&resolutions)?,
    }
    Ok(())
}

fn print_resolutions(resolutions: &[Resolution]) -> std::io::Result<()> {
    let mut out = stdout().lock();
    for r in resolutions {
        let referent = match &r.referent {
            Some(resource) => resource.to_string().green(),
            None => "nil".to_string().red(),
        };
        let cost = r.cost.as_ref().map(|c| format!(" ({:.3})", c.total_cost)).unwrap_or_default();
        writeln!(out, "{:>6}  {:<30} -> {referent}{cost}", r.xml_id, r.name)?;
    }
    out.flush()
}

fn precompute(kb: PathBuf, directory: PathBuf) -> toponym_matcher::Result<()> {
    let kb = KnowledgeBase::from_path(&kb)?;
    let graph = KbGraph::from_store(&kb);
    let written = persistence::precompute_all(&graph, &directory)?;
    println!("{written} shortest-path trees written to {}", directory.display());
    Ok(())
}
