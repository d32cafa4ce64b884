use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    time::Instant,
};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use mmsummary::{
    config, logging,
    processing::{ChunkSettings, DEFAULT_LANGUAGE, DEFAULT_MODEL, SummarizeRequest, SummaryService},
};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(
    name = "mmsummary-cli",
    about = "Summarize long meeting transcripts from the command line"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Summarize one transcript or every `.txt` file under a directory.
    Summarize(SummarizeArgs),
    /// Split a transcript and report chunk sizes without calling a model.
    Split {
        #[arg(long)]
        file: PathBuf,
        #[arg(long, default_value_t = 16000)]
        chunk_size: usize,
        #[arg(long, default_value_t = 4000)]
        chunk_overlap: usize,
        #[arg(long, default_value = DEFAULT_MODEL)]
        model: String,
    },
}

#[derive(Args)]
struct SummarizeArgs {
    #[arg(long, conflicts_with = "input_dir", required_unless_present = "input_dir")]
    file: Option<PathBuf>,
    #[arg(long)]
    input_dir: Option<PathBuf>,
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,
    #[arg(long, default_value_t = 16000)]
    chunk_size_1: usize,
    #[arg(long, default_value_t = 4000)]
    chunk_overlap_1: usize,
    #[arg(long, default_value_t = 8000)]
    chunk_size_2: usize,
    #[arg(long, default_value_t = 0)]
    chunk_overlap_2: usize,
    #[arg(long, default_value_t = 16000)]
    token_max: usize,
    #[arg(long, default_value_t = 0.0)]
    temperature: f32,
    #[arg(long)]
    without_map: bool,
    #[arg(long, default_value = DEFAULT_LANGUAGE)]
    language: String,
    #[arg(long, default_value = "output")]
    output_dir: PathBuf,
    #[arg(long, default_value_t = 8)]
    max_collapse_rounds: usize,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    config::init_config();
    logging::init_cli_tracing();
    let service = SummaryService::from_config().context("failed to initialize summarizer")?;

    match cli.command {
        Command::Summarize(args) => summarize(&service, &args).await,
        Command::Split {
            file,
            chunk_size,
            chunk_overlap,
            model,
        } => split(&service, &file, chunk_size, chunk_overlap, &model),
    }
}

async fn summarize(service: &SummaryService, args: &SummarizeArgs) -> Result<()> {
    let inputs = match (&args.file, &args.input_dir) {
        (Some(file), _) => vec![file.clone()],
        (None, Some(dir)) => collect_transcripts(dir),
        (None, None) => bail!("either --file or --input-dir is required"),
    };
    if inputs.is_empty() {
        bail!("no .txt transcripts found");
    }

    for input in inputs {
        summarize_file(service, args, &input).await?;
    }
    Ok(())
}

async fn summarize_file(
    service: &SummaryService,
    args: &SummarizeArgs,
    input: &Path,
) -> Result<()> {
    let text = fs::read_to_string(input)
        .with_context(|| format!("failed to read transcript at {}", input.display()))?;
    let stem = input
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("transcript");
    println!("File: {stem} ({} characters)", text.chars().count());

    let started = Instant::now();
    let outcome = service
        .summarize(SummarizeRequest {
            text,
            chunk_size_1: args.chunk_size_1,
            chunk_overlap_1: args.chunk_overlap_1,
            chunk_size_2: args.chunk_size_2,
            chunk_overlap_2: args.chunk_overlap_2,
            token_max: args.token_max,
            temperature: args.temperature,
            reduce_temperature: args.temperature,
            model: args.model.clone(),
            use_map: !args.without_map,
            language: args.language.clone(),
            max_collapse_rounds: args.max_collapse_rounds,
            ..SummarizeRequest::default()
        })
        .await
        .with_context(|| format!("failed to summarize {}", input.display()))?;
    println!(
        "Done in {}s: {} primary chunks, {} secondary chunks, {} model calls",
        started.elapsed().as_secs(),
        outcome.stats.primary_chunks,
        outcome.stats.secondary_chunks,
        outcome.stats.model_calls
    );

    let output = args.output_dir.join(output_file_name(stem, args));
    println!("Output file: {}", output.display());
    println!("{}", outcome.summary);
    write_string(&output, &outcome.summary)
}

fn split(
    service: &SummaryService,
    file: &Path,
    chunk_size: usize,
    chunk_overlap: usize,
    model: &str,
) -> Result<()> {
    let text = fs::read_to_string(file)
        .with_context(|| format!("failed to read transcript at {}", file.display()))?;
    let chunks = service
        .split(&text, ChunkSettings::new(chunk_size, chunk_overlap), Some(model))
        .context("failed to split transcript")?;
    println!("Split into {} chunks", chunks.len());
    for chunk in &chunks {
        println!("#{}: {} tokens", chunk.sequence_index, chunk.token_count);
    }
    Ok(())
}

fn collect_transcripts(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| {
            e.file_type().is_file() && e.path().extension().is_some_and(|ext| ext == "txt")
        })
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

fn output_file_name(stem: &str, args: &SummarizeArgs) -> String {
    let suffix = if args.without_map { "_nomap" } else { "" };
    format!(
        "{stem}_output_{}_{}_{}_{}_{}{suffix}.txt",
        args.chunk_size_1,
        args.chunk_overlap_1,
        args.chunk_size_2,
        args.chunk_overlap_2,
        args.temperature
    )
}

fn write_string(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| {
            format!(
                "failed to create parent directories for {}",
                parent.display()
            )
        })?;
    }
    let mut file = fs::File::create(path)
        .with_context(|| format!("failed to create file at {}", path.display()))?;
    file.write_all(contents.as_bytes())
        .with_context(|| format!("failed to write data to {}", path.display()))?;
    Ok(())
}
