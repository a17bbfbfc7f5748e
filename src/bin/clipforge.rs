use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "clipforge", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a composition into an interchange timeline file.
    Export(ExportArgs),
    /// Validate a composition and print its structure (optionally its resolved timeline).
    Inspect(InspectArgs),
}

#[derive(Parser, Debug)]
struct ResolveArgs {
    /// Resolution mode.
    #[arg(long, value_enum, default_value_t = ModeChoice::Default)]
    mode: ModeChoice,

    /// Durable media cache directory.
    #[arg(long, env = "CLIPFORGE_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Lifetime of new cache entries in seconds.
    #[arg(long)]
    cache_ttl_secs: Option<u64>,

    /// Directory relative `src` locators are read from (defaults to the composition's directory).
    #[arg(long)]
    media_root: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct ExportArgs {
    /// Input composition JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output timeline path.
    #[arg(long)]
    out: PathBuf,

    /// Interchange format.
    #[arg(long, value_enum, default_value_t = FormatChoice::Json)]
    format: FormatChoice,

    /// Refuse to replace an existing output file.
    #[arg(long)]
    no_overwrite: bool,

    #[command(flatten)]
    resolve: ResolveArgs,
}

#[derive(Parser, Debug)]
struct InspectArgs {
    /// Input composition JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Also resolve the composition and print the timeline as JSON.
    #[arg(long)]
    timeline: bool,

    #[command(flatten)]
    resolve: ResolveArgs,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeChoice {
    Strict,
    Default,
    Preview,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatChoice {
    Json,
    Xml,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Export(args) => cmd_export(args).await,
        Command::Inspect(args) => cmd_inspect(args).await,
    }
}

fn read_render(args_in: &Path) -> anyhow::Result<clipforge::RenderNode> {
    let render = clipforge::RenderNode::from_path(args_in)
        .with_context(|| format!("load composition '{}'", args_in.display()))?;
    render.validate()?;
    Ok(render)
}

fn resolve_opts(args: &ResolveArgs, in_path: &Path) -> clipforge::ResolveOpts {
    let mode = match args.mode {
        ModeChoice::Strict => clipforge::ResolveMode::Strict,
        ModeChoice::Default => clipforge::ResolveMode::Default,
        ModeChoice::Preview => clipforge::ResolveMode::Preview,
    };
    let root = args.media_root.clone().unwrap_or_else(|| {
        in_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
    });
    clipforge::ResolveOpts {
        mode,
        cache_dir: args.cache_dir.clone(),
        cache_ttl: args.cache_ttl_secs.map(Duration::from_secs),
        fetcher: Some(Arc::new(clipforge::LocalFetcher::with_root(root))),
        ..clipforge::ResolveOpts::default()
    }
}

async fn cmd_export(args: ExportArgs) -> anyhow::Result<()> {
    let render = read_render(&args.in_path)?;
    let opts = clipforge::ExportOpts {
        resolve: resolve_opts(&args.resolve, &args.in_path),
        format: match args.format {
            FormatChoice::Json => clipforge::InterchangeFormat::Json,
            FormatChoice::Xml => clipforge::InterchangeFormat::Xml,
        },
        out_path: args.out.clone(),
        overwrite: !args.no_overwrite,
    };

    let result = clipforge::export_timeline(&render, &opts).await?;
    for w in &result.warnings {
        eprintln!("warning [{:?}]: {}", w.kind, w.message);
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&result.summary).context("encode summary")?
    );
    eprintln!("wrote {}", result.timeline_path.display());
    Ok(())
}

async fn cmd_inspect(args: InspectArgs) -> anyhow::Result<()> {
    let render = read_render(&args.in_path)?;
    let fps = render.frame_rate()?;
    eprintln!(
        "{}x{} @ {}/{} fps, {} clip(s)",
        render.width,
        render.height,
        fps.num,
        fps.den,
        render.clip_count()
    );
    let tree = clipforge::Node::Render(render.clone()).describe();
    println!(
        "{}",
        serde_json::to_string_pretty(&tree).context("encode node tree")?
    );

    if args.timeline {
        let opts = resolve_opts(&args.resolve, &args.in_path);
        let mut timeline = clipforge::resolve_composition(&render, &opts).await?;
        // In-memory payloads have no serialized form; show where they would live instead.
        for asset in &mut timeline.assets {
            if asset.is_in_memory() {
                asset.payload = clipforge::MediaPayload::Location(format!("memory://{}", asset.id));
            }
        }
        println!(
            "{}",
            serde_json::to_string_pretty(&timeline).context("encode timeline")?
        );
    }
    Ok(())
}
