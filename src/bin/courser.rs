use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "courser", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile a pattern into a knitout file.
    Compile(CompileArgs),
    /// Validate a pattern and dry-run the compile without writing output.
    Check(CheckArgs),
}

#[derive(Parser, Debug)]
struct CompileArgs {
    /// Input pattern JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output knitout path.
    #[arg(long)]
    out: PathBuf,

    /// Machine family to compile for.
    #[arg(long, value_enum, default_value_t = courser::BackendKind::Swg)]
    backend: courser::BackendKind,

    /// Value for the `;;Position:` header.
    #[arg(long, value_enum, default_value_t = courser::Position::Keep)]
    position: courser::Position,

    /// Free-text description, emitted as a comment after the headers.
    #[arg(long, default_value = "")]
    description: String,

    /// Spread the pattern over every other needle.
    #[arg(long)]
    half_gauge: bool,

    /// Keep fractional racking in place around transfers instead of
    /// temporarily aligning it (misaligned transfers become warnings).
    #[arg(long)]
    no_auto_align: bool,
}

#[derive(Parser, Debug)]
struct CheckArgs {
    /// Input pattern JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Machine family to compile for.
    #[arg(long, value_enum, default_value_t = courser::BackendKind::Swg)]
    backend: courser::BackendKind,

    /// Spread the pattern over every other needle.
    #[arg(long)]
    half_gauge: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Compile(args) => cmd_compile(args),
        Command::Check(args) => cmd_check(args),
    }
}

fn read_pattern_json(path: &Path) -> anyhow::Result<courser::Pattern> {
    let f = File::open(path).with_context(|| format!("open pattern '{}'", path.display()))?;
    let r = BufReader::new(f);
    let pattern: courser::Pattern =
        serde_json::from_reader(r).with_context(|| "parse pattern JSON")?;
    Ok(pattern)
}

fn cmd_compile(args: CompileArgs) -> anyhow::Result<()> {
    let pattern = read_pattern_json(&args.in_path)?;
    pattern.validate()?;

    let mut opts = courser::GenerateOpts::for_backend(args.backend);
    opts.position = args.position;
    opts.description = args.description;
    opts.half_gauge = args.half_gauge;
    opts.auto_align = !args.no_auto_align;

    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }

    let report = pattern.generate_to_path(&args.out, &opts)?;
    for warning in &report.warnings {
        eprintln!("warning: {warning}");
    }

    eprintln!("wrote {} ({} courses)", args.out.display(), report.courses);
    Ok(())
}

fn cmd_check(args: CheckArgs) -> anyhow::Result<()> {
    let pattern = read_pattern_json(&args.in_path)?;
    pattern.validate()?;

    let mut opts = courser::GenerateOpts::for_backend(args.backend);
    opts.half_gauge = args.half_gauge;

    let mut sink = courser::InMemorySink::new();
    let report = pattern.generate(&mut sink, &opts)?;
    for warning in &report.warnings {
        eprintln!("warning: {warning}");
    }

    eprintln!(
        "ok: {} courses, {} instructions, {} warnings",
        report.courses,
        sink.ops().len(),
        report.warnings.len()
    );
    Ok(())
}
