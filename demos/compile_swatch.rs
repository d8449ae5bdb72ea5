use courser::{GenerateOpts, KnitoutFile, Pattern};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let s = include_str!("../tests/data/rib_swatch.json");
    let pattern: Pattern = serde_json::from_str(s)?;
    pattern.validate()?;

    let mut file = KnitoutFile::new();
    let report = pattern.generate(&mut file, &GenerateOpts::default())?;
    for w in &report.warnings {
        eprintln!("warning: {w}");
    }
    println!("{}", file.as_text());

    Ok(())
}
