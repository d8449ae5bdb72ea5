use std::path::PathBuf;

use courser::{Pattern, Yarn};

#[test]
fn cli_compile_writes_knitout() {
    let dir = PathBuf::from("target").join("cli_smoke");
    std::fs::create_dir_all(&dir).unwrap();

    let pattern_path = dir.join("swatch.json");
    let out_path = dir.join("swatch.k");
    let _ = std::fs::remove_file(&out_path);

    let wool = Yarn::new("wool").unwrap();
    let mut pattern = Pattern::new();
    for _ in 0..4 {
        pattern.new_course(&[&wool], 0).unwrap();
        pattern.insert(&[&wool], "k", 12).unwrap();
    }
    pattern.map_yarn(&wool, 3, true, None);

    let f = std::fs::File::create(&pattern_path).unwrap();
    serde_json::to_writer_pretty(f, &pattern).unwrap();

    let exe = std::env::var_os("CARGO_BIN_EXE_courser")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let mut p = PathBuf::from("target").join("debug");
            p.push(if cfg!(windows) {
                "courser.exe"
            } else {
                "courser"
            });
            p
        });

    let pattern_arg = pattern_path.to_string_lossy().to_string();
    let out_arg = out_path.to_string_lossy().to_string();

    let status = std::process::Command::new(exe)
        .args(["compile", "--in", pattern_arg.as_str(), "--out"])
        .arg(out_arg.as_str())
        .status()
        .unwrap();

    assert!(status.success());
    let text = std::fs::read_to_string(&out_path).unwrap();
    assert!(text.starts_with(";!knitout-2\n"));
    assert!(text.contains("\nouthook 3\n"));
}
