use std::path::Path;

use crate::emit::sink::InstructionSink;
use crate::foundation::core::{Dir, Needle};
use crate::foundation::error::{CourserError, CourserResult};

const MAGIC: &str = ";!knitout-2";

/// Knitout v2 text builder.
///
/// Header fields and operation lines are buffered in memory and rendered in
/// file order by [`KnitoutFile::as_text`]; nothing touches the filesystem
/// until [`KnitoutFile::write`].
#[derive(Debug, Default)]
pub struct KnitoutFile {
    headers: Vec<(String, String)>,
    lines: Vec<String>,
}

impl KnitoutFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of operation lines (headers and the magic line excluded).
    pub fn op_count(&self) -> usize {
        self.lines.len()
    }

    /// Render the complete file: magic line, headers, then operations.
    pub fn as_text(&self) -> String {
        let mut out = String::new();
        out.push_str(MAGIC);
        out.push('\n');
        for (key, value) in &self.headers {
            out.push_str(&format!(";;{key}: {value}\n"));
        }
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    /// Write the rendered file, creating parent directories as needed.
    pub fn write(&self, path: impl AsRef<Path>) -> CourserResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                CourserError::io(format!("create output dir '{}': {e}", parent.display()))
            })?;
        }
        std::fs::write(path, self.as_text())
            .map_err(|e| CourserError::io(format!("write knitout '{}': {e}", path.display())))
    }

    fn push_carrier_line(&mut self, op: &str, dir: Dir, needle: Needle, carriers: &[u32]) {
        let mut line = format!("{op} {} {needle}", dir.as_knitout());
        if !carriers.is_empty() {
            line.push(' ');
            line.push_str(&carriers_str(carriers));
        }
        self.lines.push(line);
    }
}

fn carriers_str(carriers: &[u32]) -> String {
    carriers
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Racking values print as integers when whole, else as their fraction.
fn fmt_rack(value: f64) -> String {
    if value.fract().abs() < 1e-9 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

impl InstructionSink for KnitoutFile {
    fn header(&mut self, key: &str, value: &str) -> CourserResult<()> {
        self.headers.push((key.to_string(), value.to_string()));
        Ok(())
    }

    fn knit(&mut self, dir: Dir, needle: Needle, carriers: &[u32]) -> CourserResult<()> {
        self.push_carrier_line("knit", dir, needle, carriers);
        Ok(())
    }

    fn tuck(&mut self, dir: Dir, needle: Needle, carriers: &[u32]) -> CourserResult<()> {
        self.push_carrier_line("tuck", dir, needle, carriers);
        Ok(())
    }

    fn miss(&mut self, dir: Dir, needle: Needle, carriers: &[u32]) -> CourserResult<()> {
        self.push_carrier_line("miss", dir, needle, carriers);
        Ok(())
    }

    fn xfer(&mut self, src: Needle, dst: Needle) -> CourserResult<()> {
        self.lines.push(format!("xfer {src} {dst}"));
        Ok(())
    }

    fn split(
        &mut self,
        dir: Dir,
        src: Needle,
        dst: Needle,
        carriers: &[u32],
    ) -> CourserResult<()> {
        let mut line = format!("split {} {src} {dst}", dir.as_knitout());
        if !carriers.is_empty() {
            line.push(' ');
            line.push_str(&carriers_str(carriers));
        }
        self.lines.push(line);
        Ok(())
    }

    fn drop_loop(&mut self, needle: Needle) -> CourserResult<()> {
        self.lines.push(format!("drop {needle}"));
        Ok(())
    }

    fn rack(&mut self, value: f64) -> CourserResult<()> {
        self.lines.push(format!("rack {}", fmt_rack(value)));
        Ok(())
    }

    fn carrier_in(&mut self, carrier: u32) -> CourserResult<()> {
        self.lines.push(format!("in {carrier}"));
        Ok(())
    }

    fn inhook(&mut self, carrier: u32) -> CourserResult<()> {
        self.lines.push(format!("inhook {carrier}"));
        Ok(())
    }

    fn releasehook(&mut self, carrier: u32) -> CourserResult<()> {
        self.lines.push(format!("releasehook {carrier}"));
        Ok(())
    }

    fn carrier_out(&mut self, carrier: u32) -> CourserResult<()> {
        self.lines.push(format!("out {carrier}"));
        Ok(())
    }

    fn outhook(&mut self, carrier: u32) -> CourserResult<()> {
        self.lines.push(format!("outhook {carrier}"));
        Ok(())
    }

    fn stitch_number(&mut self, value: u32) -> CourserResult<()> {
        self.lines.push(format!("x-stitch-number {value}"));
        Ok(())
    }

    fn speed_number(&mut self, value: u32) -> CourserResult<()> {
        self.lines.push(format!("x-speed-number {value}"));
        Ok(())
    }

    fn comment(&mut self, text: &str) -> CourserResult<()> {
        self.lines.push(format!(";{text}"));
        Ok(())
    }

    fn pause(&mut self, message: Option<&str>) -> CourserResult<()> {
        if let Some(msg) = message {
            self.lines.push(format!(";pause: {msg}"));
        }
        self.lines.push("x-pause".to_string());
        Ok(())
    }

    fn raw(&mut self, line: &str) -> CourserResult<()> {
        self.lines.push(line.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::core::Bed;

    #[test]
    fn renders_magic_then_headers_then_ops() {
        let mut k = KnitoutFile::new();
        k.header("Machine", "SWG091N2").unwrap();
        k.header("Gauge", "15").unwrap();
        k.rack(0.25).unwrap();
        k.knit(Dir::Right, Needle::hook(Bed::Front, 12), &[3]).unwrap();

        let text = k.as_text();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                ";!knitout-2",
                ";;Machine: SWG091N2",
                ";;Gauge: 15",
                "rack 0.25",
                "knit + f12 3",
            ]
        );
        assert_eq!(k.op_count(), 2);
    }

    #[test]
    fn op_line_formats() {
        let mut k = KnitoutFile::new();
        k.tuck(Dir::Left, Needle::hook(Bed::Back, 4), &[1, 2]).unwrap();
        k.xfer(Needle::hook(Bed::Front, 4), Needle::hook(Bed::Back, 4))
            .unwrap();
        k.split(
            Dir::Right,
            Needle::hook(Bed::Front, 9),
            Needle::hook(Bed::Back, 9),
            &[6],
        )
        .unwrap();
        k.drop_loop(Needle::slider(Bed::Back, 2)).unwrap();
        k.inhook(3).unwrap();
        k.releasehook(3).unwrap();
        k.outhook(3).unwrap();
        k.stitch_number(5).unwrap();
        k.speed_number(300).unwrap();
        k.comment("hello").unwrap();
        k.pause(Some("swap cone")).unwrap();
        k.raw("x-presser-mode auto").unwrap();
        // Carrier-less pass lines carry no trailing field.
        k.knit(Dir::Left, Needle::hook(Bed::Front, 1), &[]).unwrap();

        let text = k.as_text();
        for expected in [
            "tuck - b4 1 2",
            "xfer f4 b4",
            "split + f9 b9 6",
            "drop bs2",
            "inhook 3",
            "releasehook 3",
            "outhook 3",
            "x-stitch-number 5",
            "x-speed-number 300",
            ";hello",
            ";pause: swap cone",
            "x-pause",
            "x-presser-mode auto",
            "knit - f1\n",
        ] {
            assert!(text.contains(expected), "missing {expected:?} in:\n{text}");
        }
    }

    #[test]
    fn rack_values_render_minimally() {
        assert_eq!(fmt_rack(0.0), "0");
        assert_eq!(fmt_rack(2.0), "2");
        assert_eq!(fmt_rack(-1.0), "-1");
        assert_eq!(fmt_rack(0.25), "0.25");
        assert_eq!(fmt_rack(-2.25), "-2.25");
    }
}
