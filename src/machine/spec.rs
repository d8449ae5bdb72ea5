use crate::machine::backend::BackendKind;

/// Physical description of the target machine, emitted as knitout headers
/// and used to validate needle and carrier ranges.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MachineSpec {
    /// Machine name for the `Machine:` header.
    pub name: String,
    /// Needle count per bed.
    pub width: u32,
    /// Needles per inch, for the `Gauge:` header.
    pub gauge: u32,
    /// Number of yarn carriers.
    pub carriers: u32,
    /// Stitch number used when neither pattern nor yarn overrides it.
    pub default_stitch_number: u32,
    /// `x-presser-mode` extension value, when the machine has a presser foot.
    pub presser_mode: Option<String>,
}

impl MachineSpec {
    /// Shima Seiki SWG091N2, the house default for backend
    /// [`BackendKind::Swg`].
    pub fn swg() -> Self {
        Self {
            name: "SWG091N2".to_string(),
            width: 361,
            gauge: 15,
            carriers: 10,
            default_stitch_number: 5,
            presser_mode: Some("auto".to_string()),
        }
    }

    /// Kniterate, the house default for backend [`BackendKind::Kniterate`].
    pub fn kniterate() -> Self {
        Self {
            name: "Kniterate".to_string(),
            width: 252,
            gauge: 7,
            carriers: 6,
            default_stitch_number: 5,
            presser_mode: None,
        }
    }

    /// House default spec for a backend.
    pub fn for_backend(kind: BackendKind) -> Self {
        match kind {
            BackendKind::Swg => Self::swg(),
            BackendKind::Kniterate => Self::kniterate(),
        }
    }

    /// Carrier ids as a space-separated list for the `Carriers:` header.
    pub fn carriers_header(&self) -> String {
        let mut out = String::new();
        for id in 1..=self.carriers {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(&id.to_string());
        }
        out
    }
}
