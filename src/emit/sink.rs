use crate::foundation::core::{Dir, Needle};
use crate::foundation::error::CourserResult;

/// Sink contract for consuming machine instructions in program order.
///
/// Ordering contract: calls arrive in exactly the order the physical machine
/// must execute them. Implementations must not reorder or batch; the target
/// is a linear program.
pub trait InstructionSink {
    /// A `;;Key: value` header field. Headers arrive before any operation.
    fn header(&mut self, key: &str, value: &str) -> CourserResult<()>;
    fn knit(&mut self, dir: Dir, needle: Needle, carriers: &[u32]) -> CourserResult<()>;
    fn tuck(&mut self, dir: Dir, needle: Needle, carriers: &[u32]) -> CourserResult<()>;
    fn miss(&mut self, dir: Dir, needle: Needle, carriers: &[u32]) -> CourserResult<()>;
    fn xfer(&mut self, src: Needle, dst: Needle) -> CourserResult<()>;
    fn split(&mut self, dir: Dir, src: Needle, dst: Needle, carriers: &[u32])
    -> CourserResult<()>;
    fn drop_loop(&mut self, needle: Needle) -> CourserResult<()>;
    fn rack(&mut self, value: f64) -> CourserResult<()>;
    fn carrier_in(&mut self, carrier: u32) -> CourserResult<()>;
    fn inhook(&mut self, carrier: u32) -> CourserResult<()>;
    fn releasehook(&mut self, carrier: u32) -> CourserResult<()>;
    fn carrier_out(&mut self, carrier: u32) -> CourserResult<()>;
    fn outhook(&mut self, carrier: u32) -> CourserResult<()>;
    fn stitch_number(&mut self, value: u32) -> CourserResult<()>;
    fn speed_number(&mut self, value: u32) -> CourserResult<()>;
    fn comment(&mut self, text: &str) -> CourserResult<()>;
    fn pause(&mut self, message: Option<&str>) -> CourserResult<()>;
    /// A backend-specific directive passed through verbatim.
    fn raw(&mut self, line: &str) -> CourserResult<()>;
}

/// One recorded instruction, as captured by [`InMemorySink`].
#[derive(Clone, Debug, PartialEq)]
pub enum EmittedOp {
    Header { key: String, value: String },
    Knit { dir: Dir, needle: Needle, carriers: Vec<u32> },
    Tuck { dir: Dir, needle: Needle, carriers: Vec<u32> },
    Miss { dir: Dir, needle: Needle, carriers: Vec<u32> },
    Xfer { src: Needle, dst: Needle },
    Split { dir: Dir, src: Needle, dst: Needle, carriers: Vec<u32> },
    Drop { needle: Needle },
    Rack { value: f64 },
    In { carrier: u32 },
    Inhook { carrier: u32 },
    Releasehook { carrier: u32 },
    Out { carrier: u32 },
    Outhook { carrier: u32 },
    StitchNumber { value: u32 },
    SpeedNumber { value: u32 },
    Comment { text: String },
    Pause { message: Option<String> },
    Raw { line: String },
}

/// In-memory sink for tests and debugging.
#[derive(Debug, Default)]
pub struct InMemorySink {
    ops: Vec<EmittedOp>,
}

impl InMemorySink {
    /// Create a new in-memory sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow the captured instructions, in emission order.
    pub fn ops(&self) -> &[EmittedOp] {
        &self.ops
    }

    /// Take the captured instructions out of the sink.
    pub fn into_ops(self) -> Vec<EmittedOp> {
        self.ops
    }
}

impl InstructionSink for InMemorySink {
    fn header(&mut self, key: &str, value: &str) -> CourserResult<()> {
        self.ops.push(EmittedOp::Header {
            key: key.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    fn knit(&mut self, dir: Dir, needle: Needle, carriers: &[u32]) -> CourserResult<()> {
        self.ops.push(EmittedOp::Knit {
            dir,
            needle,
            carriers: carriers.to_vec(),
        });
        Ok(())
    }

    fn tuck(&mut self, dir: Dir, needle: Needle, carriers: &[u32]) -> CourserResult<()> {
        self.ops.push(EmittedOp::Tuck {
            dir,
            needle,
            carriers: carriers.to_vec(),
        });
        Ok(())
    }

    fn miss(&mut self, dir: Dir, needle: Needle, carriers: &[u32]) -> CourserResult<()> {
        self.ops.push(EmittedOp::Miss {
            dir,
            needle,
            carriers: carriers.to_vec(),
        });
        Ok(())
    }

    fn xfer(&mut self, src: Needle, dst: Needle) -> CourserResult<()> {
        self.ops.push(EmittedOp::Xfer { src, dst });
        Ok(())
    }

    fn split(
        &mut self,
        dir: Dir,
        src: Needle,
        dst: Needle,
        carriers: &[u32],
    ) -> CourserResult<()> {
        self.ops.push(EmittedOp::Split {
            dir,
            src,
            dst,
            carriers: carriers.to_vec(),
        });
        Ok(())
    }

    fn drop_loop(&mut self, needle: Needle) -> CourserResult<()> {
        self.ops.push(EmittedOp::Drop { needle });
        Ok(())
    }

    fn rack(&mut self, value: f64) -> CourserResult<()> {
        self.ops.push(EmittedOp::Rack { value });
        Ok(())
    }

    fn carrier_in(&mut self, carrier: u32) -> CourserResult<()> {
        self.ops.push(EmittedOp::In { carrier });
        Ok(())
    }

    fn inhook(&mut self, carrier: u32) -> CourserResult<()> {
        self.ops.push(EmittedOp::Inhook { carrier });
        Ok(())
    }

    fn releasehook(&mut self, carrier: u32) -> CourserResult<()> {
        self.ops.push(EmittedOp::Releasehook { carrier });
        Ok(())
    }

    fn carrier_out(&mut self, carrier: u32) -> CourserResult<()> {
        self.ops.push(EmittedOp::Out { carrier });
        Ok(())
    }

    fn outhook(&mut self, carrier: u32) -> CourserResult<()> {
        self.ops.push(EmittedOp::Outhook { carrier });
        Ok(())
    }

    fn stitch_number(&mut self, value: u32) -> CourserResult<()> {
        self.ops.push(EmittedOp::StitchNumber { value });
        Ok(())
    }

    fn speed_number(&mut self, value: u32) -> CourserResult<()> {
        self.ops.push(EmittedOp::SpeedNumber { value });
        Ok(())
    }

    fn comment(&mut self, text: &str) -> CourserResult<()> {
        self.ops.push(EmittedOp::Comment {
            text: text.to_string(),
        });
        Ok(())
    }

    fn pause(&mut self, message: Option<&str>) -> CourserResult<()> {
        self.ops.push(EmittedOp::Pause {
            message: message.map(str::to_string),
        });
        Ok(())
    }

    fn raw(&mut self, line: &str) -> CourserResult<()> {
        self.ops.push(EmittedOp::Raw {
            line: line.to_string(),
        });
        Ok(())
    }
}
