use crate::error::{reserve, Result};

/// Digital code that terminates a sequence. Never a residue.
pub const SENTINEL: u8 = 255;

/// A growable digital sequence. Reused between samples, it only ever grows its buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigitalSequence {
    pub name: String,
    dsq: Vec<u8>,
}

impl DigitalSequence {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            name: String::new(),
            dsq: Vec::with_capacity(n),
        }
    }

    /// Forget the residues, keep the allocation.
    pub fn reuse(&mut self) {
        self.dsq.clear();
    }

    /// Append one residue.
    pub fn push(&mut self, x: u8) -> Result<()> {
        reserve(&mut self.dsq, 1, "sequence buffer")?;
        self.dsq.push(x);
        Ok(())
    }

    /// Append the terminal sentinel.
    pub fn terminate(&mut self) -> Result<()> {
        self.push(SENTINEL)
    }

    /// The residues, without the sentinel.
    pub fn residues(&self) -> &[u8] {
        match self.dsq.split_last() {
            Some((&SENTINEL, rest)) => rest,
            _ => &self.dsq,
        }
    }

    /// Number of residues.
    pub fn len(&self) -> usize {
        self.residues().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_terminated(&self) -> bool {
        self.dsq.last() == Some(&SENTINEL)
    }
}
