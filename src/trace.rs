use crate::error::{reserve, Error, Result};
use crate::profile::EntryMode;
use strum_macros::{Display, EnumCount, EnumIter};

/// States of the search model.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Display, EnumIter, EnumCount)]
pub enum State {
    /// Start.
    S = 0,
    /// Unaligned sequence before the first domain.
    N = 1,
    /// Begin of a domain.
    B = 2,
    M = 3,
    D = 4,
    I = 5,
    /// End of a domain.
    E = 6,
    /// Unaligned sequence after the last domain.
    C = 7,
    /// Unaligned sequence between domains.
    J = 8,
    /// Terminal.
    T = 9,
}

impl State {
    /// States that belong to the core model rather than to the flanks.
    #[inline]
    pub fn is_core(self) -> bool {
        matches!(self, State::M | State::D | State::I)
    }
}

/// One visited state. `i` is the 1-based sequence position of the emitted residue, 0 if none.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Step {
    pub st: State,
    pub k: usize,
    pub i: usize,
}

/// A path through the model. Reused between samples, it only ever grows its buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trace {
    steps: Vec<Step>,
}

impl Trace {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            steps: Vec::with_capacity(n),
        }
    }

    /// Forget the path, keep the allocation.
    pub fn reuse(&mut self) {
        self.steps.clear();
    }

    pub fn append(&mut self, st: State, k: usize, i: usize) -> Result<()> {
        reserve(&mut self.steps, 1, "trace buffer")?;
        self.steps.push(Step { st, k, i });
        Ok(())
    }

    #[inline]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Number of residues the path emits.
    pub fn emitted(&self) -> usize {
        self.steps.iter().filter(|s| s.i > 0).count()
    }

    /// Number of passes through the core model.
    pub fn domains(&self) -> usize {
        self.steps.iter().filter(|s| s.st == State::B).count()
    }

    /// First and last node used by each domain. Only match and delete states count as used.
    pub fn model_endpoints(&self) -> Vec<(usize, usize)> {
        let mut endpoints = Vec::new();
        let mut first = None;
        let mut last = 0;

        for step in &self.steps {
            match step.st {
                State::M => {
                    first.get_or_insert(step.k);
                    last = step.k;
                }
                State::D => last = step.k,
                State::E => {
                    if let Some(first) = first.take() {
                        endpoints.push((first, last));
                    }
                }
                _ => (),
            }
        }
        endpoints
    }

    /// Check that this is a complete profile path S,N,...,C,T for a model with `m` nodes:
    /// every transition exists, node indices follow the transitions,
    /// and exactly the emitting steps carry consecutive sequence positions.
    /// A local domain may leave from any M or D, an explicit one leaves a D only at node `m`.
    pub fn validate(&self, m: usize, mode: EntryMode) -> Result<()> {
        let steps = &self.steps;
        if steps.len() < 2 || steps[0].st != State::S || steps[1].st != State::N {
            return Err(Error::invalid_trace("doesn't start with S, N"));
        }
        match steps.last() {
            Some(last) if last.st == State::T => (),
            _ => return Err(Error::invalid_trace("doesn't end with T")),
        }

        let mut i = 0;
        for (pos, pair) in steps.windows(2).enumerate() {
            let (prv, cur) = (pair[0], pair[1]);
            let fail = |what: &str| {
                Error::invalid_trace(format!(
                    "{} at step {}: {}{} -> {}{}",
                    what,
                    pos + 1,
                    prv.st,
                    prv.k,
                    cur.st,
                    cur.k
                ))
            };

            let k_ok = match (prv.st, cur.st) {
                (State::S, State::N)
                | (State::N, State::N)
                | (State::N, State::B)
                | (State::E, State::C)
                | (State::E, State::J)
                | (State::C, State::C)
                | (State::C, State::T)
                | (State::J, State::J)
                | (State::J, State::B) => cur.k == 0,
                (State::B, State::M) => cur.k >= 1 && cur.k <= m,
                (State::M, State::M)
                | (State::M, State::D)
                | (State::D, State::M)
                | (State::D, State::D)
                | (State::I, State::M) => cur.k == prv.k + 1 && cur.k <= m,
                (State::M, State::I) | (State::I, State::I) => cur.k == prv.k && cur.k < m,
                (State::M, State::E) => cur.k == 0,
                (State::D, State::E) => {
                    cur.k == 0 && (mode == EntryMode::Implicit || prv.k == m)
                }
                _ => return Err(fail("impossible transition")),
            };
            if !k_ok {
                return Err(fail("bad node index"));
            }

            let emits = match cur.st {
                State::M | State::I => true,
                State::N | State::C | State::J => prv.st == cur.st,
                _ => false,
            };
            if emits {
                i += 1;
                if cur.i != i {
                    return Err(fail("bad sequence position"));
                }
            } else if cur.i != 0 {
                return Err(fail("non-emitting state with a sequence position"));
            }
        }

        Ok(())
    }
}
