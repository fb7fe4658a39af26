use crate::bg::{Background, TOLERANCE};
use crate::error::{Error, Result};
use crate::hmm::{delete_row, insert_row, match_row, Hmm, Transition, TransitionProb};
use crate::util::check_distribution;
use log::debug;
use std::ops;
use strum_macros::EnumCount;

/// Index of the move transition of a special state (N->B, E->C, C->T, J->B).
pub const MOVE: usize = 0;
/// Index of the loop transition of a special state (N->N, E->J, C->C, J->J).
pub const LOOP: usize = 1;

/// Probability mass of entering past node 1 in the explicit configuration.
const EXPLICIT_ENTRY: f64 = 0.5;
/// Probability mass of leaving before node M in the explicit configuration.
const EXPLICIT_EXIT: f64 = 0.5;

/// Special states that carry a move/loop pair.
#[repr(usize)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, EnumCount)]
pub enum Special {
    N = 0,
    E = 1,
    C = 2,
    J = 3,
}

impl<T> ops::Index<Special> for [T] {
    type Output = T;

    fn index(&self, index: Special) -> &Self::Output {
        &self[index as usize]
    }
}

impl<T> ops::IndexMut<Special> for [T] {
    fn index_mut(&mut self, index: Special) -> &mut Self::Output {
        &mut self[index as usize]
    }
}

/// How a domain enters and leaves the model.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EntryMode {
    /// Local alignment: entry from an occupancy-weighted distribution, exit free from any node.
    Implicit,
    /// Old style: explicit begin and end probabilities, end being a fourth match transition.
    Explicit,
}

/// Configuration of a profile.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ProfileConfig {
    pub mode: EntryMode,
    /// Allow more than one domain per sequence (E -> J -> B).
    pub multihit: bool,
    /// Expected length of the target sequences.
    pub target_length: usize,
    /// Allowed deviation of a distribution sum from one.
    pub tolerance: f64,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            mode: EntryMode::Implicit,
            multihit: true,
            target_length: 400,
            tolerance: TOLERANCE,
        }
    }
}

/// A core model configured for searching: flanking states, entry and exit distributions.
/// Nothing but the expected target length changes after configuration.
#[derive(Debug, Clone)]
pub struct Profile<'a> {
    m: usize,
    mode: EntryMode,
    /// Expected number of J uses: 1 for multihit, 0 for unihit.
    nj: f64,
    target_length: usize,
    tolerance: f64,
    /// Transitions of nodes 1..M-1. Node 0 and node M are unused: M_M and D_M only lead to E.
    t: Vec<TransitionProb>,
    /// Entry distribution over 1..=M. Index 0 is unused.
    begin: Vec<f64>,
    /// Exit probability per node. In implicit mode every node exits for free.
    end: Vec<f64>,
    /// Move/loop probabilities of N, E, C and J.
    xt: [[f64; 2]; SPECIAL_COUNT],
    mat: Vec<Vec<f64>>,
    ins: Vec<Vec<f64>>,
    bg: &'a Background,
}

impl<'a> Profile<'a> {
    /// Configure `hmm` against the null model `bg`.
    pub fn configure(hmm: &Hmm, bg: &'a Background, cfg: &ProfileConfig) -> Result<Self> {
        hmm.validate(cfg.tolerance)?;
        if hmm.k != bg.k() {
            return Err(Error::model_invalid(format!(
                "model alphabet size {} doesn't match background size {}",
                hmm.k,
                bg.k()
            )));
        }

        let m = hmm.m;
        let mut t = vec![TransitionProb::default(); m + 1];
        t[1..m].copy_from_slice(&hmm.t[1..m]);
        let mut begin = vec![0.0; m + 1];
        let mut end = vec![0.0; m + 1];

        match cfg.mode {
            EntryMode::Implicit => {
                // Uniform fragment lengths: weigh each entry by its number of possible exits.
                let occ = hmm.match_occupancy();
                let z: f64 = (1..=m).map(|k| occ[k] * (m - k + 1) as f64).sum();
                for k in 1..=m {
                    begin[k] = occ[k] * (m - k + 1) as f64 / z;
                    end[k] = 1.0;
                }
            }
            EntryMode::Explicit if m == 1 => {
                begin[1] = 1.0;
                end[1] = 1.0;
            }
            EntryMode::Explicit => {
                begin[1] = 1.0 - EXPLICIT_ENTRY;
                for b in &mut begin[2..] {
                    *b = EXPLICIT_ENTRY / (m - 1) as f64;
                }
                for e in &mut end[1..m] {
                    *e = EXPLICIT_EXIT / (m - 1) as f64;
                }
                end[m] = 1.0;

                // Exits take their share of the match transitions.
                for k in 1..m {
                    let sum: f64 = match_row(&t[k]).iter().sum();
                    let scale = (1.0 - end[k]) / sum;
                    for tr in [Transition::MM, Transition::MI, Transition::MD].iter() {
                        t[k][*tr] *= scale;
                    }
                }
            }
        }

        let mut xt = [[0.0; 2]; SPECIAL_COUNT];
        let nj = if cfg.multihit {
            xt[Special::E] = [0.5, 0.5];
            1.0
        } else {
            xt[Special::E] = [1.0, 0.0];
            0.0
        };

        let mut profile = Self {
            m,
            mode: cfg.mode,
            nj,
            target_length: 0,
            tolerance: cfg.tolerance,
            t,
            begin,
            end,
            xt,
            mat: hmm.mat.clone(),
            ins: hmm.ins.clone(),
            bg,
        };
        profile.reconfig_length(cfg.target_length)?;

        debug!(
            "configured {:?} {} profile of length {} for L={}",
            profile.mode,
            if cfg.multihit { "multihit" } else { "unihit" },
            profile.m,
            profile.target_length
        );
        Ok(profile)
    }

    /// Set the flank loops so that the expected unaligned length is `l`.
    pub fn reconfig_length(&mut self, l: usize) -> Result<()> {
        let pmove = (2.0 + self.nj) / (l as f64 + 2.0 + self.nj);
        let ploop = 1.0 - pmove;
        for &s in [Special::N, Special::C, Special::J].iter() {
            self.xt[s][MOVE] = pmove;
            self.xt[s][LOOP] = ploop;
        }
        self.target_length = l;
        debug!("flank move probability {:.5} for L={}", pmove, l);
        self.validate(self.tolerance)
    }

    /// Check every distribution, and that no reachable loop is inescapable.
    pub fn validate(&self, tol: f64) -> Result<()> {
        if self.m == 0 {
            return Err(Error::model_invalid("profile has no nodes"));
        }

        check_distribution(&self.begin[1..], tol, || "entry distribution".to_string())?;
        for k in 1..self.m {
            let t = &self.t[k];
            match self.mode {
                EntryMode::Implicit => {
                    check_distribution(match_row(t), tol, || format!("match transitions of {}", k))?
                }
                EntryMode::Explicit => {
                    let row = [
                        t[Transition::MM],
                        t[Transition::MI],
                        t[Transition::MD],
                        self.end[k],
                    ];
                    check_distribution(&row, tol, || format!("match and end transitions of {}", k))?
                }
            }
            check_distribution(insert_row(t), tol, || format!("insert transitions of {}", k))?;
            check_distribution(delete_row(t), tol, || format!("delete transitions of {}", k))?;
            check_distribution(&self.ins[k], tol, || format!("insert emissions of {}", k))?;
            if t[Transition::MI] > 0.0 && t[Transition::IM] <= 0.0 {
                return Err(Error::model_invalid(format!("insert state {} can't be left", k)));
            }
        }
        for k in 1..=self.m {
            check_distribution(&self.mat[k], tol, || format!("match emissions of {}", k))?;
        }

        for (s, name) in [Special::N, Special::E, Special::C, Special::J]
            .iter()
            .zip(["N", "E", "C", "J"].iter())
        {
            check_distribution(&self.xt[*s], tol, || format!("{} transitions", name))?;
        }
        let j_reachable = self.xt[Special::E][LOOP] > 0.0;
        if self.xt[Special::N][MOVE] <= 0.0
            || self.xt[Special::C][MOVE] <= 0.0
            || (j_reachable && self.xt[Special::J][MOVE] <= 0.0)
        {
            return Err(Error::model_invalid("a flanking state can't be left"));
        }

        Ok(())
    }

    /// Number of nodes.
    #[inline]
    pub fn m(&self) -> usize {
        self.m
    }

    /// Alphabet size.
    #[inline]
    pub fn k(&self) -> usize {
        self.bg.k()
    }

    #[inline]
    pub fn mode(&self) -> EntryMode {
        self.mode
    }

    #[inline]
    pub fn is_multihit(&self) -> bool {
        self.nj > 0.0
    }

    #[inline]
    pub fn nj(&self) -> f64 {
        self.nj
    }

    #[inline]
    pub fn target_length(&self) -> usize {
        self.target_length
    }

    /// Transitions of node k, 1 <= k < M.
    #[inline]
    pub fn t(&self, k: usize) -> &TransitionProb {
        &self.t[k]
    }

    /// Entry distribution, indexed 1..=M.
    #[inline]
    pub fn begin(&self) -> &[f64] {
        &self.begin
    }

    #[inline]
    pub fn end(&self, k: usize) -> f64 {
        self.end[k]
    }

    /// Move/loop pair of a special state.
    #[inline]
    pub fn xt(&self, s: Special) -> &[f64; 2] {
        &self.xt[s]
    }

    #[inline]
    pub fn mat(&self, k: usize) -> &[f64] {
        &self.mat[k]
    }

    #[inline]
    pub fn ins(&self, k: usize) -> &[f64] {
        &self.ins[k]
    }

    #[inline]
    pub fn bg(&self) -> &'a Background {
        self.bg
    }
}
