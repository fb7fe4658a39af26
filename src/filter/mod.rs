//! Scaled 16-bit Viterbi filter.
//!
//! Scores are log-odds against the background, in units of `scale` per nat, offset by `base`.
//! Insert emissions and the N, C, J loops score zero, and the final score carries a fixed
//! correction instead. The score is an approximation used to throw away hopeless targets before
//! any exact computation is done.

mod lanes;
mod matrix;
mod scalar;
mod striped;

pub use lanes::Lanes;
pub use matrix::{Cells, FilterMatrix};
pub use scalar::ScalarFilter;
pub use striped::StripedFilter;

use crate::error::{Error, Result};
use crate::hmm::Transition;
use crate::profile::{EntryMode, Profile, Special, LOOP, MOVE, SPECIAL_COUNT};
use crate::util::clampf64;
use std::f64::consts::LN_2;
use std::{cmp, ops};
use strum_macros::EnumCount;

/// The -infinity word. Absorbing under saturating addition of non-positive words.
pub const NEG_INF: i16 = i16::MIN;

/// Numeric parameters of the filter. Immutable once a filter is built.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FilterConfig {
    /// Words per nat.
    pub scale: f64,
    /// Offset of the N state at the start of the sequence.
    pub base: i16,
    /// An E score at or above this is an overflow.
    pub overflow_at: i16,
    /// Nats subtracted from the final score, standing in for the zero N, C, J loop scores.
    pub flank_correction: f64,
    /// Log every DP row at trace level.
    pub dump_rows: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            scale: 500.0 / LN_2,
            base: 12000,
            overflow_at: i16::MAX,
            flank_correction: 3.0,
            dump_rows: false,
        }
    }
}

impl FilterConfig {
    /// Convert a score in nats to a word, rounding, and clamping to the 16-bit range.
    pub fn wordify(&self, sc: f64) -> i16 {
        if sc == f64::NEG_INFINITY {
            NEG_INF
        } else {
            clampf64((self.scale * sc).round(), NEG_INF as f64, i16::MAX as f64) as i16
        }
    }
}

/// Transition words of node k.
/// BM, MM, IM and DM lead *into* M_k (so MM is the word of M_(k-1) -> M_k),
/// MD, MI, II and DD leave node k.
/// Note: keep order correct, the striped layout relies on DD being last.
#[repr(usize)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, EnumCount)]
pub enum Tsc {
    BM = 0,
    MM = 1,
    IM = 2,
    DM = 3,
    MD = 4,
    MI = 5,
    II = 6,
    DD = 7,
}

impl<T> ops::Index<Tsc> for [T] {
    type Output = T;

    fn index(&self, index: Tsc) -> &Self::Output {
        &self[index as usize]
    }
}

impl<T> ops::IndexMut<Tsc> for [T] {
    fn index_mut(&mut self, index: Tsc) -> &mut Self::Output {
        &mut self[index as usize]
    }
}

/// A profile converted to words, in plain k order. Backends rearrange it as they see fit.
#[derive(Debug, Clone)]
pub struct WordProfile {
    m: usize,
    cfg: FilterConfig,
    nj: f64,
    target_length: usize,
    /// Transition words of nodes 0..=M. Node 0 is all -infinity.
    tsc: Vec<[i16; TSC_COUNT]>,
    /// Match emission words, `rsc[x][k]` for k in 0..=M. Row K scores residues outside the alphabet.
    rsc: Vec<Vec<i16>>,
    xw: [[i16; 2]; SPECIAL_COUNT],
    /// Upper bound on how much a D->D path can gain over the B->M entry, see `skip_dd`.
    ddbound: i32,
}

impl WordProfile {
    pub fn new(profile: &Profile, cfg: FilterConfig) -> Self {
        debug_assert_eq!(profile.mode(), EntryMode::Implicit);

        let m = profile.m();
        let word = |p: f64| cfg.wordify(p.ln());

        let mut tsc = vec![[NEG_INF; TSC_COUNT]; m + 1];
        for k in 1..=m {
            let tw = &mut tsc[k];
            tw[Tsc::BM] = word(profile.begin()[k] / (m - k + 1) as f64);
            if k > 1 {
                let prev = profile.t(k - 1);
                tw[Tsc::MM] = word(prev[Transition::MM]);
                tw[Tsc::IM] = word(prev[Transition::IM]);
                tw[Tsc::DM] = word(prev[Transition::DM]);
            }
            if k < m {
                let t = profile.t(k);
                tw[Tsc::MD] = word(t[Transition::MD]);
                tw[Tsc::MI] = word(t[Transition::MI]);
                tw[Tsc::II] = word(t[Transition::II]);
                tw[Tsc::DD] = word(t[Transition::DD]);
            }
        }

        let f = profile.bg().f();
        let mut rsc: Vec<Vec<i16>> = (0..profile.k())
            .map(|x| {
                let mut row = vec![NEG_INF; m + 1];
                for k in 1..=m {
                    row[k] = word(profile.mat(k)[x] / f[x]);
                }
                row
            })
            .collect();
        rsc.push(vec![0; m + 1]);

        let mut xw = [[0; 2]; SPECIAL_COUNT];
        xw[Special::E] = [
            word(profile.xt(Special::E)[MOVE]),
            word(profile.xt(Special::E)[LOOP]),
        ];

        let mut words = Self {
            m,
            cfg,
            nj: profile.nj(),
            target_length: 0,
            ddbound: ddbound(&tsc),
            tsc,
            rsc,
            xw,
        };
        words.reconfig_length(profile.target_length());
        words
    }

    /// Recompute the flank move words for expected length `l`. The loop words stay zero.
    pub fn reconfig_length(&mut self, l: usize) {
        let pmove = (2.0 + self.nj) / (l as f64 + 2.0 + self.nj);
        let w = self.cfg.wordify(pmove.ln());
        for &s in [Special::N, Special::C, Special::J].iter() {
            self.xw[s] = [w, 0];
        }
        self.target_length = l;
    }

    #[inline]
    pub fn m(&self) -> usize {
        self.m
    }

    #[inline]
    pub fn cfg(&self) -> &FilterConfig {
        &self.cfg
    }

    #[inline]
    pub fn target_length(&self) -> usize {
        self.target_length
    }

    #[inline]
    pub fn tsc(&self, k: usize) -> &[i16; TSC_COUNT] {
        &self.tsc[k]
    }

    /// Match emission words of residue `x` over k in 0..=M.
    #[inline]
    pub fn rsc(&self, x: u8) -> &[i16] {
        let unknown = self.rsc.len() - 1;
        &self.rsc[cmp::min(x as usize, unknown)]
    }

    /// Number of emission rows, residues outside the alphabet included.
    #[inline]
    pub fn rsc_rows(&self) -> usize {
        self.rsc.len()
    }

    #[inline]
    pub fn xw(&self, s: Special) -> &[i16; 2] {
        &self.xw[s]
    }

    /// Whether no D->D path of this row can beat the B->M entry of the next row, given the best
    /// M->D word `dmax` of this row and the row's B score.
    #[inline]
    pub fn skip_dd(&self, dmax: i16, xb: i16) -> bool {
        dmax as i32 + self.ddbound <= xb as i32
    }
}

/// max DD + max (DM(k-1) - BM(k)). Every DD word is <= 0, so any chain of them is bounded by its
/// single largest word.
fn ddbound(tsc: &[[i16; TSC_COUNT]]) -> i32 {
    let m = tsc.len() - 1;
    let max_dd = (1..m)
        .map(|k| tsc[k][Tsc::DD] as i32)
        .max()
        .unwrap_or(NEG_INF as i32);
    let max_dm_bm = (2..=m)
        .map(|k| tsc[k][Tsc::DM] as i32 - tsc[k][Tsc::BM] as i32)
        .max()
        .unwrap_or(NEG_INF as i32);
    max_dd + max_dm_bm
}

/// The N, B, E, C and J cells of the current row.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct Specials {
    pub xn: i16,
    pub xb: i16,
    pub xe: i16,
    pub xc: i16,
    pub xj: i16,
}

impl Specials {
    /// Row 0: all the mass in N.
    pub fn new(words: &WordProfile) -> Self {
        let xn = words.cfg.base;
        Self {
            xn,
            xb: xn.saturating_add(words.xw[Special::N][MOVE]),
            xe: NEG_INF,
            xc: NEG_INF,
            xj: NEG_INF,
        }
    }

    /// Fold the best match score `xe` of a row into the flanking states.
    #[inline]
    pub fn update(&mut self, xe: i16, words: &WordProfile) -> Result<()> {
        if xe >= words.cfg.overflow_at {
            return Err(Error::Overflow);
        }
        let xw = &words.xw;
        self.xe = xe;
        self.xn = self.xn.saturating_add(xw[Special::N][LOOP]);
        self.xc = cmp::max(
            self.xc.saturating_add(xw[Special::C][LOOP]),
            xe.saturating_add(xw[Special::E][MOVE]),
        );
        self.xj = cmp::max(
            self.xj.saturating_add(xw[Special::J][LOOP]),
            xe.saturating_add(xw[Special::E][LOOP]),
        );
        self.xb = cmp::max(
            self.xj.saturating_add(xw[Special::J][MOVE]),
            self.xn.saturating_add(xw[Special::N][MOVE]),
        );
        Ok(())
    }

    /// Final score in nats.
    pub fn score(&self, words: &WordProfile) -> f64 {
        if self.xc == NEG_INF {
            return f64::NEG_INFINITY;
        }
        let cfg = &words.cfg;
        let xc = self.xc as i32 + words.xw[Special::C][MOVE] as i32;
        (xc - cfg.base as i32) as f64 / cfg.scale - cfg.flank_correction
    }
}

/// A Viterbi filter backend.
pub trait Filter {
    /// One cell of the rolling matrix.
    type Cell: Copy;

    /// An empty matrix. It grows on first use and is reused afterwards.
    fn new_matrix(&self) -> FilterMatrix<Self::Cell> {
        FilterMatrix::default()
    }

    /// Score the residues `dsq` (without sentinel). The filter must be configured for `dsq.len()`.
    fn score(&self, dsq: &[u8], mx: &mut FilterMatrix<Self::Cell>) -> Result<f64>;

    /// Set the expected target length.
    fn reconfig_length(&mut self, l: usize);
}
