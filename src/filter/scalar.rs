use super::{Cells, Filter, FilterConfig, FilterMatrix, Specials, Tsc, WordProfile, NEG_INF};
use crate::error::Result;
use crate::profile::Profile;
use log::trace;
use std::cmp::max;

/// Reference backend: one cell at a time, D computed left to right.
#[derive(Debug, Clone)]
pub struct ScalarFilter {
    words: WordProfile,
}

impl ScalarFilter {
    pub fn new(profile: &Profile, cfg: FilterConfig) -> Self {
        Self {
            words: WordProfile::new(profile, cfg),
        }
    }

    pub fn words(&self) -> &WordProfile {
        &self.words
    }
}

impl Filter for ScalarFilter {
    type Cell = i16;

    fn score(&self, dsq: &[u8], mx: &mut FilterMatrix<i16>) -> Result<f64> {
        let w = &self.words;
        let m = w.m();
        debug_assert_eq!(w.target_length(), dsq.len());

        // Cell 0 is the k = 0 boundary and stays -infinity.
        mx.reinit(m + 1, NEG_INF)?;
        let Cells {
            m: mmx,
            d: dmx,
            i: imx,
        } = mx.cells();
        let mut x = Specials::new(w);

        for (i, &residue) in dsq.iter().enumerate() {
            let rsc = w.rsc(residue);
            // Previous row at k - 1.
            let mut mpv = NEG_INF;
            let mut ipv = NEG_INF;
            let mut dpv = NEG_INF;
            let mut xe = NEG_INF;

            for k in 1..=m {
                let tw = w.tsc(k);
                let mut sv = x.xb.saturating_add(tw[Tsc::BM]);
                sv = max(sv, mpv.saturating_add(tw[Tsc::MM]));
                sv = max(sv, ipv.saturating_add(tw[Tsc::IM]));
                sv = max(sv, dpv.saturating_add(tw[Tsc::DM]));
                sv = sv.saturating_add(rsc[k]);
                xe = max(xe, sv);

                mpv = mmx[k];
                ipv = imx[k];
                dpv = dmx[k];
                mmx[k] = sv;
                imx[k] = max(
                    mpv.saturating_add(tw[Tsc::MI]),
                    ipv.saturating_add(tw[Tsc::II]),
                );
                let prev = w.tsc(k - 1);
                dmx[k] = max(
                    mmx[k - 1].saturating_add(prev[Tsc::MD]),
                    dmx[k - 1].saturating_add(prev[Tsc::DD]),
                );
            }

            x.update(xe, w)?;
            if w.cfg().dump_rows {
                trace!("row {} M {:?}", i + 1, &mmx[1..]);
                trace!("row {} I {:?}", i + 1, &imx[1..]);
                trace!("row {} D {:?}", i + 1, &dmx[1..]);
                trace!("row {} {:?}", i + 1, x);
            }
        }

        Ok(x.score(w))
    }

    fn reconfig_length(&mut self, l: usize) {
        self.words.reconfig_length(l);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bg::Background;
    use crate::filter::tests::{configured, one_path_model};
    use crate::hmm::{Hmm, Transition};
    use crate::profile::{Special, MOVE};

    /// M1 -> M2 -> M3 with probability one, node k emitting only residue k - 1. Every
    /// probability on the path is a power of two apart from the entry.
    fn single_path_model() -> (Hmm, Background) {
        let (m, k) = (3, 4);
        let mut hmm = Hmm::new(m, k);
        for node in 0..=m {
            let t = &mut hmm.t[node];
            t[Transition::MM] = 1.0;
            t[Transition::IM] = 0.5;
            t[Transition::II] = 0.5;
            if node > 0 && node < m {
                t[Transition::DM] = 0.5;
                t[Transition::DD] = 0.5;
            }
            hmm.ins[node] = vec![0.25; k];
            if node > 0 {
                hmm.mat[node] = vec![0.0; k];
                hmm.mat[node][node - 1] = 1.0;
            }
        }
        (hmm, Background::uniform(k).unwrap())
    }

    #[test]
    fn scores_the_single_path() {
        let (hmm, bg) = single_path_model();
        // Multihit with L = 3: every flank move is 3 / 6.
        let profile = configured(&hmm, &bg, 3);
        let filter = ScalarFilter::new(&profile, FilterConfig::default());
        let w = filter.words();
        let mut mx = filter.new_matrix();

        // Residue k - 1 at node k: B -> M1 -> M2 -> M3 -> E -> C -> T with empty flanks.
        let dsq = [0, 1, 2];
        let sc = filter.score(&dsq, &mut mx).unwrap();

        let path = w.xw(Special::N)[MOVE] as i32
            + w.tsc(1)[Tsc::BM] as i32
            + w.rsc(0)[1] as i32
            + w.tsc(2)[Tsc::MM] as i32
            + w.rsc(1)[2] as i32
            + w.tsc(3)[Tsc::MM] as i32
            + w.rsc(2)[3] as i32
            + w.xw(Special::E)[MOVE] as i32
            + w.xw(Special::C)[MOVE] as i32;
        let cfg = FilterConfig::default();
        let expected = path as f64 / cfg.scale - cfg.flank_correction;
        assert_eq!(sc, expected);

        let pmove = profile.xt(Special::N)[MOVE];
        assert_eq!(pmove, 0.5);
        let nats = pmove.ln()
            + (profile.begin()[1] / 3.0).ln()
            + 3.0 * 4.0f64.ln()
            + profile.xt(Special::E)[MOVE].ln()
            + pmove.ln()
            - cfg.flank_correction;
        assert!(
            (sc - nats).abs() * cfg.scale <= 1.0,
            "{} words off",
            (sc - nats) * cfg.scale
        );
    }

    #[test]
    fn same_input_same_score() {
        let (hmm, bg) = one_path_model();
        let profile = configured(&hmm, &bg, 6);
        let filter = ScalarFilter::new(&profile, FilterConfig::default());
        let mut mx = filter.new_matrix();

        let dsq = [3, 0, 1, 2, 2, 1];
        let first = filter.score(&dsq, &mut mx).unwrap();
        assert_eq!(filter.score(&dsq, &mut mx).unwrap(), first);
        assert!(first.is_finite());
    }

    #[test]
    fn empty_sequence_never_reaches_c() {
        let (hmm, bg) = one_path_model();
        let profile = configured(&hmm, &bg, 0);
        let filter = ScalarFilter::new(&profile, FilterConfig::default());
        let mut mx = filter.new_matrix();
        assert_eq!(filter.score(&[], &mut mx).unwrap(), f64::NEG_INFINITY);
    }
}
