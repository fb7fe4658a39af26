use super::{Cells, Filter, FilterConfig, FilterMatrix, Lanes, Specials, Tsc, WordProfile, NEG_INF};
use crate::error::Result;
use crate::profile::Profile;
use log::trace;
use std::cmp::max;

/// Transition words stored per striped position; DD is kept apart for the lazy D sweeps.
const TW_PER_Q: usize = 7;

/// Striped backend over vectors of V words (Farrar).
///
/// Node k lives in lane z, position q with k = z * Q + q + 1, so within a lane the predecessor of
/// position q is q - 1, and position 0 takes its predecessor from the previous lane at Q - 1:
/// a single shift of the last vector. Positions past M are padding and score -infinity.
///
/// D->D paths are only followed when they can matter ("lazy F"), which gives scores identical to
/// `ScalarFilter`.
#[derive(Debug, Clone)]
pub struct StripedFilter<const V: usize> {
    words: WordProfile,
    q: usize,
    /// `[BM, MM, IM, DM, MD, MI, II]` of each position q at `7q..7q + 7`, DD of position q at `7Q + q`.
    twv: Vec<Lanes<V>>,
    /// Match emissions per residue, one vector per position q.
    rsv: Vec<Vec<Lanes<V>>>,
}

impl<const V: usize> StripedFilter<V> {
    pub fn new(profile: &Profile, cfg: FilterConfig) -> Self {
        assert!(
            matches!(V, 4 | 8 | 16 | 32),
            "unsupported vector width {}",
            V
        );
        let words = WordProfile::new(profile, cfg);
        let m = words.m();
        let q_count = max(2, (m + V - 1) / V);

        // Words of node k at (q, z), -infinity for padding.
        let stripe = |q: usize, word: &dyn Fn(usize) -> i16| {
            let mut lanes = [NEG_INF; V];
            for (z, lane) in lanes.iter_mut().enumerate() {
                let k = z * q_count + q + 1;
                if k <= m {
                    *lane = word(k);
                }
            }
            Lanes(lanes)
        };

        let order = [
            Tsc::BM,
            Tsc::MM,
            Tsc::IM,
            Tsc::DM,
            Tsc::MD,
            Tsc::MI,
            Tsc::II,
        ];
        let mut twv = Vec::with_capacity((TW_PER_Q + 1) * q_count);
        for q in 0..q_count {
            for &t in order.iter() {
                twv.push(stripe(q, &|k| words.tsc(k)[t]));
            }
        }
        for q in 0..q_count {
            twv.push(stripe(q, &|k| words.tsc(k)[Tsc::DD]));
        }

        let rsv: Vec<Vec<Lanes<V>>> = (0..words.rsc_rows())
            .map(|x| {
                let rsc = words.rsc(x as u8);
                (0..q_count)
                    .map(|q| stripe(q, &|k| rsc[k]))
                    .collect::<Vec<_>>()
            })
            .collect();

        Self {
            words,
            q: q_count,
            twv,
            rsv,
        }
    }

    /// Positions per lane.
    #[inline]
    pub fn q(&self) -> usize {
        self.q
    }

    #[inline]
    fn rsv(&self, x: u8) -> &[Lanes<V>] {
        let unknown = self.rsv.len() - 1;
        &self.rsv[(x as usize).min(unknown)]
    }

    /// A striped row back in k order.
    fn unstripe(&self, row: &[Lanes<V>]) -> Vec<i16> {
        (1..=self.words.m())
            .map(|k| row[(k - 1) % self.q].0[(k - 1) / self.q])
            .collect()
    }
}

impl<const V: usize> Filter for StripedFilter<V> {
    type Cell = Lanes<V>;

    fn score(&self, dsq: &[u8], mx: &mut FilterMatrix<Lanes<V>>) -> Result<f64> {
        let w = &self.words;
        let q_count = self.q;
        debug_assert_eq!(w.target_length(), dsq.len());

        let neg_inf = Lanes::splat(NEG_INF);
        mx.reinit(q_count, neg_inf)?;
        let Cells {
            m: mmx,
            d: dmx,
            i: imx,
        } = mx.cells();
        let dd = &self.twv[TW_PER_Q * q_count..];
        let mut x = Specials::new(w);

        for (i, &residue) in dsq.iter().enumerate() {
            let rsc = self.rsv(residue);
            let xbv = Lanes::splat(x.xb);
            let mut xev = neg_inf;
            let mut dmaxv = neg_inf;
            // M->D into the position after the current one.
            let mut dcv = neg_inf;
            // Previous row at k - 1.
            let mut mpv = mmx[q_count - 1].rightshift(NEG_INF);
            let mut ipv = imx[q_count - 1].rightshift(NEG_INF);
            let mut dpv = dmx[q_count - 1].rightshift(NEG_INF);

            for q in 0..q_count {
                let tw = &self.twv[TW_PER_Q * q..TW_PER_Q * (q + 1)];
                let mut sv = xbv.adds(tw[Tsc::BM]);
                sv = sv.max(mpv.adds(tw[Tsc::MM]));
                sv = sv.max(ipv.adds(tw[Tsc::IM]));
                sv = sv.max(dpv.adds(tw[Tsc::DM]));
                sv = sv.adds(rsc[q]);
                xev = xev.max(sv);

                mpv = mmx[q];
                ipv = imx[q];
                dpv = dmx[q];
                mmx[q] = sv;
                dmx[q] = dcv;

                dcv = sv.adds(tw[Tsc::MD]);
                dmaxv = dmaxv.max(dcv);

                imx[q] = mpv.adds(tw[Tsc::MI]).max(ipv.adds(tw[Tsc::II]));
            }

            x.update(xev.hmax(), w)?;

            if w.skip_dd(dmaxv.hmax(), x.xb) {
                // Only the M->D carry across lanes is missing.
                dmx[0] = dcv.rightshift(NEG_INF);
            } else {
                // One full sweep, then more until a sweep dies out before reaching the end.
                dcv = dcv.rightshift(NEG_INF);
                for q in 0..q_count {
                    dmx[q] = dcv.max(dmx[q]);
                    dcv = dmx[q].adds(dd[q]);
                }
                loop {
                    dcv = dcv.rightshift(NEG_INF);
                    let mut completed = true;
                    for q in 0..q_count {
                        if !dcv.any_gt(dmx[q]) {
                            completed = false;
                            break;
                        }
                        dmx[q] = dcv.max(dmx[q]);
                        dcv = dmx[q].adds(dd[q]);
                    }
                    if !completed {
                        break;
                    }
                }
            }

            if w.cfg().dump_rows {
                trace!("row {} M {:?}", i + 1, self.unstripe(mmx));
                trace!("row {} I {:?}", i + 1, self.unstripe(imx));
                trace!("row {} D {:?}", i + 1, self.unstripe(dmx));
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
    use crate::emit::profile_emit;
    use crate::error::Error;
    use crate::filter::tests::{configured, one_path_model};
    use crate::filter::ScalarFilter;
    use crate::hmm::{Hmm, Transition};
    use crate::profile::ProfileConfig;
    use crate::sequence::DigitalSequence;
    use proptest::prelude::*;
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoshiro256StarStar;

    /// Score `dsq` with both backends, each configured for its length.
    fn both<const V: usize>(profile: &Profile, dsq: &[u8]) -> (Result<f64>, Result<f64>) {
        let mut scalar = ScalarFilter::new(profile, FilterConfig::default());
        let mut striped = StripedFilter::<V>::new(profile, FilterConfig::default());
        scalar.reconfig_length(dsq.len());
        striped.reconfig_length(dsq.len());

        let mut smx = scalar.new_matrix();
        let mut vmx = striped.new_matrix();
        (scalar.score(dsq, &mut smx), striped.score(dsq, &mut vmx))
    }

    fn assert_same(a: Result<f64>, b: Result<f64>) {
        match (a, b) {
            (Ok(a), Ok(b)) => assert_eq!(a.to_bits(), b.to_bits()),
            (Err(Error::Overflow), Err(Error::Overflow)) => (),
            (a, b) => panic!("backends disagree: {:?} vs {:?}", a, b),
        }
    }

    #[test]
    fn layout_pads_the_last_lane() {
        let (hmm, bg) = one_path_model();
        let profile = configured(&hmm, &bg, 3);
        let filter = StripedFilter::<4>::new(&profile, FilterConfig::default());
        assert_eq!(filter.q(), 2);

        // M = 3, Q = 2: k = 1, 2 in lane 0, k = 3 at lane 1, q = 0, the rest is padding.
        let bm_q0 = filter.twv[Tsc::BM as usize];
        let words = filter.words.tsc(3);
        assert_eq!(bm_q0.0[1], words[Tsc::BM]);
        assert_eq!(&bm_q0.0[2..], &[NEG_INF, NEG_INF]);
        let bm_q1 = filter.twv[TW_PER_Q + Tsc::BM as usize];
        assert_eq!(&bm_q1.0[1..], &[NEG_INF, NEG_INF, NEG_INF]);
        let expected: Vec<i16> = (1..=3).map(|k| filter.words.tsc(k)[Tsc::BM]).collect();
        assert_eq!(filter.unstripe(&[bm_q0, bm_q1]), expected);
    }

    #[test]
    fn matches_scalar_on_the_dominant_path() {
        let (hmm, bg) = one_path_model();
        let profile = configured(&hmm, &bg, 3);
        let (a, b) = both::<8>(&profile, &[0, 1, 2]);
        assert_same(a, b);
    }

    #[test]
    fn growth_is_transparent() {
        let mut rng = Xoshiro256StarStar::seed_from_u64(17);
        let bg = Background::uniform(4).unwrap();
        let small = Hmm::sample(&mut rng, 5, 4);
        let large = Hmm::sample(&mut rng, 90, 4);
        let small = configured(&small, &bg, 12);
        let large = configured(&large, &bg, 12);
        let dsq: Vec<u8> = (0..12).map(|_| rng.gen_range(0..4)).collect();

        let small_filter = StripedFilter::<4>::new(&small, FilterConfig::default());
        let large_filter = StripedFilter::<4>::new(&large, FilterConfig::default());

        // Sized for the large model up front.
        let mut presized = large_filter.new_matrix();
        presized.reinit(large_filter.q(), Lanes::splat(NEG_INF)).unwrap();
        let large_expected = large_filter.score(&dsq, &mut presized).unwrap();
        let mut fresh = small_filter.new_matrix();
        let small_expected = small_filter.score(&dsq, &mut fresh).unwrap();

        // Sized by the small model, then forced to grow by the large one.
        let mut grown = small_filter.new_matrix();
        assert_eq!(small_filter.score(&dsq, &mut grown).unwrap(), small_expected);
        assert!(grown.capacity() < large_filter.q());
        let sc = large_filter.score(&dsq, &mut grown).unwrap();
        assert_eq!(sc.to_bits(), large_expected.to_bits());
        assert!(grown.capacity() >= large_filter.q());

        // And reused for the small one again.
        let sc = small_filter.score(&dsq, &mut grown).unwrap();
        assert_eq!(sc.to_bits(), small_expected.to_bits());
    }

    #[test]
    fn scores_unihit_profiles() {
        let mut rng = Xoshiro256StarStar::seed_from_u64(23);
        let bg = Background::uniform(4).unwrap();
        let hmm = Hmm::sample(&mut rng, 25, 4);
        let cfg = ProfileConfig {
            multihit: false,
            target_length: 30,
            ..ProfileConfig::default()
        };
        let profile = Profile::configure(&hmm, &bg, &cfg).unwrap();

        let mut sq = DigitalSequence::default();
        for _ in 0..20 {
            profile_emit(&mut rng, &profile, Some(&mut sq), None).unwrap();
            let (a, b) = both::<8>(&profile, sq.residues());
            assert!(a.as_ref().map_or(false, |sc| sc.is_finite()) || sq.is_empty());
            assert_same(a, b);
        }
    }

    #[test]
    fn detects_overflow() {
        // Thirty near-certain matches of a one-hot residue in a 20 letter alphabet.
        let (m, k) = (30, 20);
        let mut hmm = Hmm::new(m, k);
        for node in 0..=m {
            let t = &mut hmm.t[node];
            if node == m {
                t[Transition::MM] = 1.0;
            } else {
                t[Transition::MM] = 0.998;
                t[Transition::MI] = 0.001;
                t[Transition::MD] = 0.001;
            }
            t[Transition::IM] = 0.5;
            t[Transition::II] = 0.5;
            if node > 0 && node < m {
                t[Transition::DM] = 0.5;
                t[Transition::DD] = 0.5;
            }
            hmm.ins[node] = vec![1.0 / k as f64; k];
            if node > 0 {
                hmm.mat[node] = vec![0.0; k];
                hmm.mat[node][0] = 1.0;
            }
        }
        let bg = Background::uniform(k).unwrap();
        let profile = configured(&hmm, &bg, m);
        let dsq = vec![0u8; m];

        let (scalar, striped) = both::<16>(&profile, &dsq);
        assert!(matches!(scalar, Err(Error::Overflow)));
        assert!(striped.unwrap_err().is_overflow());
    }

    fn check_backends(seed: u64, m: usize, l: usize, emitted: bool) {
        let mut rng = Xoshiro256StarStar::seed_from_u64(seed);
        let bg = Background::uniform(4).unwrap();
        let hmm = Hmm::sample(&mut rng, m, 4);
        let profile = configured(&hmm, &bg, l);

        let dsq = if emitted {
            let mut sq = DigitalSequence::default();
            profile_emit(&mut rng, &profile, Some(&mut sq), None).unwrap();
            sq.residues().to_vec()
        } else {
            (0..l).map(|_| rng.gen_range(0..4)).collect()
        };

        let (a, b) = both::<4>(&profile, &dsq);
        let (c, d) = both::<8>(&profile, &dsq);
        let (e, f) = both::<16>(&profile, &dsq);
        let (g, h) = both::<32>(&profile, &dsq);
        assert_same(a, b);
        assert_same(c, d);
        assert_same(e, f);
        assert_same(g, h);
    }

    proptest! {
        #[test]
        fn striped_matches_scalar(seed in any::<u64>(), m in 1usize..70, l in 0usize..60) {
            check_backends(seed, m, l, false);
        }

        #[test]
        fn striped_matches_scalar_on_homologs(seed in any::<u64>(), m in 1usize..40) {
            check_backends(seed, m, 20, true);
        }
    }
}
