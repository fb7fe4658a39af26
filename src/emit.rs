//! Sampling sequences and their paths from a model.
//!
//! The walk is split in two: [`StateMachine`] answers, without any randomness, which transitions
//! leave the current state and what taking one of them means. The emitters only draw the choices.

use crate::error::{Error, Result};
use crate::hmm::{delete_row, insert_row, match_row, Hmm, Transition};
use crate::profile::{EntryMode, Profile, Special};
use crate::sequence::DigitalSequence;
use crate::trace::{State, Trace};
use rand::Rng;

/// Source of random choices for the generator.
pub trait Randomness {
    /// Pick index i with probability proportional to `weights[i]`.
    fn choose(&mut self, weights: &[f64]) -> usize;

    /// Uniform integer in 0..n, n > 0.
    fn roll(&mut self, n: usize) -> usize;
}

impl<R: Rng + ?Sized> Randomness for R {
    fn choose(&mut self, weights: &[f64]) -> usize {
        let total: f64 = weights.iter().sum();
        let mut roll = self.gen::<f64>() * total;
        for (i, &w) in weights.iter().enumerate() {
            if roll < w {
                return i;
            }
            roll -= w;
        }
        // Rounding can leave a sliver past the last bin.
        weights.iter().rposition(|&w| w > 0.0).unwrap_or(0)
    }

    fn roll(&mut self, n: usize) -> usize {
        self.gen_range(0..n)
    }
}

/// How the node index changes on a transition.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum KUpdate {
    Keep,
    Increment,
    /// Entering E.
    Reset,
    /// B -> M_k entry.
    Set(usize),
}

impl KUpdate {
    #[inline]
    pub fn apply(self, k: usize) -> usize {
        match self {
            KUpdate::Keep => k,
            KUpdate::Increment => k + 1,
            KUpdate::Reset => 0,
            KUpdate::Set(k) => k,
        }
    }
}

/// Position of a walk: the current state, its node, and the node the current domain leaves from.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub st: State,
    pub k: usize,
    pub kend: usize,
}

impl Cursor {
    /// Where every profile walk starts after S.
    pub fn start(m: usize) -> Self {
        Self {
            st: State::N,
            k: 0,
            kend: m,
        }
    }
}

/// Transitions leaving a state.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Branches<'p> {
    /// A single successor, nothing to draw.
    Forced,
    /// Successors weighted by a slice of the profile.
    Weighted(&'p [f64]),
    /// Old style match state: M, I, D or E.
    MatchOrEnd([f64; 4]),
}

impl<'p> Branches<'p> {
    /// Weights to draw from, `None` if there's no choice.
    pub fn weights(&self) -> Option<&[f64]> {
        match self {
            Branches::Forced => None,
            Branches::Weighted(w) => Some(w),
            Branches::MatchOrEnd(w) => Some(&w[..]),
        }
    }
}

/// Outcome of a transition: the next state, how k changes, and what the next state emits from.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Transit<'p> {
    pub next: State,
    pub k: KUpdate,
    pub emission: Option<&'p [f64]>,
}

/// The profile's state machine.
pub struct StateMachine<'p, 'a> {
    profile: &'p Profile<'a>,
}

impl<'p, 'a> StateMachine<'p, 'a> {
    pub fn new(profile: &'p Profile<'a>) -> Self {
        Self { profile }
    }

    /// Outgoing transitions of the cursor's state.
    pub fn branches(&self, cur: &Cursor) -> Result<Branches<'p>> {
        let p = self.profile;
        let branches = match cur.st {
            // [move, loop]
            State::N => Branches::Weighted(p.xt(Special::N)),
            State::E => Branches::Weighted(p.xt(Special::E)),
            State::C => Branches::Weighted(p.xt(Special::C)),
            State::J => Branches::Weighted(p.xt(Special::J)),
            State::B => Branches::Weighted(&p.begin()[1..]),
            State::M | State::D if cur.k >= cur.kend => Branches::Forced,
            State::M => match p.mode() {
                EntryMode::Implicit => Branches::Weighted(match_row(p.t(cur.k))),
                EntryMode::Explicit => {
                    let t = p.t(cur.k);
                    Branches::MatchOrEnd([
                        t[Transition::MM],
                        t[Transition::MI],
                        t[Transition::MD],
                        p.end(cur.k),
                    ])
                }
            },
            State::D => Branches::Weighted(delete_row(p.t(cur.k))),
            State::I => Branches::Weighted(insert_row(p.t(cur.k))),
            State::S | State::T => {
                return Err(Error::corrupt(format!("no transitions out of {}", cur.st)))
            }
        };
        Ok(branches)
    }

    /// Take branch `choice` of the cursor's state.
    pub fn transition(&self, cur: &Cursor, choice: usize) -> Result<Transit<'p>> {
        let p = self.profile;
        let (next, k) = match (cur.st, choice) {
            (State::N, 0) | (State::J, 0) => (State::B, KUpdate::Keep),
            (State::N, 1) => (State::N, KUpdate::Keep),
            (State::J, 1) => (State::J, KUpdate::Keep),
            (State::E, 0) => (State::C, KUpdate::Keep),
            (State::E, 1) => (State::J, KUpdate::Keep),
            (State::C, 0) => (State::T, KUpdate::Keep),
            (State::C, 1) => (State::C, KUpdate::Keep),
            (State::B, c) if c < p.m() => (State::M, KUpdate::Set(c + 1)),
            (State::M, _) | (State::D, _) if cur.k >= cur.kend => (State::E, KUpdate::Reset),
            (State::M, 0) => (State::M, KUpdate::Increment),
            (State::M, 1) => (State::I, KUpdate::Keep),
            (State::M, 2) => (State::D, KUpdate::Increment),
            (State::M, 3) if p.mode() == EntryMode::Explicit => (State::E, KUpdate::Reset),
            (State::D, 0) | (State::I, 0) => (State::M, KUpdate::Increment),
            (State::D, 1) => (State::D, KUpdate::Increment),
            (State::I, 1) => (State::I, KUpdate::Keep),
            (st, choice) => {
                return Err(Error::corrupt(format!(
                    "impossible branch {} out of {}{}",
                    choice, st, cur.k
                )))
            }
        };

        let k_next = k.apply(cur.k);
        let emission = match next {
            State::M => Some(p.mat(k_next)),
            State::I => Some(p.ins(k_next)),
            // Flanks only emit on their loop, never on the move into them.
            State::N | State::C | State::J if next == cur.st => Some(p.bg().f()),
            _ => None,
        };

        Ok(Transit {
            next,
            k,
            emission,
        })
    }

    /// Node the domain entered at `k` leaves from.
    /// Local mode draws it uniformly among k..=M, the old style runs to M (or ends early through E).
    pub fn sample_exit<R: Randomness + ?Sized>(&self, rng: &mut R, k: usize) -> usize {
        let m = self.profile.m();
        match self.profile.mode() {
            EntryMode::Implicit => k + rng.roll(m - k + 1),
            EntryMode::Explicit => m,
        }
    }
}

/// Sample a sequence and its path from a configured profile.
///
/// Both sinks are optional and are reset first. The path starts with S, N and ends with C, T;
/// emitting steps carry their 1-based sequence position. The sequence is terminated by the sentinel.
pub fn profile_emit<R: Randomness + ?Sized>(
    rng: &mut R,
    profile: &Profile,
    mut sq: Option<&mut DigitalSequence>,
    mut tr: Option<&mut Trace>,
) -> Result<()> {
    if let Some(sq) = sq.as_deref_mut() {
        sq.reuse();
    }
    if let Some(tr) = tr.as_deref_mut() {
        tr.reuse();
        tr.append(State::S, 0, 0)?;
        tr.append(State::N, 0, 0)?;
    }

    let machine = StateMachine::new(profile);
    let mut cur = Cursor::start(profile.m());
    let mut i = 0;

    while cur.st != State::T {
        let choice = match machine.branches(&cur)?.weights() {
            Some(weights) => rng.choose(weights),
            None => 0,
        };
        let transit = machine.transition(&cur, choice)?;

        let prv = cur.st;
        cur.st = transit.next;
        cur.k = transit.k.apply(cur.k);
        if prv == State::B {
            cur.kend = machine.sample_exit(rng, cur.k);
        }

        let x = transit.emission.map(|p| rng.choose(p) as u8);
        if x.is_some() {
            i += 1;
        }

        if let (Some(sq), Some(x)) = (sq.as_deref_mut(), x) {
            sq.push(x)?;
        }
        if let Some(tr) = tr.as_deref_mut() {
            tr.append(cur.st, cur.k, if x.is_some() { i } else { 0 })?;
        }
    }

    if let Some(sq) = sq.as_deref_mut() {
        sq.terminate()?;
    }
    Ok(())
}

/// Sample a sequence and its path from the core model: a single pass B, ..., E, without flanks.
pub fn core_emit<R: Randomness + ?Sized>(
    rng: &mut R,
    hmm: &Hmm,
    mut sq: Option<&mut DigitalSequence>,
    mut tr: Option<&mut Trace>,
) -> Result<()> {
    if let Some(sq) = sq.as_deref_mut() {
        sq.reuse();
    }
    if let Some(tr) = tr.as_deref_mut() {
        tr.reuse();
        tr.append(State::B, 0, 0)?;
    }

    let mut st = State::B;
    let mut k = 0;
    let mut i = 0;

    while st != State::E {
        let t = &hmm.t[k];
        st = match st {
            // B behaves as M_0
            State::B | State::M => match rng.choose(match_row(t)) {
                0 => State::M,
                1 => State::I,
                _ => State::D,
            },
            State::I => match rng.choose(insert_row(t)) {
                0 => State::M,
                _ => State::I,
            },
            State::D => match rng.choose(delete_row(t)) {
                0 => State::M,
                _ => State::D,
            },
            st => return Err(Error::corrupt(format!("impossible state {} in core model", st))),
        };

        if st == State::M || st == State::D {
            k += 1;
        }
        // M_(M+1) is E.
        if k == hmm.m + 1 {
            if st != State::M {
                return Err(Error::corrupt("failed to reach E through a match transition"));
            }
            st = State::E;
            k = 0;
        }

        let x = match st {
            State::M => Some(rng.choose(&hmm.mat[k]) as u8),
            State::I => Some(rng.choose(&hmm.ins[k]) as u8),
            _ => None,
        };
        if x.is_some() {
            i += 1;
        }

        if let (Some(sq), Some(x)) = (sq.as_deref_mut(), x) {
            sq.push(x)?;
        }
        if let Some(tr) = tr.as_deref_mut() {
            tr.append(st, k, if x.is_some() { i } else { 0 })?;
        }
    }

    if let Some(sq) = sq.as_deref_mut() {
        sq.terminate()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bg::Background;
    use crate::profile::ProfileConfig;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256StarStar;

    fn model(m: usize, seed: u64) -> (Hmm, Background) {
        let mut rng = Xoshiro256StarStar::seed_from_u64(seed);
        (Hmm::sample(&mut rng, m, 4), Background::uniform(4).unwrap())
    }

    fn config(mode: EntryMode, multihit: bool, target_length: usize) -> ProfileConfig {
        ProfileConfig {
            mode,
            multihit,
            target_length,
            ..ProfileConfig::default()
        }
    }

    fn at(st: State, k: usize, kend: usize) -> Cursor {
        Cursor { st, k, kend }
    }

    #[test]
    fn flank_transitions() {
        let (hmm, bg) = model(3, 1);
        let cfg = config(EntryMode::Explicit, true, 10);
        let profile = Profile::configure(&hmm, &bg, &cfg).unwrap();
        let machine = StateMachine::new(&profile);
        let n = at(State::N, 0, 3);

        assert_eq!(
            machine.branches(&n).unwrap(),
            Branches::Weighted(profile.xt(Special::N))
        );
        let moved = machine.transition(&n, 0).unwrap();
        assert_eq!((moved.next, moved.k, moved.emission), (State::B, KUpdate::Keep, None));
        let looped = machine.transition(&n, 1).unwrap();
        assert_eq!(looped.next, State::N);
        assert_eq!(looped.emission, Some(bg.f()));

        // Moving into C emits nothing, looping on C emits background.
        let into_c = machine.transition(&at(State::E, 0, 3), 0).unwrap();
        assert_eq!((into_c.next, into_c.emission), (State::C, None));
        let c_loop = machine.transition(&at(State::C, 0, 3), 1).unwrap();
        assert_eq!(c_loop.emission, Some(bg.f()));
        assert_eq!(machine.transition(&at(State::C, 0, 3), 0).unwrap().next, State::T);
        assert_eq!(machine.transition(&at(State::E, 0, 3), 1).unwrap().next, State::J);
    }

    #[test]
    fn core_transitions_update_k() {
        let (hmm, bg) = model(3, 2);
        let cfg = config(EntryMode::Explicit, true, 10);
        let profile = Profile::configure(&hmm, &bg, &cfg).unwrap();
        let machine = StateMachine::new(&profile);

        let entry = machine.transition(&at(State::B, 0, 3), 1).unwrap();
        assert_eq!((entry.next, entry.k), (State::M, KUpdate::Set(2)));
        assert_eq!(entry.emission, Some(profile.mat(2)));

        let m1 = at(State::M, 1, 3);
        match machine.branches(&m1).unwrap() {
            Branches::MatchOrEnd(w) => assert!((w.iter().sum::<f64>() - 1.0).abs() < 1e-9),
            other => panic!("unexpected branches {:?}", other),
        }
        let to_insert = machine.transition(&m1, 1).unwrap();
        assert_eq!((to_insert.next, to_insert.k), (State::I, KUpdate::Keep));
        assert_eq!(to_insert.emission, Some(profile.ins(1)));
        let to_delete = machine.transition(&m1, 2).unwrap();
        assert_eq!((to_delete.next, to_delete.k.apply(1)), (State::D, 2));
        assert_eq!(to_delete.emission, None);
        let to_end = machine.transition(&m1, 3).unwrap();
        assert_eq!((to_end.next, to_end.k.apply(1)), (State::E, 0));

        let insert = machine.transition(&at(State::I, 1, 3), 0).unwrap();
        assert_eq!((insert.next, insert.k.apply(1)), (State::M, 2));

        // The last node can only end the domain.
        for &st in [State::M, State::D].iter() {
            let last = at(st, 3, 3);
            assert_eq!(machine.branches(&last).unwrap(), Branches::Forced);
            assert_eq!(machine.transition(&last, 0).unwrap().next, State::E);
        }
    }

    #[test]
    fn impossible_branches_are_corrupt_state() {
        let (hmm, bg) = model(3, 3);
        let cfg = config(EntryMode::Implicit, true, 10);
        let profile = Profile::configure(&hmm, &bg, &cfg).unwrap();
        let machine = StateMachine::new(&profile);

        // No end transition out of a local-mode match state before its exit node.
        assert!(matches!(
            machine.transition(&at(State::M, 1, 3), 3),
            Err(Error::CorruptState(_))
        ));
        assert!(machine.transition(&at(State::B, 0, 3), 3).is_err());
        assert!(machine.branches(&at(State::T, 0, 3)).is_err());
        assert!(machine.transition(&at(State::S, 0, 3), 0).is_err());
        // Local mode leaves at the sampled exit node, not only at M.
        assert_eq!(machine.transition(&at(State::M, 2, 2), 0).unwrap().next, State::E);
    }

    #[test]
    fn same_seed_same_sample() {
        let (hmm, bg) = model(20, 4);
        let cfg = config(EntryMode::Implicit, true, 50);
        let profile = Profile::configure(&hmm, &bg, &cfg).unwrap();

        let mut runs = Vec::new();
        for _ in 0..2 {
            let mut rng = Xoshiro256StarStar::seed_from_u64(99);
            let mut sq = DigitalSequence::default();
            let mut tr = Trace::default();
            for _ in 0..10 {
                profile_emit(&mut rng, &profile, Some(&mut sq), Some(&mut tr)).unwrap();
            }
            runs.push((sq, tr));
        }
        assert_eq!(runs[0], runs[1]);
    }

    #[test]
    fn sampled_paths_are_valid() {
        let (hmm, bg) = model(15, 5);
        let mut rng = Xoshiro256StarStar::seed_from_u64(6);
        let mut sq = DigitalSequence::with_capacity(64);
        let mut tr = Trace::with_capacity(64);

        for &mode in [EntryMode::Implicit, EntryMode::Explicit].iter() {
            for &multihit in [true, false].iter() {
                let cfg = config(mode, multihit, 20);
                let profile = Profile::configure(&hmm, &bg, &cfg).unwrap();
                for _ in 0..200 {
                    profile_emit(&mut rng, &profile, Some(&mut sq), Some(&mut tr)).unwrap();
                    tr.validate(profile.m(), mode).unwrap();

                    let steps = tr.steps();
                    assert_eq!((steps[0].st, steps[1].st), (State::S, State::N));
                    assert_eq!(steps[steps.len() - 1].st, State::T);
                    assert_eq!(steps[steps.len() - 2].st, State::C);
                    assert!(sq.is_terminated());
                    assert_eq!(sq.len(), tr.emitted());
                    assert!(sq.residues().iter().all(|&x| (x as usize) < profile.k()));
                    if !multihit {
                        assert_eq!(tr.domains(), 1);
                    }
                    for (first, last) in tr.model_endpoints() {
                        assert!(1 <= first && first <= last && last <= profile.m());
                    }
                }
            }
        }
    }

    #[test]
    fn emits_without_sinks() {
        let (hmm, bg) = model(5, 7);
        let profile = Profile::configure(&hmm, &bg, &ProfileConfig::default()).unwrap();
        let mut rng = Xoshiro256StarStar::seed_from_u64(8);
        profile_emit(&mut rng, &profile, None, None).unwrap();
        core_emit(&mut rng, &hmm, None, None).unwrap();
    }

    #[test]
    fn core_paths_run_from_b_to_e() {
        let (hmm, _) = model(10, 9);
        let mut rng = Xoshiro256StarStar::seed_from_u64(10);
        let mut sq = DigitalSequence::default();
        let mut tr = Trace::default();

        for _ in 0..100 {
            core_emit(&mut rng, &hmm, Some(&mut sq), Some(&mut tr)).unwrap();
            let steps = tr.steps();
            assert_eq!(steps[0].st, State::B);
            assert_eq!(steps[steps.len() - 1].st, State::E);
            assert_eq!(sq.len(), tr.emitted());
            assert!(steps.iter().all(|s| s.k <= hmm.m));

            let positions: Vec<usize> = steps.iter().map(|s| s.i).filter(|&i| i > 0).collect();
            assert!(positions.windows(2).all(|w| w[1] == w[0] + 1));
        }
    }

    #[test]
    fn choose_respects_zero_weights() {
        let mut rng = Xoshiro256StarStar::seed_from_u64(11);
        for _ in 0..1000 {
            let x = rng.choose(&[0.0, 2.0, 0.0, 1.0]);
            assert!(x == 1 || x == 3);
        }
    }
}
