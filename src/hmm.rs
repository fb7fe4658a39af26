use crate::bg::MAX_K;
use crate::error::{Error, Result};
use crate::util::check_distribution;
use rand::Rng;
use std::ops;
use strum_macros::EnumCount;

pub type TransitionProb = [f64; TRANSITION_COUNT];

/// Transitions out of a core model node.
/// Note: keep order correct, the I and D pairs are sliced as `[IM, II]` and `[DM, DD]`.
#[repr(usize)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, EnumCount)]
pub enum Transition {
    MM = 0,
    MI = 1,
    MD = 2,
    IM = 3,
    II = 4,
    DM = 5,
    DD = 6,
}

impl<T> ops::Index<Transition> for [T] {
    type Output = T;

    fn index(&self, index: Transition) -> &Self::Output {
        &self[index as usize]
    }
}

impl<T> ops::IndexMut<Transition> for [T] {
    fn index_mut(&mut self, index: Transition) -> &mut Self::Output {
        &mut self[index as usize]
    }
}

/// Slices of a transition row, one per source state.
pub fn match_row(t: &TransitionProb) -> &[f64] {
    &t[Transition::MM as usize..=Transition::MD as usize]
}

pub fn insert_row(t: &TransitionProb) -> &[f64] {
    &t[Transition::IM as usize..=Transition::II as usize]
}

pub fn delete_row(t: &TransitionProb) -> &[f64] {
    &t[Transition::DM as usize..=Transition::DD as usize]
}

/// A trained core model: nodes 1..M with match, insert and delete states, and a begin node 0.
/// This is just a "plain old data" struct, which is why the fields are public.
#[derive(Debug, Clone, PartialEq)]
pub struct Hmm {
    pub name: String,
    /// Number of nodes.
    pub m: usize,
    /// Alphabet size.
    pub k: usize,
    /// Transition probabilities of nodes 0..=M. Node 0 holds B -> {M1, I0, D1}.
    pub t: Vec<TransitionProb>,
    /// Match emissions of nodes 1..=M. Row 0 is unused.
    pub mat: Vec<Vec<f64>>,
    /// Insert emissions of nodes 0..=M.
    pub ins: Vec<Vec<f64>>,
}

impl Hmm {
    /// All-zero model, apart from the fixed boundary transitions (there is no D0 and no D(M+1)).
    pub fn new(m: usize, k: usize) -> Self {
        let mut t = vec![TransitionProb::default(); m + 1];
        t[0][Transition::DM] = 1.0;
        t[m][Transition::DM] = 1.0;

        Self {
            name: String::from("model"),
            m,
            k,
            t,
            mat: vec![vec![0.0; k]; m + 1],
            ins: vec![vec![0.0; k]; m + 1],
        }
    }

    /// Sample a model with every distribution drawn from a uniform Dirichlet.
    pub fn sample<R: Rng + ?Sized>(rng: &mut R, m: usize, k: usize) -> Self {
        let mut hmm = Self::new(m, k);
        for node in 0..=m {
            let t = &mut hmm.t[node];
            if node == m {
                // M_M can only go to E (through MM) or I_M.
                dirichlet_uniform(rng, &mut t[Transition::MM as usize..=Transition::MI as usize]);
                t[Transition::MD] = 0.0;
            } else {
                dirichlet_uniform(rng, &mut t[Transition::MM as usize..=Transition::MD as usize]);
            }
            dirichlet_uniform(rng, &mut t[Transition::IM as usize..=Transition::II as usize]);
            if node > 0 && node < m {
                dirichlet_uniform(rng, &mut t[Transition::DM as usize..=Transition::DD as usize]);
            }

            dirichlet_uniform(rng, &mut hmm.ins[node]);
            if node > 0 {
                dirichlet_uniform(rng, &mut hmm.mat[node]);
            }
        }
        hmm
    }

    /// Check every distribution of the model.
    pub fn validate(&self, tol: f64) -> Result<()> {
        if self.m == 0 || self.k == 0 {
            return Err(Error::model_invalid("model needs at least one node and one residue"));
        }
        if self.k > MAX_K {
            return Err(Error::model_invalid(format!("alphabet size {} too large", self.k)));
        }
        if self.t.len() != self.m + 1 || self.mat.len() != self.m + 1 || self.ins.len() != self.m + 1
        {
            return Err(Error::model_invalid("model tables do not cover nodes 0..=M"));
        }
        if self.t[self.m][Transition::MD] != 0.0 {
            return Err(Error::model_invalid("last node can't transition to a delete state"));
        }

        for (node, t) in self.t.iter().enumerate() {
            check_distribution(match_row(t), tol, || format!("match transitions of node {}", node))?;
            check_distribution(insert_row(t), tol, || format!("insert transitions of node {}", node))?;
            check_distribution(delete_row(t), tol, || format!("delete transitions of node {}", node))?;
            check_distribution(&self.ins[node], tol, || format!("insert emissions of node {}", node))?;
            if node > 0 {
                check_distribution(&self.mat[node], tol, || {
                    format!("match emissions of node {}", node)
                })?;
            }
            if t[Transition::MI] > 0.0 && t[Transition::IM] <= 0.0 {
                return Err(Error::model_invalid(format!("insert state {} can't be left", node)));
            }
        }

        Ok(())
    }

    /// Probability that a core model path uses match state k, for k in 1..=M. Index 0 is unused.
    pub fn match_occupancy(&self) -> Vec<f64> {
        let mut occ = vec![0.0; self.m + 1];
        if self.m == 0 {
            return occ;
        }
        occ[1] = self.t[0][Transition::MI] + self.t[0][Transition::MM];
        for k in 2..=self.m {
            let prev = &self.t[k - 1];
            occ[k] = occ[k - 1] * (prev[Transition::MM] + prev[Transition::MI])
                + (1.0 - occ[k - 1]) * prev[Transition::DM];
        }
        occ
    }
}

/// Fill `p` with a sample from a flat Dirichlet, via normalized Exp(1) draws.
fn dirichlet_uniform<R: Rng + ?Sized>(rng: &mut R, p: &mut [f64]) {
    for x in p.iter_mut() {
        // gen() is in [0, 1), so the logarithm's argument is never zero.
        *x = -(1.0 - rng.gen::<f64>()).ln();
    }
    let sum: f64 = p.iter().sum();
    if sum > 0.0 {
        p.iter_mut().for_each(|x| *x /= sum);
    } else {
        let uniform = 1.0 / p.len() as f64;
        p.iter_mut().for_each(|x| *x = uniform);
    }
}
