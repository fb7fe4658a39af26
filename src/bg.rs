use crate::alphabet::Alphabet;
use crate::error::{Error, Result};
use crate::sequence::SENTINEL;
use crate::util::check_distribution;

/// Default tolerance on "sums to one".
pub const TOLERANCE: f64 = 1e-4;

/// Largest alphabet: residue codes must stay below the sentinel.
pub const MAX_K: usize = SENTINEL as usize;

/// The null model: residue frequencies of unrelated sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Background {
    f: Vec<f64>,
}

impl Background {
    /// Uniform null model over an alphabet of size `k`.
    pub fn uniform(k: usize) -> Result<Self> {
        check_size(k)?;
        Ok(Self {
            f: vec![1.0 / k as f64; k],
        })
    }

    /// Null model from explicit frequencies.
    pub fn from_frequencies(f: Vec<f64>) -> Result<Self> {
        check_size(f.len())?;
        check_distribution(&f, TOLERANCE, || "background".to_string())?;
        Ok(Self { f })
    }

    pub fn for_alphabet(alphabet: Alphabet) -> Result<Self> {
        Self::from_frequencies(alphabet.frequencies())
    }

    /// Alphabet size.
    #[inline]
    pub fn k(&self) -> usize {
        self.f.len()
    }

    #[inline]
    pub fn f(&self) -> &[f64] {
        &self.f
    }
}

fn check_size(k: usize) -> Result<()> {
    if k == 0 || k > MAX_K {
        return Err(Error::model_invalid(format!(
            "alphabet size {} not in 1..={}",
            k, MAX_K
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_sums_to_one() {
        let bg = Background::uniform(7).unwrap();
        assert_eq!(bg.k(), 7);
        assert!((bg.f().iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn rejects_bad_frequencies() {
        assert!(Background::from_frequencies(vec![0.5, 0.4]).is_err());
        assert!(Background::from_frequencies(vec![1.5, -0.5]).is_err());
        assert!(Background::uniform(0).is_err());
        assert!(Background::for_alphabet(Alphabet::Amino).is_ok());
    }

    #[test]
    fn alphabet_stays_below_sentinel() {
        assert_eq!(Background::uniform(MAX_K).unwrap().k(), 255);
        assert!(matches!(
            Background::uniform(MAX_K + 1),
            Err(Error::ModelInvalid(_))
        ));
        let f = vec![1.0 / 256.0; 256];
        assert!(Background::from_frequencies(f).is_err());
    }
}
