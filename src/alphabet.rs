use std::str::FromStr;

const DNA_SYMBOLS: &[u8] = b"ACGT";
const AMINO_SYMBOLS: &[u8] = b"ACDEFGHIKLMNPQRSTVWY";

/// Background amino acid composition, in `AMINO_SYMBOLS` order.
const AMINO_FREQUENCIES: [f64; 20] = [
    0.0787945, 0.0151600, 0.0535222, 0.0668298, 0.0397062, 0.0695071, 0.0229198, 0.0590092,
    0.0594422, 0.0963728, 0.0237718, 0.0414386, 0.0482904, 0.0395639, 0.0540978, 0.0683364,
    0.0540687, 0.0673417, 0.0114135, 0.0304133,
];

/// The residue alphabets the driver knows how to print.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Alphabet {
    Dna,
    Amino,
}

impl Alphabet {
    /// Number of canonical residues.
    pub fn k(self) -> usize {
        self.symbols().len()
    }

    pub fn symbols(self) -> &'static [u8] {
        match self {
            Alphabet::Dna => DNA_SYMBOLS,
            Alphabet::Amino => AMINO_SYMBOLS,
        }
    }

    /// Default null model residue frequencies.
    pub fn frequencies(self) -> Vec<f64> {
        match self {
            Alphabet::Dna => vec![0.25; 4],
            Alphabet::Amino => AMINO_FREQUENCIES.to_vec(),
        }
    }

    /// Convert digital residues back to letters. Codes outside the alphabet become 'X' ('N' for DNA).
    pub fn textize(self, dsq: &[u8]) -> Vec<u8> {
        let symbols = self.symbols();
        let unknown = match self {
            Alphabet::Dna => b'N',
            Alphabet::Amino => b'X',
        };
        dsq.iter()
            .map(|&x| *symbols.get(x as usize).unwrap_or(&unknown))
            .collect()
    }
}

impl FromStr for Alphabet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dna" | "DNA" => Ok(Alphabet::Dna),
            "amino" | "protein" => Ok(Alphabet::Amino),
            _ => Err(format!("unknown alphabet {}", s)),
        }
    }
}
