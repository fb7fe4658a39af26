mod run;

use crate::run::run;
use log::info;
use profhmm::alphabet::Alphabet;
use rayon::ThreadPoolBuilder;
use std::error::Error;
use std::path::PathBuf;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "profhmm",
    about = "Sample sequences from a profile HMM, optionally screening them with a Viterbi filter"
)]
pub struct Opt {
    /// Number of sequences to sample.
    #[structopt(short = "n", default_value = "1")]
    count: usize,

    /// Number of nodes of the randomly sampled model.
    #[structopt(short = "M", default_value = "100")]
    model_length: usize,

    /// Residue alphabet.
    #[structopt(
        long,
        default_value = "amino",
        possible_values = &["dna", "DNA", "amino", "protein"]
    )]
    alphabet: Alphabet,

    /// Seed for the model and for every sample. Output doesn't depend on the thread count.
    #[structopt(short = "s", default_value = "42")]
    seed: u64,

    /// Sample from the configured profile, flanks included, instead of the core model.
    #[structopt(short = "p")]
    profile: bool,

    /// Expected length of the target sequences, sets the flank lengths.
    #[structopt(short = "L", default_value = "400")]
    target_length: usize,

    /// Old style configuration: explicit begin and end probabilities.
    #[structopt(long)]
    h2: bool,

    /// At most one domain per sequence.
    #[structopt(long)]
    unihit: bool,

    /// Screen every sampled sequence with the striped filter, reporting the score in the description.
    #[structopt(long, conflicts_with = "h2")]
    score: bool,

    /// Words per filter vector.
    #[structopt(long, default_value = "16", possible_values = &["4", "8", "16", "32"])]
    lanes: usize,

    /// How many worker threads are allowed to be used? Zero will use the amount of logical cores.
    #[structopt(short = "t", default_value = "1")]
    threads: usize,

    /// Path to where the FASTA output must be written, stdout if not given.
    #[structopt(short = "o", parse(from_os_str))]
    output: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    // Read & setup options
    let opt: Opt = Opt::from_args();
    ThreadPoolBuilder::new()
        .num_threads(opt.threads)
        .build_global()?;

    let summary = run(opt)?;
    info!(
        "wrote {} sequences, {} residues, {} domains{}",
        summary.sequences,
        summary.residues,
        summary.domains,
        match summary.best_score {
            Some(sc) => format!(", best filter score {:.2} nats", sc),
            None => String::new(),
        }
    );
    if summary.overflows > 0 {
        info!("{} filter scores overflowed", summary.overflows);
    }

    Ok(())
}
