use crate::Opt;
use bio::io::fasta;
use log::{debug, info};
use profhmm::bg::Background;
use profhmm::emit::{core_emit, profile_emit};
use profhmm::error::{Error, Result};
use profhmm::filter::{Filter, FilterConfig, FilterMatrix, StripedFilter};
use profhmm::hmm::Hmm;
use profhmm::profile::{EntryMode, Profile, ProfileConfig};
use profhmm::sequence::DigitalSequence;
use profhmm::trace::Trace;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256StarStar;
use rayon::prelude::{IntoParallelIterator, ParallelIterator};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{self, Write};
use std::sync::mpsc::{channel, Sender};
use std::thread;

/// A single sampled sequence, ready to be written.
#[derive(Debug)]
struct WriteEntry {
    name: String,
    desc: Option<String>,
    seq: Vec<u8>,
    domains: usize,
    /// Filter score, `f64::INFINITY` if it overflowed.
    score: Option<f64>,
}

/// This is a tuple to guarantee ordering for `WriteEntry`.
struct WriteTuple {
    /// The sample index: gives the ordering.
    idx: usize,
    /// The `WriteEntry`.
    data: WriteEntry,
}

impl Eq for WriteTuple {}

impl PartialEq for WriteTuple {
    fn eq(&self, other: &Self) -> bool {
        other.idx.eq(&self.idx)
    }
}

impl PartialOrd for WriteTuple {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        // We want to have a min-heap.
        other.idx.partial_cmp(&self.idx)
    }
}

impl Ord for WriteTuple {
    fn cmp(&self, other: &Self) -> Ordering {
        // We want to have a min-heap.
        other.idx.cmp(&self.idx)
    }
}

/// What was written, for the final report.
#[derive(Debug, Default)]
pub struct Summary {
    pub sequences: usize,
    pub residues: usize,
    pub domains: usize,
    pub overflows: usize,
    pub best_score: Option<f64>,
}

impl Summary {
    fn add(&mut self, entry: &WriteEntry) {
        self.sequences += 1;
        self.residues += entry.seq.len();
        self.domains += entry.domains;
        match entry.score {
            Some(sc) if sc == f64::INFINITY => self.overflows += 1,
            Some(sc) => {
                self.best_score = Some(self.best_score.map_or(sc, |best| best.max(sc)));
            }
            None => (),
        }
    }
}

/// Per thread state: buffers are reused from one sample to the next.
/// The filter is cloned too, because every sample reconfigures it for its own length.
#[derive(Clone)]
struct Worker<F: Filter> {
    tx: Sender<WriteTuple>,
    sq: DigitalSequence,
    tr: Trace,
    filter: Option<(F, FilterMatrix<F::Cell>)>,
}

/// Actually runs the main loop of the program.
pub fn run(opt: Opt) -> Result<Summary> {
    let mut rng = Xoshiro256StarStar::seed_from_u64(opt.seed);
    let bg = Background::for_alphabet(opt.alphabet)?;
    let mut hmm = Hmm::sample(&mut rng, opt.model_length, bg.k());
    hmm.name = format!("random{}", opt.model_length);

    let cfg = ProfileConfig {
        mode: if opt.h2 {
            EntryMode::Explicit
        } else {
            EntryMode::Implicit
        },
        multihit: !opt.unihit,
        target_length: opt.target_length,
        ..ProfileConfig::default()
    };
    let profile = Profile::configure(&hmm, &bg, &cfg)?;
    info!(
        "sampling {} sequences from {} of length {}",
        opt.count,
        if opt.profile { "profile" } else { "core model" },
        hmm.m
    );

    if !opt.score {
        return sample_all(&opt, &hmm, &profile, None::<StripedFilter<16>>);
    }
    let fcfg = FilterConfig::default();
    match opt.lanes {
        4 => sample_all(&opt, &hmm, &profile, Some(StripedFilter::<4>::new(&profile, fcfg))),
        8 => sample_all(&opt, &hmm, &profile, Some(StripedFilter::<8>::new(&profile, fcfg))),
        32 => sample_all(&opt, &hmm, &profile, Some(StripedFilter::<32>::new(&profile, fcfg))),
        _ => sample_all(&opt, &hmm, &profile, Some(StripedFilter::<16>::new(&profile, fcfg))),
    }
}

fn sample_all<F>(opt: &Opt, hmm: &Hmm, profile: &Profile, filter: Option<F>) -> Result<Summary>
where
    F: Filter + Clone + Send + Sync,
    F::Cell: Send,
{
    let out: Box<dyn Write + Send> = match &opt.output {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(io::stdout()),
    };
    let (tx, rx) = channel::<WriteTuple>();

    // We might be working with a lot of data.
    // So instead of collecting it sequentially at the end, we send it to a separate writing thread.
    let writer_thread = thread::spawn(move || -> io::Result<Summary> {
        let mut out = fasta::Writer::new(out);
        let mut summary = Summary::default();

        // We use a binary heap to get the incoming data in the right order.
        // While data may wait here for a bit until it is written, it shouldn't be too bad.
        let mut heap = BinaryHeap::<WriteTuple>::new();
        let mut next_wanted = 0;

        loop {
            // Work ordered, only continue if the top is the expected next value.
            while heap.peek().map_or(false, |e| e.idx == next_wanted) {
                if let Some(WriteTuple { data, .. }) = heap.pop() {
                    out.write(&data.name, data.desc.as_deref(), &data.seq)?;
                    summary.add(&data);
                }
                next_wanted += 1;
            }

            // Can only fail if all senders are broken and no messages are left in the buffer.
            match rx.recv() {
                Ok(msg) => heap.push(msg),
                Err(_) => break,
            }
        }

        out.flush()?;
        Ok(summary)
    });

    let worker = Worker {
        tx,
        sq: DigitalSequence::default(),
        tr: Trace::default(),
        filter: filter.map(|f| {
            let mx = f.new_matrix();
            (f, mx)
        }),
    };

    let alphabet = opt.alphabet;
    let sampled = (0..opt.count)
        .into_par_iter()
        .try_for_each_with(worker, |w, idx| -> Result<()> {
            // Every sample has its own stream, independent of which thread draws it.
            let mut rng = Xoshiro256StarStar::seed_from_u64(opt.seed.wrapping_add(idx as u64 + 1));
            if opt.profile {
                profile_emit(&mut rng, profile, Some(&mut w.sq), Some(&mut w.tr))?;
            } else {
                core_emit(&mut rng, hmm, Some(&mut w.sq), Some(&mut w.tr))?;
            }

            let score = match w.filter.as_mut() {
                Some((filter, mx)) => {
                    filter.reconfig_length(w.sq.len());
                    match filter.score(w.sq.residues(), mx) {
                        Ok(sc) => Some(sc),
                        Err(e) if e.is_overflow() => Some(f64::INFINITY),
                        Err(e) => return Err(e),
                    }
                }
                None => None,
            };

            let domains = if opt.profile { w.tr.domains() } else { 1 };
            let mut desc = Vec::new();
            if opt.profile {
                desc.push(format!("domains={}", domains));
            }
            if let Some(sc) = score {
                desc.push(format!("score={:.2}", sc));
            }
            let data = WriteEntry {
                name: format!("{}-sample{}", hmm.name, idx + 1),
                desc: if desc.is_empty() {
                    None
                } else {
                    Some(desc.join(" "))
                },
                seq: alphabet.textize(w.sq.residues()),
                domains,
                score,
            };
            debug!("sample {}: {} residues", idx + 1, data.seq.len());

            // Sending can only fail if the writer stopped, its own error is reported below.
            w.tx.send(WriteTuple { idx, data }).map_err(|_| {
                Error::Io(io::Error::new(io::ErrorKind::BrokenPipe, "writer stopped"))
            })
        });

    // Every sender is gone once the iterator is done, which ends the writer's loop.
    let written = writer_thread
        .join()
        .map_err(|_| Error::Io(io::Error::new(io::ErrorKind::Other, "writer thread panicked")))?;
    let summary = written?;
    sampled?;
    Ok(summary)
}
