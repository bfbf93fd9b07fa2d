//! External sources feeding numeric samples into the simulation.
//!
//! A [`Source`] is a lightweight handle held by a model (generator, dynamic
//! queue, priority queue). It carries a sample window plus the identifier
//! and family tag of the registry entry that refills it. Reading past the
//! window triggers an [`SourceOp::Update`] through the registry dispatch;
//! a refill that still yields nothing is reported as
//! [`crate::Error::SourceEmpty`].
//!
//! Four families are provided: constant scalars, binary files of raw f64,
//! whitespace-delimited text files, and pseudo-random draws from a 64-bit
//! Mersenne Twister seeded per registry.

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::PathBuf;

use rand::Rng;
use rand_distr::Distribution as _;
use rand_mt::Mt64;
use serde::{Deserialize, Serialize};

use crate::arena::{
    BinaryFileSourceId, ConstantSourceId, DataArray, Id, RandomSourceId, TextFileSourceId,
};
use crate::error::{Error, SimResult};

/// Samples per refill window.
const CHUNK: usize = 512;

/// Default Mersenne Twister seed.
const DEFAULT_SEED: u64 = 5489;

/// Registry operation requested for a [`Source`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceOp {
    /// Prepare the source at simulation initialize time.
    Initialize,
    /// Refill the sample window after exhaustion.
    Update,
    /// Release the source at simulation finalize time.
    Finalize,
}

/// The four source families.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceType {
    BinaryFile,
    Constant,
    Random,
    TextFile,
}

/// Host-settable dispatch: routes a source operation to whatever owns the
/// sample data.
pub type SourceDispatch = Box<dyn FnMut(&mut Source, SourceOp) -> SimResult<()>>;

/// A bound sample stream: the window, plus `(kind, id)` naming the registry
/// entry that refills it.
#[derive(Clone, Debug, Default)]
pub struct Source {
    pub(crate) buffer: Vec<f64>,
    pub id: u64,
    pub kind: Option<SourceType>,
    pub(crate) index: usize,
}

impl Source {
    pub fn constant(id: ConstantSourceId) -> Self {
        Self {
            kind: Some(SourceType::Constant),
            id: id.raw(),
            ..Self::default()
        }
    }

    pub fn binary_file(id: BinaryFileSourceId) -> Self {
        Self {
            kind: Some(SourceType::BinaryFile),
            id: id.raw(),
            ..Self::default()
        }
    }

    pub fn text_file(id: TextFileSourceId) -> Self {
        Self {
            kind: Some(SourceType::TextFile),
            id: id.raw(),
            ..Self::default()
        }
    }

    pub fn random(id: RandomSourceId) -> Self {
        Self {
            kind: Some(SourceType::Random),
            id: id.raw(),
            ..Self::default()
        }
    }

    /// True when the handle is bound to a registry entry.
    pub fn is_bound(&self) -> bool {
        self.kind.is_some()
    }

    /// Reads the next sample from the window. Returns `false` on
    /// exhaustion; the caller then issues an update and retries.
    pub fn next(&mut self, value: &mut f64) -> bool {
        if self.index >= self.buffer.len() {
            return false;
        }

        *value = self.buffer[self.index];
        self.index += 1;
        true
    }

    /// Empties the window, keeping the binding.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.index = 0;
    }

    /// Empties the window and drops the binding.
    pub fn reset(&mut self) {
        self.clear();
        self.kind = None;
        self.id = 0;
    }
}

/// A source producing one scalar forever.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstantSource {
    pub value: f64,
}

impl ConstantSource {
    pub fn new(value: f64) -> Self {
        Self { value }
    }

    fn dispatch(&mut self, src: &mut Source, op: SourceOp) -> SimResult<()> {
        match op {
            SourceOp::Initialize | SourceOp::Update => {
                src.buffer.clear();
                src.buffer.push(self.value);
                src.index = 0;
                Ok(())
            }
            SourceOp::Finalize => {
                src.clear();
                Ok(())
            }
        }
    }
}

/// A source streaming raw f64 values from a binary file.
#[derive(Debug, Default)]
pub struct BinaryFileSource {
    pub path: PathBuf,
    reader: Option<BufReader<File>>,
}

impl BinaryFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            reader: None,
        }
    }

    fn dispatch(&mut self, src: &mut Source, op: SourceOp) -> SimResult<()> {
        match op {
            SourceOp::Initialize => {
                let file = File::open(&self.path).map_err(|_| Error::SourceEmpty)?;
                self.reader = Some(BufReader::new(file));
                src.clear();
                Ok(())
            }
            SourceOp::Update => self.refill(src),
            SourceOp::Finalize => {
                self.reader = None;
                src.clear();
                Ok(())
            }
        }
    }

    fn refill(&mut self, src: &mut Source) -> SimResult<()> {
        let reader = self.reader.as_mut().ok_or(Error::SourceEmpty)?;

        src.buffer.clear();
        src.index = 0;

        let mut raw = [0u8; 8];
        while src.buffer.len() < CHUNK {
            match reader.read_exact(&mut raw) {
                Ok(()) => src.buffer.push(f64::from_ne_bytes(raw)),
                Err(_) => break,
            }
        }

        Ok(())
    }
}

/// A source parsing whitespace-delimited f64 values from a text file.
#[derive(Debug, Default)]
pub struct TextFileSource {
    pub path: PathBuf,
    reader: Option<BufReader<File>>,
}

impl TextFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            reader: None,
        }
    }

    fn dispatch(&mut self, src: &mut Source, op: SourceOp) -> SimResult<()> {
        match op {
            SourceOp::Initialize => {
                let file = File::open(&self.path).map_err(|_| Error::SourceEmpty)?;
                self.reader = Some(BufReader::new(file));
                src.clear();
                Ok(())
            }
            SourceOp::Update => self.refill(src),
            SourceOp::Finalize => {
                self.reader = None;
                src.clear();
                Ok(())
            }
        }
    }

    // Reads until the window is full or the file ends; values are taken a
    // whole line at a time, so the window may run slightly past CHUNK.
    fn refill(&mut self, src: &mut Source) -> SimResult<()> {
        let reader = self.reader.as_mut().ok_or(Error::SourceEmpty)?;

        src.buffer.clear();
        src.index = 0;

        let mut line = String::new();
        while src.buffer.len() < CHUNK {
            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    for token in line.split_whitespace() {
                        if let Ok(value) = token.parse::<f64>() {
                            src.buffer.push(value);
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

/// The distribution drawn by a [`RandomSource`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "distribution", rename_all = "kebab-case")]
pub enum RandomDistribution {
    UniformInt { a: i32, b: i32 },
    UniformReal { a: f64, b: f64 },
    Bernoulli { p: f64 },
    Binomial { t: u64, p: f64 },
    NegativeBinomial { r: f64, p: f64 },
    Geometric { p: f64 },
    Poisson { mean: f64 },
    Exponential { lambda: f64 },
    Gamma { alpha: f64, beta: f64 },
    Weibull { a: f64, b: f64 },
    ExtremeValue { a: f64, b: f64 },
    Normal { mean: f64, stddev: f64 },
    LogNormal { m: f64, s: f64 },
    ChiSquared { n: f64 },
    Cauchy { a: f64, b: f64 },
    FisherF { m: f64, n: f64 },
    StudentT { n: f64 },
}

impl Default for RandomDistribution {
    fn default() -> Self {
        Self::UniformReal { a: 0.0, b: 1.0 }
    }
}

impl RandomDistribution {
    /// Draws one sample. Invalid parameters are reported as
    /// [`Error::SourceEmpty`]: the stream cannot produce values.
    pub fn sample(&self, rng: &mut Mt64) -> SimResult<f64> {

        match *self {
            Self::UniformInt { a, b } => {
                if a > b {
                    return Err(Error::SourceEmpty);
                }
                Ok(rng.gen_range(a..=b) as f64)
            }
            Self::UniformReal { a, b } => {
                if !(a < b) {
                    return Err(Error::SourceEmpty);
                }
                Ok(rng.gen_range(a..b))
            }
            Self::Bernoulli { p } => {
                let dist = rand_distr::Bernoulli::new(p).map_err(|_| Error::SourceEmpty)?;
                Ok(if dist.sample(rng) { 1.0 } else { 0.0 })
            }
            Self::Binomial { t, p } => {
                let dist = rand_distr::Binomial::new(t, p).map_err(|_| Error::SourceEmpty)?;
                Ok(dist.sample(rng) as f64)
            }
            Self::NegativeBinomial { r, p } => {
                // Gamma-Poisson mixture; `rand_distr` has no direct
                // negative-binomial distribution.
                if !(p > 0.0 && p <= 1.0) || !(r > 0.0) {
                    return Err(Error::SourceEmpty);
                }
                if p >= 1.0 {
                    return Ok(0.0);
                }
                let gamma = rand_distr::Gamma::new(r, (1.0 - p) / p).map_err(|_| Error::SourceEmpty)?;
                let lambda = gamma.sample(rng);
                if lambda <= 0.0 {
                    return Ok(0.0);
                }
                let poisson = rand_distr::Poisson::new(lambda).map_err(|_| Error::SourceEmpty)?;
                Ok(poisson.sample(rng))
            }
            Self::Geometric { p } => {
                let dist = rand_distr::Geometric::new(p).map_err(|_| Error::SourceEmpty)?;
                Ok(dist.sample(rng) as f64)
            }
            Self::Poisson { mean } => {
                let dist = rand_distr::Poisson::new(mean).map_err(|_| Error::SourceEmpty)?;
                Ok(dist.sample(rng))
            }
            Self::Exponential { lambda } => {
                let dist = rand_distr::Exp::new(lambda).map_err(|_| Error::SourceEmpty)?;
                Ok(dist.sample(rng))
            }
            Self::Gamma { alpha, beta } => {
                let dist = rand_distr::Gamma::new(alpha, beta).map_err(|_| Error::SourceEmpty)?;
                Ok(dist.sample(rng))
            }
            Self::Weibull { a, b } => {
                let dist = rand_distr::Weibull::new(b, a).map_err(|_| Error::SourceEmpty)?;
                Ok(dist.sample(rng))
            }
            Self::ExtremeValue { a, b } => {
                let dist = rand_distr::Gumbel::new(a, b).map_err(|_| Error::SourceEmpty)?;
                Ok(dist.sample(rng))
            }
            Self::Normal { mean, stddev } => {
                let dist = rand_distr::Normal::new(mean, stddev).map_err(|_| Error::SourceEmpty)?;
                Ok(dist.sample(rng))
            }
            Self::LogNormal { m, s } => {
                let dist = rand_distr::LogNormal::new(m, s).map_err(|_| Error::SourceEmpty)?;
                Ok(dist.sample(rng))
            }
            Self::ChiSquared { n } => {
                let dist = rand_distr::ChiSquared::new(n).map_err(|_| Error::SourceEmpty)?;
                Ok(dist.sample(rng))
            }
            Self::Cauchy { a, b } => {
                let dist = rand_distr::Cauchy::new(a, b).map_err(|_| Error::SourceEmpty)?;
                Ok(dist.sample(rng))
            }
            Self::FisherF { m, n } => {
                let dist = rand_distr::FisherF::new(m, n).map_err(|_| Error::SourceEmpty)?;
                Ok(dist.sample(rng))
            }
            Self::StudentT { n } => {
                let dist = rand_distr::StudentT::new(n).map_err(|_| Error::SourceEmpty)?;
                Ok(dist.sample(rng))
            }
        }
    }
}

/// A source generating pseudo-random draws into its window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RandomSource {
    pub distribution: RandomDistribution,
}

impl RandomSource {
    pub fn new(distribution: RandomDistribution) -> Self {
        Self { distribution }
    }

    fn dispatch(&mut self, src: &mut Source, op: SourceOp, rng: &mut Mt64) -> SimResult<()> {
        match op {
            SourceOp::Initialize | SourceOp::Update => {
                src.buffer.clear();
                src.index = 0;
                for _ in 0..CHUNK {
                    let value = self.distribution.sample(rng)?;
                    src.buffer.push(value);
                }
                Ok(())
            }
            SourceOp::Finalize => {
                src.clear();
                Ok(())
            }
        }
    }
}

/// Registry owning every external source, one arena per family.
///
/// Replaces any process-wide state: a host builds a registry, registers the
/// sources its models reference, then installs it on the simulation via
/// [`ExternalSources::into_dispatch`] (or wraps it in its own closure).
pub struct ExternalSources {
    pub constants: DataArray<ConstantSource, ConstantSourceId>,
    pub binary_files: DataArray<BinaryFileSource, BinaryFileSourceId>,
    pub text_files: DataArray<TextFileSource, TextFileSourceId>,
    pub randoms: DataArray<RandomSource, RandomSourceId>,
    rng: Mt64,
}

impl ExternalSources {
    pub fn with_capacity(capacity: usize) -> SimResult<Self> {
        Self::with_seed(capacity, DEFAULT_SEED)
    }

    pub fn with_seed(capacity: usize, seed: u64) -> SimResult<Self> {
        Ok(Self {
            constants: DataArray::with_capacity(capacity)?,
            binary_files: DataArray::with_capacity(capacity)?,
            text_files: DataArray::with_capacity(capacity)?,
            randoms: DataArray::with_capacity(capacity)?,
            rng: Mt64::new(seed),
        })
    }

    /// Routes `op` to the registry entry bound to `src`.
    pub fn dispatch(&mut self, src: &mut Source, op: SourceOp) -> SimResult<()> {
        match src.kind {
            None => Err(Error::SourceUnknown),
            Some(SourceType::Constant) => {
                let id = ConstantSourceId::from_raw(src.id);
                match self.constants.try_to_get_mut(id) {
                    Some(entry) => entry.dispatch(src, op),
                    None => Err(Error::SourceUnknown),
                }
            }
            Some(SourceType::BinaryFile) => {
                let id = BinaryFileSourceId::from_raw(src.id);
                match self.binary_files.try_to_get_mut(id) {
                    Some(entry) => entry.dispatch(src, op),
                    None => Err(Error::SourceUnknown),
                }
            }
            Some(SourceType::TextFile) => {
                let id = TextFileSourceId::from_raw(src.id);
                match self.text_files.try_to_get_mut(id) {
                    Some(entry) => entry.dispatch(src, op),
                    None => Err(Error::SourceUnknown),
                }
            }
            Some(SourceType::Random) => {
                let Self { randoms, rng, .. } = self;
                let id = RandomSourceId::from_raw(src.id);
                match randoms.try_to_get_mut(id) {
                    Some(entry) => entry.dispatch(src, op, rng),
                    None => Err(Error::SourceUnknown),
                }
            }
        }
    }

    /// Consumes the registry into a boxed dispatch closure ready for
    /// [`crate::Simulation::set_source_dispatch`].
    pub fn into_dispatch(self) -> SourceDispatch {
        let mut registry = self;
        Box::new(move |src, op| registry.dispatch(src, op))
    }
}

/// Target format for [`generate_random_file`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RandomFileType {
    Binary,
    Text,
}

/// Writes `len` draws of `distribution` to `out`, producing a file a
/// [`BinaryFileSource`] or [`TextFileSource`] can replay.
pub fn generate_random_file<W: Write>(
    out: &mut W,
    rng: &mut Mt64,
    distribution: RandomDistribution,
    len: usize,
    kind: RandomFileType,
) -> std::io::Result<()> {
    for _ in 0..len {
        let value = distribution.sample(rng).map_err(|err| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string())
        })?;

        match kind {
            RandomFileType::Text => writeln!(out, "{value}")?,
            RandomFileType::Binary => out.write_all(&value.to_ne_bytes())?,
        }
    }

    Ok(())
}
