use rand::SeedableRng;
use rand::rngs::StdRng;

/// Pipeline stages that each own an independent random stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stream {
    Sampler,
    MediatorNoise,
    EventTimes,
    Bootstrap,
}

impl Stream {
    fn tag(self) -> u64 {
        match self {
            Stream::Sampler => 0x5341_4d50,
            Stream::MediatorNoise => 0x4d45_4449,
            Stream::EventTimes => 0x5449_4d45,
            Stream::Bootstrap => 0x424f_4f54,
        }
    }
}

/// Derives reproducible generators from a single master seed.
///
/// Every stage and every bootstrap replicate receives its own `StdRng`, so a
/// stage can be replayed in isolation and replicates do not depend on the
/// order in which they are evaluated.
#[derive(Clone, Copy, Debug)]
pub struct RngStreams {
    master: u64,
}

impl RngStreams {
    pub fn new(master: u64) -> Self {
        Self { master }
    }

    pub fn master(&self) -> u64 {
        self.master
    }

    pub fn stream(&self, stream: Stream) -> StdRng {
        StdRng::seed_from_u64(derive_seed(self.master, stream.tag(), 0))
    }

    /// Generator for bootstrap replicate `index` (0-based).
    pub fn replicate(&self, index: usize) -> StdRng {
        StdRng::seed_from_u64(derive_seed(
            self.master,
            Stream::Bootstrap.tag(),
            index as u64 + 1,
        ))
    }
}

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn derive_seed(master: u64, tag: u64, index: u64) -> u64 {
    splitmix64(splitmix64(splitmix64(master) ^ tag) ^ index)
}
