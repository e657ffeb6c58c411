//! Reference algorithm clients, one per adaptation strategy

mod hpss;
mod onset;
mod stats;
mod stft;

pub use hpss::*;
pub use onset::*;
pub use stats::*;
pub use stft::*;

use crate::adaptation::{Slicing, Streaming, StreamingControl};
use crate::wrapper::{BatchClient, BufferLayout};

pub type HpssBatch = BatchClient<HpssClient, Streaming>;
pub type OnsetSliceBatch = BatchClient<OnsetSliceClient, Slicing>;
pub type StatsBatch = BatchClient<StatsClient, StreamingControl>;

impl HpssClient {
    /// `source` into `harmonic`, `percussive` and `residual`
    pub fn batch() -> HpssBatch {
        BatchClient::new(
            BufferLayout::new()
                .input("source")
                .output("harmonic")
                .output("percussive")
                .output("residual"),
            Self::new(),
        )
    }
}

impl OnsetSliceClient {
    /// `source` into onset frames in `indices`
    pub fn batch() -> OnsetSliceBatch {
        BatchClient::new(BufferLayout::new().input("source").output("indices"), Self::new())
    }
}

impl StatsClient {
    /// `source` into one statistics frame per hop in `stats`
    pub fn batch() -> StatsBatch {
        BatchClient::new(BufferLayout::new().input("source").output("stats"), Self::new())
    }
}
