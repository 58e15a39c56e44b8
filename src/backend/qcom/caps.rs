//! MDP hardware description
//!
//! The display engine lists its pipes and limits in the `caps` attribute
//! of its sysfs node, one entry per line:
//!
//! ```text
//! mdp_version=5
//! hw_rev=268894209
//! pipe_count:4
//! pipe_num:0 pipe_type:vig pipe_ndx:1 rects:1 pipe_fmts=...
//! max_pipe_width=2560
//! features= ubwc decimation src_split
//! ```

use std::{fmt, str::FromStr};

use scan_fmt::scan_fmt;
use tracing::{debug, trace, warn};

/// Longest line accepted from the caps attribute, newline included
pub const MAX_CAPS_LINE: usize = 127;

bitflags::bitflags! {
    /// Optional MDP features
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MdpFeatures: u32 {
        /// Universal bandwidth compression
        const UBWC = 0b0001;
        /// Source decimation, extends the downscale range
        const DECIMATION = 0b0010;
        /// Sources split across two pipes of one mixer
        const SRC_SPLIT = 0b0100;
        /// Downscaling in the rotator
        const ROTATOR_DOWNSCALE = 0b1000;
    }
}

/// Kind of an MDP source pipe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipeType {
    /// RGB only, used for the framebuffer
    Rgb,
    /// Video pipe with scaler and color conversion, used for client buffers
    Vig,
    /// Plain DMA pipe
    Dma,
    /// Hardware cursor pipe
    Cursor,
}

impl FromStr for PipeType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rgb" => Ok(PipeType::Rgb),
            "vig" => Ok(PipeType::Vig),
            "dma" => Ok(PipeType::Dma),
            "cursor" => Ok(PipeType::Cursor),
            _ => Err(()),
        }
    }
}

/// One source pipe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pipe {
    /// Pipe mask, as passed in a layer
    pub index: u32,
    /// Pipe kind
    pub kind: PipeType,
}

impl fmt::Display for Pipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} pipe {:#x}", self.kind, self.index)
    }
}

/// Limits of the display engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HwInfo {
    /// MDP version
    pub hw_version: u32,
    /// Hardware revision
    pub hw_revision: u32,
    /// Number of blending stages of a mixer
    pub blending_stages: u32,
    /// Largest cursor image
    pub max_cursor_size: u32,
    /// Largest `dst / src` ratio of a pipe
    pub max_scale_up: u32,
    /// Largest `src / dst` ratio of a pipe, without decimation
    pub max_scale_down: u32,
    /// Widest rectangle a single pipe can fetch or output
    pub max_pipe_width: u32,
    /// Widest mixer output
    pub max_mixer_width: u32,
    /// Optional features
    pub features: MdpFeatures,
}

/// Everything read from the caps attribute
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MdpCaps {
    /// Engine limits
    pub hw: HwInfo,
    /// Source pipes in listing order
    pub pipes: Vec<Pipe>,
}

impl MdpCaps {
    /// Parse the contents of the caps attribute
    ///
    /// Parsing never fails: lines that are too long or cannot be understood
    /// are skipped, leaving the matching limit at zero.
    pub fn parse(text: &str) -> MdpCaps {
        let mut caps = MdpCaps::default();
        let mut pipe_count = None;

        for line in text.split_inclusive('\n') {
            if line.len() > MAX_CAPS_LINE {
                warn!(len = line.len(), "line too long in MDP caps");
                continue;
            }
            let line = line.trim_end_matches('\n');

            if line.starts_with("pipe_count:") {
                match scan_fmt!(line, "pipe_count:{d}", usize) {
                    Ok(count) => pipe_count = Some(count),
                    Err(err) => warn!(line, ?err, "invalid pipe count"),
                }
            } else if line.starts_with("pipe_num:") {
                match parse_pipe(line) {
                    Some(pipe) => {
                        trace!(%pipe, "add pipe");
                        caps.pipes.push(pipe);
                    }
                    None => debug!(line, "skipping pipe definition"),
                }
            } else if let Some((key, value)) = line.split_once('=') {
                caps.hw.set(key, value);
            }
        }

        if pipe_count.map_or(false, |count| count != caps.pipes.len()) {
            warn!(
                expected = ?pipe_count,
                parsed = caps.pipes.len(),
                "failed to parse some pipe definitions"
            );
        }

        caps
    }

    /// Pipes of a given kind
    pub fn pipes_of(&self, kind: PipeType) -> impl Iterator<Item = &Pipe> {
        self.pipes.iter().filter(move |pipe| pipe.kind == kind)
    }
}

fn parse_pipe(line: &str) -> Option<Pipe> {
    let mut kind = None;
    let mut index = None;

    for token in line.split(' ') {
        let Some((key, value)) = token.split_once(':') else {
            continue;
        };
        match key {
            "pipe_type" => kind = value.parse::<PipeType>().ok(),
            "pipe_ndx" => index = scan_fmt!(value, "{d}", u32).ok(),
            _ => {}
        }
    }

    Some(Pipe {
        index: index?,
        kind: kind?,
    })
}

impl HwInfo {
    fn set(&mut self, key: &str, value: &str) {
        if key == "features" {
            self.features = value
                .split(' ')
                .filter_map(|feature| match feature {
                    "ubwc" => Some(MdpFeatures::UBWC),
                    "decimation" => Some(MdpFeatures::DECIMATION),
                    "src_split" => Some(MdpFeatures::SRC_SPLIT),
                    "rotator_downscale" => Some(MdpFeatures::ROTATOR_DOWNSCALE),
                    _ => None,
                })
                .collect();
            return;
        }

        let field = match key {
            "mdp_version" => &mut self.hw_version,
            "hw_rev" => &mut self.hw_revision,
            "blending_stages" => &mut self.blending_stages,
            "max_cursor_size" => &mut self.max_cursor_size,
            "max_upscale_ratio" => &mut self.max_scale_up,
            "max_downscale_ratio" => &mut self.max_scale_down,
            "max_pipe_width" => &mut self.max_pipe_width,
            "max_mixer_width" => &mut self.max_mixer_width,
            _ => return,
        };
        match value.trim().parse() {
            Ok(value) => *field = value,
            Err(err) => warn!(key, value, ?err, "invalid MDP caps value"),
        }
    }
}
