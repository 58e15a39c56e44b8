use std::fmt;

use tracing::info;

use super::device::{GdlDevice, GdlError, TvMode};
use super::Error;
use crate::utils::{Physical, Size};

bitflags::bitflags! {
    /// Flags of an output mode
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ModeFlags: u32 {
        /// The mode in use
        const CURRENT = 0x1;
        /// The mode preferred by the display
        const PREFERRED = 0x2;
        /// The mode comes from the display pipe itself
        const TVMODE = 0x8000;
    }
}

/// A mode of an ice output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputMode {
    /// Active area
    pub size: Size<i32, Physical>,
    /// Refresh rate in mHz
    pub refresh: u32,
    /// Whether the mode is interlaced
    pub interlaced: bool,
    /// Mode flags
    pub flags: ModeFlags,
}

impl OutputMode {
    /// Output mode matching a display pipe timing
    pub fn from_tvmode(tvmode: &TvMode, flags: ModeFlags) -> OutputMode {
        OutputMode {
            size: tvmode.size,
            refresh: tvmode.refresh.millihertz(),
            interlaced: tvmode.interlaced,
            flags,
        }
    }

    /// Whether both modes have the same timing, ignoring flags
    pub fn same_timing(&self, other: &OutputMode) -> bool {
        self.size == other.size && self.refresh == other.refresh && self.interlaced == other.interlaced
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}{}{:.1}",
            self.size.w,
            self.size.h,
            if self.interlaced { 'i' } else { 'p' },
            self.refresh as f32 / 1000.0
        )
    }
}

/// Read the display pipe timing
///
/// Returns the mode and whether the display actually reported one.
pub(super) fn read_display_mode<D: GdlDevice>(device: &mut D) -> Result<(TvMode, bool), Error> {
    match device.display_mode() {
        Ok(tvmode) => Ok((tvmode, true)),
        Err(GdlError::TvModeUndefined) => {
            let tvmode = TvMode::fallback();
            info!(
                mode = %OutputMode::from_tvmode(&tvmode, ModeFlags::empty()),
                "display mode undefined, using fallback"
            );
            Ok((tvmode, false))
        }
        Err(source) => Err(Error::Access {
            errmsg: "failed to get display info",
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::{read_display_mode, ModeFlags, OutputMode};
    use crate::backend::ice::device::{GdlError, Refresh, TvMode};
    use crate::backend::ice::test::DummyGdl;
    use crate::backend::ice::Error;
    use crate::utils::Size;

    #[test]
    fn mode_names() {
        let tvmode = TvMode {
            size: Size::from((1920, 1080)),
            refresh: Refresh::Hz59_94,
            interlaced: true,
        };
        let mode = OutputMode::from_tvmode(&tvmode, ModeFlags::TVMODE);
        assert_eq!(mode.to_string(), "1920x1080i59.9");
        assert_eq!(mode.refresh, 59940);

        let progressive = OutputMode::from_tvmode(&TvMode::fallback(), ModeFlags::CURRENT);
        assert_eq!(progressive.to_string(), "720x576p50.0");
        assert!(!progressive.same_timing(&mode));
        assert!(progressive.same_timing(&OutputMode {
            flags: ModeFlags::empty(),
            ..progressive
        }));
    }

    #[test]
    fn undefined_mode_falls_back() {
        let mut device = DummyGdl::new();
        device.mode = Err(GdlError::TvModeUndefined);
        assert_eq!(read_display_mode(&mut device).unwrap(), (TvMode::fallback(), false));

        device.mode = Err(GdlError::Busy);
        assert!(matches!(
            read_display_mode(&mut device),
            Err(Error::Access {
                source: GdlError::Busy,
                ..
            })
        ));
    }
}
