use tracing::trace;

use super::caps::{MdpFeatures, PipeType};
use super::device::{BlendOp, MdpDevice};
use super::format::MdpFormat;
use super::output::QcomOutput;
use super::pipe::{needs_split, release_pipe, reserve_pipe};
use super::plane::{LayerConfig, MdpPlane};
use crate::backend::scanout::clip::{align_even, check_scale, clip_view};
use crate::backend::scanout::format::{classify_alpha, AlphaBlend};
use crate::backend::scanout::{
    assign_views, BufferKind, DebugFlags, PlaneAssigner, PlaneAssignments, Rejection, ScaleLimits, ScanoutSource,
    TransformFlags, View,
};
use crate::utils::{Physical, Size};

/// Extra downscale reached by decimating before the pipe scaler
const DECIMATION_DOWNSCALE: u32 = 16;

impl<D: MdpDevice, R> QcomOutput<D, R> {
    /// Place `views`, ordered topmost first, on layers of the next commit
    ///
    /// Views that get no plane must be rendered into the framebuffer before
    /// [`QcomOutput::repaint`] is called.
    #[profiling::function]
    pub fn assign_planes(&mut self, views: &[View]) -> PlaneAssignments<MdpPlane> {
        let span = self.span.clone();
        let _guard = span.enter();

        assign_views(self, views)
    }

    fn scale_limits(&self, format: MdpFormat) -> ScaleLimits {
        let hw = &self.caps.hw;
        let mut down = hw.max_scale_down;
        if hw.features.contains(MdpFeatures::DECIMATION) && !format.is_ubwc() {
            down = down.saturating_mul(DECIMATION_DOWNSCALE);
        }
        ScaleLimits {
            max_upscale: Some(hw.max_scale_up),
            max_downscale: Some(down),
            max_src_width: None,
            interlaced: true,
        }
    }
}

impl<D: MdpDevice, R> PlaneAssigner for QcomOutput<D, R> {
    type Plane = MdpPlane;

    fn output_size(&self) -> Size<i32, Physical> {
        self.size()
    }

    fn try_overlay(&mut self, view: &View, _is_last: bool) -> Result<MdpPlane, Rejection> {
        if self.config.debug_flags.contains(DebugFlags::DISABLE_PLANES) {
            return Err(Rejection::PlanesDisabled);
        }
        if view.buffer_transform != self.config.transform || view.transform.flags.contains(TransformFlags::ROTATE) {
            return Err(Rejection::UnsupportedTransform);
        }
        if Some(view.output_mask) != 1u32.checked_shl(self.config.output_id) {
            return Err(Rejection::OtherOutputs);
        }
        let buffer = view.buffer.as_ref().ok_or(Rejection::NoBuffer)?;

        let index = self
            .planes
            .find_last_free(|plane| plane.state.is_idle())
            .ok_or(Rejection::NoFreePlane)?;

        let BufferKind::Dmabuf {
            handle,
            format,
            modifier,
            ref planes,
            ..
        } = *buffer.kind()
        else {
            trace!(view = view.id.0, "not a dmabuf");
            return Err(Rejection::UnsupportedBuffer);
        };
        let mdp_format = MdpFormat::from_drm(format, modifier).ok_or(Rejection::UnsupportedFormat)?;
        if planes.len() != 1 {
            trace!(view = view.id.0, planes = planes.len(), "multi-planar buffer");
            return Err(Rejection::UnsupportedBuffer);
        }

        let mut rects = clip_view(view, self.size())?.to_scanout(view, false);
        if rects.dst.is_empty() || rects.src.is_empty() {
            return Err(Rejection::SizeOutOfRange);
        }

        // the format is kept, a fully opaque surface just skips blending
        let blend = match classify_alpha(format, &view.opaque, view.surface_size)? {
            AlphaBlend::Opaque { .. } => BlendOp::Opaque,
            AlphaBlend::Premultiplied => BlendOp::Premultiplied,
        };

        align_even(&mut rects.src);
        if rects.src.is_empty() {
            return Err(Rejection::SizeOutOfRange);
        }
        check_scale(rects.src.size, rects.dst.size, &self.scale_limits(mdp_format), false)?;

        let left = reserve_pipe(&mut self.pipes, PipeType::Vig).ok_or(Rejection::NoFreePipe)?;
        let right = if needs_split(&rects, &self.caps.hw) {
            match reserve_pipe(&mut self.pipes, PipeType::Vig) {
                Some(pipe) => Some(pipe),
                None => {
                    release_pipe(&mut self.pipes, left);
                    return Err(Rejection::NoFreePipe);
                }
            }
        } else {
            None
        };

        let config = LayerConfig {
            mode: None,
            left: Some(left),
            right,
            src: rects.src,
            dst: rects.dst,
            alpha: view.alpha_u8(),
            format: Some(mdp_format),
            blend,
            zorder: self.zorder,
        };

        let Some(plane) = self.planes.get_mut(index) else {
            release_pipe(&mut self.pipes, left);
            return Err(Rejection::NoFreePlane);
        };
        if plane
            .state
            .prepare(ScanoutSource::Surface(handle), Some(config), Some(buffer.clone()))
            .is_err()
        {
            release_pipe(&mut self.pipes, left);
            if let Some(right) = right {
                release_pipe(&mut self.pipes, right);
            }
            return Err(Rejection::PlaneBusy);
        }

        let id = plane.id;
        self.planes.reserve(index);
        self.zorder += 1;
        trace!(
            %id,
            %left,
            right = ?right.map(|pipe| pipe.index),
            src = ?rects.src,
            dst = ?rects.dst,
            ?blend,
            "view assigned"
        );
        Ok(id)
    }
}
