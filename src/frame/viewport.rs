// Letterboxing - keep a fixed aspect ratio inside whatever extent we get
//
// The viewport is the largest rectangle of the target aspect that fits the
// current extent, centered; the leftover space becomes symmetric bars on the
// longer axis.

use ash::vk;

#[derive(Debug, Clone, Copy)]
pub struct Letterbox {
    pub viewport: vk::Viewport,
    pub scissor: vk::Rect2D,
}

impl Letterbox {
    pub fn fit(extent: vk::Extent2D, target_aspect: f32) -> Self {
        let cur_w = extent.width as f32;
        let cur_h = extent.height as f32;
        let cur_aspect = if cur_h > 0.0 { cur_w / cur_h } else { 1.0 };

        let (mut vp_w, mut vp_h) = (cur_w, cur_h);
        if target_aspect > 0.0 {
            if cur_aspect > target_aspect {
                // Too wide: pillarbox
                vp_w = target_aspect * cur_h;
            } else if cur_aspect < target_aspect {
                // Too tall: letterbox
                vp_h = cur_w / target_aspect;
            }
        }

        let vp_x = (cur_w - vp_w) * 0.5;
        let vp_y = (cur_h - vp_h) * 0.5;

        let viewport = vk::Viewport {
            x: vp_x,
            y: vp_y,
            width: vp_w,
            height: vp_h,
            min_depth: 0.0,
            max_depth: 1.0,
        };

        let scissor = vk::Rect2D {
            offset: vk::Offset2D {
                x: vp_x.round() as i32,
                y: vp_y.round() as i32,
            },
            extent: vk::Extent2D {
                width: vp_w.round() as u32,
                height: vp_h.round() as u32,
            },
        };

        Self { viewport, scissor }
    }

    /// (horizontal, vertical) bar size on each side, in whole pixels
    pub fn margins(&self) -> (u32, u32) {
        (self.scissor.offset.x as u32, self.scissor.offset.y as u32)
    }
}

pub fn aspect_of(extent: vk::Extent2D) -> f32 {
    if extent.height == 0 {
        1.0
    } else {
        extent.width as f32 / extent.height as f32
    }
}
