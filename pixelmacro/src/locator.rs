use crate::capture::ScreenSampler;
use crate::events::{Anchor, Position, Rect};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Search budget and acceptance thresholds for anchor relocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocatorConfig {
    /// Minimum normalized cross-correlation score to accept a template match
    pub template_threshold: f32,

    /// Region radii searched around the hint when a full-screen template
    /// match misses
    pub template_retry_radii: Vec<u32>,

    /// Base radius for the expanding color search
    pub color_radius: u32,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            template_threshold: 0.70,
            template_retry_radii: vec![10, 30, 60, 120],
            color_radius: 15,
        }
    }
}

/// A successful anchor search
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocatedMatch {
    pub position: Position,
    pub confidence: f32,
}

/// Finds a previously captured visual anchor on the live screen.
///
/// A miss is `None`, never an error: callers own the fallback policy.
/// Capture failures during a search are logged and treated as a miss.
#[derive(Clone)]
pub struct VisualLocator {
    sampler: ScreenSampler,
    config: LocatorConfig,
}

impl VisualLocator {
    pub fn new(sampler: ScreenSampler) -> Self {
        Self {
            sampler,
            config: LocatorConfig::default(),
        }
    }

    pub fn with_config(sampler: ScreenSampler, config: LocatorConfig) -> Self {
        Self { sampler, config }
    }

    /// Locate an anchor, searching around `hint` where the anchor itself
    /// carries no origin
    pub fn locate(&self, anchor: &Anchor, hint: Option<Position>) -> Option<LocatedMatch> {
        match anchor {
            Anchor::Color { rgb } => {
                let hint = hint?;
                self.find_color_near(hint, *rgb, self.config.color_radius)
            }
            Anchor::Template {
                path,
                origin,
                image,
            } => {
                let template = match image {
                    Some(img) => img.clone(),
                    None => {
                        let path = path.as_ref()?;
                        match image::open(path) {
                            Ok(img) => img.to_rgba8(),
                            Err(e) => {
                                warn!("Could not load template {:?}: {}", path, e);
                                return None;
                            }
                        }
                    }
                };
                let hint = hint.unwrap_or(*origin);
                self.find_template_near(&template, hint)
            }
        }
    }

    /// Expanding-radius color scan around `hint`.
    ///
    /// Scans square regions of radius [r, 2r, 3r, 60, 100] at a 2-pixel
    /// step, accepting the first pixel within a per-channel tolerance that
    /// widens with the region radius (10, then 15 up to radius 60, then 20).
    pub fn find_color_near(
        &self,
        hint: Position,
        rgb: (u8, u8, u8),
        radius: u32,
    ) -> Option<LocatedMatch> {
        let radii = [radius, radius * 2, radius * 3, 60, 100];
        for rad in radii {
            let tolerance = if rad <= radius {
                10
            } else if rad <= 60 {
                15
            } else {
                20
            };
            if let Some(found) = self.scan_region(hint, rad, rgb, tolerance, 2) {
                debug!(
                    "Color anchor found at {:?} (radius {}, tolerance {})",
                    found.position, rad, tolerance
                );
                return Some(found);
            }
        }
        debug!("Color anchor {:?} not found near {:?}", rgb, hint);
        None
    }

    /// Tight single-pixel-step color scan used as the last-resort drag
    /// fallback: radii [r, 2r, 3r], tolerance 4
    pub fn find_color_simple(
        &self,
        hint: Position,
        rgb: (u8, u8, u8),
        radius: u32,
    ) -> Option<LocatedMatch> {
        for rad in [radius, radius * 2, radius * 3] {
            if let Some(found) = self.scan_region(hint, rad, rgb, 4, 1) {
                return Some(found);
            }
        }
        None
    }

    fn scan_region(
        &self,
        center: Position,
        radius: u32,
        rgb: (u8, u8, u8),
        tolerance: u8,
        step: usize,
    ) -> Option<LocatedMatch> {
        let rect = self.clamp_to_screen(Rect::centered(center, radius))?;
        let region = match self.sampler.capture_region(rect) {
            Ok(region) => region,
            Err(e) => {
                warn!("Capture failed during color search: {}", e);
                return None;
            }
        };
        for dy in (0..region.height()).step_by(step) {
            for dx in (0..region.width()).step_by(step) {
                let px = region.get_pixel(dx, dy);
                let diff = channel_diff((px[0], px[1], px[2]), rgb);
                if diff <= tolerance {
                    return Some(LocatedMatch {
                        position: Position::new(rect.x + dx as i32, rect.y + dy as i32),
                        confidence: 1.0 - diff as f32 / 255.0,
                    });
                }
            }
        }
        None
    }

    /// Full-screen template match first, then expanding regions around the
    /// hint if the full screen misses
    fn find_template_near(&self, template: &RgbaImage, hint: Position) -> Option<LocatedMatch> {
        if let Some(found) = self.match_template(template, None) {
            return Some(found);
        }
        for &rad in &self.config.template_retry_radii {
            debug!("Template retry around {:?} with radius {}", hint, rad);
            if let Some(rect) = self.clamp_to_screen(Rect::centered(hint, rad)) {
                if let Some(found) = self.match_template(template, Some(rect)) {
                    return Some(found);
                }
            }
        }
        debug!("Template anchor not found near {:?}", hint);
        None
    }

    /// Normalized cross-correlation of the template against a region of the
    /// live screen (the whole screen when `region` is `None`)
    fn match_template(&self, template: &RgbaImage, region: Option<Rect>) -> Option<LocatedMatch> {
        let (search, origin) = match region {
            Some(rect) => match self.sampler.capture_region(rect) {
                Ok(img) => (img, Position::new(rect.x, rect.y)),
                Err(e) => {
                    warn!("Capture failed during template search: {}", e);
                    return None;
                }
            },
            None => match self.sampler.capture_full() {
                Ok(img) => (img, Position::new(0, 0)),
                Err(e) => {
                    warn!("Capture failed during template search: {}", e);
                    return None;
                }
            },
        };

        let (x, y, score) = ncc_best_match(&search, template)?;
        if score < self.config.template_threshold {
            debug!("Best template score {:.3} below threshold", score);
            return None;
        }
        let (tw, th) = template.dimensions();
        Some(LocatedMatch {
            position: Position::new(
                origin.x + x as i32 + (tw / 2) as i32,
                origin.y + y as i32 + (th / 2) as i32,
            ),
            confidence: score,
        })
    }

    fn clamp_to_screen(&self, rect: Rect) -> Option<Rect> {
        let (sw, sh) = match self.sampler.dimensions() {
            Ok(dims) => dims,
            Err(e) => {
                warn!("Could not read screen dimensions: {}", e);
                return None;
            }
        };
        let x0 = rect.x.clamp(0, sw as i32);
        let y0 = rect.y.clamp(0, sh as i32);
        let x1 = (rect.x + rect.width as i32).clamp(0, sw as i32);
        let y1 = (rect.y + rect.height as i32).clamp(0, sh as i32);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(Rect::new(x0, y0, (x1 - x0) as u32, (y1 - y0) as u32))
    }
}

fn channel_diff(a: (u8, u8, u8), b: (u8, u8, u8)) -> u8 {
    let dr = a.0.abs_diff(b.0);
    let dg = a.1.abs_diff(b.1);
    let db = a.2.abs_diff(b.2);
    dr.max(dg).max(db)
}

fn luminance(img: &RgbaImage) -> Vec<f32> {
    img.pixels()
        .map(|p| 0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32)
        .collect()
}

/// Best zero-mean normalized cross-correlation position of `template` in
/// `search`, as (top-left x, top-left y, score in [-1, 1])
fn ncc_best_match(search: &RgbaImage, template: &RgbaImage) -> Option<(u32, u32, f32)> {
    let (sw, sh) = search.dimensions();
    let (tw, th) = template.dimensions();
    if tw == 0 || th == 0 || tw > sw || th > sh {
        return None;
    }

    let s = luminance(search);
    let t = luminance(template);
    let n = (tw * th) as f32;

    let t_mean = t.iter().sum::<f32>() / n;
    let t_zero: Vec<f32> = t.iter().map(|v| v - t_mean).collect();
    let t_norm = t_zero.iter().map(|v| v * v).sum::<f32>().sqrt();
    if t_norm <= f32::EPSILON {
        // A flat template correlates with everything equally; treat as a miss.
        return None;
    }

    let mut best: Option<(u32, u32, f32)> = None;
    for y in 0..=(sh - th) {
        for x in 0..=(sw - tw) {
            let mut patch_sum = 0.0f32;
            for ty in 0..th {
                let row = ((y + ty) * sw + x) as usize;
                for tx in 0..tw {
                    patch_sum += s[row + tx as usize];
                }
            }
            let patch_mean = patch_sum / n;

            let mut num = 0.0f32;
            let mut patch_sq = 0.0f32;
            for ty in 0..th {
                let row = ((y + ty) * sw + x) as usize;
                let t_row = (ty * tw) as usize;
                for tx in 0..tw {
                    let sv = s[row + tx as usize] - patch_mean;
                    num += t_zero[t_row + tx as usize] * sv;
                    patch_sq += sv * sv;
                }
            }
            let patch_norm = patch_sq.sqrt();
            if patch_norm <= f32::EPSILON {
                continue;
            }
            let score = num / (t_norm * patch_norm);
            if best.map(|(_, _, b)| score > b).unwrap_or(true) {
                best = Some((x, y, score));
            }
        }
    }
    best
}
