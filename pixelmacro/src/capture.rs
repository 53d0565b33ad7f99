use crate::error::{MacroError, Result};
use crate::events::{Position, Rect};
use image::RgbaImage;
use std::sync::Arc;
use tracing::{debug, warn};

/// A source of screen pixel data.
///
/// Implementations capture the full screen; region capture defaults to
/// cropping a full frame, clamped to the screen bounds.
pub trait ScreenSource: Send + Sync {
    /// Screen dimensions in pixels
    fn dimensions(&self) -> Result<(u32, u32)>;

    /// Capture the whole screen
    fn capture_full(&self) -> Result<RgbaImage>;

    /// Capture a rectangular region, clamped to the screen bounds
    fn capture_region(&self, rect: Rect) -> Result<RgbaImage> {
        let frame = self.capture_full()?;
        crop_clamped(&frame, rect)
    }
}

/// Crop `rect` out of `frame`, clamping to the frame bounds
pub(crate) fn crop_clamped(frame: &RgbaImage, rect: Rect) -> Result<RgbaImage> {
    let (fw, fh) = frame.dimensions();
    let x0 = rect.x.clamp(0, fw as i32) as u32;
    let y0 = rect.y.clamp(0, fh as i32) as u32;
    let x1 = (rect.x + rect.width as i32).clamp(0, fw as i32) as u32;
    let y1 = (rect.y + rect.height as i32).clamp(0, fh as i32) as u32;
    if x1 <= x0 || y1 <= y0 {
        return Err(MacroError::CaptureError(format!(
            "Region {:?} lies outside the {}x{} screen",
            rect, fw, fh
        )));
    }
    Ok(image::imageops::crop_imm(frame, x0, y0, x1 - x0, y1 - y0).to_image())
}

/// Captures the primary monitor through xcap
pub struct XcapScreen;

impl XcapScreen {
    pub fn new() -> Self {
        Self
    }

    fn primary_monitor() -> Result<xcap::Monitor> {
        let monitors = xcap::Monitor::all()
            .map_err(|e| MacroError::CaptureError(format!("Failed to get monitors: {}", e)))?;
        let mut fallback = None;
        for monitor in monitors {
            match monitor.is_primary() {
                Ok(true) => return Ok(monitor),
                Ok(false) => {
                    fallback.get_or_insert(monitor);
                }
                Err(e) => {
                    warn!("Error checking monitor primary status: {}", e);
                }
            }
        }
        fallback.ok_or_else(|| MacroError::CaptureError("No monitors found".to_string()))
    }
}

impl Default for XcapScreen {
    fn default() -> Self {
        Self::new()
    }
}

impl ScreenSource for XcapScreen {
    fn dimensions(&self) -> Result<(u32, u32)> {
        let monitor = Self::primary_monitor()?;
        let width = monitor
            .width()
            .map_err(|e| MacroError::CaptureError(format!("Failed to get monitor width: {}", e)))?;
        let height = monitor.height().map_err(|e| {
            MacroError::CaptureError(format!("Failed to get monitor height: {}", e))
        })?;
        Ok((width, height))
    }

    fn capture_full(&self) -> Result<RgbaImage> {
        let monitor = Self::primary_monitor()?;
        monitor
            .capture_image()
            .map_err(|e| MacroError::CaptureError(format!("Failed to capture screen: {}", e)))
    }
}

/// A fixed in-memory frame, used as a deterministic screen in tests and as
/// a last-known-frame fallback source
pub struct BufferScreen {
    frame: RgbaImage,
}

impl BufferScreen {
    pub fn new(frame: RgbaImage) -> Self {
        Self { frame }
    }

    /// A solid-color screen of the given size
    pub fn solid(width: u32, height: u32, rgb: (u8, u8, u8)) -> Self {
        let frame = RgbaImage::from_pixel(width, height, image::Rgba([rgb.0, rgb.1, rgb.2, 255]));
        Self::new(frame)
    }

    /// Overwrite one pixel of the frame
    pub fn put_pixel(&mut self, pos: Position, rgb: (u8, u8, u8)) {
        if pos.x >= 0 && pos.y >= 0 {
            let (w, h) = self.frame.dimensions();
            if (pos.x as u32) < w && (pos.y as u32) < h {
                self.frame
                    .put_pixel(pos.x as u32, pos.y as u32, image::Rgba([rgb.0, rgb.1, rgb.2, 255]));
            }
        }
    }

    /// Blit an image patch into the frame at the given top-left corner
    pub fn put_patch(&mut self, x: u32, y: u32, patch: &RgbaImage) {
        image::imageops::overlay(&mut self.frame, patch, x as i64, y as i64);
    }
}

impl ScreenSource for BufferScreen {
    fn dimensions(&self) -> Result<(u32, u32)> {
        Ok(self.frame.dimensions())
    }

    fn capture_full(&self) -> Result<RgbaImage> {
        Ok(self.frame.clone())
    }
}

/// Wraps a primary screen source with an optional fallback used when the
/// primary capture fails
#[derive(Clone)]
pub struct ScreenSampler {
    primary: Arc<dyn ScreenSource>,
    fallback: Option<Arc<dyn ScreenSource>>,
}

impl ScreenSampler {
    pub fn new(primary: Arc<dyn ScreenSource>) -> Self {
        Self {
            primary,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn ScreenSource>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn dimensions(&self) -> Result<(u32, u32)> {
        match self.primary.dimensions() {
            Ok(dims) => Ok(dims),
            Err(e) => match &self.fallback {
                Some(fb) => fb.dimensions(),
                None => Err(e),
            },
        }
    }

    pub fn capture_full(&self) -> Result<RgbaImage> {
        match self.primary.capture_full() {
            Ok(frame) => Ok(frame),
            Err(e) => match &self.fallback {
                Some(fb) => {
                    debug!("Primary capture failed ({}), using fallback source", e);
                    fb.capture_full()
                }
                None => Err(e),
            },
        }
    }

    pub fn capture_region(&self, rect: Rect) -> Result<RgbaImage> {
        match self.primary.capture_region(rect) {
            Ok(frame) => Ok(frame),
            Err(e) => match &self.fallback {
                Some(fb) => {
                    debug!("Primary region capture failed ({}), using fallback", e);
                    fb.capture_region(rect)
                }
                None => Err(e),
            },
        }
    }

    /// The RGB color of a single pixel
    pub fn pixel_color(&self, pos: Position) -> Result<(u8, u8, u8)> {
        let region = self.capture_region(Rect::new(pos.x, pos.y, 1, 1))?;
        let px = region.get_pixel(0, 0);
        Ok((px[0], px[1], px[2]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_color_reads_back() {
        let mut screen = BufferScreen::solid(50, 50, (0, 0, 0));
        screen.put_pixel(Position::new(10, 20), (200, 100, 50));
        let sampler = ScreenSampler::new(Arc::new(screen));
        assert_eq!(
            sampler.pixel_color(Position::new(10, 20)).unwrap(),
            (200, 100, 50)
        );
        assert_eq!(sampler.pixel_color(Position::new(0, 0)).unwrap(), (0, 0, 0));
    }

    #[test]
    fn region_capture_is_clamped() {
        let screen = BufferScreen::solid(30, 30, (9, 9, 9));
        let sampler = ScreenSampler::new(Arc::new(screen));
        let region = sampler
            .capture_region(Rect::new(-5, -5, 20, 20))
            .unwrap();
        assert_eq!(region.dimensions(), (15, 15));
        assert!(sampler.capture_region(Rect::new(100, 100, 5, 5)).is_err());
    }

    struct FailingScreen;

    impl ScreenSource for FailingScreen {
        fn dimensions(&self) -> Result<(u32, u32)> {
            Err(MacroError::CaptureError("no display".into()))
        }

        fn capture_full(&self) -> Result<RgbaImage> {
            Err(MacroError::CaptureError("no display".into()))
        }
    }

    #[test]
    fn fallback_source_is_used_when_primary_fails() {
        let sampler = ScreenSampler::new(Arc::new(FailingScreen))
            .with_fallback(Arc::new(BufferScreen::solid(10, 10, (1, 2, 3))));
        assert_eq!(sampler.pixel_color(Position::new(5, 5)).unwrap(), (1, 2, 3));
        assert_eq!(sampler.dimensions().unwrap(), (10, 10));
    }
}
