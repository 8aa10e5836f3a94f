//! PDF rasterisation: render page 1 of a drawing to a `DynamicImage`.
//!
//! Rendering is CPU-bound and pdfium keeps thread-local state, so the
//! pipeline always calls [`Rasterizer::rasterize`] from
//! `tokio::task::spawn_blocking` (see [`prepare_image`]).
//!
//! The [`Rasterizer`] trait is the seam between the pipeline and pdfium; tests
//! substitute an in-memory implementation.
//!
//! ## Pixel cap
//!
//! `max_pixels` bounds the image that is *sent*, not the page bitmap. When a
//! pass crops a zone, the page is rendered so that the zone alone fits the
//! cap; a 35 % zone at 600 DPI therefore keeps its full resolution even on an
//! A1 sheet. The DPI actually rendered is reported back in [`RenderedPage`].

use crate::error::ExtractError;
use crate::pipeline::crop::CropRegion;
use crate::pipeline::encode;
use edgequake_llm::ImageData;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// PDF user-space units per inch.
const POINTS_PER_INCH: f32 = 72.0;

/// What a pass asks the rasterizer for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    /// Requested resolution.
    pub dpi: u32,
    /// Zone that will be cut from the page afterwards, if any.
    pub zone: Option<CropRegion>,
}

/// Page 1 as rendered, with the resolution it was rendered at.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub image: DynamicImage,
    /// Effective DPI; lower than requested when the pixel cap applied.
    pub dpi: f32,
}

/// Turns the first page of a PDF into a bitmap.
pub trait Rasterizer: Send + Sync {
    /// Render page 1 of `pdf_path` for `request`.
    ///
    /// The zone is not cut here; it only tells the rasterizer which part of
    /// the page the pixel budget is for.
    fn rasterize(&self, pdf_path: &Path, request: RenderRequest) -> Result<RenderedPage, ExtractError>;
}

/// Points-to-pixels scale factor for a page of `width_pts` × `height_pts`.
///
/// Starts from `request.dpi` and shrinks only if the requested zone (the
/// whole page without one) would exceed `max_pixels` in either dimension.
pub fn render_scale(
    width_pts: f32,
    height_pts: f32,
    request: RenderRequest,
    max_pixels: Option<u32>,
) -> f32 {
    let scale = request.dpi as f32 / POINTS_PER_INCH;
    let Some(max) = max_pixels else {
        return scale;
    };

    let (fw, fh) = request.zone.map_or((1.0, 1.0), |z| {
        ((z.right - z.left) as f32, (z.bottom - z.top) as f32)
    });
    let zone_w = width_pts * scale * fw;
    let zone_h = height_pts * scale * fh;
    let over = (zone_w / max as f32).max(zone_h / max as f32);
    if over > 1.0 {
        scale / over
    } else {
        scale
    }
}

/// pdfium-backed [`Rasterizer`].
#[derive(Debug, Clone, Default)]
pub struct PdfiumRasterizer {
    /// Cap on either dimension of the image sent to the model.
    pub max_pixels: Option<u32>,
    pub password: Option<String>,
}

impl PdfiumRasterizer {
    pub fn new(max_pixels: u32, password: Option<String>) -> Self {
        Self {
            max_pixels: Some(max_pixels),
            password,
        }
    }
}

impl Rasterizer for PdfiumRasterizer {
    fn rasterize(&self, pdf_path: &Path, request: RenderRequest) -> Result<RenderedPage, ExtractError> {
        let dpi = request.dpi;
        let pdfium = Pdfium::default();
        let password = self.password.as_deref();

        let document = pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
            let err_str = format!("{e:?}");
            if err_str.to_lowercase().contains("password") {
                ExtractError::PasswordRequired {
                    path: pdf_path.to_path_buf(),
                }
            } else {
                ExtractError::CorruptPdf {
                    path: pdf_path.to_path_buf(),
                    detail: err_str,
                }
            }
        })?;

        let pages = document.pages();
        if pages.len() == 0 {
            return Err(ExtractError::EmptyDocument {
                path: pdf_path.to_path_buf(),
            });
        }

        let page = pages
            .get(0)
            .map_err(|e| ExtractError::RasterisationFailed {
                dpi,
                detail: format!("{e:?}"),
            })?;

        let width_pts = page.width().value;
        let scale = render_scale(width_pts, page.height().value, request, self.max_pixels);
        let render_config = PdfRenderConfig::new().scale_page_by_factor(scale);

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| ExtractError::RasterisationFailed {
                dpi,
                detail: format!("{e:?}"),
            })?;

        let image = bitmap.as_image();
        let effective = image.width() as f32 / (width_pts / POINTS_PER_INCH);
        debug!(
            "Rendered page 1 at {:.0} DPI (requested {}) → {}x{} px",
            effective,
            dpi,
            image.width(),
            image.height()
        );
        Ok(RenderedPage {
            image,
            dpi: effective,
        })
    }
}

/// A pass-ready image: encoded payload plus the size that was sent.
pub struct PreparedImage {
    pub data: ImageData,
    pub width: u32,
    pub height: u32,
    /// Effective rendering DPI.
    pub dpi: f32,
}

/// Render, optionally crop, and encode page 1 on the blocking pool.
pub async fn prepare_image(
    rasterizer: Arc<dyn Rasterizer>,
    pdf_path: &Path,
    dpi: u32,
    crop: Option<CropRegion>,
) -> Result<PreparedImage, ExtractError> {
    let path: PathBuf = pdf_path.to_path_buf();
    let request = RenderRequest { dpi, zone: crop };

    tokio::task::spawn_blocking(move || {
        let RenderedPage { image: page, dpi: effective } = rasterizer.rasterize(&path, request)?;
        let image = match crop {
            Some(region) => {
                let cropped = region.apply(&page)?;
                debug!(
                    "Cropped {}x{} → {}x{} ({})",
                    page.width(),
                    page.height(),
                    cropped.width(),
                    cropped.height(),
                    region
                );
                cropped
            }
            None => page,
        };
        let data = encode::encode_image(&image, dpi)?;
        Ok(PreparedImage {
            data,
            width: image.width(),
            height: image.height(),
            dpi: effective,
        })
    })
    .await
    .map_err(|e| ExtractError::Internal(format!("Render task panicked: {e}")))?
}
