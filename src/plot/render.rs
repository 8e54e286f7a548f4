//! Raster rendering of a variable into a PNG
//!
//! Heat-map panels use square cells and one colour bar shared by every
//! panel. Panels larger than the configured size are sampled by striding.
//! The canvas is bounded: facet axes longer than the panel limit are sampled
//! evenly and panels shrink until the canvas fits the pixel budget.
//! No text is drawn.

use super::strategy::PlotStrategy;
use super::style::PlotStyle;
use crate::metadata::VariableDescriptor;
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use ndarray::{ArrayD, ArrayView2, Axis, Ix2};
use thiserror::Error;
use tracing::{debug, warn};

pub const HISTOGRAM_BINS: usize = 30;

/// Smallest side a heat-map panel is shrunk to
const MIN_PANEL_SIZE: u32 = 16;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to encode image: {0}")]
    Image(#[from] image::ImageError),

    #[error("values do not fit the plot layout: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("{0}")]
    Layout(String),
}

/// Everything one render call needs.
#[derive(Debug, Clone, Copy)]
pub struct RenderRequest<'a> {
    pub variable: &'a VariableDescriptor,
    pub values: &'a ArrayD<f64>,
    pub strategy: &'a PlotStrategy,
    pub style: &'a PlotStyle,
}

/// Turns values plus a strategy into encoded image bytes.
pub trait Renderer {
    fn render(&self, request: &RenderRequest<'_>) -> Result<Vec<u8>, RenderError>;
}

/// PNG renderer drawing straight into an RGBA buffer
#[derive(Debug, Clone)]
pub struct RasterRenderer {
    /// Longest panel side in pixels
    pub panel_size: u32,
    pub margin: u32,
    pub colorbar_width: u32,
    /// Most panels drawn for one variable
    pub max_panels: usize,
    /// Upper bound on `width * height` of the canvas
    pub max_pixels: u64,
}

impl Default for RasterRenderer {
    fn default() -> Self {
        Self {
            panel_size: 320,
            margin: 16,
            colorbar_width: 16,
            max_panels: 16,
            max_pixels: 4096 * 4096,
        }
    }
}

/// `limit` evenly spaced indices of `0..extent`, first and last included.
fn sample_indices(extent: usize, limit: usize) -> Vec<usize> {
    let limit = limit.max(1);
    if extent <= limit {
        return (0..extent).collect();
    }
    if limit == 1 {
        return vec![0];
    }
    (0..limit).map(|k| k * (extent - 1) / (limit - 1)).collect()
}

fn overflow() -> RenderError {
    RenderError::Layout("plot canvas size overflows".to_string())
}

/// Min and max over finite values, `(0, 1)` when there are none.
fn finite_range<'a>(values: impl Iterator<Item = &'a f64>) -> (f64, f64) {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if lo > hi {
        (0.0, 1.0)
    } else {
        (lo, hi)
    }
}

fn normalize(value: f64, (lo, hi): (f64, f64)) -> f64 {
    if hi > lo {
        (value - lo) / (hi - lo)
    } else {
        0.5
    }
}

fn fill(image: &mut RgbaImage, x: i64, y: i64, w: u32, h: u32, color: Rgba<u8>) {
    if w > 0 && h > 0 {
        draw_filled_rect_mut(image, Rect::at(x as i32, y as i32).of_size(w, h), color);
    }
}

fn frame(image: &mut RgbaImage, x: i64, y: i64, w: u32, h: u32, color: Rgba<u8>) {
    draw_hollow_rect_mut(
        image,
        Rect::at(x as i32 - 1, y as i32 - 1).of_size(w + 2, h + 2),
        color,
    );
}

fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, RenderError> {
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf).write_image(image.as_raw(), image.width(), image.height(), ColorType::Rgba8)?;
    Ok(buf)
}

/// Sampling of one 2-D panel onto the canvas
#[derive(Debug, Clone, Copy)]
struct PanelGeometry {
    stride: usize,
    rows: usize,
    cols: usize,
    cell: u32,
}

impl PanelGeometry {
    fn new(ny: usize, nx: usize, panel_size: u32) -> Self {
        let longest = ny.max(nx).max(1);
        let budget = panel_size.max(1) as usize;
        let stride = (longest + budget - 1) / budget;
        let rows = ((ny + stride - 1) / stride).max(1);
        let cols = ((nx + stride - 1) / stride).max(1);
        let cell = (budget / rows.max(cols)).max(1) as u32;
        Self {
            stride,
            rows,
            cols,
            cell,
        }
    }

    fn width(&self) -> u32 {
        self.cols as u32 * self.cell
    }

    fn height(&self) -> u32 {
        self.rows as u32 * self.cell
    }
}

impl RasterRenderer {
    fn check_extent(values: &ArrayD<f64>, axis: usize, extent: usize) -> Result<(), RenderError> {
        match values.shape().get(axis) {
            Some(&n) if n == extent => Ok(()),
            found => Err(RenderError::Layout(format!(
                "axis {} has extent {:?}, layout expects {}",
                axis, found, extent
            ))),
        }
    }

    /// Panels in row-major grid order plus the number of grid columns.
    /// Facet axes are sampled so that at most `max_panels` panels come back.
    fn panels<'v>(
        values: &'v ArrayD<f64>,
        strategy: &PlotStrategy,
        max_panels: usize,
    ) -> Result<(Vec<ArrayView2<'v, f64>>, usize), RenderError> {
        match strategy {
            PlotStrategy::Single { drop_leading: None } => {
                Ok((vec![values.view().into_dimensionality::<Ix2>()?], 1))
            }
            PlotStrategy::Single { drop_leading: Some(_) } => {
                Self::check_extent(values, 0, 1)?;
                let panel = values.index_axis(Axis(0), 0).into_dimensionality::<Ix2>()?;
                Ok((vec![panel], 1))
            }
            PlotStrategy::FacetOneAxis { col, col_wrap } => {
                Self::check_extent(values, col.axis, col.extent)?;
                let shown = sample_indices(col.extent, max_panels);
                if shown.len() < col.extent {
                    warn!(
                        dimension = %col.dimension,
                        extent = col.extent,
                        shown = shown.len(),
                        "too many facets, sampling the axis evenly"
                    );
                }
                let panels = shown
                    .into_iter()
                    .map(|i| values.index_axis(Axis(col.axis), i).into_dimensionality::<Ix2>())
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((panels, (*col_wrap).max(1)))
            }
            PlotStrategy::FacetTwoAxis { row, col } => {
                Self::check_extent(values, row.axis, row.extent)?;
                Self::check_extent(values, col.axis, col.extent)?;
                let cols = sample_indices(col.extent, max_panels);
                let rows = sample_indices(row.extent, max_panels / cols.len().max(1));
                if rows.len() < row.extent || cols.len() < col.extent {
                    warn!(
                        rows = %row.dimension,
                        cols = %col.dimension,
                        shown_rows = rows.len(),
                        shown_cols = cols.len(),
                        "too many facets, sampling the grid evenly"
                    );
                }
                let mut panels = Vec::with_capacity(rows.len() * cols.len());
                for &r in &rows {
                    let row_view = values.index_axis(Axis(row.axis), r);
                    for &c in &cols {
                        // axis 0 is gone after the row selection
                        let panel = row_view
                            .clone()
                            .index_axis_move(Axis(col.axis - 1), c)
                            .into_dimensionality::<Ix2>()?;
                        panels.push(panel);
                    }
                }
                Ok((panels, cols.len().max(1)))
            }
            PlotStrategy::Fallback => Err(RenderError::Layout("fallback has no panels".to_string())),
        }
    }

    /// Panel side that keeps a `grid_cols x grid_rows` canvas inside the
    /// pixel budget, never larger than `panel_size`.
    fn fitted_panel_size(&self, grid_cols: usize, grid_rows: usize) -> u32 {
        let cells = (grid_cols as u64).saturating_mul(grid_rows as u64).max(1);
        let share = (self.max_pixels / cells) as f64;
        let fitted = (share.sqrt() as u64)
            .saturating_sub(2 * self.margin as u64 + self.colorbar_width as u64)
            .max(MIN_PANEL_SIZE as u64);
        self.panel_size.min(fitted.min(u32::MAX as u64) as u32)
    }

    /// `(grid_width, width, height)` of the canvas, checked against the
    /// pixel budget.
    fn canvas_size(
        &self,
        geometry: &PanelGeometry,
        grid_cols: usize,
        grid_rows: usize,
    ) -> Result<(u32, u32, u32), RenderError> {
        let pitch_x = geometry.width().checked_add(self.margin).ok_or_else(overflow)?;
        let pitch_y = geometry.height().checked_add(self.margin).ok_or_else(overflow)?;
        let grid_cols = u32::try_from(grid_cols).map_err(|_| overflow())?;
        let grid_rows = u32::try_from(grid_rows).map_err(|_| overflow())?;
        let grid_width = grid_cols
            .checked_mul(pitch_x)
            .and_then(|w| w.checked_add(self.margin))
            .ok_or_else(overflow)?;
        let width = grid_width
            .checked_add(self.colorbar_width)
            .and_then(|w| w.checked_add(self.margin))
            .ok_or_else(overflow)?;
        let height = grid_rows
            .checked_mul(pitch_y)
            .and_then(|h| h.checked_add(self.margin))
            .ok_or_else(overflow)?;
        self.check_budget(width, height)?;
        Ok((grid_width, width, height))
    }

    fn check_budget(&self, width: u32, height: u32) -> Result<(), RenderError> {
        let pixels = width as u64 * height as u64;
        if pixels > self.max_pixels || width > i32::MAX as u32 || height > i32::MAX as u32 {
            return Err(RenderError::Layout(format!(
                "plot canvas of {} x {} pixels exceeds the budget of {} pixels",
                width, height, self.max_pixels
            )));
        }
        Ok(())
    }

    fn draw_panel(
        &self,
        image: &mut RgbaImage,
        panel: &ArrayView2<'_, f64>,
        geometry: &PanelGeometry,
        origin: (i64, i64),
        range: (f64, f64),
        style: &PlotStyle,
    ) {
        let (x0, y0) = origin;
        fill(image, x0, y0, geometry.width(), geometry.height(), style.panel);
        let (ny, nx) = panel.dim();
        let cell = geometry.cell;
        for (r, i) in (0..ny).step_by(geometry.stride).enumerate() {
            // first row at the bottom
            let y = y0 + ((geometry.rows - 1 - r) as u32 * cell) as i64;
            for (c, j) in (0..nx).step_by(geometry.stride).enumerate() {
                let value = panel[[i, j]];
                let color = if value.is_finite() {
                    style.colormap.color_at(normalize(value, range))
                } else {
                    style.nan_color
                };
                fill(image, x0 + (c as u32 * cell) as i64, y, cell, cell, color);
            }
        }
        frame(image, x0, y0, geometry.width(), geometry.height(), style.foreground);
    }

    fn draw_colorbar(&self, image: &mut RgbaImage, x0: i64, y0: i64, height: u32, style: &PlotStyle) {
        let span = height.saturating_sub(1).max(1) as f64;
        for py in 0..height {
            let t = 1.0 - py as f64 / span;
            fill(image, x0, y0 + py as i64, self.colorbar_width, 1, style.colormap.color_at(t));
        }
        frame(image, x0, y0, self.colorbar_width, height, style.foreground);
    }

    fn render_panels(&self, request: &RenderRequest<'_>) -> Result<RgbaImage, RenderError> {
        let (panels, grid_cols) = Self::panels(request.values, request.strategy, self.max_panels)?;
        let (ny, nx) = panels.first().map(|p| p.dim()).unwrap_or((0, 0));
        let grid_cols = grid_cols.min(panels.len()).max(1);
        let grid_rows = ((panels.len() + grid_cols - 1) / grid_cols).max(1);
        let panel_size = self.fitted_panel_size(grid_cols, grid_rows);
        let geometry = PanelGeometry::new(ny, nx, panel_size);
        let range = finite_range(request.values.iter());

        let (grid_width, width, height) = self.canvas_size(&geometry, grid_cols, grid_rows)?;
        let pitch_x = geometry.width() + self.margin;
        let pitch_y = geometry.height() + self.margin;
        debug!(
            panels = panels.len(),
            grid_rows,
            grid_cols,
            panel_size,
            stride = geometry.stride,
            width,
            height,
            "laying out heat-map panels"
        );

        let mut image = RgbaImage::from_pixel(width, height, request.style.background);
        for (k, panel) in panels.iter().enumerate() {
            let origin = (
                self.margin as i64 + (k % grid_cols) as i64 * pitch_x as i64,
                self.margin as i64 + (k / grid_cols) as i64 * pitch_y as i64,
            );
            self.draw_panel(&mut image, panel, &geometry, origin, range, request.style);
        }
        self.draw_colorbar(
            &mut image,
            grid_width as i64,
            self.margin as i64,
            height - 2 * self.margin,
            request.style,
        );
        Ok(image)
    }

    fn chart_canvas(&self, style: &PlotStyle) -> Result<(RgbaImage, i64, i64, u32, u32), RenderError> {
        let h = self.fitted_panel_size(2, 1);
        let w = h.checked_mul(2).ok_or_else(overflow)?;
        let outer = |side: u32| side.checked_add(2 * self.margin).ok_or_else(overflow);
        let (width, height) = (outer(w)?, outer(h)?);
        self.check_budget(width, height)?;
        let mut image = RgbaImage::from_pixel(width, height, style.background);
        let (x0, y0) = (self.margin as i64, self.margin as i64);
        fill(&mut image, x0, y0, w, h, style.panel);
        Ok((image, x0, y0, w, h))
    }

    /// Values against their index.
    fn render_line(&self, values: &ArrayD<f64>, style: &PlotStyle) -> Result<RgbaImage, RenderError> {
        let (mut image, x0, y0, w, h) = self.chart_canvas(style)?;
        let range = finite_range(values.iter());
        let n = values.len();
        let point = |i: usize, v: f64| {
            let fx = if n > 1 { i as f64 / (n - 1) as f64 } else { 0.5 };
            let x = x0 as f64 + fx * (w - 1) as f64;
            let y = y0 as f64 + (1.0 - normalize(v, range)) * (h - 1) as f64;
            (x as f32, y as f32)
        };

        let mut previous: Option<(f32, f32)> = None;
        for (i, &v) in values.iter().enumerate() {
            if !v.is_finite() {
                previous = None;
                continue;
            }
            let current = point(i, v);
            match previous {
                Some(start) => draw_line_segment_mut(&mut image, start, current, style.line_color),
                None => fill(&mut image, current.0 as i64 - 1, current.1 as i64 - 1, 3, 3, style.line_color),
            }
            previous = Some(current);
        }
        frame(&mut image, x0, y0, w, h, style.foreground);
        Ok(image)
    }

    /// Distribution of all finite values.
    fn render_histogram(&self, values: &ArrayD<f64>, style: &PlotStyle) -> Result<RgbaImage, RenderError> {
        let (mut image, x0, y0, w, h) = self.chart_canvas(style)?;
        let range = finite_range(values.iter());
        let mut counts = [0usize; HISTOGRAM_BINS];
        for &v in values.iter().filter(|v| v.is_finite()) {
            let bin = (normalize(v, range) * HISTOGRAM_BINS as f64) as usize;
            counts[bin.min(HISTOGRAM_BINS - 1)] += 1;
        }

        let tallest = counts.iter().copied().max().unwrap_or(0).max(1);
        let bar_width = (w / HISTOGRAM_BINS as u32).max(1);
        for (k, &count) in counts.iter().enumerate() {
            let bar_height = ((count as f64 / tallest as f64) * h as f64).round() as u32;
            let x = x0 + (k as u32 * bar_width) as i64;
            fill(&mut image, x, y0 + (h - bar_height) as i64, bar_width.saturating_sub(1).max(1), bar_height, style.line_color);
        }
        frame(&mut image, x0, y0, w, h, style.foreground);
        Ok(image)
    }
}

impl Renderer for RasterRenderer {
    fn render(&self, request: &RenderRequest<'_>) -> Result<Vec<u8>, RenderError> {
        if request.values.shape() != request.variable.shape.as_slice() {
            return Err(RenderError::Layout(format!(
                "values of shape {:?} do not match variable '{}' of shape {:?}",
                request.values.shape(),
                request.variable.name,
                request.variable.shape
            )));
        }

        let image = match request.strategy {
            PlotStrategy::Fallback if request.values.ndim() == 1 => {
                self.render_line(request.values, request.style)?
            }
            PlotStrategy::Fallback => self.render_histogram(request.values, request.style)?,
            _ => self.render_panels(request)?,
        };
        debug!(
            variable = %request.variable.name,
            strategy = request.strategy.name(),
            style = %request.style.name,
            colormap = request.style.colormap.name(),
            width = image.width(),
            height = image.height(),
            "rendered plot"
        );
        encode_png(&image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plot::strategy::select_strategy;
    use crate::types::ElementType;
    use ndarray::IxDyn;
    use std::collections::BTreeMap;

    const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

    fn descriptor(dims: &[(&str, usize)]) -> VariableDescriptor {
        VariableDescriptor {
            name: "v".to_string(),
            element_type: ElementType::Float64,
            shape: dims.iter().map(|(_, n)| *n).collect(),
            dimension_names: dims.iter().map(|(d, _)| d.to_string()).collect(),
            size_bytes: 0,
            attributes: BTreeMap::new(),
        }
    }

    fn render(dims: &[(&str, usize)]) -> Result<Vec<u8>, RenderError> {
        render_with(&RasterRenderer::default(), dims)
    }

    fn render_with(renderer: &RasterRenderer, dims: &[(&str, usize)]) -> Result<Vec<u8>, RenderError> {
        let variable = descriptor(dims);
        let count: usize = variable.shape.iter().product();
        let mut data: Vec<f64> = (0..count).map(|i| i as f64).collect();
        if let Some(first) = data.first_mut() {
            *first = f64::NAN;
        }
        let values = ArrayD::from_shape_vec(IxDyn(&variable.shape), data).unwrap();
        let strategy = select_strategy(&variable);
        let style = PlotStyle::default();
        renderer.render(&RenderRequest {
            variable: &variable,
            values: &values,
            strategy: &strategy,
            style: &style,
        })
    }

    /// Width and height from the PNG header.
    fn png_size(png: &[u8]) -> (u32, u32) {
        let word = |at: usize| u32::from_be_bytes([png[at], png[at + 1], png[at + 2], png[at + 3]]);
        (word(16), word(20))
    }

    #[test]
    fn test_every_strategy_produces_png() {
        let cases: [&[(&str, usize)]; 6] = [
            &[("x", 12)],
            &[("y", 5), ("x", 7)],
            &[("t", 1), ("y", 50), ("x", 50)],
            &[("t", 6), ("y", 4), ("x", 4)],
            &[("t", 3), ("z", 2), ("y", 20), ("x", 20)],
            &[("a", 2), ("b", 2), ("c", 2), ("d", 2), ("e", 2)],
        ];
        for dims in cases {
            let png = render(dims).unwrap();
            assert_eq!(&png[..8], &PNG_MAGIC, "dims {:?}", dims);
        }
    }

    #[test]
    fn test_large_panels_are_strided() {
        let geometry = PanelGeometry::new(1000, 500, 320);
        assert_eq!(geometry.stride, 4);
        assert_eq!(geometry.rows, 250);
        assert_eq!(geometry.cols, 125);
        assert!(geometry.height() <= 320);
    }

    #[test]
    fn test_finite_range_ignores_non_finite() {
        let values = [f64::NAN, 2.0, f64::INFINITY, -1.0];
        assert_eq!(finite_range(values.iter()), (-1.0, 2.0));
        assert_eq!(finite_range([f64::NAN].iter()), (0.0, 1.0));
    }

    #[test]
    fn test_shape_mismatch_is_reported() {
        let variable = descriptor(&[("y", 2), ("x", 2)]);
        let values = ArrayD::<f64>::zeros(IxDyn(&[3, 3]));
        let strategy = select_strategy(&variable);
        let style = PlotStyle::default();
        let result = RasterRenderer::default().render(&RenderRequest {
            variable: &variable,
            values: &values,
            strategy: &strategy,
            style: &style,
        });
        assert!(matches!(result, Err(RenderError::Layout(_))));
    }

    #[test]
    fn test_sample_indices() {
        assert_eq!(sample_indices(3, 16), vec![0, 1, 2]);
        assert_eq!(sample_indices(400, 4), vec![0, 133, 266, 399]);
        assert_eq!(sample_indices(10, 1), vec![0]);
        assert_eq!(sample_indices(0, 16), Vec::<usize>::new());
    }

    #[test]
    fn test_long_facet_axis_is_sampled() {
        let png = render(&[("t", 400), ("y", 2), ("x", 2)]).unwrap();
        // 16 panels in a 4 x 4 grid of 320 px panels
        assert_eq!(png_size(&png), (1392, 1360));
    }

    #[test]
    fn test_two_axis_grid_is_capped() {
        let values = ArrayD::<f64>::zeros(IxDyn(&[30, 3, 2, 2]));
        let strategy = select_strategy(&descriptor(&[("a", 30), ("b", 3), ("y", 2), ("x", 2)]));
        let (panels, grid_cols) = RasterRenderer::panels(&values, &strategy, 16).unwrap();
        assert_eq!(grid_cols, 3);
        assert_eq!(panels.len(), 15);
    }

    #[test]
    fn test_pixel_budget_shrinks_panels() {
        let renderer = RasterRenderer {
            max_pixels: 200_000,
            ..RasterRenderer::default()
        };
        let png = render_with(&renderer, &[("t", 6), ("y", 4), ("x", 4)]).unwrap();
        let (width, height) = png_size(&png);
        assert!(width as u64 * height as u64 <= renderer.max_pixels);
        assert_eq!((width, height), (544, 264));

        let png = render_with(&renderer, &[("x", 12)]).unwrap();
        let (width, height) = png_size(&png);
        assert!(width as u64 * height as u64 <= renderer.max_pixels);
    }

    #[test]
    fn test_oversized_canvas_is_a_layout_error() {
        let renderer = RasterRenderer {
            panel_size: u32::MAX,
            max_pixels: u64::MAX,
            ..RasterRenderer::default()
        };
        let result = render_with(&renderer, &[("y", 2), ("x", 2)]);
        assert!(matches!(result, Err(RenderError::Layout(_))));
    }
}
