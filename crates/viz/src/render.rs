// Rasterize a recorded Figure to PNG with plotters and the image crate.
//
// Text needs a font file. When none of the configured fonts can be loaded
// the chart is still drawn, without title, tick labels or legend.

use std::fmt;
use std::fs;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::OnceLock;

use plotters::coord::cartesian::Cartesian2d;
use plotters::coord::types::RangedCoordf64;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use plotters::style::{register_font, FontStyle};

use crate::figure::{Figure, Series, XValues};

const FONT_FAMILY: &str = "sans-serif";

/// Fonts tried when none are configured
pub const DEFAULT_FONT_PATHS: &[&str] = &[
    "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/noto-cjk/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/truetype/wqy/wqy-microhei.ttc",
    "/System/Library/Fonts/PingFang.ttc",
    "C:\\Windows\\Fonts\\msyh.ttc",
    "C:\\Windows\\Fonts\\simhei.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
];

// tab10
const PALETTE: [RGBColor; 10] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
    RGBColor(227, 119, 194),
    RGBColor(127, 127, 127),
    RGBColor(188, 189, 34),
    RGBColor(23, 190, 207),
];

const MAX_CATEGORY_TICKS: usize = 20;

#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub width: u32,
    pub height: u32,
    /// Font files tried in order; the first that loads is used for all text
    pub font_paths: Vec<PathBuf>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            width: 1000,
            height: 600,
            font_paths: DEFAULT_FONT_PATHS.iter().map(PathBuf::from).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderError {
    Draw(String),
    Encode(String),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::Draw(msg) => write!(f, "drawing failed: {}", msg),
            RenderError::Encode(msg) => write!(f, "PNG encoding failed: {}", msg),
        }
    }
}

impl std::error::Error for RenderError {}

fn draw_err<E: fmt::Display>(e: E) -> RenderError {
    RenderError::Draw(e.to_string())
}

/// Register the first loadable font under [`FONT_FAMILY`].
///
/// Registration is process-wide, so only the first call's paths are used.
pub fn ensure_font(paths: &[PathBuf]) -> bool {
    static REGISTERED: OnceLock<bool> = OnceLock::new();
    *REGISTERED.get_or_init(|| {
        for path in paths {
            let Ok(bytes) = fs::read(path) else {
                continue;
            };
            let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());
            if register_font(FONT_FAMILY, FontStyle::Normal, bytes).is_ok() {
                log::debug!("chart font: {}", path.display());
                return true;
            }
        }
        log::warn!("no usable chart font found; charts are rendered without text");
        false
    })
}

fn font(size: f64) -> FontDesc<'static> {
    (FONT_FAMILY, size).into_font()
}

fn color(i: usize) -> RGBColor {
    PALETTE[i % PALETTE.len()]
}

/// Render `figure` to PNG bytes. A figure without series still gets its
/// axes, title and labels.
pub fn render_png(figure: &Figure, opts: &RenderOptions) -> Result<Vec<u8>, RenderError> {
    let (w, h) = (opts.width.max(200), opts.height.max(150));
    let text = ensure_font(&opts.font_paths);
    let mut buf = vec![0u8; (w as usize) * (h as usize) * 3];

    {
        let root = BitMapBackend::with_buffer(&mut buf, (w, h)).into_drawing_area();
        root.fill(&WHITE).map_err(draw_err)?;

        let pie = figure.series.iter().find_map(|s| match s {
            Series::Pie { labels, values } => Some((labels, values)),
            _ => None,
        });
        match pie {
            Some((labels, values)) => draw_pie(&root, figure, labels, values, text)?,
            None => draw_cartesian(&root, figure, text)?,
        }
        root.present().map_err(draw_err)?;
    }

    encode_png(buf, w, h)
}

fn encode_png(buf: Vec<u8>, w: u32, h: u32) -> Result<Vec<u8>, RenderError> {
    let img = image::RgbImage::from_raw(w, h, buf)
        .ok_or_else(|| RenderError::Encode("pixel buffer size mismatch".to_string()))?;
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png)
        .map_err(|e| RenderError::Encode(e.to_string()))?;
    Ok(out.into_inner())
}

// ============================================================================
// Axes
// ============================================================================

enum XAxis {
    Numeric,
    Category(Vec<String>),
}

impl XAxis {
    fn for_figure(figure: &Figure) -> XAxis {
        let mut categories: Vec<String> = Vec::new();
        let mut categorical = false;
        for series in &figure.series {
            let labels = match series {
                Series::Bar { labels, .. } | Series::Box { labels, .. } => labels,
                Series::Line { x: XValues::Labels(labels), .. }
                | Series::Scatter { x: XValues::Labels(labels), .. } => labels,
                _ => continue,
            };
            categorical = true;
            for label in labels {
                if !categories.contains(label) {
                    categories.push(label.clone());
                }
            }
        }
        if categorical {
            XAxis::Category(categories)
        } else {
            XAxis::Numeric
        }
    }

    fn position(&self, label: &str) -> f64 {
        match self {
            XAxis::Category(c) => c.iter().position(|l| l == label).unwrap_or(0) as f64,
            XAxis::Numeric => 0.0,
        }
    }

    fn positions(&self, x: &XValues) -> Vec<f64> {
        match (self, x) {
            (XAxis::Numeric, XValues::Numbers(v)) => v.clone(),
            (_, XValues::Labels(l)) => l.iter().map(|s| self.position(s)).collect(),
            (XAxis::Category(_), XValues::Numbers(v)) => (0..v.len()).map(|i| i as f64).collect(),
        }
    }
}

/// (lo, hi, count) per bin.
fn histogram(values: &[f64], bins: usize) -> Vec<(f64, f64, usize)> {
    let (mut lo, mut hi) = (f64::INFINITY, f64::NEG_INFINITY);
    for &v in values {
        lo = lo.min(v);
        hi = hi.max(v);
    }
    if values.is_empty() || bins == 0 {
        return Vec::new();
    }
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }
    let width = (hi - lo) / bins as f64;
    let mut counts = vec![0usize; bins];
    for &v in values {
        let i = (((v - lo) / width) as usize).min(bins - 1);
        counts[i] += 1;
    }
    counts
        .into_iter()
        .enumerate()
        .map(|(i, c)| (lo + i as f64 * width, lo + (i + 1) as f64 * width, c))
        .collect()
}

fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let (i, frac) = (pos.floor() as usize, pos.fract());
    match sorted.get(i + 1) {
        Some(next) => sorted[i] + (next - sorted[i]) * frac,
        None => sorted[i],
    }
}

struct BoxStats {
    q1: f64,
    median: f64,
    q3: f64,
    low: f64,
    high: f64,
    outliers: Vec<f64>,
}

fn box_stats(values: &[f64]) -> Option<BoxStats> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let (q1, median, q3) = (
        quantile(&sorted, 0.25),
        quantile(&sorted, 0.5),
        quantile(&sorted, 0.75),
    );
    let reach = 1.5 * (q3 - q1);
    let inside = |v: &&f64| **v >= q1 - reach && **v <= q3 + reach;
    let low = sorted.iter().find(inside).copied().unwrap_or(q1);
    let high = sorted.iter().rev().find(inside).copied().unwrap_or(q3);
    let outliers = sorted.iter().filter(|v| !inside(v)).copied().collect();
    Some(BoxStats { q1, median, q3, low, high, outliers })
}

fn padded(lo: f64, hi: f64, pad: f64) -> (f64, f64) {
    if !lo.is_finite() || !hi.is_finite() {
        return (0.0, 1.0);
    }
    if lo == hi {
        return (lo - 1.0, hi + 1.0);
    }
    let margin = (hi - lo) * pad;
    (lo - margin, hi + margin)
}

fn ranges(figure: &Figure, axis: &XAxis) -> ((f64, f64), (f64, f64)) {
    let (mut x_lo, mut x_hi) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut y_lo, mut y_hi) = (f64::INFINITY, f64::NEG_INFINITY);
    let mut see_x = |v: f64| {
        if v.is_finite() {
            x_lo = x_lo.min(v);
            x_hi = x_hi.max(v);
        }
    };
    let mut ys: Vec<f64> = Vec::new();

    for series in &figure.series {
        match series {
            Series::Bar { values, .. } => {
                ys.push(0.0);
                ys.extend(values);
            }
            Series::Line { x, y, .. } | Series::Scatter { x, y, .. } => {
                axis.positions(x).into_iter().for_each(&mut see_x);
                ys.extend(y);
            }
            Series::Hist { values, bins, .. } => {
                ys.push(0.0);
                for (lo, hi, count) in histogram(values, *bins) {
                    see_x(lo);
                    see_x(hi);
                    ys.push(count as f64);
                }
            }
            Series::Box { groups, .. } => ys.extend(groups.iter().flatten()),
            Series::Pie { .. } => {}
        }
    }
    for y in ys.into_iter().filter(|y| y.is_finite()) {
        y_lo = y_lo.min(y);
        y_hi = y_hi.max(y);
    }

    let x = match axis {
        XAxis::Category(c) => (-0.5, c.len().max(1) as f64 - 0.5),
        XAxis::Numeric => padded(x_lo, x_hi, 0.02),
    };
    (x, padded(y_lo, y_hi, 0.05))
}

/// Tick label text; `unicode_minus` selects U+2212 for negatives.
pub fn tick_label(v: f64, unicode_minus: bool) -> String {
    let a = v.abs();
    let s = if a != 0.0 && !(1e-3..1e6).contains(&a) {
        format!("{:.2e}", v)
    } else if v.fract() == 0.0 {
        format!("{:.0}", v)
    } else {
        let s = format!("{:.2}", v);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    };
    match (unicode_minus, s.strip_prefix('-')) {
        (true, Some(rest)) => format!("\u{2212}{}", rest),
        _ => s,
    }
}

// ============================================================================
// Cartesian charts
// ============================================================================

type Chart<'a, 'b> = ChartContext<'a, BitMapBackend<'b>, Cartesian2d<RangedCoordf64, RangedCoordf64>>;

fn draw_cartesian(
    root: &DrawingArea<BitMapBackend<'_>, Shift>,
    figure: &Figure,
    text: bool,
) -> Result<(), RenderError> {
    let axis = XAxis::for_figure(figure);
    let ((x0, x1), (y0, y1)) = ranges(figure, &axis);

    let mut builder = ChartBuilder::on(root);
    builder.margin(20);
    if text {
        if let Some(title) = &figure.title {
            builder.caption(title, font(28.0));
        }
        builder.x_label_area_size(50).y_label_area_size(70);
    }
    let mut chart = builder.build_cartesian_2d(x0..x1, y0..y1).map_err(draw_err)?;

    if text {
        let minus = figure.rc.unicode_minus;
        let y_fmt = |v: &f64| tick_label(*v, minus);
        let x_fmt = |v: &f64| match &axis {
            XAxis::Numeric => tick_label(*v, minus),
            XAxis::Category(c) => {
                let r = v.round();
                if (v - r).abs() < 1e-6 && r >= 0.0 {
                    c.get(r as usize).cloned().unwrap_or_default()
                } else {
                    String::new()
                }
            }
        };

        let mut mesh = chart.configure_mesh();
        if !figure.grid {
            mesh.disable_mesh();
        }
        if let XAxis::Category(c) = &axis {
            mesh.x_labels((c.len() + 1).min(MAX_CATEGORY_TICKS + 1));
        }
        if let Some(x) = &figure.xlabel {
            mesh.x_desc(x.as_str());
        }
        if let Some(y) = &figure.ylabel {
            mesh.y_desc(y.as_str());
        }
        mesh.label_style(font(15.0))
            .axis_desc_style(font(17.0))
            .x_label_formatter(&x_fmt)
            .y_label_formatter(&y_fmt)
            .draw()
            .map_err(draw_err)?;
    } else {
        chart
            .draw_series([
                PathElement::new(vec![(x0, y0), (x1, y0)], &BLACK),
                PathElement::new(vec![(x0, y0), (x0, y1)], &BLACK),
            ])
            .map_err(draw_err)?;
    }

    draw_series(&mut chart, figure, &axis, text)?;

    let labelled = figure.series.iter().any(|s| s.label().is_some());
    if text && figure.legend && labelled {
        chart
            .configure_series_labels()
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .label_font(font(15.0))
            .draw()
            .map_err(draw_err)?;
    }
    Ok(())
}

fn draw_series(chart: &mut Chart<'_, '_>, figure: &Figure, axis: &XAxis, text: bool) -> Result<(), RenderError> {
    let bar_count = figure
        .series
        .iter()
        .filter(|s| matches!(s, Series::Bar { .. }))
        .count()
        .max(1);
    let bar_width = 0.8 / bar_count as f64;
    let mut bar_slot = 0usize;

    for (i, series) in figure.series.iter().enumerate() {
        let c = color(i);
        let anno = match series {
            Series::Bar { labels, values, .. } => {
                let offset = -0.4 + bar_slot as f64 * bar_width;
                bar_slot += 1;
                let bars: Vec<_> = labels
                    .iter()
                    .zip(values)
                    .filter(|(_, v)| v.is_finite())
                    .map(|(l, v)| {
                        let left = axis.position(l) + offset;
                        Rectangle::new([(left, 0.0), (left + bar_width, *v)], c.filled())
                    })
                    .collect();
                chart.draw_series(bars).map_err(draw_err)?
            }
            Series::Line { x, y, .. } => {
                let points: Vec<(f64, f64)> = axis
                    .positions(x)
                    .into_iter()
                    .zip(y.iter().copied())
                    .filter(|(x, y)| x.is_finite() && y.is_finite())
                    .collect();
                chart
                    .draw_series(LineSeries::new(points, c.stroke_width(2)))
                    .map_err(draw_err)?
            }
            Series::Scatter { x, y, .. } => {
                let points: Vec<_> = axis
                    .positions(x)
                    .into_iter()
                    .zip(y.iter().copied())
                    .filter(|(x, y)| x.is_finite() && y.is_finite())
                    .map(|p| Circle::new(p, 4, c.filled()))
                    .collect();
                chart.draw_series(points).map_err(draw_err)?
            }
            Series::Hist { values, bins, .. } => {
                let bars: Vec<_> = histogram(values, *bins)
                    .into_iter()
                    .map(|(lo, hi, n)| Rectangle::new([(lo, 0.0), (hi, n as f64)], c.mix(0.8).filled()))
                    .collect();
                chart.draw_series(bars).map_err(draw_err)?
            }
            Series::Box { labels, groups } => {
                draw_boxes(chart, axis, labels, groups, c)?;
                continue;
            }
            Series::Pie { .. } => continue,
        };
        if let (true, Some(label)) = (text, series.label()) {
            anno.label(label)
                .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 12, y + 5)], c.filled()));
        }
    }
    Ok(())
}

fn draw_boxes(
    chart: &mut Chart<'_, '_>,
    axis: &XAxis,
    labels: &[String],
    groups: &[Vec<f64>],
    c: RGBColor,
) -> Result<(), RenderError> {
    for (label, values) in labels.iter().zip(groups) {
        let Some(b) = box_stats(values) else {
            continue;
        };
        let x = axis.position(label);
        let (left, right) = (x - 0.25, x + 0.25);
        chart
            .draw_series([Rectangle::new([(left, b.q1), (right, b.q3)], c.mix(0.3).filled())])
            .map_err(draw_err)?;
        chart
            .draw_series([
                PathElement::new(vec![(left, b.q1), (right, b.q1), (right, b.q3), (left, b.q3), (left, b.q1)], c.stroke_width(2)),
                PathElement::new(vec![(left, b.median), (right, b.median)], BLACK.stroke_width(2)),
                PathElement::new(vec![(x, b.q3), (x, b.high)], c.stroke_width(1)),
                PathElement::new(vec![(x, b.q1), (x, b.low)], c.stroke_width(1)),
                PathElement::new(vec![(x - 0.1, b.high), (x + 0.1, b.high)], c.stroke_width(1)),
                PathElement::new(vec![(x - 0.1, b.low), (x + 0.1, b.low)], c.stroke_width(1)),
            ])
            .map_err(draw_err)?;
        chart
            .draw_series(b.outliers.iter().map(|&v| Circle::new((x, v), 3, c.stroke_width(1))))
            .map_err(draw_err)?;
    }
    Ok(())
}

// ============================================================================
// Pie charts
// ============================================================================

fn draw_pie(
    root: &DrawingArea<BitMapBackend<'_>, Shift>,
    figure: &Figure,
    labels: &[String],
    values: &[f64],
    text: bool,
) -> Result<(), RenderError> {
    let area = match (&figure.title, text) {
        (Some(title), true) => root.titled(title, font(28.0)).map_err(draw_err)?,
        _ => root.clone(),
    };
    let (w, h) = area.dim_in_pixel();
    let center = (w as f64 / 2.0, h as f64 / 2.0);
    let radius = w.min(h) as f64 * 0.35;

    let slices: Vec<(&String, f64)> = labels
        .iter()
        .zip(values.iter().copied())
        .filter(|(_, v)| v.is_finite() && *v > 0.0)
        .collect();
    let total: f64 = slices.iter().map(|(_, v)| v).sum();
    if total <= 0.0 {
        return Ok(());
    }

    let point = |angle: f64, r: f64| {
        (
            (center.0 + r * angle.cos()).round() as i32,
            (center.1 - r * angle.sin()).round() as i32,
        )
    };

    // Counter-clockwise from twelve o'clock
    let mut start = std::f64::consts::FRAC_PI_2;
    for (i, (label, value)) in slices.iter().enumerate() {
        let sweep = value / total * std::f64::consts::TAU;
        let steps = ((sweep.to_degrees()).ceil() as usize).max(2);
        let mut points = vec![point(0.0, 0.0)];
        points.extend((0..=steps).map(|s| point(start + sweep * s as f64 / steps as f64, radius)));
        area.draw(&Polygon::new(points, color(i).filled())).map_err(draw_err)?;

        if text {
            let mid = start + sweep / 2.0;
            let style = TextStyle::from(font(15.0)).pos(Pos::new(HPos::Center, VPos::Center));
            let caption = format!("{} {:.1}%", label, value / total * 100.0);
            area.draw(&Text::new(caption, point(mid, radius * 1.2), style))
                .map_err(draw_err)?;
        }
        start += sweep;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_fonts() -> RenderOptions {
        RenderOptions {
            width: 320,
            height: 240,
            font_paths: Vec::new(),
        }
    }

    fn is_png(bytes: &[u8]) -> bool {
        bytes.starts_with(&[0x89, b'P', b'N', b'G'])
    }

    #[test]
    fn test_figure_without_series_renders_axes() {
        let figure = Figure {
            title: Some("nothing yet".into()),
            xlabel: Some("x".into()),
            ..Figure::default()
        };
        assert!(is_png(&render_png(&figure, &no_fonts()).unwrap()));
        assert!(is_png(&render_png(&Figure::default(), &no_fonts()).unwrap()));
    }

    #[test]
    fn test_tick_label() {
        assert_eq!(tick_label(-3.0, false), "-3");
        assert_eq!(tick_label(-3.0, true), "\u{2212}3");
        assert_eq!(tick_label(2.5, false), "2.5");
        assert_eq!(tick_label(0.0, true), "0");
        assert_eq!(tick_label(2_500_000.0, false), "2.50e6");
    }

    #[test]
    fn test_histogram_bins() {
        let bins = histogram(&[0.0, 1.0, 2.0, 3.0, 4.0], 2);
        assert_eq!(bins.len(), 2);
        assert_eq!(bins[0], (0.0, 2.0, 2));
        assert_eq!(bins[1], (2.0, 4.0, 3));
        assert!(histogram(&[], 5).is_empty());
        // Constant input gets a unit-wide range
        assert_eq!(histogram(&[7.0, 7.0], 1), vec![(6.5, 7.5, 2)]);
    }

    #[test]
    fn test_box_stats() {
        let b = box_stats(&[1.0, 2.0, 3.0, 4.0, 100.0]).unwrap();
        assert_eq!(b.median, 3.0);
        assert_eq!(b.q1, 2.0);
        assert_eq!(b.q3, 4.0);
        assert_eq!(b.high, 4.0);
        assert_eq!(b.outliers, vec![100.0]);
        assert!(box_stats(&[]).is_none());
    }

    #[test]
    fn test_render_cartesian_and_pie() {
        let bar = Figure {
            title: Some("t".into()),
            series: vec![
                Series::Bar {
                    labels: vec!["a".into(), "b".into()],
                    values: vec![3.0, -1.0],
                    label: Some("x".into()),
                },
                Series::Line {
                    x: XValues::Labels(vec!["a".into(), "b".into()]),
                    y: vec![1.0, f64::NAN],
                    label: None,
                },
            ],
            legend: true,
            ..Figure::default()
        };
        let png = render_png(&bar, &no_fonts()).unwrap();
        assert!(is_png(&png));

        let pie = Figure {
            series: vec![Series::Pie {
                labels: vec!["a".into(), "b".into(), "c".into()],
                values: vec![1.0, 2.0, 0.0],
            }],
            ..Figure::default()
        };
        assert!(is_png(&render_png(&pie, &no_fonts()).unwrap()));
    }
}
