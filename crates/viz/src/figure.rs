// Figure model filled in by the `plt` Lua API and consumed by the renderer.

use std::cell::RefCell;
use std::rc::Rc;

/// Values along the x axis: positions or category labels.
#[derive(Debug, Clone, PartialEq)]
pub enum XValues {
    Numbers(Vec<f64>),
    Labels(Vec<String>),
}

impl XValues {
    pub fn len(&self) -> usize {
        match self {
            XValues::Numbers(v) => v.len(),
            XValues::Labels(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Series {
    Bar {
        labels: Vec<String>,
        values: Vec<f64>,
        label: Option<String>,
    },
    Line {
        x: XValues,
        y: Vec<f64>,
        label: Option<String>,
    },
    Scatter {
        x: XValues,
        y: Vec<f64>,
        label: Option<String>,
    },
    Hist {
        values: Vec<f64>,
        bins: usize,
        label: Option<String>,
    },
    Pie {
        labels: Vec<String>,
        values: Vec<f64>,
    },
    Box {
        labels: Vec<String>,
        groups: Vec<Vec<f64>>,
    },
}

impl Series {
    pub fn label(&self) -> Option<&str> {
        match self {
            Series::Bar { label, .. }
            | Series::Line { label, .. }
            | Series::Scatter { label, .. }
            | Series::Hist { label, .. } => label.as_deref(),
            Series::Pie { .. } | Series::Box { .. } => None,
        }
    }
}

/// Runtime configuration set through `plt.rc`.
#[derive(Debug, Clone, PartialEq)]
pub struct RcParams {
    /// Preferred font families, most preferred first
    pub sans_serif: Vec<String>,
    /// Render negative tick labels with U+2212 instead of '-'
    pub unicode_minus: bool,
}

impl Default for RcParams {
    fn default() -> Self {
        Self {
            sans_serif: Vec::new(),
            unicode_minus: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Figure {
    pub title: Option<String>,
    pub xlabel: Option<String>,
    pub ylabel: Option<String>,
    pub series: Vec<Series>,
    pub legend: bool,
    pub grid: bool,
    pub rc: RcParams,
}

/// Shared handle the Lua callbacks draw into.
pub type FigureSink = Rc<RefCell<Figure>>;

pub fn new_sink() -> FigureSink {
    Rc::new(RefCell::new(Figure::default()))
}

/// Swap in a blank figure and return the one that was drawn.
pub fn take_figure(sink: &FigureSink) -> Figure {
    std::mem::take(&mut *sink.borrow_mut())
}
