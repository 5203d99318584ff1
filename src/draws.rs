//! Module for visualizing the equity curve of a backtest.
//!
//! The chart compares the strategy equity with buying and holding the instrument from the first
//! open, and marks every trade event at the strategy equity of its date.

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use plotters::backend::{BitMapBackend, DrawingBackend, SVGBackend};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::WHITE;

use crate::engine::{Backtest, PositionSide, Trade};
use crate::errors::{Error, Result};

/// Size of the X-axis labels.
const X_LABEL_SIZE: i32 = 20;
/// Size of the Y-axis labels.
const Y_LABEL_SIZE: i32 = 20;
/// Size of the trade markers.
const MARKER_SIZE: i32 = 6;

/// Output formats for the generated charts with output filename.
#[derive(Debug, Clone)]
pub enum DrawOutput {
    /// Save to the output SVG file.
    Svg(PathBuf),
    /// Save to the output PNG file.
    Png(PathBuf),
}

impl Default for DrawOutput {
    fn default() -> Self {
        Self::Svg(PathBuf::from("gemini.svg"))
    }
}

/// Configuration options for chart generation.
#[derive(Debug, Clone, Default)]
pub struct DrawOptions {
    /// Chart title.
    title: Option<String>,
    /// Output format and path.
    output: DrawOutput,
}

impl DrawOptions {
    /// Sets the chart title.
    pub fn title(mut self, title: impl ToString) -> Self {
        self.title = Some(title.to_string());
        self
    }

    /// Sets the output format and path.
    pub fn draw_output(mut self, output: DrawOutput) -> Self {
        self.output = output;
        self
    }
}

/// Kind of trade event shown on the chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Long,
    Short,
    Sell,
    Cover,
}

/// Equity chart of a completed backtest run.
pub struct Draw<'d> {
    backtest: &'d Backtest,
    options: DrawOptions,
}

impl<'d> From<&'d Backtest> for Draw<'d> {
    fn from(backtest: &'d Backtest) -> Self {
        Self {
            backtest,
            options: DrawOptions::default(),
        }
    }
}

impl<'d> Draw<'d> {
    /// Sets the drawing options.
    pub fn with_options(mut self, options: DrawOptions) -> Self {
        self.options = options;
        self
    }

    /// Generates and saves the chart based on the configured options.
    ///
    /// ### Returns
    /// An error if the backtest has not been run, if an open price is missing, or if the backend
    /// fails to write the file.
    pub fn plot(&self) -> Result<()> {
        if self.backtest.curve().is_empty() {
            return Err(Error::Msg("No equity recorded, run the backtest first".to_string()));
        }

        let title = self.options.title.as_deref().unwrap_or("Gemini Backtest");
        let width = 1280.max(4 * self.backtest.curve().len() as u32);
        let height = 720;

        match &self.options.output {
            DrawOutput::Svg(path) => {
                let root = SVGBackend::new(path.as_path(), (width, height)).into_drawing_area();
                self.draw_chart(&root, title)
            }
            DrawOutput::Png(path) => {
                let root = BitMapBackend::new(path.as_path(), (width, height)).into_drawing_area();
                self.draw_chart(&root, title)
            }
        }
    }

    /// Buy-and-hold equity: the initial capital invested at the first open, valued at each open.
    fn benchmark(&self) -> Result<Vec<(DateTime<Utc>, f64)>> {
        let mut bars = self.backtest.bars().take(self.backtest.curve().len());
        let first = bars.next().ok_or(Error::Msg("No bars to draw".to_string()))?;
        let units = self.backtest.initial_capital() / first.open()?;

        std::iter::once(first)
            .chain(bars)
            .map(|bar| Ok((bar.date(), units * bar.open()?)))
            .collect()
    }

    /// Trade events placed at the strategy equity of their date. Events whose date has no
    /// recorded equity are logged and skipped.
    fn markers(&self) -> Vec<(Marker, DateTime<Utc>, f64)> {
        let opened = self.backtest.opened_trades().iter().map(|t| {
            let marker = match t.side() {
                PositionSide::Long => Marker::Long,
                PositionSide::Short => Marker::Short,
            };
            (marker, t)
        });
        let closed = self.backtest.closed_trades().iter().map(|t| {
            let marker = match t.side() {
                PositionSide::Long => Marker::Sell,
                PositionSide::Short => Marker::Cover,
            };
            (marker, t)
        });

        opened
            .chain(closed)
            .filter_map(|(marker, trade): (Marker, &Trade)| match self.backtest.curve().get(&trade.date()) {
                Some(record) => Some((marker, trade.date(), record.strategy_equity)),
                None => {
                    tracing::warn!(position = trade.position().id(), date = %trade.date(), "{marker:?} marker has no equity on its date, skipped");
                    None
                }
            })
            .collect()
    }

    /// Draws both equity lines, the trade markers and the legend.
    fn draw_chart<DB: DrawingBackend>(&self, root: &DrawingArea<DB, Shift>, title: &str) -> Result<()> {
        root.fill(&WHITE).map_err(|e| Error::Plotters(e.to_string()))?;

        let benchmark = self.benchmark()?;
        let strategy = self
            .backtest
            .curve()
            .iter()
            .map(|r| (r.date, r.strategy_equity))
            .collect::<Vec<_>>();
        let markers = self.markers();

        let first_date = strategy.first().map(|(d, _)| *d).ok_or(Error::Msg("No equity to draw".to_string()))?;
        let mut last_date = strategy.last().map(|(d, _)| *d).unwrap_or(first_date);
        if last_date <= first_date {
            last_date = first_date + Duration::days(1);
        }

        let values = || benchmark.iter().chain(&strategy).map(|(_, v)| *v);
        let min_value = values().fold(f64::INFINITY, f64::min);
        let max_value = values().fold(f64::NEG_INFINITY, f64::max);
        let padding = ((max_value - min_value) * 0.05).max(1.0);

        let mut chart = ChartBuilder::on(root)
            .caption(title, ("sans-serif", 30).into_font())
            .margin(20)
            .x_label_area_size(X_LABEL_SIZE * 2)
            .y_label_area_size(Y_LABEL_SIZE * 4)
            .build_cartesian_2d(first_date..last_date, min_value - padding..max_value + padding)
            .map_err(|e| Error::Plotters(e.to_string()))?;

        chart
            .configure_mesh()
            .x_desc("Date")
            .y_desc("Equity")
            .x_label_style(("sans-serif", X_LABEL_SIZE))
            .y_label_style(("sans-serif", Y_LABEL_SIZE))
            .x_labels(10)
            .y_labels(8)
            .draw()
            .map_err(|e| Error::Plotters(e.to_string()))?;

        chart
            .draw_series(LineSeries::new(benchmark, &BLUE))
            .map_err(|e| Error::Plotters(e.to_string()))?
            .label("Buy and Hold")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLUE));

        chart
            .draw_series(LineSeries::new(strategy, &BLACK))
            .map_err(|e| Error::Plotters(e.to_string()))?
            .label("Strategy")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLACK));

        let at = |kind: Marker| markers.iter().filter(move |(m, ..)| *m == kind).map(|(_, d, v)| (*d, *v));

        chart
            .draw_series(at(Marker::Long).map(|p| TriangleMarker::new(p, MARKER_SIZE, GREEN.filled())))
            .map_err(|e| Error::Plotters(e.to_string()))?
            .label("Long")
            .legend(|p| TriangleMarker::new(p, MARKER_SIZE, GREEN.filled()));

        chart
            .draw_series(at(Marker::Short).map(|p| TriangleMarker::new(p, MARKER_SIZE, RED.filled())))
            .map_err(|e| Error::Plotters(e.to_string()))?
            .label("Short")
            .legend(|p| TriangleMarker::new(p, MARKER_SIZE, RED.filled()));

        chart
            .draw_series(at(Marker::Sell).map(|p| Cross::new(p, MARKER_SIZE, GREEN.stroke_width(2))))
            .map_err(|e| Error::Plotters(e.to_string()))?
            .label("Sell")
            .legend(|p| Cross::new(p, MARKER_SIZE, GREEN.stroke_width(2)));

        chart
            .draw_series(at(Marker::Cover).map(|p| Cross::new(p, MARKER_SIZE, RED.stroke_width(2))))
            .map_err(|e| Error::Plotters(e.to_string()))?
            .label("Cover")
            .legend(|p| Cross::new(p, MARKER_SIZE, RED.stroke_width(2)));

        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(|e| Error::Plotters(e.to_string()))?;

        root.present().map_err(|e| Error::Plotters(e.to_string()))
    }
}
