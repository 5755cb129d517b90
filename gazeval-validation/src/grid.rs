//! Target position sequences.
//!
//! A [`PositionGrid`] holds the base positions (explicit, regular grid or
//! uniformly random), a pinned first position and a per-pass set of Gaussian
//! jitter offsets. Iterating yields `len()` positions and then rewinds.

use crate::error::ConfigError;
use gazeval_core::{Bounds, Position};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Margins {
    pub left: f64,
    pub right: f64,
    pub top: f64,
    pub bottom: f64,
}

#[derive(Debug, Clone)]
pub struct GridBuilder {
    bounds: Bounds,
    shape: Option<(usize, usize)>,
    pos_count: Option<usize>,
    margins: Margins,
    scale: (f64, f64),
    pos_list: Option<Vec<Position>>,
    columns: Option<(Vec<f64>, Vec<f64>)>,
    noise_std: Option<(f64, f64)>,
    first_pos_index: usize,
    repeat_first_pos: bool,
    seed: Option<u64>,
}

impl GridBuilder {
    pub fn new(bounds: Bounds) -> Self {
        Self {
            bounds,
            shape: None,
            pos_count: None,
            margins: Margins::default(),
            scale: (1.0, 1.0),
            pos_list: None,
            columns: None,
            noise_std: None,
            first_pos_index: 0,
            repeat_first_pos: false,
            seed: None,
        }
    }

    /// Regular `cols` x `rows` layout.
    pub fn shape(mut self, cols: usize, rows: usize) -> Self {
        self.shape = Some((cols, rows));
        self
    }

    /// Random layout with `floor(sqrt(count))` values per axis.
    pub fn pos_count(mut self, count: usize) -> Self {
        self.pos_count = Some(count);
        self
    }

    pub fn margins(mut self, margins: Margins) -> Self {
        self.margins = margins;
        self
    }

    pub fn scale(self, scale: f64) -> Self {
        self.scale_xy(scale, scale)
    }

    pub fn scale_xy(mut self, horz: f64, vert: f64) -> Self {
        self.scale = (horz, vert);
        self
    }

    /// Explicit `(x, y)` pairs. Shape, count, margins and scale are ignored.
    pub fn positions(mut self, positions: impl IntoIterator<Item = Position>) -> Self {
        self.pos_list = Some(positions.into_iter().collect());
        self
    }

    /// Explicit positions given column-major as `(x1..xn)` and `(y1..yn)`.
    pub fn columns(mut self, xs: Vec<f64>, ys: Vec<f64>) -> Self {
        self.columns = Some((xs, ys));
        self
    }

    pub fn noise_std(self, std: f64) -> Self {
        self.noise_std_xy(std, std)
    }

    pub fn noise_std_xy(mut self, horz: f64, vert: f64) -> Self {
        self.noise_std = Some((horz, vert));
        self
    }

    pub fn first_pos_index(mut self, index: usize) -> Self {
        self.first_pos_index = index;
        self
    }

    pub fn repeat_first_pos(mut self, repeat: bool) -> Self {
        self.repeat_first_pos = repeat;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<PositionGrid, ConfigError> {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };

        let noise = match self.noise_std {
            Some((h, v)) => Some((normal(h)?, normal(v)?)),
            None => None,
        };

        let mut positions = if let Some(list) = self.pos_list {
            list
        } else if let Some((xs, ys)) = self.columns {
            if xs.len() != ys.len() {
                return Err(ConfigError::ColumnLength {
                    xs: xs.len(),
                    ys: ys.len(),
                });
            }
            xs.into_iter()
                .zip(ys)
                .map(|(x, y)| Position::new(x, y))
                .collect()
        } else if self.pos_count.is_some_and(|c| c > 0) || self.shape.is_some() {
            generate(
                &self.bounds,
                self.shape,
                self.pos_count,
                self.margins,
                self.scale,
                &mut rng,
            )?
        } else {
            return Err(ConfigError::NoPositions);
        };

        if positions.is_empty() {
            return Err(ConfigError::NoPositions);
        }
        if self.first_pos_index >= positions.len() {
            return Err(ConfigError::FirstPosIndex {
                index: self.first_pos_index,
                len: positions.len(),
            });
        }
        if self.first_pos_index > 0 {
            let first = positions.remove(self.first_pos_index);
            positions.insert(0, first);
        }

        let mut grid = PositionGrid {
            bounds: self.bounds,
            positions,
            offsets: Vec::new(),
            pos_index: 0,
            repeat_first_pos: self.repeat_first_pos,
            noise,
            rng,
        };
        grid.generate_offsets();
        Ok(grid)
    }
}

fn normal(std: f64) -> Result<Option<Normal<f64>>, ConfigError> {
    if !std.is_finite() || std < 0.0 {
        return Err(ConfigError::Noise(std));
    }
    if std == 0.0 {
        return Ok(None);
    }
    Normal::new(0.0, std)
        .map(Some)
        .map_err(|_| ConfigError::Noise(std))
}

fn axis_range(
    size: f64,
    low_margin: f64,
    high_margin: f64,
    scale: f64,
    sides: (&'static str, &'static str),
    dimension: &'static str,
) -> Result<(f64, f64), ConfigError> {
    let half = size.abs() / 2.0;
    for (side, margin) in [(sides.0, low_margin), (sides.1, high_margin)] {
        if !(0.0..=half).contains(&margin) {
            return Err(ConfigError::Margin {
                side,
                dimension,
                margin,
                half,
            });
        }
    }
    if !(scale > 0.0 && scale <= 1.0) {
        return Err(ConfigError::Scale(scale));
    }
    let mut lo = low_margin / size.abs();
    let mut hi = 1.0 - high_margin / size.abs();
    lo += (1.0 - scale) / 2.0;
    hi -= (1.0 - scale) / 2.0;
    if lo > hi {
        return Err(ConfigError::Margin {
            side: sides.1,
            dimension,
            margin: high_margin,
            half,
        });
    }
    Ok((lo, hi))
}

fn linspace(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![lo],
        _ => (0..n)
            .map(|i| lo + (hi - lo) * i as f64 / (n - 1) as f64)
            .collect(),
    }
}

fn generate(
    bounds: &Bounds,
    shape: Option<(usize, usize)>,
    pos_count: Option<usize>,
    margins: Margins,
    scale: (f64, f64),
    rng: &mut StdRng,
) -> Result<Vec<Position>, ConfigError> {
    let width = bounds.right - bounds.left;
    let height = bounds.bottom - bounds.top;
    let (xmin, xmax) = axis_range(
        width,
        margins.left,
        margins.right,
        scale.0,
        ("left", "right"),
        "width",
    )?;
    let (ymin, ymax) = axis_range(
        height,
        margins.top,
        margins.bottom,
        scale.1,
        ("top", "bottom"),
        "height",
    )?;

    // fractions run left to right and top to bottom
    let (fx, fy) = match (pos_count, shape) {
        (Some(count), _) if count > 0 => {
            let n = (count as f64).sqrt() as usize;
            let fx: Vec<f64> = (0..n).map(|_| rng.random_range(xmin..=xmax)).collect();
            let fy: Vec<f64> = (0..n).map(|_| rng.random_range(ymin..=ymax)).collect();
            (fx, fy)
        }
        (_, Some((cols, rows))) => (linspace(xmin, xmax, cols), linspace(ymin, ymax, rows)),
        _ => return Err(ConfigError::NoPositions),
    };

    let mut out = Vec::with_capacity(fx.len() * fy.len());
    for y in &fy {
        for x in &fx {
            out.push(Position::new(
                bounds.left + x * width,
                bounds.top + y * height,
            ));
        }
    }
    Ok(out)
}

#[derive(Debug, Clone)]
pub struct PositionGrid {
    bounds: Bounds,
    positions: Vec<Position>,
    offsets: Vec<Position>,
    pos_index: usize,
    repeat_first_pos: bool,
    noise: Option<(Option<Normal<f64>>, Option<Normal<f64>>)>,
    rng: StdRng,
}

impl PositionGrid {
    pub fn builder(bounds: Bounds) -> GridBuilder {
        GridBuilder::new(bounds)
    }

    /// Explicit positions, first position kept first, no repeat.
    pub fn from_positions(
        bounds: Bounds,
        positions: impl IntoIterator<Item = Position>,
    ) -> Result<Self, ConfigError> {
        GridBuilder::new(bounds).positions(positions).build()
    }

    /// Number of positions one pass yields.
    pub fn len(&self) -> usize {
        self.positions.len() + usize::from(self.repeat_first_pos)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unique base positions, before jitter.
    pub fn base_positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    /// Index of the next position to be yielded.
    pub fn pos_index(&self) -> usize {
        self.pos_index
    }

    pub fn reset(&mut self) {
        self.pos_index = 0;
    }

    /// Shuffles every position but the first and draws fresh offsets.
    pub fn randomize(&mut self) {
        if self.positions.len() > 1 {
            self.positions[1..].shuffle(&mut self.rng);
        }
        self.generate_offsets();
    }

    fn generate_offsets(&mut self) {
        let n = self.len();
        let (h, v) = self.noise.unwrap_or((None, None));
        let rng = &mut self.rng;
        self.offsets = (0..n)
            .map(|_| {
                let dx = h.map_or(0.0, |d| d.sample(rng));
                let dy = v.map_or(0.0, |d| d.sample(rng));
                Position::new(dx, dy)
            })
            .collect();
    }

    /// Runs a full pass and collects it. This moves the cursor: a pass that
    /// was already partly consumed is finished first, then rewinds.
    pub fn get_positions(&mut self) -> Vec<Position> {
        self.by_ref().collect()
    }

    /// The positions a full pass yields, without touching the cursor.
    pub fn pass_positions(&self) -> Vec<Position> {
        (0..self.len()).map(|i| self.at(i)).collect()
    }

    fn at(&self, i: usize) -> Position {
        let base = if i < self.positions.len() { i } else { 0 };
        self.positions[base] + self.offsets[base]
    }
}

impl Iterator for PositionGrid {
    type Item = Position;

    /// Yields the next jittered position, or rewinds and returns `None` at the
    /// end of a pass.
    fn next(&mut self) -> Option<Position> {
        if self.pos_index < self.len() {
            let p = self.at(self.pos_index);
            self.pos_index += 1;
            Some(p)
        } else {
            self.pos_index = 0;
            None
        }
    }
}

/// Named position sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GridPreset {
    ThreePoints,
    FivePoints,
    NinePoints,
    ThirteenPoints,
    SeventeenPoints,
}

impl GridPreset {
    pub fn name(&self) -> &'static str {
        match self {
            GridPreset::ThreePoints => "THREE_POINTS",
            GridPreset::FivePoints => "FIVE_POINTS",
            GridPreset::NinePoints => "NINE_POINTS",
            GridPreset::ThirteenPoints => "THIRTEEN_POINTS",
            GridPreset::SeventeenPoints => "SEVENTEEN_POINTS",
        }
    }

    /// Base positions for `bounds`; the first entry is the one pinned first.
    pub fn positions(&self, bounds: Bounds) -> Result<Vec<Position>, ConfigError> {
        let regular = |n: usize, scale: f64| {
            GridBuilder::new(bounds)
                .shape(n, n)
                .scale(scale)
                .build()
                .map(|mut g| g.get_positions())
        };
        let center = bounds.center();
        let w = bounds.right - bounds.left;
        let h = bounds.top - bounds.bottom;
        Ok(match self {
            GridPreset::ThreePoints => vec![
                center + Position::new(0.0, h / 4.0),
                center + Position::new(-w / 4.0, -h / 4.0),
                center + Position::new(w / 4.0, -h / 4.0),
            ],
            GridPreset::FivePoints => {
                let mut out = vec![center];
                out.extend(regular(2, 0.85)?);
                out
            }
            GridPreset::NinePoints => GridBuilder::new(bounds)
                .shape(3, 3)
                .scale(0.85)
                .first_pos_index(4)
                .build()?
                .get_positions(),
            GridPreset::ThirteenPoints => {
                let mut out = GridPreset::NinePoints.positions(bounds)?;
                out.extend(regular(2, 0.5)?);
                out
            }
            GridPreset::SeventeenPoints => {
                let mut out = vec![center];
                out.extend(regular(4, 0.85)?);
                out
            }
        })
    }
}

impl fmt::Display for GridPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GridPreset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "THREE_POINTS" => Ok(GridPreset::ThreePoints),
            "FIVE_POINTS" => Ok(GridPreset::FivePoints),
            "NINE_POINTS" => Ok(GridPreset::NinePoints),
            "THIRTEEN_POINTS" => Ok(GridPreset::ThirteenPoints),
            "SEVENTEEN_POINTS" => Ok(GridPreset::SeventeenPoints),
            other => Err(ConfigError::UnknownPreset(other.to_string())),
        }
    }
}
