//! Uniform structured grids of bilinear quadrilateral elements.
use crate::error::Error;
use serde::{Deserialize, Serialize};

/// Directions in which the grid wraps around.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Periodicity {
    None,
    X,
    Y,
    #[serde(rename = "xy")]
    XY,
}

impl Periodicity {
    pub fn x(&self) -> bool {
        matches!(self, Self::X | Self::XY)
    }

    pub fn y(&self) -> bool {
        matches!(self, Self::Y | Self::XY)
    }
}

impl Default for Periodicity {
    fn default() -> Self {
        Self::None
    }
}

/// A uniform `mx` x `my` node grid with spacing `dx`, `dy`.
///
/// Node `(i, j)` sits at `(i dx, j dy)` and has the canonical (flat) index `j * mx + i`.
/// Element `(i, j)` has the nodes `(i, j)`, `(i + 1, j)`, `(i + 1, j + 1)`, `(i, j + 1)`,
/// where indices past the last node wrap around in periodic directions.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    mx: usize,
    my: usize,
    dx: f64,
    dy: f64,
    periodicity: Periodicity,
}

impl Grid {
    pub fn new(mx: usize, my: usize, dx: f64, dy: f64, periodicity: Periodicity) -> Result<Self, Error> {
        if mx < 2 || my < 2 {
            return Err(Error::InvalidGrid(format!(
                "need at least 2 nodes in each direction, got {} x {}",
                mx, my
            )));
        }
        if !(dx > 0.0 && dy > 0.0) || !dx.is_finite() || !dy.is_finite() {
            return Err(Error::InvalidGrid(format!(
                "grid spacing must be positive and finite, got dx = {}, dy = {}",
                dx, dy
            )));
        }
        Ok(Self {
            mx,
            my,
            dx,
            dy,
            periodicity,
        })
    }

    /// A grid covering `[0, lx] x [0, ly]` (or the periodic cell of that size).
    pub fn from_extent(lx: f64, ly: f64, mx: usize, my: usize, periodicity: Periodicity) -> Result<Self, Error> {
        let intervals = |m: usize, periodic: bool| if periodic { m } else { m.saturating_sub(1) };
        let nx = intervals(mx, periodicity.x()).max(1);
        let ny = intervals(my, periodicity.y()).max(1);
        Self::new(mx, my, lx / nx as f64, ly / ny as f64, periodicity)
    }

    pub fn mx(&self) -> usize {
        self.mx
    }

    pub fn my(&self) -> usize {
        self.my
    }

    pub fn dx(&self) -> f64 {
        self.dx
    }

    pub fn dy(&self) -> f64 {
        self.dy
    }

    pub fn periodicity(&self) -> Periodicity {
        self.periodicity
    }

    pub fn num_nodes(&self) -> usize {
        self.mx * self.my
    }

    pub fn node_index(&self, i: usize, j: usize) -> usize {
        debug_assert!(i < self.mx && j < self.my);
        j * self.mx + i
    }

    /// Iterates over all nodes `(i, j)` in canonical order.
    pub fn nodes(&self) -> impl Iterator<Item = (usize, usize)> {
        let (mx, my) = (self.mx, self.my);
        (0..my).flat_map(move |j| (0..mx).map(move |i| (i, j)))
    }

    /// Maps a possibly out-of-range node index to its canonical node.
    ///
    /// Returns `None` if the index lies outside the grid in a non-periodic direction.
    pub fn wrap(&self, i: isize, j: isize) -> Option<(usize, usize)> {
        let wrap_1d = |k: isize, m: usize, periodic: bool| {
            let m = m as isize;
            if (0..m).contains(&k) {
                Some(k as usize)
            } else if periodic {
                Some(k.rem_euclid(m) as usize)
            } else {
                None
            }
        };
        Some((
            wrap_1d(i, self.mx, self.periodicity.x())?,
            wrap_1d(j, self.my, self.periodicity.y())?,
        ))
    }

    pub fn num_elements_x(&self) -> usize {
        if self.periodicity.x() {
            self.mx
        } else {
            self.mx - 1
        }
    }

    pub fn num_elements_y(&self) -> usize {
        if self.periodicity.y() {
            self.my
        } else {
            self.my - 1
        }
    }

    pub fn num_elements(&self) -> usize {
        self.num_elements_x() * self.num_elements_y()
    }

    pub fn element_index(&self, i: usize, j: usize) -> usize {
        j * self.num_elements_x() + i
    }

    /// Iterates over all elements `(i, j)`, ordered by their element index.
    pub fn elements(&self) -> impl Iterator<Item = (usize, usize)> {
        let (nx, ny) = (self.num_elements_x(), self.num_elements_y());
        (0..ny).flat_map(move |j| (0..nx).map(move |i| (i, j)))
    }
}
