//! Display unit handling.
//!
//! Positions are stored in the display's own units. Angular values use the
//! linear small-angle model (no flat screen correction): one degree spans
//! `distance_cm * 0.017455` centimetres everywhere on the screen.

use crate::error::ConfigError;
use gazeval_core::{Bounds, Position};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const CM_PER_DEG_PER_CM_DISTANCE: f64 = 0.017455;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Pix,
    Norm,
    Height,
    Deg,
}

impl Units {
    pub fn as_str(&self) -> &'static str {
        match self {
            Units::Pix => "pix",
            Units::Norm => "norm",
            Units::Height => "height",
            Units::Deg => "deg",
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Units {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pix" | "pixels" => Ok(Units::Pix),
            "norm" => Ok(Units::Norm),
            "height" => Ok(Units::Height),
            "deg" | "degree" | "degrees" => Ok(Units::Deg),
            _ => Err(ConfigError::Unit(s.to_string())),
        }
    }
}

/// Physical description of the screen used for angular conversions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorGeometry {
    pub width_cm: f64,
    pub distance_cm: f64,
    pub width_px: u32,
    pub height_px: u32,
}

impl Default for MonitorGeometry {
    fn default() -> Self {
        Self {
            width_cm: 53.0,
            distance_cm: 60.0,
            width_px: 1920,
            height_px: 1080,
        }
    }
}

impl MonitorGeometry {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.width_cm.is_finite() && self.width_cm > 0.0) {
            return Err(ConfigError::Monitor(format!(
                "width_cm must be > 0, got {}",
                self.width_cm
            )));
        }
        if !(self.distance_cm.is_finite() && self.distance_cm > 0.0) {
            return Err(ConfigError::Monitor(format!(
                "distance_cm must be > 0, got {}",
                self.distance_cm
            )));
        }
        if self.width_px == 0 || self.height_px == 0 {
            return Err(ConfigError::Monitor(format!(
                "pixel size must be non-zero, got {}x{}",
                self.width_px, self.height_px
            )));
        }
        Ok(())
    }

    pub fn cm_per_pixel(&self) -> f64 {
        self.width_cm / self.width_px as f64
    }

    pub fn pix_to_deg(&self, pix: f64) -> f64 {
        pix * self.cm_per_pixel() / (self.distance_cm * CM_PER_DEG_PER_CM_DISTANCE)
    }

    pub fn deg_to_pix(&self, deg: f64) -> f64 {
        deg * self.distance_cm * CM_PER_DEG_PER_CM_DISTANCE / self.cm_per_pixel()
    }
}

/// Converts between one display unit space and pixels or degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitConverter {
    units: Units,
    monitor: MonitorGeometry,
}

impl UnitConverter {
    pub fn new(units: Units, monitor: MonitorGeometry) -> Result<Self, ConfigError> {
        monitor.validate()?;
        Ok(Self { units, monitor })
    }

    pub fn units(&self) -> Units {
        self.units
    }

    pub fn monitor(&self) -> &MonitorGeometry {
        &self.monitor
    }

    /// Coordinate bounds of the full screen in display units, y up.
    pub fn bounds(&self) -> Bounds {
        let w = self.monitor.width_px as f64;
        let h = self.monitor.height_px as f64;
        let half = self.from_pix(Position::new(w / 2.0, h / 2.0));
        Bounds::new(-half.x, half.y, half.x, -half.y)
    }

    pub fn length_to_pix(&self, v: f64) -> f64 {
        match self.units {
            Units::Pix => v,
            // lengths in norm units follow the horizontal axis
            Units::Norm => v * self.monitor.width_px as f64 / 2.0,
            Units::Height => v * self.monitor.height_px as f64,
            Units::Deg => self.monitor.deg_to_pix(v),
        }
    }

    pub fn length_from_pix(&self, v: f64) -> f64 {
        match self.units {
            Units::Pix => v,
            Units::Norm => v * 2.0 / self.monitor.width_px as f64,
            Units::Height => v / self.monitor.height_px as f64,
            Units::Deg => self.monitor.pix_to_deg(v),
        }
    }

    pub fn to_pix(&self, p: Position) -> Position {
        match self.units {
            Units::Norm => Position::new(
                p.x * self.monitor.width_px as f64 / 2.0,
                p.y * self.monitor.height_px as f64 / 2.0,
            ),
            _ => Position::new(self.length_to_pix(p.x), self.length_to_pix(p.y)),
        }
    }

    pub fn from_pix(&self, p: Position) -> Position {
        match self.units {
            Units::Norm => Position::new(
                p.x * 2.0 / self.monitor.width_px as f64,
                p.y * 2.0 / self.monitor.height_px as f64,
            ),
            _ => Position::new(self.length_from_pix(p.x), self.length_from_pix(p.y)),
        }
    }

    pub fn to_deg(&self, p: Position) -> Position {
        let pix = self.to_pix(p);
        Position::new(self.monitor.pix_to_deg(pix.x), self.monitor.pix_to_deg(pix.y))
    }

    pub fn from_deg(&self, p: Position) -> Position {
        self.from_pix(Position::new(
            self.monitor.deg_to_pix(p.x),
            self.monitor.deg_to_pix(p.y),
        ))
    }

    /// Converts `p` from display units into `target` units.
    pub fn convert(&self, p: Position, target: Units) -> Position {
        let pix = self.to_pix(p);
        let other = Self {
            units: target,
            monitor: self.monitor,
        };
        other.from_pix(pix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn monitor() -> MonitorGeometry {
        MonitorGeometry {
            width_cm: 50.0,
            distance_cm: 57.0,
            width_px: 1000,
            height_px: 800,
        }
    }

    #[test]
    fn pixel_degree_round_trip() {
        let conv = UnitConverter::new(Units::Pix, monitor()).unwrap();
        for p in [
            Position::new(0.0, 0.0),
            Position::new(123.25, -87.5),
            Position::new(-499.0, 399.0),
        ] {
            let back = conv.from_deg(conv.to_deg(p));
            assert_relative_eq!(back.x, p.x, epsilon = 1e-9);
            assert_relative_eq!(back.y, p.y, epsilon = 1e-9);
        }
    }

    #[test]
    fn linear_degree_model() {
        let m = monitor();
        // 20 px = 1 cm at 57 cm viewing distance is ~1.005 deg
        assert_relative_eq!(m.pix_to_deg(20.0), 1.0 / (57.0 * 0.017455), epsilon = 1e-12);
    }

    #[test]
    fn norm_and_height_bounds() {
        let norm = UnitConverter::new(Units::Norm, monitor()).unwrap();
        assert_eq!(norm.bounds(), Bounds::new(-1.0, 1.0, 1.0, -1.0));
        let height = UnitConverter::new(Units::Height, monitor()).unwrap();
        let b = height.bounds();
        assert_relative_eq!(b.top, 0.5);
        assert_relative_eq!(b.right, 0.625);
        let p = norm.convert(Position::new(0.5, -0.5), Units::Pix);
        assert_eq!(p, Position::new(250.0, -200.0));
    }

    #[test]
    fn rejects_bad_geometry() {
        let mut m = monitor();
        m.distance_cm = 0.0;
        assert!(matches!(
            UnitConverter::new(Units::Deg, m),
            Err(ConfigError::Monitor(_))
        ));
        assert!("furlong".parse::<Units>().is_err());
        assert_eq!("degree".parse::<Units>().unwrap(), Units::Deg);
    }
}
