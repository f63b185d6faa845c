//! Cutting tool and feed/speed parameters.

use serde::{Deserialize, Serialize};

use crate::{CamError, Result};

/// Kind of rotating cutter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Flat end mill for general machining.
    #[default]
    EndMill,
    /// Ball end mill for 3D contouring.
    BallMill,
    /// Face mill for surface machining.
    FaceMill,
    /// Drill bit for hole making.
    Drill,
    /// Chamfer cutter for edge breaking.
    Chamfer,
    /// Thread mill.
    Thread,
}

impl ToolKind {
    /// Human readable name.
    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::EndMill => "End Mill",
            ToolKind::BallMill => "Ball Mill",
            ToolKind::FaceMill => "Face Mill",
            ToolKind::Drill => "Drill",
            ToolKind::Chamfer => "Chamfer",
            ToolKind::Thread => "Thread Mill",
        }
    }
}

/// Geometry and optional machining limits of a cutting tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameters {
    /// Cutter kind.
    pub kind: ToolKind,
    /// Cutting diameter in mm.
    pub diameter: f64,
    /// Number of flutes.
    pub flutes: u8,
    /// Overall length in mm.
    pub length: f64,
    /// Shank diameter in mm.
    pub shank_diameter: f64,
    /// Maximum axial depth of cut in mm.
    #[serde(default)]
    pub max_depth_of_cut: Option<f64>,
    /// Maximum radial width of cut in mm.
    #[serde(default)]
    pub max_width_of_cut: Option<f64>,
    /// Recommended feed rate in mm/min.
    #[serde(default)]
    pub feed_rate: Option<f64>,
    /// Recommended spindle speed in RPM.
    #[serde(default)]
    pub spindle_speed: Option<f64>,
}

impl Default for ToolParameters {
    fn default() -> Self {
        Self {
            kind: ToolKind::EndMill,
            diameter: 10.0,
            flutes: 4,
            length: 50.0,
            shank_diameter: 10.0,
            max_depth_of_cut: None,
            max_width_of_cut: None,
            feed_rate: None,
            spindle_speed: None,
        }
    }
}

impl ToolParameters {
    /// Create a tool of the given kind and diameter with default proportions.
    pub fn new(kind: ToolKind, diameter: f64) -> Self {
        Self {
            kind,
            diameter,
            shank_diameter: diameter,
            ..Default::default()
        }
    }

    /// Create a flat end mill.
    pub fn end_mill(diameter: f64) -> Self {
        Self::new(ToolKind::EndMill, diameter)
    }

    /// Tool radius.
    pub fn radius(&self) -> f64 {
        self.diameter / 2.0
    }

    /// Check that every dimension is usable.
    pub fn validate(&self) -> Result<()> {
        positive("diameter", self.diameter).map_err(CamError::InvalidTool)?;
        positive("length", self.length).map_err(CamError::InvalidTool)?;
        positive("shank diameter", self.shank_diameter).map_err(CamError::InvalidTool)?;
        if self.flutes == 0 {
            return Err(CamError::InvalidTool("tool needs at least one flute".into()));
        }
        let limits = [
            ("max depth of cut", self.max_depth_of_cut),
            ("max width of cut", self.max_width_of_cut),
            ("feed rate", self.feed_rate),
            ("spindle speed", self.spindle_speed),
        ];
        for (name, value) in limits {
            if let Some(v) = value {
                positive(name, v).map_err(CamError::InvalidTool)?;
            }
        }
        Ok(())
    }
}

/// Feeds, speeds and coolant for a cut.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CuttingParameters {
    /// Cutting feed rate in mm/min.
    pub feedrate: f64,
    /// Spindle speed in RPM.
    pub spindle_speed: f64,
    /// Axial depth of cut in mm.
    pub depth_of_cut: f64,
    /// Radial width of cut in mm.
    pub width_of_cut: f64,
    /// Flood coolant on.
    pub coolant: bool,
}

impl Default for CuttingParameters {
    fn default() -> Self {
        Self {
            feedrate: 1000.0,
            spindle_speed: 10000.0,
            depth_of_cut: 1.0,
            width_of_cut: 5.0,
            coolant: true,
        }
    }
}

impl CuttingParameters {
    /// Check that feeds and depths are positive.
    pub fn validate(&self) -> Result<()> {
        positive("feedrate", self.feedrate).map_err(CamError::InvalidParameter)?;
        positive("spindle speed", self.spindle_speed).map_err(CamError::InvalidParameter)?;
        positive("depth of cut", self.depth_of_cut).map_err(CamError::InvalidParameter)?;
        positive("width of cut", self.width_of_cut).map_err(CamError::InvalidParameter)?;
        Ok(())
    }
}

pub(crate) fn positive(name: &str, value: f64) -> std::result::Result<(), String> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(format!("{name} must be positive, got {value}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_defaults() {
        let tool = ToolParameters::default();
        assert_eq!(tool.kind, ToolKind::EndMill);
        assert!((tool.radius() - 5.0).abs() < 1e-10);
        assert!(tool.validate().is_ok());
    }

    #[test]
    fn test_tool_validation() {
        let mut tool = ToolParameters::end_mill(6.0);
        assert!(tool.validate().is_ok());

        tool.diameter = 0.0;
        assert!(matches!(tool.validate(), Err(CamError::InvalidTool(_))));
        assert!(matches!(ToolParameters::end_mill(0.0).validate(), Err(CamError::InvalidTool(_))));

        tool.diameter = 6.0;
        tool.flutes = 0;
        assert!(tool.validate().is_err());

        tool.flutes = 2;
        tool.max_depth_of_cut = Some(-1.0);
        assert!(tool.validate().is_err());

        tool.max_depth_of_cut = Some(12.0);
        assert!(tool.validate().is_ok());
    }

    #[test]
    fn test_cutting_validation() {
        assert!(CuttingParameters::default().validate().is_ok());
        let bad = CuttingParameters {
            feedrate: f64::NAN,
            ..Default::default()
        };
        assert!(matches!(bad.validate(), Err(CamError::InvalidParameter(_))));
    }

    #[test]
    fn test_tool_serialization() {
        let tool = ToolParameters::new(ToolKind::BallMill, 6.0);
        let json = serde_json::to_string(&tool).unwrap();
        assert!(json.contains("\"ball_mill\""));
        let parsed: ToolParameters = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, tool);
    }

    #[test]
    fn test_tool_optional_limits_default() {
        let json =
            r#"{"kind":"drill","diameter":3.0,"flutes":2,"length":40.0,"shank_diameter":3.0}"#;
        let tool: ToolParameters = serde_json::from_str(json).unwrap();
        assert_eq!(tool.kind, ToolKind::Drill);
        assert!(tool.max_depth_of_cut.is_none());
    }
}
