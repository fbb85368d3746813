//! Static field geometry and camera calibration data.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::transform::from_vision;

/// Field dimensions and markings in meters. `field_width` spans x, the short
/// side; `field_height` spans y, the playing direction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldGeometry {
    pub field_width: f32,
    pub field_height: f32,
    pub goal_width: f32,
    pub goal_depth: f32,
    pub goal_height: f32,
    pub boundary_width: f32,
    pub line_width: f32,
    pub center_circle_radius: f32,
    pub penalty_area_width: f32,
    pub penalty_area_depth: f32,
}

impl Default for FieldGeometry {
    fn default() -> Self {
        // Division A dimensions.
        Self {
            field_width: 9.0,
            field_height: 12.0,
            goal_width: 1.8,
            goal_depth: 0.18,
            goal_height: 0.16,
            boundary_width: 0.3,
            line_width: 0.01,
            center_circle_radius: 0.5,
            penalty_area_width: 3.6,
            penalty_area_depth: 1.8,
        }
    }
}

/// Camera pose as reported to vision consumers; translations in millimeters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraCalibration {
    pub camera_id: u32,
    pub focal_length: f32,
    pub derived_camera_world_tx: f32,
    pub derived_camera_world_ty: f32,
    pub derived_camera_world_tz: f32,
}

impl CameraCalibration {
    /// Calibration for a camera hovering over `(x, y)` meters at `height`
    /// meters.
    #[must_use]
    pub fn overhead(camera_id: u32, x: f32, y: f32, height: f32) -> Self {
        Self {
            camera_id,
            focal_length: 500.0,
            derived_camera_world_tx: x * 1000.0,
            derived_camera_world_ty: y * 1000.0,
            derived_camera_world_tz: height * 1000.0,
        }
    }

    /// True camera position in field meters.
    #[must_use]
    pub fn world_position(&self) -> Vec3 {
        Vec3::new(
            from_vision(self.derived_camera_world_tx),
            from_vision(self.derived_camera_world_ty),
            from_vision(self.derived_camera_world_tz),
        )
    }
}

/// Construction-time description of the simulated environment. The camera
/// sequence is fixed for the simulator's lifetime and defines `camera_id`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulatorSetup {
    pub geometry: FieldGeometry,
    pub camera_setup: Vec<CameraCalibration>,
}

impl SimulatorSetup {
    /// Setup with `columns x rows` cameras spread evenly over the field at
    /// the given height.
    #[must_use]
    pub fn with_camera_grid(geometry: FieldGeometry, columns: u32, rows: u32, height: f32) -> Self {
        let mut camera_setup = Vec::with_capacity((columns * rows) as usize);
        for row in 0..rows {
            for column in 0..columns {
                let x = geometry.field_width * ((column as f32 + 0.5) / columns as f32 - 0.5);
                let y = geometry.field_height * ((row as f32 + 0.5) / rows as f32 - 0.5);
                let id = row * columns + column;
                camera_setup.push(CameraCalibration::overhead(id, x, y, height));
            }
        }
        Self {
            geometry,
            camera_setup,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overhead_calibration_round_trips_position() {
        let calibration = CameraCalibration::overhead(2, -3.0, 1.5, 4.0);
        let position = calibration.world_position();
        assert!((position.x + 3.0).abs() < 1e-6);
        assert!((position.y - 1.5).abs() < 1e-6);
        assert!((position.z - 4.0).abs() < 1e-6);
    }

    #[test]
    fn camera_grid_covers_the_field_symmetrically() {
        let setup = SimulatorSetup::with_camera_grid(FieldGeometry::default(), 2, 2, 4.0);
        assert_eq!(setup.camera_setup.len(), 4);
        let ids: Vec<u32> = setup.camera_setup.iter().map(|c| c.camera_id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        let sum: f32 = setup
            .camera_setup
            .iter()
            .map(|c| c.derived_camera_world_tx + c.derived_camera_world_ty)
            .sum();
        assert!(sum.abs() < 1e-3, "grid should be centered, got {sum}");
    }
}
