//! Static field collider: boundary walls and goal frames.

use glam::Vec3;
use pitchsim_physics::{BodyError, DynamicsWorld, Material, RigidBodyDesc, Shape};

use crate::geometry::FieldGeometry;
use crate::SIMULATOR_SCALE;

const WALL_HEIGHT: f32 = 0.4;
const WALL_THICKNESS: f32 = 0.05;

/// Material for walls and goal frames.
const FIELD_MATERIAL: Material = Material {
    restitution: 0.56,
    friction: 0.35,
};

/// Immovable collision geometry surrounding the playing surface.
#[derive(Debug)]
pub struct SimField {
    bodies: Vec<pitchsim_physics::BodyHandle>,
}

impl SimField {
    /// Build the boundary walls for `geometry` into `world`.
    pub fn new(world: &mut DynamicsWorld, geometry: &FieldGeometry) -> Result<Self, BodyError> {
        let total_width = geometry.field_width / 2.0 + geometry.boundary_width;
        let total_height = geometry.field_height / 2.0 + geometry.boundary_width;
        let mut bodies = Vec::with_capacity(4);

        // Walls along x (long sides) and y (short sides).
        for side in [-1.0f32, 1.0] {
            bodies.push(add_wall(
                world,
                Vec3::new(side * (total_width + WALL_THICKNESS), 0.0, WALL_HEIGHT / 2.0),
                Vec3::new(WALL_THICKNESS, total_height + 2.0 * WALL_THICKNESS, WALL_HEIGHT / 2.0),
            )?);
            bodies.push(add_wall(
                world,
                Vec3::new(0.0, side * (total_height + WALL_THICKNESS), WALL_HEIGHT / 2.0),
                Vec3::new(total_width + 2.0 * WALL_THICKNESS, WALL_THICKNESS, WALL_HEIGHT / 2.0),
            )?);
        }

        // Goal frames: back wall plus two posts per goal mouth.
        let goal_half = geometry.goal_width / 2.0;
        let post = geometry.goal_depth / 2.0;
        for side in [-1.0f32, 1.0] {
            let mouth = side * geometry.field_height / 2.0;
            bodies.push(add_wall(
                world,
                Vec3::new(0.0, mouth + side * geometry.goal_depth, geometry.goal_height / 2.0),
                Vec3::new(goal_half + WALL_THICKNESS, WALL_THICKNESS, geometry.goal_height / 2.0),
            )?);
            for post_side in [-1.0f32, 1.0] {
                bodies.push(add_wall(
                    world,
                    Vec3::new(
                        post_side * (goal_half + WALL_THICKNESS),
                        mouth + side * post,
                        geometry.goal_height / 2.0,
                    ),
                    Vec3::new(WALL_THICKNESS, post, geometry.goal_height / 2.0),
                )?);
            }
        }

        Ok(Self { bodies })
    }

    #[must_use]
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }
}

fn add_wall(
    world: &mut DynamicsWorld,
    center_m: Vec3,
    half_extents_m: Vec3,
) -> Result<pitchsim_physics::BodyHandle, BodyError> {
    world.add_body(
        RigidBodyDesc::new(
            Shape::Cuboid {
                half_extents: half_extents_m * SIMULATOR_SCALE,
            },
            0.0,
        )
        .with_material(FIELD_MATERIAL)
        .with_position(center_m * SIMULATOR_SCALE),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world_with_defaults;

    #[test]
    fn field_registers_walls_and_goals() {
        let mut world = world_with_defaults();
        let field = SimField::new(&mut world, &FieldGeometry::default()).expect("field");
        // Four boundary walls plus two goals of three segments each.
        assert_eq!(field.body_count(), 10);
        assert_eq!(world.body_count(), 10);
    }
}
