//! Minimal rigid-body dynamics world for the pitchsim simulator.
//!
//! The simulator core treats this crate as an opaque engine: a discrete
//! dynamics world holding sphere/cuboid bodies, gravity and force
//! management, and a fixed-substep integrator that invokes a caller-supplied
//! callback before every substep. Lengths handed to this crate are already
//! premultiplied by the simulator's length scale.

use glam::Vec3;
use slotmap::{SlotMap, new_key_type};
use thiserror::Error;

new_key_type! {
    /// Stable handle for rigid bodies backed by a generational slot map.
    pub struct BodyHandle;
}

/// Errors raised when constructing bodies.
#[derive(Debug, Error, PartialEq)]
pub enum BodyError {
    #[error("body mass must be finite and non-negative")]
    InvalidMass,
    #[error("collider dimensions must be positive")]
    InvalidShape,
}

/// Collision shape attached to a rigid body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    Sphere { radius: f32 },
    Cuboid { half_extents: Vec3 },
}

impl Shape {
    /// Lowest point of the shape relative to the body origin.
    #[must_use]
    pub fn bottom_offset(&self) -> f32 {
        match self {
            Shape::Sphere { radius } => -radius,
            Shape::Cuboid { half_extents } => -half_extents.z,
        }
    }

    fn is_valid(&self) -> bool {
        match self {
            Shape::Sphere { radius } => *radius > 0.0,
            Shape::Cuboid { half_extents } => half_extents.min_element() > 0.0,
        }
    }
}

/// Surface material used when resolving contacts. Effective restitution and
/// friction of a pair are the products of the two materials.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    pub restitution: f32,
    pub friction: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            restitution: 0.0,
            friction: 0.5,
        }
    }
}

/// Construction parameters for a rigid body.
#[derive(Debug, Clone, Copy)]
pub struct RigidBodyDesc {
    pub shape: Shape,
    pub material: Material,
    pub position: Vec3,
    pub yaw: f32,
    /// Zero mass marks the body static.
    pub mass: f32,
    /// Kinematic bodies integrate velocity but ignore forces and contacts.
    pub kinematic: bool,
}

impl RigidBodyDesc {
    #[must_use]
    pub fn new(shape: Shape, mass: f32) -> Self {
        Self {
            shape,
            material: Material::default(),
            position: Vec3::ZERO,
            yaw: 0.0,
            mass,
            kinematic: false,
        }
    }

    #[must_use]
    pub fn with_material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }

    #[must_use]
    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    #[must_use]
    pub fn with_yaw(mut self, yaw: f32) -> Self {
        self.yaw = yaw;
        self
    }

    #[must_use]
    pub fn kinematic(mut self) -> Self {
        self.kinematic = true;
        self
    }
}

/// A rigid body with planar orientation (yaw) plus a tracked up vector.
///
/// The up vector is only changed by angular velocity about the x/y axes,
/// which normal ground play never produces; external state injection can tip
/// a body over, and `up.z` then reveals it.
#[derive(Debug, Clone)]
pub struct RigidBody {
    shape: Shape,
    material: Material,
    position: Vec3,
    yaw: f32,
    up: Vec3,
    linear_velocity: Vec3,
    angular_velocity: Vec3,
    force: Vec3,
    torque_z: f32,
    inv_mass: f32,
    mass: f32,
    kinematic: bool,
}

impl RigidBody {
    fn new(desc: &RigidBodyDesc) -> Result<Self, BodyError> {
        if !desc.mass.is_finite() || desc.mass < 0.0 {
            return Err(BodyError::InvalidMass);
        }
        if !desc.shape.is_valid() {
            return Err(BodyError::InvalidShape);
        }
        let inv_mass = if desc.mass > 0.0 && !desc.kinematic {
            1.0 / desc.mass
        } else {
            0.0
        };
        Ok(Self {
            shape: desc.shape,
            material: desc.material,
            position: desc.position,
            yaw: desc.yaw,
            up: Vec3::Z,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            force: Vec3::ZERO,
            torque_z: 0.0,
            inv_mass,
            mass: desc.mass,
            kinematic: desc.kinematic,
        })
    }

    #[must_use]
    pub fn shape(&self) -> Shape {
        self.shape
    }

    #[must_use]
    pub fn material(&self) -> Material {
        self.material
    }

    #[must_use]
    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    #[must_use]
    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn set_yaw(&mut self, yaw: f32) {
        self.yaw = yaw;
    }

    /// Body-frame up axis in world space.
    #[must_use]
    pub fn up(&self) -> Vec3 {
        self.up
    }

    pub fn set_up(&mut self, up: Vec3) {
        self.up = up.normalize_or_zero();
        if self.up == Vec3::ZERO {
            self.up = Vec3::Z;
        }
    }

    #[must_use]
    pub fn linear_velocity(&self) -> Vec3 {
        self.linear_velocity
    }

    pub fn set_linear_velocity(&mut self, velocity: Vec3) {
        self.linear_velocity = velocity;
    }

    #[must_use]
    pub fn angular_velocity(&self) -> Vec3 {
        self.angular_velocity
    }

    pub fn set_angular_velocity(&mut self, velocity: Vec3) {
        self.angular_velocity = velocity;
    }

    #[must_use]
    pub fn mass(&self) -> f32 {
        self.mass
    }

    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        self.inv_mass > 0.0
    }

    pub fn apply_central_force(&mut self, force: Vec3) {
        self.force += force;
    }

    pub fn apply_torque_z(&mut self, torque: f32) {
        self.torque_z += torque;
    }

    pub fn apply_central_impulse(&mut self, impulse: Vec3) {
        self.linear_velocity += impulse * self.inv_mass;
    }

    /// True when numeric state has left the representable range.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        !self.position.is_finite() || !self.linear_velocity.is_finite()
    }

    fn rest_height(&self) -> f32 {
        -self.shape.bottom_offset()
    }
}

/// Discrete dynamics world with an implicit ground plane at z = 0.
#[derive(Debug)]
pub struct DynamicsWorld {
    gravity: Vec3,
    ground: Material,
    bodies: SlotMap<BodyHandle, RigidBody>,
    accumulator: f32,
}

impl DynamicsWorld {
    /// Create a world with the given gravity vector and ground material.
    #[must_use]
    pub fn new(gravity: Vec3, ground: Material) -> Self {
        Self {
            gravity,
            ground,
            bodies: SlotMap::with_key(),
            accumulator: 0.0,
        }
    }

    pub fn set_gravity(&mut self, gravity: Vec3) {
        self.gravity = gravity;
    }

    #[must_use]
    pub fn gravity(&self) -> Vec3 {
        self.gravity
    }

    pub fn add_body(&mut self, desc: RigidBodyDesc) -> Result<BodyHandle, BodyError> {
        let body = RigidBody::new(&desc)?;
        Ok(self.bodies.insert(body))
    }

    pub fn remove_body(&mut self, handle: BodyHandle) -> Option<RigidBody> {
        self.bodies.remove(handle)
    }

    #[must_use]
    pub fn body(&self, handle: BodyHandle) -> Option<&RigidBody> {
        self.bodies.get(handle)
    }

    #[must_use]
    pub fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut RigidBody> {
        self.bodies.get_mut(handle)
    }

    #[must_use]
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Zero accumulated forces and torques on every body.
    pub fn clear_forces(&mut self) {
        for body in self.bodies.values_mut() {
            body.force = Vec3::ZERO;
            body.torque_z = 0.0;
        }
    }

    /// Add gravity to the force accumulator of every dynamic body.
    pub fn apply_gravity(&mut self) {
        let gravity = self.gravity;
        for body in self.bodies.values_mut() {
            if body.is_dynamic() {
                body.force += gravity * body.mass;
            }
        }
    }

    /// Advance the world by `dt` seconds in fixed substeps.
    ///
    /// At most `max_substeps` substeps of exactly `fixed_substep` seconds
    /// run; the remainder below one substep carries over to the next call and
    /// time beyond the cap is dropped. `pre_substep` runs before each
    /// substep with the world and the substep size, mirroring an internal
    /// tick callback. Returns the number of substeps executed.
    pub fn step_simulation<F>(
        &mut self,
        dt: f32,
        max_substeps: usize,
        fixed_substep: f32,
        mut pre_substep: F,
    ) -> usize
    where
        F: FnMut(&mut Self, f32),
    {
        if fixed_substep <= 0.0 || dt < 0.0 {
            return 0;
        }
        self.accumulator += dt;
        let available = (self.accumulator / fixed_substep) as usize;
        self.accumulator -= available as f32 * fixed_substep;
        let steps = available.min(max_substeps);
        for _ in 0..steps {
            pre_substep(self, fixed_substep);
            self.substep(fixed_substep);
        }
        steps
    }

    fn substep(&mut self, dt: f32) {
        self.integrate(dt);
        self.resolve_ground_contacts(dt);
        self.resolve_pair_contacts();
    }

    fn integrate(&mut self, dt: f32) {
        for body in self.bodies.values_mut() {
            if body.kinematic {
                body.position += body.linear_velocity * dt;
                body.yaw += body.angular_velocity.z * dt;
                continue;
            }
            if !body.is_dynamic() {
                continue;
            }
            body.linear_velocity += body.force * body.inv_mass * dt;
            // Unit inertia about z keeps torque response proportional to mass.
            body.angular_velocity.z += body.torque_z * body.inv_mass * dt;
            body.position += body.linear_velocity * dt;
            body.yaw += body.angular_velocity.z * dt;

            let tilt = Vec3::new(body.angular_velocity.x, body.angular_velocity.y, 0.0);
            if tilt.length_squared() > 0.0 {
                let up = body.up + tilt.cross(body.up) * dt;
                body.set_up(up);
            }
        }
    }

    fn resolve_ground_contacts(&mut self, dt: f32) {
        let ground = self.ground;
        for body in self.bodies.values_mut() {
            if !body.is_dynamic() {
                continue;
            }
            let rest = body.rest_height();
            if body.position.z >= rest {
                continue;
            }
            body.position.z = rest;
            if body.linear_velocity.z < 0.0 {
                let restitution = body.material.restitution * ground.restitution;
                body.linear_velocity.z = -body.linear_velocity.z * restitution;
                if body.linear_velocity.z.abs() < 1e-3 {
                    body.linear_velocity.z = 0.0;
                }
            }
            // Coulomb friction against the ground while in contact.
            let friction = body.material.friction * ground.friction;
            let tangential = Vec3::new(body.linear_velocity.x, body.linear_velocity.y, 0.0);
            let speed = tangential.length();
            if speed > 0.0 {
                let drop = friction * self.gravity.length() * dt;
                let scale = ((speed - drop) / speed).max(0.0);
                body.linear_velocity.x *= scale;
                body.linear_velocity.y *= scale;
            }
        }
    }

    fn resolve_pair_contacts(&mut self) {
        let handles: Vec<BodyHandle> = self.bodies.keys().collect();
        for i in 0..handles.len() {
            for j in (i + 1)..handles.len() {
                self.resolve_pair(handles[i], handles[j]);
            }
        }
    }

    fn resolve_pair(&mut self, a: BodyHandle, b: BodyHandle) {
        let Some([body_a, body_b]) = self.bodies.get_disjoint_mut([a, b]) else {
            return;
        };
        if !body_a.is_dynamic() && !body_b.is_dynamic() {
            return;
        }
        let Some((normal, depth)) = contact(body_a, body_b) else {
            return;
        };

        // Positional correction split by inverse mass.
        let total_inv = body_a.inv_mass + body_b.inv_mass;
        if total_inv <= 0.0 {
            return;
        }
        body_a.position -= normal * depth * (body_a.inv_mass / total_inv);
        body_b.position += normal * depth * (body_b.inv_mass / total_inv);

        let relative = body_b.linear_velocity - body_a.linear_velocity;
        let closing = relative.dot(normal);
        if closing >= 0.0 {
            return;
        }
        let restitution = body_a.material.restitution * body_b.material.restitution;
        let impulse = -(1.0 + restitution) * closing / total_inv;
        body_a.linear_velocity -= normal * impulse * body_a.inv_mass;
        body_b.linear_velocity += normal * impulse * body_b.inv_mass;

        // Friction impulse along the tangential residual.
        let tangent = relative - normal * closing;
        let tangent_speed = tangent.length();
        if tangent_speed > 1e-6 {
            let friction = body_a.material.friction * body_b.material.friction;
            let magnitude = (friction * impulse).min(tangent_speed / total_inv);
            let direction = tangent / tangent_speed;
            body_a.linear_velocity += direction * magnitude * body_a.inv_mass;
            body_b.linear_velocity -= direction * magnitude * body_b.inv_mass;
        }
    }
}

/// Contact normal (from `a` to `b`) and penetration depth, if overlapping.
fn contact(a: &RigidBody, b: &RigidBody) -> Option<(Vec3, f32)> {
    match (a.shape, b.shape) {
        (Shape::Sphere { radius: ra }, Shape::Sphere { radius: rb }) => {
            sphere_sphere(a.position, ra, b.position, rb)
        }
        (Shape::Sphere { radius }, Shape::Cuboid { half_extents }) => {
            sphere_cuboid(a.position, radius, b.position, b.yaw, half_extents)
                .map(|(n, d)| (-n, d))
        }
        (Shape::Cuboid { half_extents }, Shape::Sphere { radius }) => {
            sphere_cuboid(b.position, radius, a.position, a.yaw, half_extents)
        }
        (Shape::Cuboid { half_extents: ha }, Shape::Cuboid { half_extents: hb }) => {
            // Yaw is ignored for box pairs; bounding spheres keep bodies apart.
            sphere_sphere(a.position, ha.length(), b.position, hb.length())
        }
    }
}

fn sphere_sphere(pa: Vec3, ra: f32, pb: Vec3, rb: f32) -> Option<(Vec3, f32)> {
    let delta = pb - pa;
    let distance = delta.length();
    let depth = ra + rb - distance;
    if depth <= 0.0 {
        return None;
    }
    let normal = if distance > 1e-6 {
        delta / distance
    } else {
        Vec3::X
    };
    Some((normal, depth))
}

/// Sphere against an oriented cuboid; normal points from the cuboid towards
/// the sphere.
fn sphere_cuboid(
    sphere_pos: Vec3,
    radius: f32,
    cuboid_pos: Vec3,
    yaw: f32,
    half_extents: Vec3,
) -> Option<(Vec3, f32)> {
    let (sin, cos) = yaw.sin_cos();
    let delta = sphere_pos - cuboid_pos;
    // Rotate into the cuboid frame.
    let local = Vec3::new(
        cos * delta.x + sin * delta.y,
        -sin * delta.x + cos * delta.y,
        delta.z,
    );
    let clamped = local.clamp(-half_extents, half_extents);
    let offset = local - clamped;
    let distance = offset.length();
    if distance >= radius || distance <= 1e-6 {
        return None;
    }
    let local_normal = offset / distance;
    let normal = Vec3::new(
        cos * local_normal.x - sin * local_normal.y,
        sin * local_normal.x + cos * local_normal.y,
        local_normal.z,
    );
    Some((normal, radius - distance))
}
