// ==============================================================================
// physics.rs — RAPIER WORLD + CarBody ADAPTER
// ------------------------------------------------------------------------------
// Layers (InteractionGroups):
//   GROUND   fixed ground box, top surface at y = 0, tagged Tarmac
//   WATER    sensor volumes, ray-castable only, tagged Water
//   CHASSIS  car bodies, collide with GROUND
//
// Per tick:
//   1) query pipeline update
//   2) per car: reset user forces (rapier keeps them between steps), run the
//      arcade step through RapierCarBody
//   3) rapier step
//   4) explosion guard: non-finite or far-away cars are respawned
// ==============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use rapier3d::prelude::*;
use tracing::{info, warn};

use crate::arcade::body::{CarBody, Layer, Pos3, RayHit, SurfaceTag, Vec3};
use crate::arcade::{CarCommand, CarEvent, CarSim, RaceData, RaceTelemetrySnapshot};
use crate::config::{CarSettings, EngineSettings};

pub const GROUP_GROUND: Group = Group::from_bits_truncate(0b0001);
pub const GROUP_CHASSIS: Group = Group::from_bits_truncate(0b0010);
pub const GROUP_WATER: Group = Group::from_bits_truncate(0b0100);

const WORLD_LIMIT: f32 = 1_000.0;

/// Borrowed view of one car body plus the query state it needs for ray casts.
pub struct RapierCarBody<'a> {
    handle: RigidBodyHandle,
    bodies: &'a mut RigidBodySet,
    colliders: &'a ColliderSet,
    query: &'a QueryPipeline,
}

impl<'a> RapierCarBody<'a> {
    pub fn new(
        handle: RigidBodyHandle,
        bodies: &'a mut RigidBodySet,
        colliders: &'a ColliderSet,
        query: &'a QueryPipeline,
    ) -> Option<Self> {
        bodies.get(handle)?;
        Some(Self { handle, bodies, colliders, query })
    }

    fn rb(&self) -> &RigidBody {
        &self.bodies[self.handle]
    }

    fn rb_mut(&mut self) -> &mut RigidBody {
        &mut self.bodies[self.handle]
    }

    fn layer_groups(layer: Layer) -> InteractionGroups {
        match layer {
            Layer::Ground => InteractionGroups::new(GROUP_CHASSIS, GROUP_GROUND),
            Layer::Water => InteractionGroups::new(GROUP_CHASSIS, GROUP_WATER),
        }
    }
}

impl CarBody for RapierCarBody<'_> {
    fn pose(&self) -> Isometry<Real> {
        *self.rb().position()
    }

    fn mass(&self) -> f32 {
        self.rb().mass()
    }

    fn linvel(&self) -> Vec3 {
        *self.rb().linvel()
    }

    fn angvel(&self) -> Vec3 {
        *self.rb().angvel()
    }

    fn velocity_at_point(&self, point: &Pos3) -> Vec3 {
        self.rb().velocity_at_point(point)
    }

    fn cast_ray(&self, origin: Pos3, dir: Vec3, max_dist: f32, layer: Layer) -> Option<RayHit> {
        let ray = Ray::new(origin, dir);
        let filter = QueryFilter::default()
            .exclude_rigid_body(self.handle)
            .groups(Self::layer_groups(layer));

        let (collider, toi) = self
            .query
            .cast_ray(&*self.bodies, self.colliders, &ray, max_dist, true, filter)?;

        let tag = self
            .colliders
            .get(collider)
            .map(|c| SurfaceTag::from_user_data(c.user_data))
            .unwrap_or(SurfaceTag::Unknown);

        Some(RayHit {
            point: ray.point_at(toi),
            distance: toi * dir.norm(),
            tag,
        })
    }

    fn apply_force_at_position(&mut self, force: Vec3, point: Pos3) {
        self.rb_mut().add_force_at_point(force, point, true);
    }

    fn apply_force(&mut self, force: Vec3) {
        self.rb_mut().add_force(force, true);
    }

    fn apply_torque(&mut self, torque: Vec3) {
        self.rb_mut().add_torque(torque, true);
    }

    fn apply_impulse(&mut self, impulse: Vec3) {
        self.rb_mut().apply_impulse(impulse, true);
    }

    fn add_velocity_change(&mut self, dv: Vec3) {
        let rb = self.rb_mut();
        let v = *rb.linvel();
        rb.set_linvel(v + dv, true);
    }

    fn add_angular_velocity_change(&mut self, dw: Vec3) {
        let rb = self.rb_mut();
        let w = *rb.angvel();
        rb.set_angvel(w + dw, true);
    }

    fn teleport(&mut self, pose: Isometry<Real>) {
        let rb = self.rb_mut();
        rb.set_position(pose, true);
        rb.set_linvel(Vector::zeros(), true);
        rb.set_angvel(Vector::zeros(), true);
        rb.reset_forces(true);
        rb.reset_torques(true);
    }
}

struct CarEntry {
    body: RigidBodyHandle,
    sim: CarSim,
}

pub struct PhysicsWorld {
    pub gravity: Vector<Real>,
    pub pipeline: PhysicsPipeline,
    pub island_manager: IslandManager,
    pub broad_phase: DefaultBroadPhase,
    pub narrow_phase: NarrowPhase,
    pub bodies: RigidBodySet,
    pub colliders: ColliderSet,
    pub joints: ImpulseJointSet,
    pub multibody_joints: MultibodyJointSet,
    pub ccd: CCDSolver,
    pub query_pipeline: QueryPipeline,
    cars: HashMap<String, CarEntry>,
    next_seed: u64,
}

impl PhysicsWorld {
    pub fn new() -> Self {
        let mut bodies = RigidBodySet::new();
        let mut colliders = ColliderSet::new();

        // 1000 x 0.2 x 1000 box, top surface at y = 0
        let ground = bodies.insert(RigidBodyBuilder::fixed().translation(vector![0.0, -0.1, 0.0]).build());
        let ground_collider = ColliderBuilder::cuboid(500.0, 0.1, 500.0)
            .collision_groups(InteractionGroups::new(GROUP_GROUND, GROUP_CHASSIS))
            .user_data(SurfaceTag::Tarmac.user_data())
            .friction(1.2)
            .restitution(0.0)
            .build();
        colliders.insert_with_parent(ground_collider, ground, &mut bodies);

        info!(bodies = bodies.len(), colliders = colliders.len(), "ground inserted");

        let mut world = Self {
            gravity: vector![0.0, -9.81, 0.0],
            pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies,
            colliders,
            joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            cars: HashMap::new(),
            next_seed: 1,
        };

        // shallow pool off to the side of the spawn grid
        world.add_water(vector![0.0, 0.15, 80.0], vector![12.0, 0.15, 40.0]);
        world
    }

    /// Sensor volume on the water layer; cars ride it when fast enough.
    pub fn add_water(&mut self, center: Vector<Real>, half_extents: Vector<Real>) -> ColliderHandle {
        let collider = ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z)
            .translation(center)
            .sensor(true)
            .collision_groups(InteractionGroups::new(GROUP_WATER, GROUP_CHASSIS))
            .user_data(SurfaceTag::Water.user_data())
            .build();
        self.colliders.insert(collider)
    }

    pub fn spawn_car(
        &mut self,
        id: &str,
        pose: Isometry<Real>,
        car: Arc<CarSettings>,
        engine: Arc<EngineSettings>,
    ) -> RigidBodyHandle {
        if let Some(old) = self.cars.remove(id) {
            self.remove_body(old.body);
        }

        let [hx, hy, hz] = car.chassis_half_extents;
        let [cx, cy, cz] = car.com_offset;
        let m = car.mass;
        let inertia = vector![
            m / 3.0 * (hy * hy + hz * hz),
            m / 3.0 * (hx * hx + hz * hz),
            m / 3.0 * (hx * hx + hy * hy)
        ];

        let rb = RigidBodyBuilder::dynamic().position(pose).ccd_enabled(true).build();
        let collider = ColliderBuilder::cuboid(hx, hy, hz)
            .collision_groups(InteractionGroups::new(GROUP_CHASSIS, GROUP_GROUND))
            .mass_properties(MassProperties::new(point![cx, cy, cz], m, inertia))
            .friction(0.3)
            .restitution(0.0)
            .build();

        let handle = self.bodies.insert(rb);
        self.colliders.insert_with_parent(collider, handle, &mut self.bodies);

        let seed = self.next_seed;
        self.next_seed += 1;
        let sim = CarSim::new(car, engine, pose, seed);
        self.cars.insert(id.to_string(), CarEntry { body: handle, sim });

        info!(player = id, position = ?pose.translation.vector, "car spawned");
        handle
    }

    pub fn remove_car(&mut self, id: &str) -> bool {
        let Some(entry) = self.cars.remove(id) else { return false };
        self.remove_body(entry.body);
        info!(player = id, "car removed");
        true
    }

    fn remove_body(&mut self, handle: RigidBodyHandle) {
        self.bodies.remove(
            handle,
            &mut self.island_manager,
            &mut self.colliders,
            &mut self.joints,
            &mut self.multibody_joints,
            true,
        );
    }

    pub fn apply_command(&mut self, id: &str, command: CarCommand) -> bool {
        match self.cars.get_mut(id) {
            Some(entry) => entry.sim.apply_command(command),
            None => false,
        }
    }

    pub fn car(&self, id: &str) -> Option<&CarSim> {
        self.cars.get(id).map(|e| &e.sim)
    }

    pub fn body(&self, id: &str) -> Option<&RigidBody> {
        self.cars.get(id).and_then(|e| self.bodies.get(e.body))
    }

    pub fn race_data(&self, id: &str) -> Option<RaceData> {
        self.car(id).map(|sim| sim.race.clone())
    }

    pub fn snapshots(&self) -> Vec<(String, RaceTelemetrySnapshot)> {
        self.cars.iter().map(|(id, e)| (id.clone(), e.sim.snapshot())).collect()
    }

    pub fn drain_events(&mut self) -> Vec<(String, CarEvent)> {
        let mut out = Vec::new();
        for (id, entry) in self.cars.iter_mut() {
            out.extend(entry.sim.drain_events().into_iter().map(|e| (id.clone(), e)));
        }
        out
    }

    pub fn step(&mut self, dt: Real) {
        // 1) ray casts see last tick's poses
        self.query_pipeline.update(&self.colliders);

        // 2) arcade core
        for entry in self.cars.values_mut() {
            if let Some(rb) = self.bodies.get_mut(entry.body) {
                rb.reset_forces(true);
                rb.reset_torques(true);
            }
            let Some(mut body) =
                RapierCarBody::new(entry.body, &mut self.bodies, &self.colliders, &self.query_pipeline)
            else {
                continue;
            };
            entry.sim.step(&mut body, dt);
        }

        // 3) rapier
        self.pipeline.step(
            &self.gravity,
            &IntegrationParameters {
                dt,
                ..IntegrationParameters::default()
            },
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            Some(&mut self.query_pipeline),
            &(),
            &(),
        );

        // 4) explosion guard
        for (id, entry) in self.cars.iter_mut() {
            let Some(rb) = self.bodies.get(entry.body) else { continue };
            let pos = rb.translation();
            let bad = !pos.iter().all(|c| c.is_finite())
                || !rb.linvel().iter().all(|c| c.is_finite())
                || pos.iter().any(|c| c.abs() > WORLD_LIMIT);
            if !bad {
                continue;
            }

            warn!(player = %id, position = ?pos, "car body exploded, respawning");
            if let Some(mut body) =
                RapierCarBody::new(entry.body, &mut self.bodies, &self.colliders, &self.query_pipeline)
            {
                entry.sim.respawn(&mut body);
            }
        }
    }
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 60.0;

    fn spawn(world: &mut PhysicsWorld, id: &str, x: f32, y: f32, z: f32) {
        world.spawn_car(
            id,
            Isometry::translation(x, y, z),
            Arc::new(CarSettings::coupe()),
            Arc::new(EngineSettings::coupe()),
        );
    }

    #[test]
    fn car_settles_on_its_suspension() {
        let mut world = PhysicsWorld::new();
        spawn(&mut world, "p1", 0.0, 1.0, 0.0);

        for _ in 0..300 {
            world.step(DT);
        }

        let body = world.body("p1").unwrap();
        let y = body.translation().y;
        assert!(y > 0.4 && y < 1.2, "settled at {y}");
        assert!(body.linvel().norm() < 0.2);

        let sim = world.car("p1").unwrap();
        assert!(sim.wheels.iter().all(|w| w.grounded));
        assert!(sim.wheels.iter().all(|w| w.surface == Some(SurfaceTag::Tarmac)));
    }

    #[test]
    fn water_layer_is_ray_castable() {
        let mut world = PhysicsWorld::new();
        spawn(&mut world, "p1", 0.0, 1.0, 80.0);
        world.query_pipeline.update(&world.colliders);

        let handle = world.cars["p1"].body;
        let body = RapierCarBody::new(handle, &mut world.bodies, &world.colliders, &world.query_pipeline).unwrap();
        let down = -Vec3::y();
        let origin = Pos3::new(0.0, 0.8, 80.0);

        let water = body.cast_ray(origin, down, 2.0, Layer::Water).unwrap();
        let ground = body.cast_ray(origin, down, 2.0, Layer::Ground).unwrap();
        assert_eq!(water.tag, SurfaceTag::Water);
        assert_eq!(ground.tag, SurfaceTag::Tarmac);
        assert!(water.distance < ground.distance);
    }

    #[test]
    fn commands_and_removal() {
        let mut world = PhysicsWorld::new();
        spawn(&mut world, "p1", 0.0, 1.0, 0.0);
        assert!(world.apply_command("p1", CarCommand::StartEngine));
        assert!(!world.apply_command("nobody", CarCommand::StartEngine));

        world.step(DT);
        let events = world.drain_events();
        assert!(events.iter().any(|(id, e)| id == "p1" && *e == CarEvent::EngineStarting));

        assert!(world.remove_car("p1"));
        assert!(world.car("p1").is_none());
        assert!(!world.remove_car("p1"));
    }

    #[test]
    fn exploded_body_is_respawned() {
        let mut world = PhysicsWorld::new();
        spawn(&mut world, "p1", 0.0, 1.0, 0.0);
        let handle = world.cars["p1"].body;
        world.bodies[handle].set_translation(vector![5_000.0, 1.0, 0.0], true);

        world.step(DT);
        let pos = world.body("p1").unwrap().translation();
        assert!(pos.x.abs() < 1.0);
        assert!(world.drain_events().iter().any(|(_, e)| *e == CarEvent::Respawned));
    }
}
