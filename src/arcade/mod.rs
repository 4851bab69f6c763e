// ==============================================================================
// arcade — ENGINE-AGNOSTIC CAR SIMULATION CORE
// ------------------------------------------------------------------------------
// Leaf first:
//   body         CarBody seam to the rigid-body engine, CarFrame, math helpers
//   wheel        arc ray-cast contact, suspension, hydroplaning
//   grip         lateral grip per axle, drift state machine
//   drivetrain   engine / gearbox / clutch state machine, shift grading
//   assist       drive force, burnout / LCS, TCS, brakes
//   airborne     air control, self-righting
//   transitions  cooperative timed transitions
//   telemetry    snapshots, race data, events, recorder
//   sim          per-car orchestration step
// ==============================================================================

pub mod airborne;
pub mod assist;
pub mod body;
pub mod drivetrain;
pub mod grip;
pub mod sim;
pub mod telemetry;
pub mod transitions;
pub mod wheel;

pub use sim::{CarCommand, CarSim};
pub use telemetry::{CarEvent, RaceData, RaceTelemetrySnapshot};
