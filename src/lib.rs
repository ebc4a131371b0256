//! Physics assembly for drift-diffusion device simulation on two-point-flux
//! finite-volume grids.
//!
//! [`physics::DeviceModel`] supplies the flux, reaction, storage and boundary
//! reaction callbacks consumed by a nonlinear solver behind
//! [`numerics::solver::NonlinearSolver`], and
//! [`numerics::continuation::EquilibriumContinuation`] ramps the Poisson
//! embedding to reach thermodynamic equilibrium.

pub mod config;
pub mod discretization;
pub mod error;
pub mod numerics;
pub mod physics;
pub mod processing;

pub use config::DeviceConfig;
pub use error::{Error, Result};
pub use physics::DeviceModel;
