//! Secure inference of feed-forward classifiers on top of `mpc`.

pub mod error;
pub mod model;
pub mod secure;
pub mod session;

pub use error::{ModelError, Result};
pub use model::{Architecture, Layer, LayerShape, Model};
pub use secure::{material_plan, SecureLayer, SecureModel, Workload};
pub use session::{Roles, Session};
