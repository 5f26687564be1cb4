pub mod cdn;
pub mod certificate;
pub mod config;
pub mod control_plane;
pub mod coordinator;
pub mod error;
pub mod model;
pub mod provider;
pub mod resolver;
pub mod retry;
pub mod routing;
pub mod traits;
pub mod validation;
pub mod verify;

pub use error::{BifrostError, Result};
pub use validation::Domain;
