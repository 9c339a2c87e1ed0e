//! Transaction domain: models, repository seam, service.

mod model;
mod service;

pub use model::*;
pub use service::*;
