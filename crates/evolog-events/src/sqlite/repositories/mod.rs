//! Repository layer — stateless structs, every method takes `&Connection`.
//!
//! One repository per table. Transactions are owned by the callers (the
//! datastore facade, the migrator, the finalizer); repositories only issue
//! statements.

pub mod event;
pub mod keyframe;
pub mod migration_position;
pub mod model;
pub mod position;
pub mod staging;

pub use event::EventRepo;
pub use keyframe::KeyframeRepo;
pub use migration_position::MigrationPositionRepo;
pub use model::ModelRepo;
pub use position::PositionRepo;
pub use staging::StagingEventRepo;
