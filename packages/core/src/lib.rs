pub mod credentials;
pub mod journey;
pub mod orchestrator;

pub use timewalk_model_provider;
pub use timewalk_types;
