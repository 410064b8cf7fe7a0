pub mod entity;
pub mod task;

pub use entity::{EntityDescriptor, EntityType};
pub use task::{Task, TaskStatus};
