pub mod builder;
pub mod manifest;
pub mod recipe;

pub use builder::{CommandRunner, DockerCli, ImageBuilder};
pub use manifest::{Manifest, Requirement};
pub use recipe::{BuildRecipe, StartCommand};
