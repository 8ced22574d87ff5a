//! Domain models and pure sync logic for the fieldsync offline core.

pub mod forms;
pub mod projects;
pub mod resolver;
pub mod snapshot;
pub mod sync;

pub use forms::*;
pub use projects::*;
pub use resolver::*;
pub use snapshot::*;
pub use sync::*;
