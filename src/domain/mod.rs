//! Pure domain layer: scene coordinates, the row-set algebra, and the
//! error taxonomy shared by sensors and watchers.

pub mod errors;
pub mod scene;
pub mod table;

pub use errors::{DomainResult, WatchError};
pub use scene::{cell_matches, coerce, value_eq, Dtype, Scene};
pub use table::{Row, Table};
