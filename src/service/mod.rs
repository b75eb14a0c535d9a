//! Query execution, preloading, rendering, and response assembly.

mod collection;
mod preload;
mod query;
mod renderer;

pub use collection::{CollectionOptions, PresentArgs, PresenterCollection};
pub use preload::Preloader;
pub use query::{page_count, QueryOptions, QueryResult, QueryStrategy};
pub use renderer::{AssociatedObjects, Renderer};
