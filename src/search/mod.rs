pub mod data_loader;
pub mod populate;
pub mod recipe_store;

pub use data_loader::{load_recipe_rows, RecipeRow};
pub use populate::{populate_collection, PopulateOptions, PopulateReport};
pub use recipe_store::{RecipeRetriever, StoreSession, WeaviateStore};
