//! Built-in services.

pub mod data;
pub mod notes;
pub mod run;
pub mod state;

pub use data::DataService;
pub use notes::NotesService;
pub use run::RunService;
pub use state::StateService;
