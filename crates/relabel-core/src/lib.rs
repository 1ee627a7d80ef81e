pub mod bundle;
pub mod classify;
pub mod guard;
pub mod ids;
pub mod label;
pub mod model;
pub mod outcomes;
pub mod rewrite;
pub mod scan;

pub use bundle::*;
pub use classify::*;
pub use guard::*;
pub use ids::*;
pub use label::*;
pub use model::*;
pub use outcomes::*;
pub use rewrite::*;
pub use scan::*;
