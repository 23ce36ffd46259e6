pub mod errors;
pub mod metrics;
pub mod model;
pub mod query;
pub mod search;
pub mod util;
pub mod weights;

pub use errors::*;
pub use model::*;
pub use query::*;
pub use search::*;
pub use weights::*;
