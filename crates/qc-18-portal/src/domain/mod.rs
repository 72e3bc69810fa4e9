//! # Domain Layer
//!
//! Entities, value objects and invariants of the portal.

pub mod custodian;
pub mod exchange;
pub mod invariants;
pub mod keys;
pub mod liquidation_pool;
pub mod requests;
pub mod rewards;
pub mod state;
pub mod status;
pub mod value_objects;

pub use custodian::*;
pub use exchange::*;
pub use invariants::*;
pub use keys::*;
pub use liquidation_pool::*;
pub use requests::*;
pub use rewards::*;
pub use state::*;
pub use status::*;
pub use value_objects::*;
