pub mod error;
pub mod job;
pub mod notify;
pub mod symbol;
pub mod traits;
pub mod types;

pub use error::*;
pub use job::*;
pub use notify::*;
pub use symbol::*;
pub use traits::*;
pub use types::*;
