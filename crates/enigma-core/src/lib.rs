pub mod clock;
pub mod config;
pub mod error;
pub mod types;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{EnigmaError, EnigmaResult};
pub use types::{ContextBinding, KeyDate, SecretVersion};
