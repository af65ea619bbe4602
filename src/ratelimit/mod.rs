//! Rate limiting rules, client state and the limiter that ties them together.

mod clock;
mod limiter;
mod policy;
mod rules;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use limiter::RateLimiter;
pub use policy::Policy;
pub use rules::{RuleConfig, RuleSet, TimeUnit};
pub use store::{ClientHistory, ClientStore, Timestamps};
