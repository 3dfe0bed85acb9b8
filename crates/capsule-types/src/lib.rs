pub mod clock;
pub mod countdown;
pub mod models;
pub mod query;
pub mod record;
pub mod session;
pub mod timestamp;

pub use clock::{Clock, ManualClock, SystemClock};
pub use countdown::Countdown;
pub use models::{Capsule, CapsuleDraft, CapsulePatch};
pub use query::{CapsuleQuery, SortBy, StatusFilter, TimeRange};
pub use record::CapsuleRecord;
pub use session::{CurrentUser, Session, UserId};
