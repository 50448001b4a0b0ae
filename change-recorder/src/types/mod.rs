pub mod error;
pub mod event;
pub mod notification;
pub mod subscription;

pub use error::{RecorderError, Result};
pub use event::{MonitorEvent, RecorderSignal};
pub use notification::{ChangeNotification, EntityId, EntityKind, Operation, UNSEQUENCED};
pub use subscription::{SubscriptionSpec, ROOT_COLLECTION};
