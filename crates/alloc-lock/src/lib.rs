//! # Allocation Lock
//!
//! 訂單編輯鎖模組（會話層級的諮詢性互斥）

pub mod edit_lock;

// Re-export 主要類型
pub use edit_lock::{EditLock, EditLockRegistry, LockGrant};
