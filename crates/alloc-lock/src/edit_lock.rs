//! 訂單編輯鎖
//!
//! 以訂單ID為鍵的會話層級悲觀鎖。鎖為諮詢性/使用者體驗保護，
//! 並非資料完整性機制 —— 真正的完整性保證在帳務層的原子數量
//! 檢查。取得失敗為非致命，呼叫端降級為唯讀行為。

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;

/// 鎖持有資訊
#[derive(Debug, Clone)]
pub struct EditLock {
    /// 訂單ID
    pub order_id: String,

    /// 持有者（會話/操作者ID）
    pub actor_id: String,

    /// 取得時間
    pub acquired_at: DateTime<Utc>,

    /// 最後活動時間（逾時以此計）
    pub refreshed_at: DateTime<Utc>,
}

/// 取得結果
///
/// `granted` 為否時 `holder` 為目前持有者。
#[derive(Debug, Clone, Serialize)]
pub struct LockGrant {
    pub granted: bool,
    pub holder: Option<String>,
}

/// 編輯鎖註冊表
///
/// 鎖於閒置逾時後自動失效；失效不回溯撤銷逾時前已提交的分配，
/// 僅允許其他會話在其後取得鎖。
pub struct EditLockRegistry {
    locks: DashMap<String, EditLock>,

    /// 閒置逾時
    timeout: Duration,
}

impl EditLockRegistry {
    /// 創建註冊表（逾時以秒計）
    pub fn new(timeout_secs: i64) -> Self {
        Self {
            locks: DashMap::new(),
            timeout: Duration::seconds(timeout_secs),
        }
    }

    /// 檢查鎖是否已逾時
    fn is_expired(&self, lock: &EditLock, now: DateTime<Utc>) -> bool {
        now - lock.refreshed_at > self.timeout
    }

    /// 嘗試取得編輯鎖
    ///
    /// 同一操作者重複取得視為刷新；逾時的鎖視為空位。
    /// 他人持有時回傳未授予與持有者，不拋錯。
    pub fn acquire(&self, order_id: &str, actor_id: &str, now: DateTime<Utc>) -> LockGrant {
        match self.locks.entry(order_id.to_string()) {
            Entry::Occupied(mut occupied) => {
                let holder_expired = self.is_expired(occupied.get(), now);
                if occupied.get().actor_id == actor_id || holder_expired {
                    occupied.insert(EditLock {
                        order_id: order_id.to_string(),
                        actor_id: actor_id.to_string(),
                        acquired_at: now,
                        refreshed_at: now,
                    });
                    LockGrant {
                        granted: true,
                        holder: Some(actor_id.to_string()),
                    }
                } else {
                    LockGrant {
                        granted: false,
                        holder: Some(occupied.get().actor_id.clone()),
                    }
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(EditLock {
                    order_id: order_id.to_string(),
                    actor_id: actor_id.to_string(),
                    acquired_at: now,
                    refreshed_at: now,
                });
                LockGrant {
                    granted: true,
                    holder: Some(actor_id.to_string()),
                }
            }
        }
    }

    /// 釋放編輯鎖（僅持有者可釋放）
    pub fn release(&self, order_id: &str, actor_id: &str) -> bool {
        self.locks
            .remove_if(order_id, |_, lock| lock.actor_id == actor_id)
            .is_some()
    }

    /// 目前持有者（逾時的鎖視為無人持有並清除）
    pub fn holder(&self, order_id: &str, now: DateTime<Utc>) -> Option<String> {
        if let Some(lock) = self.locks.get(order_id) {
            if !self.is_expired(&lock, now) {
                return Some(lock.actor_id.clone());
            }
        }
        self.locks.remove_if(order_id, |_, lock| self.is_expired(lock, now));
        None
    }

    /// 刷新鎖的活動時間（展延逾時）
    pub fn touch(&self, order_id: &str, actor_id: &str, now: DateTime<Utc>) -> bool {
        match self.locks.get_mut(order_id) {
            Some(mut lock) if lock.actor_id == actor_id && !self.is_expired(&lock, now) => {
                lock.refreshed_at = now;
                true
            }
            _ => false,
        }
    }

    /// 檢查是否由其他操作者持有
    pub fn is_held_by_other(&self, order_id: &str, actor_id: &str, now: DateTime<Utc>) -> bool {
        self.holder(order_id, now)
            .map_or(false, |holder| holder != actor_id)
    }
}
