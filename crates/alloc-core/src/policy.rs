//! 分配策略配置

use serde::{Deserialize, Serialize};

/// 分配引擎策略配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationPolicy {
    /// 是否要求操作者持有編輯鎖才能提交變更
    /// - false: 鎖為純諮詢性，僅他人持有時拒絕（預設）
    /// - true: 未持鎖的提交一律拒絕
    pub require_edit_lock: bool,

    /// 是否允許交貨地點分配超過訂單行需求（明確覆寫）
    pub allow_over_allocation: bool,

    /// 近效期警告天數（候選查詢的非致命警告門檻）
    pub near_expiry_warn_days: u32,
}

impl AllocationPolicy {
    /// 創建預設策略
    pub fn new() -> Self {
        Self {
            require_edit_lock: false,
            allow_over_allocation: false,
            near_expiry_warn_days: 30,
        }
    }

    /// 建構器模式：設置是否要求編輯鎖
    pub fn with_require_edit_lock(mut self, require: bool) -> Self {
        self.require_edit_lock = require;
        self
    }

    /// 建構器模式：設置是否允許超量分配
    pub fn with_allow_over_allocation(mut self, allow: bool) -> Self {
        self.allow_over_allocation = allow;
        self
    }

    /// 建構器模式：設置近效期警告天數
    pub fn with_near_expiry_warn_days(mut self, days: u32) -> Self {
        self.near_expiry_warn_days = days;
        self
    }
}

impl Default for AllocationPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = AllocationPolicy::new();
        assert!(!policy.require_edit_lock);
        assert!(!policy.allow_over_allocation);
        assert_eq!(policy.near_expiry_warn_days, 30);
    }

    #[test]
    fn test_policy_builder() {
        let policy = AllocationPolicy::new()
            .with_require_edit_lock(true)
            .with_allow_over_allocation(true)
            .with_near_expiry_warn_days(7);

        assert!(policy.require_edit_lock);
        assert!(policy.allow_over_allocation);
        assert_eq!(policy.near_expiry_warn_days, 7);
    }
}
