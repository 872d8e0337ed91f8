//! # Allocation Engine
//!
//! 批次分配與數量調節核心引擎

pub mod ledger;
pub mod selector;
pub mod splitter;
pub mod status;
pub mod store;
pub mod transaction;

// Re-export 主要類型
pub use ledger::{QuantityDelta, QuantityLedger};
pub use selector::{CandidateQuery, CandidateSelection, CandidateSelector, LotCandidate};
pub use splitter::{
    DistributionEntry, DistributionResult, DistributionSplitter, SplitResult, SplitTarget,
};
pub use status::{derive_line_status, derive_lot_status, refresh_quantity_status};
pub use store::AllocationStore;
pub use transaction::{
    AllocationManager, AllocationRequest, CancelResult, CommitResult, RematchResult,
};

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// 領域事件（由通知/稽核等外部協作者消費）
#[derive(Debug, Clone, Serialize)]
pub enum DomainEvent {
    /// 分配已提交
    AllocationsCommitted {
        order_line_id: String,
        allocation_ids: Vec<Uuid>,
    },

    /// 分配已取消
    AllocationsCancelled {
        order_line_id: String,
        cancelled_count: usize,
    },

    /// 訂單行已重新匹配
    LineRematched {
        order_line_id: String,
        unmet_quantity: Decimal,
    },

    /// 批次已拆分
    LotSplit {
        lot_id: String,
        new_lot_ids: Vec<String>,
    },
}
