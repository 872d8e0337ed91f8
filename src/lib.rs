//! # Lot Allocation Engine
//!
//! 批次分配與數量調節引擎：將需求（訂單行）匹配到供應（庫存批次）、
//! 維護多重派生數量的一致性，並支援已承諾分配的拆分與重新分佈。
//! 持久層、路由與通知遞送為外部協作者，僅消費本引擎的輸出。

pub mod engine;

// Re-export 主要類型
pub use alloc_core::{
    is_positive, quantize, AllocError, Allocation, AllocationDraft, AllocationPolicy, LineStatus,
    Lot, LotStatus, Order, OrderLine, OrderStatus, Result, QUANTITY_SCALE,
};
pub use alloc_engine::{
    AllocationManager, AllocationRequest, AllocationStore, CancelResult, CandidateQuery,
    CandidateSelection, CandidateSelector, CommitResult, DistributionEntry, DistributionResult,
    DistributionSplitter, DomainEvent, LotCandidate, QuantityDelta, QuantityLedger, RematchResult,
    SplitResult, SplitTarget,
};
pub use alloc_lock::{EditLockRegistry, LockGrant};
pub use engine::{AllocationEngine, LineProgress};
