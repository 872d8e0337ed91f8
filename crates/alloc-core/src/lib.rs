//! # Allocation Core
//!
//! 核心資料模型與類型定義

pub mod allocation;
pub mod lot;
pub mod order;
pub mod policy;
pub mod quantity;

// Re-export 主要類型
pub use allocation::{Allocation, AllocationDraft};
pub use lot::{Lot, LotStatus};
pub use order::{LineStatus, Order, OrderLine, OrderStatus};
pub use policy::AllocationPolicy;
pub use quantity::{is_positive, quantize, QUANTITY_SCALE};

use rust_decimal::Decimal;

/// 分配引擎錯誤類型
#[derive(Debug, thiserror::Error)]
pub enum AllocError {
    /// 供應不足以覆蓋請求的保留量（可回復，由用戶重新選擇）
    #[error("庫存不足：批次 {lot_id} 需要 {requested}，可用 {available}")]
    InsufficientQuantity {
        lot_id: String,
        requested: Decimal,
        available: Decimal,
    },

    /// 請求總量超過訂單行需求（可回復，需明確覆寫）
    #[error("超量分配：訂單行 {line_id} 需求 {demand}，請求 {requested}")]
    OverAllocation {
        line_id: String,
        demand: Decimal,
        requested: Decimal,
    },

    /// 非正數量，在輸入邊界即拒絕
    #[error("無效數量: {0}")]
    InvalidQuantity(Decimal),

    /// 併發編輯衝突（可回復，鎖釋放後重試）
    #[error("訂單 {order_id} 編輯鎖衝突：{holder}")]
    LineLocked { order_id: String, holder: String },

    /// 內部數量守恆違規；屬程式缺陷而非用戶錯誤，整筆交易中止
    #[error("數量守恆違規: {0}")]
    ConservationViolation(String),

    #[error("找不到批次: {0}")]
    LotNotFound(String),

    #[error("批次ID已存在: {0}")]
    DuplicateLotId(String),

    #[error("找不到訂單: {0}")]
    OrderNotFound(String),

    #[error("找不到訂單行: {0}")]
    LineNotFound(String),

    #[error("找不到分配記錄: {0}")]
    AllocationNotFound(uuid::Uuid),

    #[error("訂單行 {line_id} 狀態 {status:?} 不允許此操作")]
    LineNotEditable {
        line_id: String,
        status: order::LineStatus,
    },

    /// 拆分指派不合法（重複指派、遺漏、或指派了外部分配）
    #[error("無效指派: {0}")]
    InvalidAssignment(String),

    /// 輸入記錄無法正規化
    #[error("無效輸入: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, AllocError>;
