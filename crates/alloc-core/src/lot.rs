//! 批次模型

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 批次狀態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LotStatus {
    /// 可用
    Active,
    /// 已耗盡
    Depleted,
    /// 已過期
    Expired,
    /// 隔離檢驗中
    Quarantine,
    /// 管理凍結
    Locked,
    /// 已封存
    Archived,
}

impl LotStatus {
    /// 檢查是否為管理性狀態（人工轉換，不由數量推導覆寫）
    pub fn is_administrative(&self) -> bool {
        matches!(
            self,
            LotStatus::Quarantine | LotStatus::Locked | LotStatus::Archived
        )
    }
}

/// 批次（單一產品在單一倉庫的一次實體收貨）
///
/// 數量欄位僅能透過分配交易、調整或拆分變更；批次不刪除，
/// 僅轉換狀態為 `Archived` / `Depleted`。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lot {
    /// 批次ID（不可變）
    pub lot_id: String,

    /// 產品ID
    pub product_id: String,

    /// 倉庫ID
    pub warehouse_id: String,

    /// 供應商ID
    pub supplier_id: Option<String>,

    /// 收貨日期
    pub received_date: NaiveDate,

    /// 到期日
    pub expiry_date: Option<NaiveDate>,

    /// 單位
    pub unit: String,

    /// 現有數量
    pub current_quantity: Decimal,

    /// 已分配數量（已確認的出貨承諾）
    pub allocated_quantity: Decimal,

    /// 凍結數量（管理性不可用）
    pub locked_quantity: Decimal,

    /// 暫留數量（未確認的軟性保留，不減少已承諾意義上的可用量）
    pub reserved_quantity_active: Decimal,

    /// 批次狀態
    pub status: LotStatus,
}

impl Lot {
    /// 創建新的批次（收貨）
    pub fn new(
        lot_id: String,
        product_id: String,
        warehouse_id: String,
        received_date: NaiveDate,
        current_quantity: Decimal,
    ) -> Self {
        Self {
            lot_id,
            product_id,
            warehouse_id,
            supplier_id: None,
            received_date,
            expiry_date: None,
            unit: "EA".to_string(),
            current_quantity: crate::quantity::quantize(current_quantity),
            allocated_quantity: Decimal::ZERO,
            locked_quantity: Decimal::ZERO,
            reserved_quantity_active: Decimal::ZERO,
            status: LotStatus::Active,
        }
    }

    /// 建構器模式：設置供應商
    pub fn with_supplier_id(mut self, supplier_id: String) -> Self {
        self.supplier_id = Some(supplier_id);
        self
    }

    /// 建構器模式：設置到期日
    pub fn with_expiry_date(mut self, expiry_date: NaiveDate) -> Self {
        self.expiry_date = Some(expiry_date);
        self
    }

    /// 建構器模式：設置單位
    pub fn with_unit(mut self, unit: String) -> Self {
        self.unit = unit;
        self
    }

    /// 建構器模式：設置狀態
    pub fn with_status(mut self, status: LotStatus) -> Self {
        self.status = status;
        self
    }

    /// 計算可用數量（現有 − 已分配 − 凍結），讀取時計算、不快取
    pub fn available_quantity(&self) -> Decimal {
        self.current_quantity - self.allocated_quantity - self.locked_quantity
    }

    /// 檢查是否已過期
    pub fn is_expired(&self, as_of: NaiveDate) -> bool {
        self.expiry_date.map_or(false, |expiry| expiry < as_of)
    }
}
