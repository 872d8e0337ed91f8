//! 訂單模型

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::allocation::Allocation;

/// 訂單狀態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// 開立
    Open,
    /// 已結案
    Closed,
    /// 已取消
    Cancelled,
}

/// 訂單（客戶需求表頭），擁有零或多個訂單行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// 訂單ID
    pub order_id: String,

    /// 客戶ID
    pub customer_id: String,

    /// 訂單日期
    pub order_date: NaiveDate,

    /// 訂單狀態
    pub status: OrderStatus,
}

impl Order {
    /// 創建新的訂單
    pub fn new(order_id: String, customer_id: String, order_date: NaiveDate) -> Self {
        Self {
            order_id,
            customer_id,
            order_date,
            status: OrderStatus::Open,
        }
    }
}

/// 訂單行狀態
///
/// 狀態機：`Draft → Open → PartAllocated → Allocated → Shipped → Closed`，
/// `Cancelled` 可由任何出貨前狀態到達。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineStatus {
    /// 草稿
    Draft,
    /// 開立（尚無分配）
    Open,
    /// 部分分配
    PartAllocated,
    /// 分配完成
    Allocated,
    /// 已出貨
    Shipped,
    /// 已結案
    Closed,
    /// 已取消
    Cancelled,
}

impl LineStatus {
    /// 檢查分配是否可編輯（取消/出貨/結案後不可）
    pub fn is_editable(&self) -> bool {
        !matches!(
            self,
            LineStatus::Cancelled | LineStatus::Shipped | LineStatus::Closed
        )
    }

    /// 檢查是否可取消（出貨前皆可）
    pub fn can_cancel(&self) -> bool {
        matches!(
            self,
            LineStatus::Draft | LineStatus::Open | LineStatus::PartAllocated | LineStatus::Allocated
        )
    }
}

/// 訂單行（一張訂單內的單一產品需求）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLine {
    /// 訂單行ID
    pub line_id: String,

    /// 所屬訂單ID
    pub order_id: String,

    /// 產品ID
    pub product_id: String,

    /// 需求數量
    pub order_quantity: Decimal,

    /// 單位
    pub unit: String,

    /// 交貨日期
    pub delivery_date: NaiveDate,

    /// 交貨地點
    pub delivery_place_id: Option<String>,

    /// 訂單行狀態
    pub status: LineStatus,
}

impl OrderLine {
    /// 創建新的訂單行
    pub fn new(
        line_id: String,
        order_id: String,
        product_id: String,
        order_quantity: Decimal,
        delivery_date: NaiveDate,
    ) -> Self {
        Self {
            line_id,
            order_id,
            product_id,
            order_quantity: crate::quantity::quantize(order_quantity),
            unit: "EA".to_string(),
            delivery_date,
            delivery_place_id: None,
            status: LineStatus::Open,
        }
    }

    /// 建構器模式：設置單位
    pub fn with_unit(mut self, unit: String) -> Self {
        self.unit = unit;
        self
    }

    /// 建構器模式：設置交貨地點
    pub fn with_delivery_place(mut self, delivery_place_id: String) -> Self {
        self.delivery_place_id = Some(delivery_place_id);
        self
    }

    /// 建構器模式：設置狀態
    pub fn with_status(mut self, status: LineStatus) -> Self {
        self.status = status;
        self
    }

    /// 已分配總量（逐筆加總其存活的分配記錄，讀取時計算、不快取）
    pub fn allocated_total(&self, allocations: &[Allocation]) -> Decimal {
        allocations
            .iter()
            .filter(|a| a.order_line_id == self.line_id)
            .map(|a| a.quantity)
            .sum()
    }

    /// 未分配餘量（不為負）
    pub fn remaining(&self, allocations: &[Allocation]) -> Decimal {
        (self.order_quantity - self.allocated_total(allocations)).max(Decimal::ZERO)
    }

    /// 分配進度百分比（超量分配時可超過 100）
    pub fn progress_pct(&self, allocations: &[Allocation]) -> u32 {
        progress_pct(self.order_quantity, self.allocated_total(allocations))
    }
}

/// 分配進度百分比計算
pub fn progress_pct(order_quantity: Decimal, allocated_total: Decimal) -> u32 {
    if order_quantity > Decimal::ZERO {
        (allocated_total / order_quantity * Decimal::from(100))
            .round()
            .to_u32()
            .unwrap_or(0)
    } else {
        0
    }
}
