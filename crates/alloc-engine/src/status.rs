//! 狀態推導
//!
//! 狀態為帳務狀態的純函數，於每次提交/取消/拆分後重算，
//! 不得獨立於其推導來源的數量另行維護。

use alloc_core::{LineStatus, Lot, LotStatus};
use chrono::NaiveDate;
use rust_decimal::Decimal;

/// 推導訂單行狀態
///
/// 轉換規則：`0 < allocated_total < order_quantity` 為部分分配；
/// `allocated_total >= order_quantity` 為分配完成。
/// 終態（取消/出貨/結案）與無分配的草稿不受推導影響。
pub fn derive_line_status(
    current: LineStatus,
    order_quantity: Decimal,
    allocated_total: Decimal,
) -> LineStatus {
    if !current.is_editable() {
        return current;
    }

    if allocated_total <= Decimal::ZERO {
        return match current {
            LineStatus::Draft => LineStatus::Draft,
            _ => LineStatus::Open,
        };
    }

    if allocated_total >= order_quantity {
        LineStatus::Allocated
    } else {
        LineStatus::PartAllocated
    }
}

/// 推導批次狀態（含效期判定）
pub fn derive_lot_status(lot: &Lot, as_of: NaiveDate) -> LotStatus {
    if lot.status.is_administrative() {
        return lot.status;
    }
    if lot.current_quantity <= Decimal::ZERO {
        return LotStatus::Depleted;
    }
    if lot.is_expired(as_of) {
        return LotStatus::Expired;
    }
    LotStatus::Active
}

/// 數量變動後更新批次的數量推導狀態
///
/// 效期判定依賴基準日期，於查詢時進行（`derive_lot_status`）；
/// 此處僅處理耗盡與回補。
pub fn refresh_quantity_status(lot: &mut Lot) {
    if lot.status.is_administrative() {
        return;
    }
    if lot.current_quantity <= Decimal::ZERO {
        lot.status = LotStatus::Depleted;
    } else if lot.status == LotStatus::Depleted {
        lot.status = LotStatus::Active;
    }
}
