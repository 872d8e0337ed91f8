//! 批次數量帳務

use alloc_core::{AllocError, Lot, Result};
use rust_decimal::Decimal;

/// 數量變動（對單一批次的有號增量）
#[derive(Debug, Clone, Copy, Default)]
pub struct QuantityDelta {
    /// 已分配數量增量
    pub allocated: Decimal,

    /// 凍結數量增量
    pub locked: Decimal,

    /// 暫留數量增量
    pub reserved: Decimal,
}

impl QuantityDelta {
    /// 分配（已分配 +quantity）
    pub fn allocate(quantity: Decimal) -> Self {
        Self {
            allocated: quantity,
            ..Self::default()
        }
    }

    /// 歸還分配（已分配 −quantity）
    pub fn deallocate(quantity: Decimal) -> Self {
        Self {
            allocated: -quantity,
            ..Self::default()
        }
    }

    /// 管理凍結（凍結 +quantity）
    pub fn lock(quantity: Decimal) -> Self {
        Self {
            locked: quantity,
            ..Self::default()
        }
    }

    /// 解除凍結（凍結 −quantity）
    pub fn unlock(quantity: Decimal) -> Self {
        Self {
            locked: -quantity,
            ..Self::default()
        }
    }

    /// 軟性保留（暫留 +quantity）
    pub fn reserve(quantity: Decimal) -> Self {
        Self {
            reserved: quantity,
            ..Self::default()
        }
    }

    /// 釋放保留（暫留 −quantity）
    pub fn release(quantity: Decimal) -> Self {
        Self {
            reserved: -quantity,
            ..Self::default()
        }
    }
}

/// 數量帳務計算器
///
/// 所有變更相對單一批次為原子操作；同一批次的併發變更
/// 由呼叫端的交易範圍序列化。
pub struct QuantityLedger;

impl QuantityLedger {
    /// 計算可用數量（現有 − 已分配 − 凍結）
    pub fn available(lot: &Lot) -> Decimal {
        lot.available_quantity()
    }

    /// 檢查是否可保留指定數量
    pub fn can_reserve(lot: &Lot, quantity: Decimal) -> bool {
        quantity > Decimal::ZERO && quantity <= Self::available(lot)
    }

    /// 套用數量變動
    ///
    /// 拒絕任何會使 `現有 − 已分配 − 凍結` 為負的變動
    /// （`InsufficientQuantity`）。計數為負屬內部不一致，
    /// 回報 `ConservationViolation`。
    pub fn apply(lot: &mut Lot, delta: &QuantityDelta) -> Result<()> {
        let next_allocated = lot.allocated_quantity + delta.allocated;
        let next_locked = lot.locked_quantity + delta.locked;
        let next_reserved = lot.reserved_quantity_active + delta.reserved;

        if next_allocated < Decimal::ZERO
            || next_locked < Decimal::ZERO
            || next_reserved < Decimal::ZERO
        {
            return Err(AllocError::ConservationViolation(format!(
                "批次 {} 數量計數為負：allocated={} locked={} reserved={}",
                lot.lot_id, next_allocated, next_locked, next_reserved
            )));
        }

        let next_available = lot.current_quantity - next_allocated - next_locked;
        if next_available < Decimal::ZERO {
            return Err(AllocError::InsufficientQuantity {
                lot_id: lot.lot_id.clone(),
                requested: delta.allocated + delta.locked,
                available: Self::available(lot),
            });
        }

        // 保留當下不得超過可用量；既有暫留在可用量之後縮減時僅具資訊性
        if delta.reserved > Decimal::ZERO && next_reserved > next_available {
            return Err(AllocError::InsufficientQuantity {
                lot_id: lot.lot_id.clone(),
                requested: delta.reserved,
                available: next_available,
            });
        }

        lot.allocated_quantity = next_allocated;
        lot.locked_quantity = next_locked;
        lot.reserved_quantity_active = next_reserved;
        Ok(())
    }

    /// 調整現有數量（收貨調整與批次拆分使用）
    pub fn adjust_current(lot: &mut Lot, delta: Decimal) -> Result<()> {
        let next_current = lot.current_quantity + delta;
        if next_current < lot.allocated_quantity + lot.locked_quantity {
            return Err(AllocError::InsufficientQuantity {
                lot_id: lot.lot_id.clone(),
                requested: delta.abs(),
                available: Self::available(lot),
            });
        }

        lot.current_quantity = next_current;
        Ok(())
    }
}
