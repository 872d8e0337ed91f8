//! 配送拆分與批次拆分
//!
//! 需求側：一個訂單行對多個交貨地點的整批分配。
//! 供應側（smart lot split）：將單一批次的前向分配重新分佈到
//! N 個目標批次，跨多實體建立與改指須在單一原子單位內完成，
//! 數量不得遺失或重複。

use alloc_core::{quantity, AllocError, AllocationPolicy, Lot, Result};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::store::AllocationStore;
use crate::transaction::{AllocationManager, AllocationRequest};
use crate::DomainEvent;

/// 交貨地點分配明細
#[derive(Debug, Clone)]
pub struct DistributionEntry {
    /// 交貨地點
    pub delivery_place_id: String,

    /// 批次ID
    pub lot_id: String,

    /// 分配數量
    pub quantity: Decimal,
}

impl DistributionEntry {
    /// 創建新的分配明細
    pub fn new(delivery_place_id: String, lot_id: String, quantity: Decimal) -> Self {
        Self {
            delivery_place_id,
            lot_id,
            quantity,
        }
    }
}

/// 配送儲存結果
#[derive(Debug, Clone)]
pub struct DistributionResult {
    /// 建立的分配ID
    pub allocation_ids: Vec<Uuid>,

    /// 附帶訊息（如超量分配覆寫說明）
    pub message: Option<String>,
}

/// 批次拆分目標
///
/// 索引 0 的目標保留原批次身分；其後每個目標的 `label`
/// 成為新批次ID。
#[derive(Debug, Clone)]
pub struct SplitTarget {
    /// 目標標籤
    pub label: String,

    /// 指派到此目標的分配ID（分配單位不可分割）
    pub assigned_allocation_ids: Vec<Uuid>,
}

impl SplitTarget {
    /// 創建新的拆分目標
    pub fn new(label: String, assigned_allocation_ids: Vec<Uuid>) -> Self {
        Self {
            label,
            assigned_allocation_ids,
        }
    }
}

/// 拆分結果
#[derive(Debug, Clone)]
pub struct SplitResult {
    /// 新建批次ID（依目標順序）
    pub new_lot_ids: Vec<String>,

    /// 留在原批次的自由庫存
    pub remainder_quantity: Decimal,
}

/// 配送拆分器
pub struct DistributionSplitter {
    policy: AllocationPolicy,
}

impl DistributionSplitter {
    /// 創建新的拆分器
    pub fn new(policy: AllocationPolicy) -> Self {
        Self { policy }
    }

    /// 需求側拆分：多交貨地點一次提交
    ///
    /// 驗證合計不超過訂單行需求（除非策略明確允許超量分配），
    /// 每筆配對各自通過提交前置條件後整批提交。
    pub fn save_distribution(
        &self,
        store: &mut AllocationStore,
        manager: &AllocationManager,
        line_id: &str,
        entries: &[DistributionEntry],
    ) -> Result<DistributionResult> {
        let line = store.line(line_id)?;

        for entry in entries {
            if !quantity::is_positive(entry.quantity) {
                return Err(AllocError::InvalidQuantity(entry.quantity));
            }
        }

        let requested_total: Decimal = entries
            .iter()
            .map(|entry| quantity::quantize(entry.quantity))
            .sum();
        if requested_total > line.order_quantity && !self.policy.allow_over_allocation {
            return Err(AllocError::OverAllocation {
                line_id: line_id.to_string(),
                demand: line.order_quantity,
                requested: requested_total,
            });
        }

        let requests: Vec<AllocationRequest> = entries
            .iter()
            .map(|entry| {
                AllocationRequest::new(entry.lot_id.clone(), entry.quantity)
                    .with_delivery_place(entry.delivery_place_id.clone())
            })
            .collect();
        let commit = manager.commit(store, line_id, &requests)?;

        let message = commit
            .over_allocated
            .then(|| "已依明確覆寫執行超量分配".to_string());
        tracing::info!(
            "交貨地點分配已儲存：訂單行 {}，{} 筆",
            line_id,
            commit.allocation_ids.len()
        );

        Ok(DistributionResult {
            allocation_ids: commit.allocation_ids,
            message,
        })
    }

    /// 供應側拆分（smart lot split）
    ///
    /// 1. 枚舉批次的前向分配為不可分割單位
    /// 2. 每個單位恰好指派到一個目標
    /// 3. 目標 0 保留原批次身分，其後目標以標籤建立新批次
    /// 4. 未指派的餘量以自由庫存留在原批次
    /// 5. 整批全有或全無；守恆於套用前後皆驗證
    pub fn split_lot(
        &self,
        store: &mut AllocationStore,
        lot_id: &str,
        targets: &[SplitTarget],
    ) -> Result<SplitResult> {
        if targets.is_empty() {
            return Err(AllocError::InvalidAssignment(
                "至少需要一個拆分目標".to_string(),
            ));
        }
        let original = store.lot(lot_id)?.clone();

        // Step 1: 枚舉前向分配
        let outstanding: HashMap<Uuid, Decimal> = store
            .lot_allocations(lot_id)
            .iter()
            .map(|a| (a.allocation_id, a.quantity))
            .collect();

        // Step 2: 指派檢查 —— 不可重複、不可指派外部分配、不可遺漏
        let mut seen: HashSet<Uuid> = HashSet::new();
        for target in targets {
            for allocation_id in &target.assigned_allocation_ids {
                if !outstanding.contains_key(allocation_id) {
                    return Err(AllocError::InvalidAssignment(format!(
                        "分配 {} 不屬於批次 {}",
                        allocation_id, lot_id
                    )));
                }
                if !seen.insert(*allocation_id) {
                    return Err(AllocError::InvalidAssignment(format!(
                        "分配 {} 被重複指派",
                        allocation_id
                    )));
                }
            }
        }
        if seen.len() != outstanding.len() {
            return Err(AllocError::InvalidAssignment(format!(
                "尚有 {} 筆分配未指派目標",
                outstanding.len() - seen.len()
            )));
        }

        // Step 3: 各目標合計
        let totals: Vec<Decimal> = targets
            .iter()
            .map(|target| {
                target
                    .assigned_allocation_ids
                    .iter()
                    .filter_map(|id| outstanding.get(id))
                    .copied()
                    .sum()
            })
            .collect();
        let assigned_total: Decimal = totals.iter().copied().sum();

        // Step 4: 守恆前驗（全域不變量下恆成立；失敗即程式缺陷）
        if assigned_total > original.current_quantity {
            tracing::error!(
                "批次 {} 拆分守恆前驗失敗：指派合計 {} 超過現有 {}",
                lot_id,
                assigned_total,
                original.current_quantity
            );
            return Err(AllocError::ConservationViolation(format!(
                "指派合計 {} 超過批次 {} 現有數量 {}",
                assigned_total, lot_id, original.current_quantity
            )));
        }
        let remainder = original.current_quantity - assigned_total;

        // Step 5: 新批次標籤不可與現有批次衝突、彼此不可重複
        let mut labels = HashSet::new();
        for target in targets.iter().skip(1) {
            if store.contains_lot(&target.label) || !labels.insert(target.label.clone()) {
                return Err(AllocError::DuplicateLotId(target.label.clone()));
            }
        }

        // Step 6: 在副本上構造整批變更
        let moved: Decimal = totals.iter().skip(1).copied().sum();
        let mut new_lots = Vec::new();
        for (target, total) in targets.iter().zip(totals.iter()).skip(1) {
            let mut new_lot = Lot::new(
                target.label.clone(),
                original.product_id.clone(),
                original.warehouse_id.clone(),
                original.received_date,
                *total,
            )
            .with_unit(original.unit.clone());
            new_lot.supplier_id = original.supplier_id.clone();
            new_lot.expiry_date = original.expiry_date;
            new_lot.allocated_quantity = *total;
            crate::status::refresh_quantity_status(&mut new_lot);
            new_lots.push(new_lot);
        }

        let mut updated_original = original.clone();
        updated_original.current_quantity -= moved;
        updated_original.allocated_quantity -= moved;
        crate::status::refresh_quantity_status(&mut updated_original);

        // Step 7: 守恆後驗：Σ 目標合計 + 剩餘 == 原現有數量（精確、同精度）
        let target_sum: Decimal = totals.iter().copied().sum();
        let invariant_broken = updated_original.current_quantity
            < updated_original.allocated_quantity + updated_original.locked_quantity
            || updated_original.allocated_quantity < Decimal::ZERO;
        if target_sum + remainder != original.current_quantity || invariant_broken {
            tracing::error!(
                "批次 {} 拆分守恆後驗失敗：目標合計 {} + 剩餘 {} ≠ 原數量 {}",
                lot_id,
                target_sum,
                remainder,
                original.current_quantity
            );
            return Err(AllocError::ConservationViolation(format!(
                "批次 {} 拆分後驗失敗",
                lot_id
            )));
        }

        // 寫回：建立新批次、改指分配、縮減原批次
        let new_lot_ids: Vec<String> = new_lots.iter().map(|lot| lot.lot_id.clone()).collect();
        for new_lot in new_lots {
            store.insert_lot(new_lot)?;
        }
        for (target, new_lot_id) in targets.iter().skip(1).zip(new_lot_ids.iter()) {
            for allocation_id in &target.assigned_allocation_ids {
                store.allocation_mut(allocation_id)?.lot_id = new_lot_id.clone();
            }
        }
        *store.lot_mut(lot_id)? = updated_original;

        store.push_event(DomainEvent::LotSplit {
            lot_id: lot_id.to_string(),
            new_lot_ids: new_lot_ids.clone(),
        });
        tracing::info!(
            "批次 {} 拆分完成：{} 個新批次，剩餘 {}",
            lot_id,
            new_lot_ids.len(),
            remainder
        );

        Ok(SplitResult {
            new_lot_ids,
            remainder_quantity: remainder,
        })
    }
}
