//! 引擎內部狀態儲存

use alloc_core::{AllocError, Allocation, Lot, Order, OrderLine, Result};
use rust_decimal::Decimal;
use std::collections::HashMap;
use uuid::Uuid;

use crate::DomainEvent;

/// 分配引擎的實體儲存
///
/// 記憶體內的交易工作集；持久層由外部協作者實作，
/// 並須維護與此處相同的不變量。
#[derive(Debug, Default)]
pub struct AllocationStore {
    lots: HashMap<String, Lot>,
    orders: HashMap<String, Order>,
    lines: HashMap<String, OrderLine>,
    allocations: HashMap<Uuid, Allocation>,
    pending_events: Vec<DomainEvent>,
}

impl AllocationStore {
    /// 創建空的儲存
    pub fn new() -> Self {
        Self::default()
    }

    /// 收貨建立批次（批次ID重複則拒絕）
    pub fn insert_lot(&mut self, lot: Lot) -> Result<()> {
        if self.lots.contains_key(&lot.lot_id) {
            return Err(AllocError::DuplicateLotId(lot.lot_id));
        }
        self.lots.insert(lot.lot_id.clone(), lot);
        Ok(())
    }

    /// 建立訂單
    pub fn insert_order(&mut self, order: Order) -> Result<()> {
        self.orders.insert(order.order_id.clone(), order);
        Ok(())
    }

    /// 建立訂單行（所屬訂單必須存在）
    pub fn insert_line(&mut self, line: OrderLine) -> Result<()> {
        if !self.orders.contains_key(&line.order_id) {
            return Err(AllocError::OrderNotFound(line.order_id));
        }
        self.lines.insert(line.line_id.clone(), line);
        Ok(())
    }

    pub fn lot(&self, lot_id: &str) -> Result<&Lot> {
        self.lots
            .get(lot_id)
            .ok_or_else(|| AllocError::LotNotFound(lot_id.to_string()))
    }

    pub fn lot_mut(&mut self, lot_id: &str) -> Result<&mut Lot> {
        self.lots
            .get_mut(lot_id)
            .ok_or_else(|| AllocError::LotNotFound(lot_id.to_string()))
    }

    pub fn contains_lot(&self, lot_id: &str) -> bool {
        self.lots.contains_key(lot_id)
    }

    pub fn order(&self, order_id: &str) -> Result<&Order> {
        self.orders
            .get(order_id)
            .ok_or_else(|| AllocError::OrderNotFound(order_id.to_string()))
    }

    pub fn line(&self, line_id: &str) -> Result<&OrderLine> {
        self.lines
            .get(line_id)
            .ok_or_else(|| AllocError::LineNotFound(line_id.to_string()))
    }

    pub fn line_mut(&mut self, line_id: &str) -> Result<&mut OrderLine> {
        self.lines
            .get_mut(line_id)
            .ok_or_else(|| AllocError::LineNotFound(line_id.to_string()))
    }

    pub fn allocation(&self, allocation_id: &Uuid) -> Result<&Allocation> {
        self.allocations
            .get(allocation_id)
            .ok_or(AllocError::AllocationNotFound(*allocation_id))
    }

    pub fn allocation_mut(&mut self, allocation_id: &Uuid) -> Result<&mut Allocation> {
        self.allocations
            .get_mut(allocation_id)
            .ok_or(AllocError::AllocationNotFound(*allocation_id))
    }

    pub fn insert_allocation(&mut self, allocation: Allocation) {
        self.allocations
            .insert(allocation.allocation_id, allocation);
    }

    pub fn remove_allocation(&mut self, allocation_id: &Uuid) -> Option<Allocation> {
        self.allocations.remove(allocation_id)
    }

    /// 所有批次（候選查詢的母體）
    pub fn lots(&self) -> Vec<&Lot> {
        self.lots.values().collect()
    }

    /// 訂單行的所有存活分配
    pub fn line_allocations(&self, line_id: &str) -> Vec<&Allocation> {
        let mut allocations: Vec<&Allocation> = self
            .allocations
            .values()
            .filter(|a| a.order_line_id == line_id)
            .collect();
        allocations.sort_by_key(|a| a.allocation_id);
        allocations
    }

    /// 批次的所有存活分配（前向承諾）
    pub fn lot_allocations(&self, lot_id: &str) -> Vec<&Allocation> {
        let mut allocations: Vec<&Allocation> = self
            .allocations
            .values()
            .filter(|a| a.lot_id == lot_id)
            .collect();
        allocations.sort_by_key(|a| a.allocation_id);
        allocations
    }

    /// 訂單行已分配總量（讀取時加總）
    pub fn line_allocated_total(&self, line_id: &str) -> Decimal {
        self.allocations
            .values()
            .filter(|a| a.order_line_id == line_id)
            .map(|a| a.quantity)
            .sum()
    }

    /// 訂單所屬的訂單行ID（依ID排序，確保決定性）
    pub fn lines_of_order(&self, order_id: &str) -> Vec<String> {
        let mut line_ids: Vec<String> = self
            .lines
            .values()
            .filter(|line| line.order_id == order_id)
            .map(|line| line.line_id.clone())
            .collect();
        line_ids.sort();
        line_ids
    }

    /// 推入領域事件
    pub fn push_event(&mut self, event: DomainEvent) {
        self.pending_events.push(event);
    }

    /// 擷取全部待處理事件
    pub fn drain_events(&mut self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.pending_events)
    }
}
