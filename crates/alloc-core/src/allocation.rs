//! 分配記錄模型

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AllocError, Result};

/// 分配記錄（單一批次對單一訂單行的承諾）
///
/// 由分配交易管理器建立；取消時直接刪除（非軟刪除），
/// 對應的批次數量同筆交易內歸還。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    /// 分配ID
    pub allocation_id: Uuid,

    /// 批次ID
    pub lot_id: String,

    /// 訂單行ID
    pub order_line_id: String,

    /// 交貨地點（同一訂單行分送子目的地時使用）
    pub delivery_place_id: Option<String>,

    /// 分配數量（唯一正規數量欄位）
    pub quantity: Decimal,
}

impl Allocation {
    /// 創建新的分配記錄（數量必須為正）
    pub fn new(lot_id: String, order_line_id: String, quantity: Decimal) -> Result<Self> {
        if !crate::quantity::is_positive(quantity) {
            return Err(AllocError::InvalidQuantity(quantity));
        }
        Ok(Self {
            allocation_id: Uuid::new_v4(),
            lot_id,
            order_line_id,
            delivery_place_id: None,
            quantity: crate::quantity::quantize(quantity),
        })
    }

    /// 建構器模式：設置交貨地點
    pub fn with_delivery_place(mut self, delivery_place_id: String) -> Self {
        self.delivery_place_id = Some(delivery_place_id);
        self
    }
}

/// 外部輸入的分配草稿
///
/// 舊系統匯入的分配記錄帶有多種數量欄位別名；此處於輸入邊界
/// 一次性正規化為單一 `quantity` 欄位，別名不進入核心模型。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationDraft {
    /// 批次ID
    pub lot_id: String,

    /// 分配數量（正規化後）
    pub quantity: Decimal,

    /// 交貨地點
    pub delivery_place_id: Option<String>,
}

/// 舊格式的數量欄位別名，依序嘗試
const LEGACY_QUANTITY_KEYS: [&str; 4] = ["quantity", "allocated_qty", "alloc_quantity", "qty"];

impl AllocationDraft {
    /// 由 JSON 物件正規化舊格式輸入
    pub fn from_legacy_json(value: &serde_json::Value) -> Result<Self> {
        let lot_id = value
            .get("lot_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AllocError::InvalidInput("缺少 lot_id 欄位".to_string()))?
            .to_string();

        let quantity = LEGACY_QUANTITY_KEYS
            .iter()
            .find_map(|key| value.get(*key).and_then(parse_decimal))
            .ok_or_else(|| AllocError::InvalidInput("缺少數量欄位".to_string()))?;

        if !crate::quantity::is_positive(quantity) {
            return Err(AllocError::InvalidQuantity(quantity));
        }

        let delivery_place_id = value
            .get("delivery_place_id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        Ok(Self {
            lot_id,
            quantity: crate::quantity::quantize(quantity),
            delivery_place_id,
        })
    }
}

/// 由 JSON 值解析數量（接受字串或數字表示）
fn parse_decimal(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::String(s) => s.parse().ok(),
        serde_json::Value::Number(n) => n.to_string().parse().ok(),
        _ => None,
    }
}
