//! 數量精度處理

use rust_decimal::Decimal;

/// 數量欄位的小數位數（3位固定小數）
pub const QUANTITY_SCALE: u32 = 3;

/// 將數量正規化為固定小數位
pub fn quantize(quantity: Decimal) -> Decimal {
    quantity.round_dp(QUANTITY_SCALE)
}

/// 檢查是否為有效的正數量
pub fn is_positive(quantity: Decimal) -> bool {
    quantity > Decimal::ZERO
}
