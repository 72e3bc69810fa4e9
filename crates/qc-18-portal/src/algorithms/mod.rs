//! # Algorithms
//!
//! Pure integer math used by the processors.

pub mod collateral;
pub mod custodian_matching;
pub mod exchange_tool;
pub mod fee_split;
pub mod median;
pub mod percent;

pub use collateral::{
    backing_collateral, collateral_ratio, collaterals_for_usd, free_collateral_usd,
    liquidation_amounts, locked_in_waiting_portings, matched_in_waiting_portings,
    top_up_amount_needed, total_hold, unlock_amounts_after_redeem, CollateralSelection,
    LiquidationAmounts,
};
pub use custodian_matching::{
    match_custodian_to_waiting_redeem, pick_custodians_for_porting, pick_custodians_for_redeem,
};
pub use exchange_tool::PortalExchangeRateTool;
pub use fee_split::split_proportional;
pub use median::{median, pick_final_rates};
pub use percent::{apply_ppm, down_percent, min_fee, up_percent};
