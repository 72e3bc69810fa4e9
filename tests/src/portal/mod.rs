//! # QC-18 Portal Flows
//!
//! End-to-end block sequences through `PortalManager`: every test produces
//! a block, applies the produced instructions, and checks committed state.

pub mod fixtures;

mod liquidation_flow;
mod porting_flow;
mod redeem_flow;
mod replay;
mod reward_flow;
