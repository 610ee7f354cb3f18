pub mod agent;
pub mod agent_stake;
pub mod audit_event;
pub mod burn_proposal;
pub mod p2p_order;
pub mod platform_settlement;
pub mod slashing_event;
pub mod sovereign_platform;
pub mod stake_history;
pub mod webhook_nonce;
