// Stock bookkeeping shared by every flow that moves inventory
pub mod stock_ledger;

// Nurse supply requests and reusable returns
pub mod requests;
pub mod returns;

// Procurement
pub mod cart;
pub mod catalog;
pub mod orders;
