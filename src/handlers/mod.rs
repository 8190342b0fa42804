//! Command Handlers module
//!
//! Each handler runs one operation as a single store transaction: lock the
//! affected rows, validate, mutate, record, commit.

mod account_handler;
mod commands;
mod deposit_handler;
mod support;
mod transfer_handler;
mod user_handler;
mod withdraw_handler;


pub use account_handler::AccountHandler;
pub use commands::*;
pub use deposit_handler::DepositHandler;
pub use transfer_handler::TransferHandler;
pub use user_handler::UserHandler;
pub use withdraw_handler::WithdrawHandler;
