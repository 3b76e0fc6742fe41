pub mod box_provider;
pub mod provider;
pub mod retry;
pub mod token_accountant;
