pub mod session_lock;
pub mod short_term;
