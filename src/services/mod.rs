pub mod access;
pub mod identity;
pub mod ledger;
pub mod metrics;
pub mod quota_manager;
pub mod rewards;
pub mod withdrawals;

pub use access::*;
pub use identity::*;
pub use ledger::*;
pub use metrics::*;
pub use quota_manager::*;
pub use rewards::*;
pub use withdrawals::*;
