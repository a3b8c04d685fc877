pub mod ad_history;
pub mod ledger;
pub mod user;
pub mod withdrawal;

pub use ad_history::*;
pub use ledger::*;
pub use user::*;
pub use withdrawal::*;
