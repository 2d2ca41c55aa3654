pub mod ledger;
pub mod leasing;
pub mod paystack;
pub mod rent;
pub mod scheduler;
pub mod settlement;
pub mod users;
pub mod utility;
pub mod vtpass;
